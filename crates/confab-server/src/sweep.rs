use std::time::{Duration, Instant};

use tracing::debug;

use confab_api::auth::AppState;

/// Background task that prunes stale rate-limiter entries.
///
/// The limiter keeps one entry per distinct client ever seen; without this
/// loop that map would grow without bound. Runs on an interval and drops
/// clients whose whole window has expired.
pub async fn run_sweep_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let dropped = state.limiter.sweep(Instant::now());
        if dropped > 0 {
            debug!("Limiter sweep: dropped {} stale clients", dropped);
        }
    }
}
