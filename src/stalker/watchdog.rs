//! Periodic handshake that keeps the portal session alive

use std::sync::Arc;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::PortalClient;

/// Re-handshake every watchdog interval until `scope` is cancelled.
///
/// A failed tick is logged and the next tick tried as usual; ticks never retry.
pub async fn run(client: Arc<PortalClient>, scope: CancellationToken) {
    let period = client.identity().watchdog_interval;
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!("Watchdog started, interval {:?}", period);

    loop {
        tokio::select! {
            biased;
            _ = scope.cancelled() => break,
            _ = ticker.tick() => {
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => break,
                    result = client.keepalive() => match result {
                        Ok(()) => debug!("Watchdog handshake succeeded"),
                        Err(e) => warn!("Watchdog handshake failed: {}", e),
                    },
                }
            }
        }
    }

    debug!("Watchdog stopped");
}
