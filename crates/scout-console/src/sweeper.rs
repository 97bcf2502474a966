use crate::registry::SessionRegistry;
use scout_config::SessionsConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Sweep `registry` every `period` until the registry is dropped
pub fn spawn_sweeper(registry: &Arc<SessionRegistry>, period: Duration) -> JoinHandle<()> {
    let registry = Arc::downgrade(registry);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(registry) = registry.upgrade() else {
                debug!("Session registry gone; sweeper exiting");
                break;
            };
            let removed = registry.sweep();
            if removed > 0 {
                info!("Removed {} expired sessions", removed);
            }
        }
    })
}

/// Sweep period from `config`, never shorter than a minute
pub fn sweep_period(config: &SessionsConfig) -> Duration {
    Duration::from_secs(config.sweep_interval_minutes.max(1) * 60)
}

/// Sweeper on the interval from `config`
pub fn spawn_configured_sweeper(
    registry: &Arc<SessionRegistry>,
    config: &SessionsConfig,
) -> JoinHandle<()> {
    spawn_sweeper(registry, sweep_period(config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_period_from_config() {
        assert_eq!(
            sweep_period(&SessionsConfig::default()),
            Duration::from_secs(30 * 60)
        );
        let zero = SessionsConfig {
            sweep_interval_minutes: 0,
            ..SessionsConfig::default()
        };
        assert_eq!(sweep_period(&zero), Duration::from_secs(60));
    }
}
