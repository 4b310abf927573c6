use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

const CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Background upkeep: compact the WAL once `threshold` appends accumulate and
/// drop notification channels nobody listens to anymore.
pub async fn run_maintenance(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        maintain_once(&engine, threshold).await;
    }
}

/// One maintenance pass. Returns whether the WAL was compacted.
pub async fn maintain_once(engine: &Engine, threshold: u64) -> bool {
    engine.notify.prune();
    let appends = engine.wal_appends_since_compact().await;
    if threshold == 0 || appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!("compacted WAL after {appends} appends");
            true
        }
        Err(e) => {
            tracing::error!("WAL compaction failed: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use crate::notify::NotifyHub;
    use crate::timeslot::DEFAULT_BUSINESS_HOURS;
    use rust_decimal::Decimal;
    use std::path::PathBuf;
    use ulid::Ulid;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("venuebook_test_maintenance");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    async fn engine_with_appends(name: &str, venues: usize) -> Engine {
        let engine = Engine::new(test_wal_path(name), Arc::new(NotifyHub::new()), DEFAULT_BUSINESS_HOURS).unwrap();
        for i in 0..venues {
            engine
                .register_venue(Venue {
                    id: Ulid::new(),
                    name: format!("Hall {i}"),
                    price: Decimal::ZERO,
                    is_active: true,
                    venue_status: VenueStatus::Active,
                    business_hours: None,
                })
                .await
                .unwrap();
        }
        engine
    }

    #[tokio::test]
    async fn compacts_at_threshold() {
        let engine = engine_with_appends("threshold.wal", 3).await;
        assert!(!maintain_once(&engine, 4).await);
        assert_eq!(engine.wal_appends_since_compact().await, 3);
        assert!(maintain_once(&engine, 3).await);
        assert_eq!(engine.wal_appends_since_compact().await, 0);
    }

    #[tokio::test]
    async fn zero_threshold_disables_compaction() {
        let engine = engine_with_appends("disabled.wal", 2).await;
        assert!(!maintain_once(&engine, 0).await);
        assert_eq!(engine.wal_appends_since_compact().await, 2);
    }

    #[tokio::test]
    async fn prunes_dead_channels() {
        let engine = engine_with_appends("prune.wal", 0).await;
        let rx = engine.notify.subscribe(Ulid::new());
        drop(rx);
        maintain_once(&engine, 0).await;
        assert_eq!(engine.notify.channel_count(), 0);
    }
}
