//! Per-server drive registry: one drive instance per connected server.
//!
//! A reader is built once and reused; here the unit of reuse is an
//! entire [`Drive`], memoized per server id behind a `DashMap` so
//! concurrent requests for the same server share one initialization
//! rather than racing to bootstrap or discover it twice.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;
use tracing::warn;

use crate::drive::Drive;
use crate::error::{DriveError, DriveResult};

pub type ServerId = u64;

/// The outcome of a server's one-time drive initialization.
#[derive(Clone)]
enum DriveCell {
    Ready(Arc<Drive>),
    Poisoned(Arc<str>),
}

/// Holds at most one [`Drive`] per server, constructed lazily on first
/// access and reused by every later caller.
#[derive(Default)]
pub struct DriveRegistry {
    cells: DashMap<ServerId, Arc<OnceCell<DriveCell>>>,
}

impl DriveRegistry {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    /// Fetch the drive for `server`, running `init` at most once per
    /// server to construct it. A drive found poisoned on an earlier
    /// operation is surfaced as [`DriveError::Internal`] without
    /// retrying `init`; call [`DriveRegistry::evict`] first to force a
    /// fresh attempt.
    pub async fn get_or_init<F, Fut>(&self, server: ServerId, init: F) -> DriveResult<Arc<Drive>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = DriveResult<Drive>>,
    {
        let cell = self
            .cells
            .entry(server)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell
            .get_or_init(|| async move {
                match init().await {
                    Ok(drive) => DriveCell::Ready(Arc::new(drive)),
                    Err(err) => DriveCell::Poisoned(Arc::from(err.to_string())),
                }
            })
            .await
            .clone();

        match result {
            DriveCell::Ready(drive) => {
                if drive.is_poisoned() {
                    let reason = drive.poison_reason().await.unwrap_or_default();
                    warn!(server, %reason, "drive observed poisoned on lookup");
                    return Err(DriveError::Internal(reason));
                }
                Ok(drive.clone())
            }
            DriveCell::Poisoned(reason) => Err(DriveError::Internal(reason.to_string())),
        }
    }

    /// Drop a server's memoized drive so the next [`DriveRegistry::get_or_init`]
    /// call reruns its init closure. Intended for a supervisor that has
    /// observed [`Drive::is_poisoned`] and wants to force rediscovery.
    pub fn evict(&self, server: ServerId) {
        self.cells.remove(&server);
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::initialize_drive;
    use crate::memory_platform::MemoryPlatform;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn get_or_init_only_runs_init_once_per_server() {
        let registry = DriveRegistry::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let drive = registry
                .get_or_init(1, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let platform: Arc<dyn crate::platform::ChatPlatform> =
                        Arc::new(MemoryPlatform::new(1));
                    let (_pointers, drive) = initialize_drive(platform)
                        .await
                        .map_err(|_| DriveError::Internal("init failed".into()))?;
                    Ok(drive)
                })
                .await
                .unwrap();
            assert_eq!(drive.bucket_count().await, 1);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn evict_forces_a_fresh_init_on_next_lookup() {
        let registry = DriveRegistry::new();
        let calls = AtomicUsize::new(0);

        let make = |calls: &AtomicUsize| async {
            calls.fetch_add(1, Ordering::SeqCst);
            let platform: Arc<dyn crate::platform::ChatPlatform> = Arc::new(MemoryPlatform::new(1));
            let (_pointers, drive) = initialize_drive(platform)
                .await
                .map_err(|_| DriveError::Internal("init failed".into()))?;
            Ok(drive)
        };

        registry.get_or_init(7, || make(&calls)).await.unwrap();
        registry.evict(7);
        registry.get_or_init(7, || make(&calls)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
