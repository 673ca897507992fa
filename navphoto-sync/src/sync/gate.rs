use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

static PROCESS_GATE: OnceLock<UploadGate> = OnceLock::new();

/// Upload serializer: at most one holder at a time.
///
/// Clones share the same slot, so one gate handed to several engines still
/// admits a single upload across all of them.
#[derive(Debug, Clone)]
pub struct UploadGate {
    slot: Arc<Mutex<()>>,
    uploading: Arc<AtomicBool>,
}

impl UploadGate {
    /// A gate of its own, not shared with any other engine.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(())),
            uploading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// The gate every [`crate::sync::engine::SyncEngine`] uses unless told otherwise.
    pub fn process_wide() -> Self {
        PROCESS_GATE.get_or_init(UploadGate::new).clone()
    }

    /// Waits until no other upload holds the gate.
    pub async fn acquire(&self) -> UploadPermit {
        let guard = Arc::clone(&self.slot).lock_owned().await;
        self.uploading.store(true, Ordering::SeqCst);
        UploadPermit {
            _guard: guard,
            uploading: Arc::clone(&self.uploading),
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::SeqCst)
    }

    pub fn shares_slot_with(&self, other: &UploadGate) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl Default for UploadGate {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases the gate on drop, whatever path the upload took.
#[derive(Debug)]
pub struct UploadPermit {
    _guard: OwnedMutexGuard<()>,
    uploading: Arc<AtomicBool>,
}

impl Drop for UploadPermit {
    fn drop(&mut self) {
        // Cleared before the guard is released, so the next holder always
        // sets the flag after this store.
        self.uploading.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn flag_tracks_holder() {
        let gate = UploadGate::new();
        assert!(!gate.is_uploading());

        let permit = gate.acquire().await;
        assert!(gate.is_uploading());

        drop(permit);
        assert!(!gate.is_uploading());
    }

    #[tokio::test]
    async fn second_acquire_waits_for_release() {
        let gate = UploadGate::new();
        let permit = gate.acquire().await;

        let contender = gate.clone();
        let waiter = tokio::spawn(async move {
            let _permit = contender.acquire().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(!gate.is_uploading());
    }

    #[tokio::test]
    async fn permit_is_released_when_holder_errors() {
        async fn failing_upload(gate: &UploadGate) -> Result<(), &'static str> {
            let _permit = gate.acquire().await;
            Err("remote rejected")
        }

        let gate = UploadGate::new();
        assert!(failing_upload(&gate).await.is_err());
        assert!(!gate.is_uploading());
        let _again = tokio::time::timeout(Duration::from_secs(1), gate.acquire())
            .await
            .unwrap();
    }

    #[test]
    fn process_wide_gate_is_shared() {
        let first = UploadGate::process_wide();
        let second = UploadGate::process_wide();

        assert!(first.shares_slot_with(&second));
        assert!(!first.shares_slot_with(&UploadGate::new()));
    }
}
