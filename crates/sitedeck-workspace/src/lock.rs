//! Per-stack update lock.
//!
//! Acquisition never waits: a second mutating operation is refused while the
//! first holds the lock. The holder's operation kind stays observable so
//! listings can report what a busy stack is doing.

use std::sync::{Arc, Mutex, PoisonError};

use sitedeck_core::UpdateKind;

#[derive(Debug, Clone, Default)]
pub(crate) struct UpdateLock {
    slot: Arc<Mutex<Option<UpdateKind>>>,
}

impl UpdateLock {
    /// Take the lock for `kind`, or `None` if another operation holds it.
    pub(crate) fn try_acquire(&self, kind: UpdateKind) -> Option<UpdateGuard> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return None;
        }
        *slot = Some(kind);
        Some(UpdateGuard {
            slot: self.slot.clone(),
        })
    }

    /// The operation currently holding the lock.
    pub(crate) fn current(&self) -> Option<UpdateKind> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Releases the lock on drop, including on error paths.
#[derive(Debug)]
pub(crate) struct UpdateGuard {
    slot: Arc<Mutex<Option<UpdateKind>>>,
}

impl Drop for UpdateGuard {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let lock = UpdateLock::default();
        let guard = lock.try_acquire(UpdateKind::Update);
        assert!(guard.is_some());
        assert!(lock.try_acquire(UpdateKind::Destroy).is_none());
        assert_eq!(lock.current(), Some(UpdateKind::Update));
    }

    #[test]
    fn test_released_on_drop() {
        let lock = UpdateLock::default();
        drop(lock.try_acquire(UpdateKind::Destroy));
        assert_eq!(lock.current(), None);
        assert!(lock.try_acquire(UpdateKind::Update).is_some());
    }
}
