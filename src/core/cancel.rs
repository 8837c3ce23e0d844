use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::error::{LauncherError, LauncherResult};

/// Cooperative cancellation signal threaded through installs and batches.
pub type CancelFlag = Arc<AtomicBool>;

pub fn new_cancel_flag() -> CancelFlag {
    Arc::new(AtomicBool::new(false))
}

/// Check whether the cancellation flag has been raised.
pub fn cancel_requested(cancel: &CancelFlag) -> bool {
    cancel.load(Ordering::SeqCst)
}

pub fn request_cancel(cancel: &CancelFlag) {
    cancel.store(true, Ordering::SeqCst);
}

pub fn ensure_not_cancelled(cancel: &CancelFlag) -> LauncherResult<()> {
    if cancel_requested(cancel) {
        Err(LauncherError::Cancelled)
    } else {
        Ok(())
    }
}
