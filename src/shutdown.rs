use crate::error::{PdrError, Result};
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

/// Cooperative cancellation shared between a run and its owner.
#[derive(Clone, Debug, Default)]
pub struct ShutdownNotifier {
    requested: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl ShutdownNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first reason wins.
    pub fn request_shutdown(&self, reason: &str) {
        if let Ok(mut r) = self.reason.lock()
            && r.is_none()
        {
            *r = Some(reason.to_string());
        }
        self.requested.store(true, Ordering::Release);
    }

    #[inline]
    pub fn should_shutdown(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().ok().and_then(|r| r.clone())
    }

    pub fn shutdown_if_necessary(&self) -> Result<()> {
        if self.should_shutdown() {
            return Err(PdrError::Interrupted(
                self.reason()
                    .unwrap_or_else(|| "shutdown requested".to_string()),
            ));
        }
        Ok(())
    }
}
