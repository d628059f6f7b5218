use std::sync::{Arc, Mutex, PoisonError};

use crate::shared::frame::Frame;

/// Latest-frame mailbox shared between a capture stream and its readers.
///
/// Publishing replaces whatever was there; an empty slot means the source
/// is not (or no longer) producing decodable frames.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<Mutex<Option<Arc<Frame>>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, frame: Frame) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(frame));
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
