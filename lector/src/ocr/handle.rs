use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{LectorError, Result};

use super::engine::RecognitionEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HandleState {
    Uninitialized,
    Ready,
    Busy,
    Terminated,
}

impl HandleState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => HandleState::Ready,
            2 => HandleState::Busy,
            3 => HandleState::Terminated,
            _ => HandleState::Uninitialized,
        }
    }
}

type EngineSlot = Option<Box<dyn RecognitionEngine>>;

/// An initialized engine bound to one language.
///
/// The engine sits behind an async mutex; [`EngineHandle::checkout`] is the
/// only way to reach it, so calls on one handle are serialized.
pub struct EngineHandle {
    language: String,
    index: usize,
    state: AtomicU8,
    engine: Arc<Mutex<EngineSlot>>,
}

impl EngineHandle {
    pub(crate) fn new(language: String, index: usize, engine: Box<dyn RecognitionEngine>) -> Self {
        Self {
            language,
            index,
            state: AtomicU8::new(HandleState::Ready as u8),
            engine: Arc::new(Mutex::new(Some(engine))),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Position of this handle within its language's handle set.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> HandleState {
        HandleState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Wait for exclusive use of the engine.
    ///
    /// The returned [`Checkout`] marks the handle `Busy` until dropped, which
    /// also happens while unwinding out of a panicking engine call.
    pub(crate) async fn checkout(self: &Arc<Self>) -> Result<Checkout> {
        let guard = Arc::clone(&self.engine).lock_owned().await;
        if guard.is_none() {
            return Err(LectorError::PoolClosed);
        }
        self.state
            .store(HandleState::Busy as u8, Ordering::Release);

        Ok(Checkout {
            guard,
            handle: Arc::clone(self),
        })
    }

    /// Release the engine. Waits for an in-flight call to finish first.
    ///
    /// Returns `false` when the handle was already terminated.
    pub(crate) async fn terminate(&self) -> bool {
        let mut slot = self.engine.lock().await;
        let engine = slot.take();
        self.state
            .store(HandleState::Terminated as u8, Ordering::Release);
        engine.is_some()
    }
}

impl std::fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineHandle")
            .field("language", &self.language)
            .field("index", &self.index)
            .field("state", &self.state())
            .finish()
    }
}

/// Exclusive access to one engine for the duration of a recognition call.
pub(crate) struct Checkout {
    guard: OwnedMutexGuard<EngineSlot>,
    handle: Arc<EngineHandle>,
}

impl Checkout {
    pub(crate) fn engine(&mut self) -> Result<&mut (dyn RecognitionEngine + 'static)> {
        self.guard
            .as_deref_mut()
            .ok_or(LectorError::PoolClosed)
    }
}

impl Drop for Checkout {
    fn drop(&mut self) {
        let _ = self.handle.state.compare_exchange(
            HandleState::Busy as u8,
            HandleState::Ready as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::engine::RawRecognition;

    struct EchoEngine;

    impl RecognitionEngine for EchoEngine {
        fn recognize(&mut self, image: &[u8]) -> Result<RawRecognition> {
            Ok(RawRecognition {
                text: String::from_utf8_lossy(image).to_string(),
                confidence: 90.0,
            })
        }
    }

    fn handle() -> Arc<EngineHandle> {
        Arc::new(EngineHandle::new("eng".to_string(), 0, Box::new(EchoEngine)))
    }

    #[tokio::test]
    async fn test_checkout_marks_busy_until_dropped() {
        let handle = handle();
        assert_eq!(handle.state(), HandleState::Ready);

        let mut checkout = handle.checkout().await.unwrap();
        assert_eq!(handle.state(), HandleState::Busy);
        let raw = checkout.engine().unwrap().recognize(b"hi").unwrap();
        assert_eq!(raw.text, "hi");

        drop(checkout);
        assert_eq!(handle.state(), HandleState::Ready);
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let handle = handle();
        assert!(handle.terminate().await);
        assert!(!handle.terminate().await);
        assert_eq!(handle.state(), HandleState::Terminated);
    }

    #[tokio::test]
    async fn test_checkout_after_terminate_is_pool_closed() {
        let handle = handle();
        handle.terminate().await;
        assert!(matches!(
            handle.checkout().await,
            Err(LectorError::PoolClosed)
        ));
    }

    #[tokio::test]
    async fn test_terminate_waits_for_checkout() {
        let handle = handle();
        let checkout = handle.checkout().await.unwrap();

        let pending = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.terminate().await })
        };
        tokio::task::yield_now().await;
        assert_eq!(handle.state(), HandleState::Busy);

        drop(checkout);
        assert!(pending.await.unwrap());
        assert_eq!(handle.state(), HandleState::Terminated);
    }
}
