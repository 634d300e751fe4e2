//! Panic isolation for plugin calls.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::contracts::{StageError, StageResult};

/// A plugin call that panicked instead of returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Panicked(pub String);

impl std::fmt::Display for Panicked {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "panicked: {}", self.0)
    }
}

/// Await a plugin call, catching a panic so it can be recorded like an error.
pub(crate) async fn guarded<F: Future>(call: F) -> Result<F::Output, Panicked> {
    // Plugins are only borrowed across the call
    AssertUnwindSafe(call)
        .catch_unwind()
        .await
        .map_err(|payload| Panicked(panic_message(payload.as_ref())))
}

/// [`guarded`] for calls that already return a [`StageResult`]; a panic
/// becomes a [`StageError`].
pub(crate) async fn stage_call<T>(call: impl Future<Output = StageResult<T>>) -> StageResult<T> {
    guarded(call)
        .await
        .unwrap_or_else(|panic| Err(StageError::failed(panic.to_string())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
