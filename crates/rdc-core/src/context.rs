//! Execution contexts.
//!
//! A context is a logical unit of work (a request, a job) that owns its own
//! set of connections. The factory asks the injected [`ContextService`] for
//! the current id and hands it a cleanup to run when the unit ends.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::debug;
use uuid::Uuid;

/// Id reported by [`GlobalContext`].
pub const GLOBAL_CONTEXT_ID: &str = "global";

/// Cleanup registered with a context.
pub type ContextCallback = Box<dyn FnOnce() + Send + 'static>;

/// Supplies the current context to the connection factory.
pub trait ContextService: Send + Sync {
    /// Id of the current context; stable for its whole lifetime.
    fn current_context_id(&self) -> String;

    /// Whether connections are isolated per context.
    fn supports_concurrent_contexts(&self) -> bool;

    /// Run `callback` once when the current context ends.
    fn on_context_end(&self, callback: ContextCallback);
}

/// A single process-wide scope without isolation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalContext;

impl ContextService for GlobalContext {
    fn current_context_id(&self) -> String {
        GLOBAL_CONTEXT_ID.to_string()
    }

    fn supports_concurrent_contexts(&self) -> bool {
        false
    }

    /// The global scope never ends, so the callback is dropped.
    fn on_context_end(&self, _callback: ContextCallback) {}
}

#[derive(Default)]
struct ContextState {
    finished: bool,
    callbacks: Vec<ContextCallback>,
}

/// An explicit, isolated context for one unit of work.
///
/// Call [`RequestContext::finish`] when the unit ends; dropping the context
/// finishes it as well. Callbacks run exactly once, in registration order.
pub struct RequestContext {
    id: String,
    state: Mutex<ContextState>,
}

impl RequestContext {
    /// New context with a random id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(ContextState::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_finished(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .finished
    }

    /// End the context and run its cleanups. Later calls do nothing.
    pub fn finish(&self) {
        let callbacks = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.finished {
                return;
            }
            state.finished = true;
            std::mem::take(&mut state.callbacks)
        };

        debug!(context = %self.id, callbacks = callbacks.len(), "Context finished");
        for callback in callbacks {
            callback();
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("id", &self.id)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        self.finish();
    }
}

impl ContextService for RequestContext {
    fn current_context_id(&self) -> String {
        self.id.clone()
    }

    fn supports_concurrent_contexts(&self) -> bool {
        true
    }

    fn on_context_end(&self, callback: ContextCallback) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finished {
            drop(state);
            callback();
            return;
        }
        state.callbacks.push(callback);
    }
}
