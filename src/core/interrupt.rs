//! Stop requests for in-flight increments.
//!
//! Each increment registers a `CancellationToken` under its task id for as
//! long as it runs. Hosts (admin actions, signal handlers) cancel the token;
//! the increment notices at its next checkpoint and winds down.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::task::TaskId;

/// Registry of stop tokens for running increments.
#[derive(Debug, Default)]
pub struct Interrupts {
    tokens: Mutex<HashMap<TaskId, CancellationToken>>,
}

impl Interrupts {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh token for `id`. The token is removed when the
    /// returned registration is dropped.
    pub fn register(&self, id: TaskId) -> Registration<'_> {
        let token = CancellationToken::new();
        self.tokens.lock().insert(id, token.clone());
        Registration {
            interrupts: self,
            id,
            token,
        }
    }

    /// Ask the increment running `id` to stop. Returns false if none runs here.
    pub fn request_stop(&self, id: TaskId) -> bool {
        match self.tokens.lock().get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ask every in-flight increment to stop; returns how many were signalled.
    pub fn request_stop_all(&self) -> usize {
        let tokens = self.tokens.lock();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Whether an increment for `id` is in flight in this process.
    #[must_use]
    pub fn is_in_flight(&self, id: TaskId) -> bool {
        self.tokens.lock().contains_key(&id)
    }
}

/// Live registration of one increment's stop token.
#[derive(Debug)]
pub struct Registration<'a> {
    interrupts: &'a Interrupts,
    id: TaskId,
    token: CancellationToken,
}

impl Registration<'_> {
    /// The increment's stop token.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.interrupts.tokens.lock().remove(&self.id);
    }
}
