//! Observer callbacks and their identities

use super::Delivery;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Identifier handed out on registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObserverId(pub u64);

static OBSERVER_COUNTER: AtomicU64 = AtomicU64::new(1);

impl ObserverId {
    pub fn new() -> Self {
        Self(OBSERVER_COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

#[derive(Debug, Error)]
#[error("observer failed: {0}")]
pub struct ObserverError(pub String);

/// Receives events on behalf of one actor
///
/// Observers are shared and called from whichever task publishes, so any
/// state they keep needs interior mutability.
pub trait Observer: Send + Sync {
    fn on_event(&self, delivery: &Delivery) -> Result<(), ObserverError>;
}

pub type SharedObserver = Arc<dyn Observer>;

/// Observer backed by a closure
pub struct FnObserver<F>
where
    F: Fn(&Delivery) -> Result<(), ObserverError> + Send + Sync,
{
    handler: F,
}

impl<F> FnObserver<F>
where
    F: Fn(&Delivery) -> Result<(), ObserverError> + Send + Sync + 'static,
{
    pub fn shared(handler: F) -> SharedObserver {
        Arc::new(Self { handler })
    }
}

impl<F> Observer for FnObserver<F>
where
    F: Fn(&Delivery) -> Result<(), ObserverError> + Send + Sync,
{
    fn on_event(&self, delivery: &Delivery) -> Result<(), ObserverError> {
        (self.handler)(delivery)
    }
}
