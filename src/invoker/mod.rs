//! Model backends.
//!
//! The engine only sees [`ModelInvoker`]: one prompt in, raw text out. Each
//! call is exactly one backend request with no retries of its own; the
//! orchestrator owns retry policy so that every attempt lands in the audit
//! trail.
use std::fmt;
use std::time::Duration;

mod command;
mod http;
mod limit;
mod scripted;

pub use command::CommandInvoker;
pub use http::{HttpInvoker, HttpSettings};
pub use limit::{InvocationLimit, InvocationPermit};
pub use scripted::ScriptedInvoker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    Unavailable(String),
    Timeout(Duration),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "backend unavailable: {reason}"),
            Self::Timeout(after) => write!(f, "backend timed out after {}ms", after.as_millis()),
        }
    }
}

impl std::error::Error for BackendError {}

pub trait ModelInvoker: Send + Sync {
    fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError>;

    /// Short label for logs and run metadata.
    fn describe(&self) -> String;
}
