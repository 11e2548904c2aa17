//! Orchestrator-side deadline around one backend call.
//!
//! The call runs on a helper thread. If no answer arrives within the
//! timeout plus a grace period, the attempt is a timeout and the helper is
//! left to finish on its own; its late answer is discarded.
use crate::invoker::{BackendError, InvocationPermit, ModelInvoker};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub(super) fn invoke_with_deadline(
    invoker: &Arc<dyn ModelInvoker>,
    prompt: String,
    timeout: Duration,
    grace: Duration,
    permit: Option<InvocationPermit>,
) -> Result<String, BackendError> {
    let (sender, receiver) = mpsc::channel();
    let invoker = Arc::clone(invoker);
    let spawned = thread::Builder::new()
        .name("stepgate-invoke".to_string())
        .spawn(move || {
            let _permit = permit;
            let result = invoker.invoke(&prompt, timeout);
            let _ = sender.send(result);
        });
    if let Err(err) = spawned {
        return Err(BackendError::Unavailable(format!(
            "spawn invocation thread: {err}"
        )));
    }

    match receiver.recv_timeout(timeout.saturating_add(grace)) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(BackendError::Timeout(timeout)),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(BackendError::Unavailable(
            "backend call ended without a result".to_string(),
        )),
    }
}
