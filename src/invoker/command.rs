//! Local LM command backend.
//!
//! Runs a user-configured command with the prompt on stdin and takes stdout
//! as the response. Any tool that reads text and writes text works (`llm`,
//! `ollama run`, a wrapper script).
use super::{BackendError, ModelInvoker};
use anyhow::{anyhow, Context, Result};
use std::io::{Read, Write};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// Environment variable carrying the `--model` override to the LM command.
pub const MODEL_ENV: &str = "STEPGATE_MODEL";

#[derive(Debug, Clone)]
pub struct CommandInvoker {
    command: String,
    program: String,
    args: Vec<String>,
    model: Option<String>,
}

impl CommandInvoker {
    pub fn new(command: &str) -> Result<Self> {
        let mut args =
            shell_words::split(command).with_context(|| format!("parse LM command: {command}"))?;
        if args.is_empty() {
            return Err(anyhow!("LM command is empty"));
        }
        let program = args.remove(0);
        Ok(Self {
            command: command.to_string(),
            program,
            args,
            model: None,
        })
    }

    /// Export `model` to the command as [`MODEL_ENV`].
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn spawn(&self) -> Result<Child, BackendError> {
        let mut command = Command::new(&self.program);
        if let Some(model) = &self.model {
            command.env(MODEL_ENV, model);
        }
        command
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                BackendError::Unavailable(format!("spawn LM command {}: {err}", self.program))
            })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut bytes);
        }
        bytes
    })
}

impl ModelInvoker for CommandInvoker {
    fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError> {
        let start = Instant::now();
        let mut child = self.spawn()?;

        // Pipes are serviced on their own threads so a chatty child cannot
        // block on a full buffer while we poll for exit.
        let stdin = child.stdin.take();
        let prompt_bytes = prompt.as_bytes().to_vec();
        let writer = thread::spawn(move || {
            if let Some(mut stdin) = stdin {
                let _ = stdin.write_all(&prompt_bytes);
            }
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(err) => {
                    return Err(BackendError::Unavailable(format!(
                        "wait for LM command: {err}"
                    )))
                }
            }
            if start.elapsed() > timeout {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(
                    command = %self.command,
                    timeout_ms = timeout.as_millis() as u64,
                    "lm command timed out"
                );
                return Err(BackendError::Timeout(timeout));
            }
            thread::sleep(POLL_INTERVAL);
        };

        let _ = writer.join();
        let stdout = stdout.join().unwrap_or_default();
        let stderr = stderr.join().unwrap_or_default();
        let elapsed_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            elapsed_ms,
            prompt_bytes = prompt.len(),
            response_bytes = stdout.len(),
            "lm invoke complete"
        );

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(BackendError::Unavailable(format!(
                "LM command failed with status {status}: {}",
                stderr.trim()
            )));
        }

        String::from_utf8(stdout)
            .map_err(|err| BackendError::Unavailable(format!("decode LM stdout as UTF-8: {err}")))
    }

    fn describe(&self) -> String {
        format!("command: {}", self.command)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn echoes_stdin_through_cat() {
        let invoker = CommandInvoker::new("cat").expect("parse command");
        let response = invoker
            .invoke("hello prompt", Duration::from_secs(10))
            .expect("cat succeeds");
        assert_eq!(response, "hello prompt");
    }

    #[test]
    fn slow_command_times_out() {
        let invoker = CommandInvoker::new("sleep 5").expect("parse command");
        let err = invoker
            .invoke("ignored", Duration::from_millis(100))
            .expect_err("times out");
        assert_eq!(err, BackendError::Timeout(Duration::from_millis(100)));
    }

    #[test]
    fn failing_command_is_unavailable() {
        let invoker = CommandInvoker::new("sh -c 'echo boom >&2; exit 3'").expect("parse command");
        let err = invoker
            .invoke("", Duration::from_secs(10))
            .expect_err("fails");
        let BackendError::Unavailable(reason) = err else {
            panic!("expected unavailable, got {err:?}");
        };
        assert!(reason.contains("boom"), "{reason}");
    }

    #[test]
    fn missing_program_is_unavailable() {
        let invoker =
            CommandInvoker::new("stepgate-no-such-program-xyz").expect("parse command");
        assert!(matches!(
            invoker.invoke("", Duration::from_secs(1)),
            Err(BackendError::Unavailable(_))
        ));
    }

    #[test]
    fn model_override_reaches_the_command() {
        let invoker = CommandInvoker::new("sh -c 'cat >/dev/null; printf %s \"$STEPGATE_MODEL\"'")
            .expect("parse command")
            .with_model(Some("qwen2".to_string()));
        let response = invoker
            .invoke("prompt", Duration::from_secs(5))
            .expect("command output");
        assert_eq!(response.trim(), "qwen2");
    }

    #[test]
    fn empty_command_is_rejected() {
        assert!(CommandInvoker::new("   ").is_err());
    }
}
