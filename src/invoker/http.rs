//! OpenAI-compatible chat-completions backend.
use super::{BackendError, ModelInvoker};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Full URL of the chat-completions endpoint.
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub system_prompt: String,
}

#[derive(Debug, Clone)]
pub struct HttpInvoker {
    settings: HttpSettings,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpInvoker {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.settings.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        }
    }
}

fn map_error(err: ureq::Error, timeout: Duration) -> BackendError {
    match err {
        ureq::Error::Timeout(_) => BackendError::Timeout(timeout),
        ureq::Error::StatusCode(code) => {
            BackendError::Unavailable(format!("endpoint answered HTTP {code}"))
        }
        other => BackendError::Unavailable(other.to_string()),
    }
}

impl ModelInvoker for HttpInvoker {
    fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError> {
        let start = std::time::Instant::now();
        let agent = ureq::Agent::new_with_config(
            ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build(),
        );

        let mut request = agent.post(&self.settings.endpoint);
        if let Some(key) = &self.settings.api_key {
            request = request.header("Authorization", &format!("Bearer {key}"));
        }
        let mut response = request
            .send_json(self.request_body(prompt))
            .map_err(|err| map_error(err, timeout))?;
        let parsed: ChatResponse = response
            .body_mut()
            .read_json()
            .map_err(|err| map_error(err, timeout))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| BackendError::Unavailable("response carried no choices".to_string()))?;

        tracing::info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = content.len(),
            model = %self.settings.model,
            "lm invoke complete"
        );
        Ok(content)
    }

    fn describe(&self) -> String {
        format!("http: {} ({})", self.settings.endpoint, self.settings.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> HttpSettings {
        HttpSettings {
            endpoint: "http://127.0.0.1:9/v1/chat/completions".to_string(),
            model: "local-model".to_string(),
            api_key: None,
            temperature: 0.1,
            system_prompt: "You are a literal code reviewer.".to_string(),
        }
    }

    #[test]
    fn request_body_carries_system_and_user_messages() {
        let invoker = HttpInvoker::new(settings());
        let body = serde_json::to_value(invoker.request_body("review this")).expect("serialize");
        assert_eq!(body["model"], "local-model");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "review this");
    }

    #[test]
    fn response_content_is_extracted() {
        let parsed: ChatResponse = serde_json::from_str(
            r#"{"choices": [{"message": {"role": "assistant", "content": "ok"}}]}"#,
        )
        .expect("parse response");
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("ok")
        );
    }
}
