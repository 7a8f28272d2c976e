//! A configurable mock of [`guard_core::capabilities::Completion`], grounded
//! on `dashflow-testing::MockTool`'s handler/fixed-response/call-history/
//! fail-next shape.

use std::sync::Arc;

use async_trait::async_trait;
use guard_core::capabilities::{Completion, CompletionResponse};
use guard_core::error::{Error, Result};
use parking_lot::Mutex;

/// Handler function type for dynamic mock completions.
pub type MockCompletionHandler = Arc<dyn Fn(&str, &str, &str) -> Result<CompletionResponse> + Send + Sync>;

/// A configurable mock completion provider.
#[derive(Clone)]
pub struct MockCompletion {
    handler: Option<MockCompletionHandler>,
    fixed_response: CompletionResponse,
    call_history: Arc<Mutex<Vec<(String, String, String)>>>,
    should_fail: Arc<Mutex<bool>>,
    error_message: String,
}

impl MockCompletion {
    /// A mock that always returns a fixed response.
    #[must_use]
    pub fn new() -> Self {
        MockCompletion {
            handler: None,
            fixed_response: CompletionResponse {
                text: "mock completion".to_string(),
                prompt_tokens: 10,
                completion_tokens: 5,
                latency_ms: 1,
            },
            call_history: Arc::new(Mutex::new(Vec::new())),
            should_fail: Arc::new(Mutex::new(false)),
            error_message: "mock completion error".to_string(),
        }
    }

    /// Set a fixed response text (token counts stay at their defaults).
    #[must_use]
    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.fixed_response.text = text.into();
        self
    }

    /// Set a handler that computes the response from `(model, system_prompt, user_message)`.
    #[must_use]
    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str, &str, &str) -> Result<CompletionResponse> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Fail on the next call only.
    pub fn fail_next(&self) {
        *self.should_fail.lock() = true;
    }

    /// Number of calls made so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_history.lock().len()
    }

    /// The `(model, system_prompt, user_message)` triples seen so far.
    #[must_use]
    pub fn call_history(&self) -> Vec<(String, String, String)> {
        self.call_history.lock().clone()
    }
}

impl Default for MockCompletion {
    fn default() -> Self {
        MockCompletion::new()
    }
}

#[async_trait]
impl Completion for MockCompletion {
    async fn complete(&self, model: &str, system_prompt: &str, user_message: &str) -> Result<CompletionResponse> {
        self.call_history.lock().push((model.to_string(), system_prompt.to_string(), user_message.to_string()));

        {
            let mut should_fail = self.should_fail.lock();
            if *should_fail {
                *should_fail = false;
                return Err(Error::ExternalUnavailable(self.error_message.clone()));
            }
        }

        if let Some(handler) = &self.handler {
            handler(model, system_prompt, user_message)
        } else {
            Ok(self.fixed_response.clone())
        }
    }
}
