//! Completion request construction under the provider's token ceiling.
//!
//! Layout: one system message (instructions, then context if any), the
//! retained history, then the user message. The estimate covers the whole
//! request; context gets whatever the ceiling leaves after the base prompt
//! and the response reserve.

use ragpipe_config::{PromptConfig, ProviderConfig};
use ragpipe_context::{TokenEstimator, truncate_chars};
use ragpipe_core::Message;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default instructions for the assistant.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a knowledgeable assistant for our products and services. \
Answer directly and concisely. When relevant context is provided, use it for specific details \
and answer with confidence. Only express uncertainty when the context does not cover the question.";

const CONTEXT_HEADER: &str = "\n\nRelevant context:\n";

/// Appended when context was cut to fit.
pub const CONTEXT_TRUNCATED_NOTICE: &str = "\n\n[Context truncated to fit the token limit]";

/// Per-message overhead for role name and delimiters.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// A completion request ready to send.
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub messages: Vec<Message>,
    pub max_response_tokens: u32,
    pub estimated_prompt_tokens: usize,
    pub context_included: bool,
    pub context_truncated: bool,
    /// Oldest history messages left out to fit the ceiling.
    pub history_dropped: usize,
}

pub struct PromptBuilder {
    system_prompt: String,
    estimator: Arc<dyn TokenEstimator>,
    max_total_tokens: usize,
    response_reserve_tokens: usize,
    min_response_tokens: usize,
    max_response_tokens: u32,
}

impl PromptBuilder {
    pub fn new(estimator: Arc<dyn TokenEstimator>, prompt: &PromptConfig, provider: &ProviderConfig) -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            estimator,
            max_total_tokens: prompt.max_total_tokens,
            response_reserve_tokens: prompt.response_reserve_tokens,
            min_response_tokens: prompt.min_response_tokens,
            max_response_tokens: provider.max_response_tokens,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    fn message_tokens(&self, content: &str) -> usize {
        MESSAGE_OVERHEAD_TOKENS + self.estimator.estimate(content)
    }

    pub fn build(&self, history: &[Message], user_message: &str, context: Option<&str>) -> BuiltPrompt {
        let fixed = self.message_tokens(&self.system_prompt) + self.message_tokens(user_message);
        let mut history_tokens: usize = history.iter().map(|m| self.message_tokens(&m.content)).sum();

        // Oldest turns go first when the base prompt alone is too large.
        let mut start = 0;
        while start < history.len() && fixed + history_tokens + self.response_reserve_tokens > self.max_total_tokens {
            history_tokens -= self.message_tokens(&history[start].content);
            start += 1;
        }
        if start > 0 {
            warn!(dropped = start, "History trimmed to fit the token ceiling");
        }

        let base = fixed + history_tokens;
        let available = self
            .max_total_tokens
            .saturating_sub(base + self.response_reserve_tokens);

        let (context_text, context_truncated) = match context {
            Some(ctx) if !ctx.is_empty() => self.fit_context(ctx, available),
            _ => (None, false),
        };

        let system_content = match &context_text {
            Some(ctx) => format!("{}{CONTEXT_HEADER}{ctx}", self.system_prompt),
            None => self.system_prompt.clone(),
        };

        let mut messages = Vec::with_capacity(history.len() - start + 2);
        messages.push(Message::system(system_content));
        messages.extend(history[start..].iter().cloned());
        messages.push(Message::user(user_message));

        let estimated_prompt_tokens: usize = messages.iter().map(|m| self.message_tokens(&m.content)).sum();
        let headroom = self.max_total_tokens.saturating_sub(estimated_prompt_tokens);
        let max_response_tokens = (self.max_response_tokens as usize)
            .min(headroom)
            .max(self.min_response_tokens);

        debug!(
            estimated_prompt_tokens,
            available_for_context = available,
            max_response_tokens,
            "Prompt built"
        );

        BuiltPrompt {
            messages,
            max_response_tokens: u32::try_from(max_response_tokens).unwrap_or(u32::MAX),
            estimated_prompt_tokens,
            context_included: context_text.is_some(),
            context_truncated,
            history_dropped: start,
        }
    }

    /// Fit `context` into `available` tokens, header included.
    fn fit_context(&self, context: &str, available: usize) -> (Option<String>, bool) {
        let header = self.estimator.estimate(CONTEXT_HEADER);
        let allowance = available.saturating_sub(header);
        if allowance == 0 {
            warn!("No room for context, sending instructions only");
            return (None, false);
        }

        if self.estimator.estimate(context) <= allowance {
            return (Some(context.to_string()), false);
        }

        let text_tokens = allowance.saturating_sub(self.estimator.estimate(CONTEXT_TRUNCATED_NOTICE));
        let prefix = truncate_chars(context, self.estimator.max_chars(text_tokens));
        if prefix.is_empty() {
            warn!("No room for context, sending instructions only");
            return (None, false);
        }

        warn!(allowance, "Context too large, truncating");
        (Some(format!("{prefix}{CONTEXT_TRUNCATED_NOTICE}")), true)
    }
}
