//! The chat pipeline façade.
//!
//! Per inbound message:
//! rate limit → input screening → response cache → context assembly →
//! prompt under the token ceiling → completion → confidence → history →
//! cache write-back. Every answered message, cached or not, is tallied by
//! topic for interaction analysis.
//!
//! The response cache is only written after a fully successful run.

use crate::analysis::{GlobalAnalysis, InteractionLog, SessionAnalysis, UNKNOWN_CATEGORY};
use crate::confidence::{confidence, needs_human};
use crate::history::HistoryStore;
use crate::prompt::PromptBuilder;
use crate::stats::{PipelineStats, StatsSnapshot};
use ragpipe_cache::CacheService;
use ragpipe_config::AppConfig;
use ragpipe_context::{CharRatioEstimator, ContextAssembler, QueryExpander};
use ragpipe_core::{Error, Message, Provider, ProviderRequest, Result, VectorIndex};
use ragpipe_providers::BatchedEmbedder;
use ragpipe_security::{InputCheckResult, InputValidator, RateLimiter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// One message from a caller.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Caller identity for rate limiting (network address).
    pub caller: String,
    pub session_id: String,
    pub text: String,
}

impl InboundMessage {
    pub fn new(caller: impl Into<String>, session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            caller: caller.into(),
            session_id: session_id.into(),
            text: text.into(),
        }
    }
}

/// The pipeline's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub confidence: f32,
    pub needs_human: bool,
    pub context_used: bool,
    /// Keyword topic of the message.
    #[serde(default = "unknown_category")]
    pub category: String,
    /// Served from the response cache.
    #[serde(default)]
    pub cached: bool,
}

fn unknown_category() -> String {
    UNKNOWN_CATEGORY.to_string()
}

pub struct ChatPipeline {
    provider: Arc<dyn Provider>,
    assembler: ContextAssembler,
    rate_limiter: RateLimiter,
    validator: InputValidator,
    caches: Arc<CacheService<ChatResponse>>,
    prompts: PromptBuilder,
    history: HistoryStore,
    topics: QueryExpander,
    interactions: InteractionLog,
    stats: PipelineStats,
    model: String,
    temperature: f32,
    context_max_tokens: usize,
}

impl ChatPipeline {
    /// Wire the pipeline from configuration. `provider` serves both
    /// completions and (batched, cached) embeddings.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, index: Arc<dyn VectorIndex>) -> Self {
        let caches = Arc::new(CacheService::new(&config.cache));
        let estimator = Arc::new(CharRatioEstimator::new(config.context.chars_per_token));
        let session_ttl = Duration::from_secs(config.prompt.history_ttl_secs);

        let embedder = BatchedEmbedder::from_config(provider.clone(), &config.provider, &config.batch)
            .with_cache(caches.embeddings.clone());
        let assembler = ContextAssembler::from_config(Arc::new(embedder), index, &config.context)
            .with_estimator(estimator.clone())
            .with_document_cache(caches.documents.clone());

        Self {
            provider,
            assembler,
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            validator: InputValidator::new(config.prompt.max_input_chars),
            caches,
            prompts: PromptBuilder::new(estimator, &config.prompt, &config.provider),
            history: HistoryStore::new(config.prompt.history_messages, session_ttl),
            topics: QueryExpander::new(config.context.max_expansions),
            interactions: InteractionLog::new(session_ttl),
            stats: PipelineStats::default(),
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            context_max_tokens: config.context.max_tokens,
        }
    }

    /// Process one inbound message.
    pub async fn handle(&self, msg: &InboundMessage) -> Result<ChatResponse> {
        self.stats.request();

        if !self.rate_limiter.allow(&msg.caller) {
            self.stats.rate_limited();
            warn!(caller = %msg.caller, "Rate limit exceeded");
            return Err(Error::RateLimitExceeded {
                identity: msg.caller.clone(),
            });
        }

        if let InputCheckResult::Rejected { reason } = self.validator.check(&msg.text) {
            self.stats.invalid_input();
            warn!(caller = %msg.caller, %reason, "Input rejected");
            return Err(Error::InvalidInput(reason));
        }

        if let Some(mut hit) = self.caches.get_response(&msg.text).await {
            self.stats.cache_hit();
            info!(session = %msg.session_id, "Response cache hit");
            hit.cached = true;
            self.interactions
                .record(&msg.session_id, &hit.category, hit.context_used, hit.confidence);
            return Ok(hit);
        }

        let context = match self.assembler.get_context(&msg.text, self.context_max_tokens).await {
            Ok(context) => context,
            Err(e) => {
                self.stats.context_failure();
                warn!(error = %e, "Context retrieval failed, continuing without context");
                None
            }
        };

        let history = self.history.get(&msg.session_id);
        let prompt = self
            .prompts
            .build(&history, &msg.text, context.as_ref().map(|c| c.text.as_str()));
        debug!(
            session = %msg.session_id,
            history = history.len(),
            estimated_prompt_tokens = prompt.estimated_prompt_tokens,
            "Sending completion"
        );

        let request = ProviderRequest {
            model: self.model.clone(),
            messages: prompt.messages,
            temperature: self.temperature,
            max_tokens: Some(prompt.max_response_tokens),
        };
        let completion = match self.provider.complete(request).await {
            Ok(completion) => completion,
            Err(e) => {
                self.stats.failure();
                error!(provider = self.provider.name(), error = %e, "Completion failed");
                return Err(e.into());
            }
        };
        self.stats.completion();

        let text = completion.message.content;
        let score = confidence(&text);
        if prompt.context_included {
            self.stats.context_used();
        }

        self.history.record_exchange(
            &msg.session_id,
            Message::user(msg.text.as_str()),
            Message::assistant(text.as_str()),
        );

        let category = self.topics.topic(&msg.text).unwrap_or(UNKNOWN_CATEGORY);
        self.interactions
            .record(&msg.session_id, category, prompt.context_included, score);

        let response = ChatResponse {
            response: text,
            confidence: score,
            needs_human: needs_human(score),
            context_used: prompt.context_included,
            category: category.to_string(),
            cached: false,
        };
        self.caches.put_response(&msg.text, response.clone()).await;

        info!(
            session = %msg.session_id,
            confidence = score,
            context_used = response.context_used,
            category,
            "Message processed"
        );
        Ok(response)
    }

    /// The session's retained conversation, oldest first.
    pub fn history(&self, session_id: &str) -> Vec<Message> {
        self.history.get(session_id)
    }

    /// Forget a session's conversation. Returns whether it existed.
    pub fn clear_history(&self, session_id: &str) -> bool {
        self.history.clear(session_id)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Topic and quality summary of a session's answered messages, if the
    /// session is still live.
    pub fn session_analysis(&self, session_id: &str) -> Option<SessionAnalysis> {
        self.interactions.session(session_id)
    }

    pub fn global_analysis(&self) -> GlobalAnalysis {
        self.interactions.global()
    }

    pub fn caches(&self) -> &Arc<CacheService<ChatResponse>> {
        &self.caches
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragpipe_core::provider::{EmbeddingRequest, EmbeddingResponse, ProviderResponse};
    use ragpipe_core::ProviderError;
    use ragpipe_index::InMemoryIndex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Answers every completion with a fixed reply and records requests.
    struct ScriptedProvider {
        reply: std::result::Result<String, ProviderError>,
        embed_fails: bool,
        completions: AtomicUsize,
        last_request: Mutex<Option<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                embed_fails: false,
                completions: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(ProviderError::Timeout("completion".into())),
                embed_fails: false,
                completions: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }

        fn without_embeddings(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                embed_fails: true,
                completions: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError> {
            self.completions.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            let content = self.reply.clone()?;
            Ok(ProviderResponse {
                message: Message::assistant(content),
                usage: None,
                model: request.model,
            })
        }

        async fn embed(&self, request: EmbeddingRequest) -> std::result::Result<EmbeddingResponse, ProviderError> {
            if self.embed_fails {
                return Err(ProviderError::Network("embeddings down".into()));
            }
            Ok(EmbeddingResponse {
                embeddings: request.inputs.iter().map(|_| vec![1.0, 0.0]).collect(),
                model: request.model,
            })
        }
    }

    const ANSWER: &str = "Items can be returned within 30 days of delivery for a full refund, \
                          provided they are unused and in their original packaging.";

    fn pipeline(provider: Arc<ScriptedProvider>, config: &AppConfig) -> ChatPipeline {
        ChatPipeline::from_config(config, provider, Arc::new(InMemoryIndex::new()))
    }

    fn msg(text: &str) -> InboundMessage {
        InboundMessage::new("10.0.0.1", "session-1", text)
    }

    #[tokio::test]
    async fn completion_result_is_scored() {
        let provider = ScriptedProvider::replying(ANSWER);
        let chat = pipeline(provider.clone(), &AppConfig::default());

        let response = chat.handle(&msg("What is your return policy?")).await.unwrap();

        assert_eq!(response.response, ANSWER);
        assert_eq!(response.confidence, 1.0);
        assert!(!response.needs_human);
        assert!(!response.context_used);
        assert!(!response.cached);
        assert_eq!(response.category, UNKNOWN_CATEGORY);

        let request = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.model, "gpt-3.5-turbo");
        assert_eq!(request.max_tokens, Some(4000));
    }

    #[tokio::test]
    async fn equivalent_query_is_served_from_cache() {
        let provider = ScriptedProvider::replying(ANSWER);
        let chat = pipeline(provider.clone(), &AppConfig::default());

        chat.handle(&msg("What is your return policy?")).await.unwrap();
        let second = chat.handle(&msg("what is your   RETURN policy?")).await.unwrap();

        assert!(second.cached);
        assert_eq!(provider.completions.load(Ordering::SeqCst), 1);
        assert_eq!(chat.stats().cache_hits, 1);
    }

    #[tokio::test]
    async fn rate_limited_caller_is_rejected_before_any_work() {
        let provider = ScriptedProvider::replying(ANSWER);
        let mut config = AppConfig::default();
        config.rate_limit.max_requests_per_minute = 1;
        let chat = pipeline(provider.clone(), &config);

        chat.handle(&msg("first question")).await.unwrap();
        let err = chat.handle(&msg("second question")).await.unwrap_err();

        assert!(matches!(err, Error::RateLimitExceeded { ref identity } if identity == "10.0.0.1"));
        assert_eq!(provider.completions.load(Ordering::SeqCst), 1);
        assert_eq!(chat.stats().rate_limited, 1);
    }

    #[tokio::test]
    async fn injection_attempt_is_rejected() {
        let provider = ScriptedProvider::replying(ANSWER);
        let chat = pipeline(provider.clone(), &AppConfig::default());

        let err = chat.handle(&msg("<script>alert(1)</script>")).await.unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(provider.completions.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_completion_is_not_cached() {
        let provider = ScriptedProvider::failing();
        let chat = pipeline(provider.clone(), &AppConfig::default());

        let err = chat.handle(&msg("What is your return policy?")).await.unwrap_err();

        assert!(matches!(err, Error::Provider(ProviderError::Timeout(_))));
        assert!(chat.caches().responses.is_empty().await);
        assert!(chat.history("session-1").is_empty());
        assert_eq!(chat.stats().failures, 1);
    }

    #[tokio::test]
    async fn history_is_bounded_and_clearable() {
        let provider = ScriptedProvider::replying(ANSWER);
        let chat = pipeline(provider.clone(), &AppConfig::default());

        for i in 0..4 {
            chat.handle(&msg(&format!("question number {i}"))).await.unwrap();
        }
        assert_eq!(chat.history("session-1").len(), 5);

        // The last request carried the retained history between system and user.
        let request = provider.last_request.lock().unwrap().clone().unwrap();
        assert_eq!(request.messages.len(), 1 + 5 + 1);

        assert!(chat.clear_history("session-1"));
        assert!(chat.history("session-1").is_empty());
    }

    #[tokio::test]
    async fn retrieval_failure_is_counted_and_answered_without_context() {
        let provider = ScriptedProvider::without_embeddings(ANSWER);
        let chat = pipeline(provider.clone(), &AppConfig::default());

        let response = chat.handle(&msg("What is your return policy?")).await.unwrap();

        assert!(!response.context_used);
        let stats = chat.stats();
        assert_eq!(stats.context_failures, 1);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.completions, 1);
    }

    #[tokio::test]
    async fn answers_are_categorized_and_tallied_per_session() {
        let provider = ScriptedProvider::replying(ANSWER);
        let chat = pipeline(provider.clone(), &AppConfig::default());

        let first = chat.handle(&msg("How much does the X200 cost?")).await.unwrap();
        chat.handle(&msg("Is there a discount for students?")).await.unwrap();
        chat.handle(&msg("The app shows an error on login")).await.unwrap();
        let repeat = chat.handle(&msg("how much does the x200 cost?")).await.unwrap();

        assert_eq!(first.category, "pricing");
        assert!(repeat.cached);
        assert_eq!(repeat.category, "pricing");

        let session = chat.session_analysis("session-1").unwrap();
        assert_eq!(session.interactions, 4);
        assert_eq!(session.common_categories[0].category, "pricing");
        assert_eq!(session.common_categories[0].count, 3);
        assert_eq!(session.common_categories[1].category, "technical_support");

        let global = chat.global_analysis();
        assert_eq!(global.total_interactions, 4);
        assert_eq!(global.active_sessions, 1);
        assert!(chat.session_analysis("session-2").is_none());
    }

    #[tokio::test]
    async fn rejected_messages_are_not_tallied() {
        let provider = ScriptedProvider::failing();
        let chat = pipeline(provider.clone(), &AppConfig::default());

        chat.handle(&msg("<script>alert(1)</script>")).await.unwrap_err();
        chat.handle(&msg("What does it cost?")).await.unwrap_err();

        assert!(chat.session_analysis("session-1").is_none());
        assert_eq!(chat.global_analysis().total_interactions, 0);
    }
}
