//! End-to-end query pipeline.
//!
//! Composes the classifier, router, retrieval gate, source aggregator,
//! prompt composer, generator, and response cache into the two public
//! entry points: [`Pipeline::answer`] (blocking) and
//! [`Pipeline::answer_stream`] (progressive delivery through a
//! [`StreamSession`]).
//!
//! Control flow: router shortcuts handle greeting / navigation /
//! mentions / listing; general-knowledge questions generate with no
//! retrieved context; content questions run retrieve → gate → aggregate
//! → compose → generate, wrapped by the response cache.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::adapters::{DocumentStore, Embedder, TextGenerator, VectorIndex};
use crate::aggregate::aggregate;
use crate::cache::{fingerprint, ResponseCache};
use crate::classifier::classify_with_deadline;
use crate::config::Config;
use crate::error::{DocentError, Result};
use crate::models::{
    AnswerResult, ConversationTurn, Domain, IntentClassification, Query, SourceSet,
};
use crate::prompt::{compose, compose_general};
use crate::retrieval::{retrieve, INSUFFICIENT_EVIDENCE_MESSAGE};
use crate::router::route_shortcut;
use crate::stream::StreamSession;

/// The assembled question-answering pipeline.
///
/// All adapters are shared trait objects; the pipeline itself holds no
/// per-query state and can serve any number of concurrent queries.
pub struct Pipeline {
    config: Config,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn DocumentStore>,
    cache: Arc<ResponseCache>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Classify a query without answering it. Used by the `classify`
    /// CLI command and by tests.
    pub async fn classify(
        &self,
        query: &Query,
        history: &[ConversationTurn],
    ) -> IntentClassification {
        classify_with_deadline(
            &query.text,
            history,
            Duration::from_secs(self.config.classifier.timeout_secs),
        )
        .await
    }

    /// Answer a query as one blocking call.
    #[instrument(skip_all, fields(user = %query.user_id))]
    pub async fn answer(
        &self,
        query: &Query,
        history: &[ConversationTurn],
    ) -> Result<AnswerResult> {
        let mut classification = self.classify(query, history).await;
        info!(domain = ?classification.domain, style = ?classification.style, "routing query");

        if let Some(result) = route_shortcut(query, &classification, &self.store).await? {
            return Ok(result);
        }

        if classification.domain == Domain::GeneralKnowledge {
            return self.general_knowledge_answer(query, &classification, history).await;
        }

        reroute_to_content(&mut classification);

        let key = fingerprint(&query.text, &query.scope, query.answer_length);
        self.cache
            .get_or_compute(
                &key,
                || self.content_answer(query, &classification, history),
                |result| result.confidence > 0.0,
            )
            .await
    }

    /// Answer a query progressively through a stream session.
    ///
    /// The session receives `connected` first, then ordered `content`
    /// fragments (with heartbeats interleaved), and exactly one terminal
    /// `done` or `error` event. A disconnected client silently stops
    /// delivery; the session never errors on late writes.
    #[instrument(skip_all, fields(user = %query.user_id))]
    pub async fn answer_stream(
        &self,
        query: &Query,
        history: &[ConversationTurn],
        session: Arc<StreamSession>,
    ) {
        let heartbeat = Duration::from_secs(self.config.stream.heartbeat_secs);
        let mut classification = self.classify(query, history).await;

        // Shortcut and general-knowledge domains produce their text in
        // one piece; deliver it as a single content fragment.
        match route_shortcut(query, &classification, &self.store).await {
            Ok(Some(result)) => {
                session.connect(result.context_id.clone(), heartbeat);
                session.send_content(&result.answer);
                session.finish(result.answer, result.sources, result.domain, result.confidence);
                return;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(error = %err, "shortcut handler failed");
                session.connect(uuid::Uuid::new_v4().to_string(), heartbeat);
                session.fail(err.user_message());
                return;
            }
        }

        if classification.domain == Domain::GeneralKnowledge {
            let context_id = uuid::Uuid::new_v4().to_string();
            session.connect(context_id.clone(), heartbeat);
            self.stream_generation(query, &classification, history, SourceSet::empty(), session)
                .await;
            return;
        }

        reroute_to_content(&mut classification);

        // Content path. A cache hit streams as one fragment.
        let key = fingerprint(&query.text, &query.scope, query.answer_length);
        if let Some(hit) = self.cache.get(&key).await {
            session.connect(hit.context_id.clone(), heartbeat);
            session.send_content(&hit.answer);
            session.finish(hit.answer, hit.sources, hit.domain, hit.confidence);
            return;
        }

        let candidates =
            match retrieve(
                &self.embedder,
                &self.index,
                &self.config.retrieval,
                &query.text,
                &query.scope,
                &classification,
            )
            .await
            {
                Ok(candidates) => candidates,
                Err(err) => {
                    warn!(error = %err, "retrieval failed");
                    session.connect(uuid::Uuid::new_v4().to_string(), heartbeat);
                    session.fail(err.user_message());
                    return;
                }
            };

        if candidates.is_empty() {
            let message = if classification.domain.is_list_style() {
                "I didn't find any documents matching that."
            } else {
                INSUFFICIENT_EVIDENCE_MESSAGE
            };
            let result = AnswerResult::without_sources(message, classification.domain);
            session.connect(result.context_id.clone(), heartbeat);
            session.send_content(&result.answer);
            session.finish(result.answer, result.sources, result.domain, result.confidence);
            return;
        }

        let sources = aggregate(candidates, self.config.retrieval.max_sources);

        // Topical listings are literal enumerations — one fragment, no
        // generator.
        if classification.domain.is_list_style() {
            let result = Self::listing_result(&classification, sources);
            session.connect(result.context_id.clone(), heartbeat);
            session.send_content(&result.answer);
            session.finish(
                result.answer.clone(),
                result.sources.clone(),
                result.domain,
                result.confidence,
            );
            if result.confidence > 0.0 {
                self.cache.set(&key, result).await;
            }
            return;
        }

        let context_id = uuid::Uuid::new_v4().to_string();
        session.connect(context_id.clone(), heartbeat);

        if let Some(result) = self
            .stream_generation(query, &classification, history, sources, session)
            .await
        {
            if result.confidence > 0.0 {
                self.cache.set(&key, result).await;
            }
        }
    }

    /// Drive the streaming generator into the session and emit the
    /// terminal event. Returns the finished result for cache
    /// population, or `None` on failure.
    async fn stream_generation(
        &self,
        query: &Query,
        classification: &IntentClassification,
        history: &[ConversationTurn],
        sources: SourceSet,
        session: Arc<StreamSession>,
    ) -> Option<AnswerResult> {
        let spec = if sources.is_empty() {
            compose_general(&query.text, classification.style, query.answer_length, history)
        } else {
            compose(
                &query.text,
                &sources,
                classification.style,
                query.answer_length,
                history,
            )
        };

        let sink_session = session.clone();
        let outcome = self
            .generator
            .generate_stream(&spec, Box::new(move |fragment| {
                sink_session.send_content(fragment);
            }))
            .await;

        match outcome {
            Ok(answer) => {
                let confidence = if sources.is_empty() {
                    classification.confidence
                } else {
                    sources.confidence
                };
                let result = AnswerResult {
                    answer: answer.clone(),
                    sources: sources.clone(),
                    context_id: uuid::Uuid::new_v4().to_string(),
                    domain: classification.domain,
                    confidence,
                    cached: false,
                };
                session.finish(answer, sources, classification.domain, confidence);
                Some(result)
            }
            Err(err) => {
                warn!(error = %err, "streaming generation failed");
                session.fail(err.user_message());
                None
            }
        }
    }

    /// Generation with no retrieved context.
    async fn general_knowledge_answer(
        &self,
        query: &Query,
        classification: &IntentClassification,
        history: &[ConversationTurn],
    ) -> Result<AnswerResult> {
        let spec =
            compose_general(&query.text, classification.style, query.answer_length, history);
        let answer = self.generator.generate(&spec).await?;
        Ok(AnswerResult {
            answer,
            sources: SourceSet::empty(),
            context_id: uuid::Uuid::new_v4().to_string(),
            domain: Domain::GeneralKnowledge,
            confidence: classification.confidence,
            cached: false,
        })
    }

    /// The full content path: retrieve → gate → aggregate → compose →
    /// generate. List-style queries that reach this path (topical
    /// listings) stop after aggregation and enumerate document names
    /// directly — the answer is a literal listing, so the generative
    /// backend is bypassed.
    async fn content_answer(
        &self,
        query: &Query,
        classification: &IntentClassification,
        history: &[ConversationTurn],
    ) -> Result<AnswerResult> {
        let candidates = retrieve(
            &self.embedder,
            &self.index,
            &self.config.retrieval,
            &query.text,
            &query.scope,
            classification,
        )
        .await?;

        if candidates.is_empty() {
            info!("confidence gate rejected all candidates");
            let message = if classification.domain.is_list_style() {
                "I didn't find any documents matching that."
            } else {
                INSUFFICIENT_EVIDENCE_MESSAGE
            };
            return Ok(AnswerResult::without_sources(message, classification.domain));
        }

        let sources = aggregate(candidates, self.config.retrieval.max_sources);

        if classification.domain.is_list_style() {
            return Ok(Self::listing_result(classification, sources));
        }

        let spec = compose(
            &query.text,
            &sources,
            classification.style,
            query.answer_length,
            history,
        );

        let answer = self.generator.generate(&spec).await?;

        Ok(AnswerResult {
            answer,
            confidence: sources.confidence,
            sources,
            context_id: uuid::Uuid::new_v4().to_string(),
            domain: classification.domain,
            cached: false,
        })
    }

    /// Format a semantic listing: one line per matching document.
    fn listing_result(
        classification: &IntentClassification,
        sources: SourceSet,
    ) -> AnswerResult {
        let mut lines = vec![format!(
            "Found {} matching document{}:",
            sources.len(),
            if sources.len() == 1 { "" } else { "s" }
        )];
        for chunk in &sources.chunks {
            lines.push(format!("- {}", chunk.document_name));
        }
        AnswerResult {
            answer: lines.join("\n"),
            confidence: sources.confidence,
            sources,
            context_id: uuid::Uuid::new_v4().to_string(),
            domain: classification.domain,
            cached: false,
        }
    }
}

/// A shortcut domain that fell through (missing entity slot) answers
/// from document content instead of half-acting; list-style domains
/// keep their identity so the relaxed threshold and listing format
/// apply.
fn reroute_to_content(classification: &mut IntentClassification) {
    if !classification.domain.is_list_style() && classification.domain != Domain::ContentQa {
        classification.domain = Domain::ContentQa;
        classification.reasoning.push_str("; re-routed to content QA");
    }
}

/// Builder for the [`Pipeline`]. All adapters are required; the cache is
/// constructed from the config.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<Config>,
    embedder: Option<Arc<dyn Embedder>>,
    index: Option<Arc<dyn VectorIndex>>,
    generator: Option<Arc<dyn TextGenerator>>,
    store: Option<Arc<dyn DocumentStore>>,
}

impl PipelineBuilder {
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn store(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let config = self
            .config
            .ok_or_else(|| DocentError::Config("config is required".to_string()))?;
        let embedder = self
            .embedder
            .ok_or_else(|| DocentError::Config("embedder is required".to_string()))?;
        let index = self
            .index
            .ok_or_else(|| DocentError::Config("vector index is required".to_string()))?;
        let generator = self
            .generator
            .ok_or_else(|| DocentError::Config("generator is required".to_string()))?;
        let store = self
            .store
            .ok_or_else(|| DocentError::Config("document store is required".to_string()))?;

        let cache = Arc::new(ResponseCache::new(&config.cache));

        Ok(Pipeline {
            config,
            embedder,
            index,
            generator,
            store,
            cache,
        })
    }
}
