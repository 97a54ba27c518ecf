//! End-to-end pipeline tests with counting mock adapters.
//!
//! Every adapter records how often it was invoked so the tests can
//! assert the pipeline's call-avoidance guarantees: greetings never
//! touch retrieval, a rejected gate never touches the generator, and
//! concurrent identical requests collapse to one generation.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use docent::adapters::{
    ChunkSink, DocumentStore, Embedder, FileEntry, InMemoryDocumentStore, TextGenerator,
    VectorIndex,
};
use docent::config::Config;
use docent::error::{DocentError, Result};
use docent::models::{
    ChunkLocation, Domain, PromptSpec, Query, QueryScope, RetrievedChunk, StreamEvent,
};
use docent::pipeline::Pipeline;
use docent::stream::StreamSession;

// ============ Mock adapters ============

struct MockEmbedder {
    calls: AtomicUsize,
}

impl MockEmbedder {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0, 0.0, 0.0])
    }

    fn dims(&self) -> usize {
        3
    }
}

struct MockIndex {
    chunks: Vec<RetrievedChunk>,
    calls: AtomicUsize,
}

impl MockIndex {
    fn new(chunks: Vec<RetrievedChunk>) -> Self {
        Self {
            chunks,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VectorIndex for MockIndex {
    async fn search_similar(
        &self,
        _vector: &[f32],
        scope: &QueryScope,
        top_k: usize,
        min_similarity: f64,
    ) -> Result<Vec<RetrievedChunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut hits: Vec<RetrievedChunk> = self
            .chunks
            .iter()
            .filter(|c| match scope {
                QueryScope::All => true,
                QueryScope::Document(id) => &c.document_id == id,
                QueryScope::Documents(ids) => ids.contains(&c.document_id),
            })
            .filter(|c| c.similarity >= min_similarity)
            .cloned()
            .collect();
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        hits.truncate(top_k);
        Ok(hits)
    }
}

struct MockGenerator {
    calls: AtomicUsize,
    fragments: Vec<&'static str>,
    delay: Duration,
    fail: bool,
}

impl MockGenerator {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fragments: vec!["The answer ", "is 42."],
            delay: Duration::ZERO,
            fail: false,
        }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl TextGenerator for MockGenerator {
    async fn generate(&self, _spec: &PromptSpec) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail {
            return Err(DocentError::UpstreamGeneration {
                provider: "mock".to_string(),
                message: "mock failure".to_string(),
            });
        }
        Ok(self.fragments.concat())
    }

    async fn generate_stream(
        &self,
        _spec: &PromptSpec,
        mut on_chunk: ChunkSink<'_>,
    ) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DocentError::UpstreamGeneration {
                provider: "mock".to_string(),
                message: "mock failure".to_string(),
            });
        }
        for fragment in &self.fragments {
            on_chunk(fragment);
        }
        Ok(self.fragments.concat())
    }
}

// ============ Fixture ============

fn chunk(chunk_id: &str, doc_id: &str, similarity: f64) -> RetrievedChunk {
    RetrievedChunk {
        chunk_id: chunk_id.to_string(),
        document_id: doc_id.to_string(),
        document_name: format!("{}.pdf", doc_id),
        content: format!("content of {}", chunk_id),
        similarity,
        location: ChunkLocation::Page(1),
        metadata: serde_json::Value::Null,
    }
}

struct Fixture {
    pipeline: Arc<Pipeline>,
    embedder: Arc<MockEmbedder>,
    index: Arc<MockIndex>,
    generator: Arc<MockGenerator>,
}

fn fixture_with(chunks: Vec<RetrievedChunk>, generator: MockGenerator) -> Fixture {
    let embedder = Arc::new(MockEmbedder::new());
    let index = Arc::new(MockIndex::new(chunks));
    let generator = Arc::new(generator);
    let store = Arc::new(InMemoryDocumentStore::new());

    let pipeline = Pipeline::builder()
        .config(Config::default())
        .embedder(embedder.clone() as Arc<dyn Embedder>)
        .index(index.clone() as Arc<dyn VectorIndex>)
        .generator(generator.clone() as Arc<dyn TextGenerator>)
        .store(store as Arc<dyn DocumentStore>)
        .build()
        .unwrap();

    Fixture {
        pipeline: Arc::new(pipeline),
        embedder,
        index,
        generator,
    }
}

fn fixture(chunks: Vec<RetrievedChunk>) -> Fixture {
    fixture_with(chunks, MockGenerator::new())
}

async fn fixture_with_store(chunks: Vec<RetrievedChunk>) -> Fixture {
    let embedder = Arc::new(MockEmbedder::new());
    let index = Arc::new(MockIndex::new(chunks));
    let generator = Arc::new(MockGenerator::new());

    let store = InMemoryDocumentStore::new();
    store
        .add_file(FileEntry {
            document_id: "d-passport".to_string(),
            file_name: "passport.pdf".to_string(),
            folder_path: "Travel".to_string(),
            content_type: "pdf".to_string(),
            updated_at: chrono::Utc::now(),
        })
        .await;

    let pipeline = Pipeline::builder()
        .config(Config::default())
        .embedder(embedder.clone() as Arc<dyn Embedder>)
        .index(index.clone() as Arc<dyn VectorIndex>)
        .generator(generator.clone() as Arc<dyn TextGenerator>)
        .store(Arc::new(store) as Arc<dyn DocumentStore>)
        .build()
        .unwrap();

    Fixture {
        pipeline: Arc::new(pipeline),
        embedder,
        index,
        generator,
    }
}

// ============ Greeting path ============

#[tokio::test]
async fn greeting_never_invokes_retrieval() {
    let f = fixture(vec![chunk("c1", "d1", 0.9)]);
    let result = f
        .pipeline
        .answer(&Query::new("hello", "u1"), &[])
        .await
        .unwrap();

    assert_eq!(result.domain, Domain::Greeting);
    assert!(result.sources.is_empty());
    assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 0);
}

// ============ Confidence gate ============

#[tokio::test]
async fn gate_rejects_weak_match_and_skips_generator() {
    // 0.42 < the 0.5 content threshold.
    let f = fixture(vec![chunk("c1", "d1", 0.42)]);
    let result = f
        .pipeline
        .answer(&Query::new("what is the Q1 revenue?", "u1"), &[])
        .await
        .unwrap();

    assert_eq!(result.confidence, 0.0);
    assert!(result.sources.is_empty());
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 0);
    // Retrieval itself did run.
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn gate_accepts_strong_match_and_generates() {
    let f = fixture(vec![chunk("c1", "d1", 0.6)]);
    let result = f
        .pipeline
        .answer(&Query::new("what is the Q1 revenue?", "u1"), &[])
        .await
        .unwrap();

    assert_eq!(result.answer, "The answer is 42.");
    assert_eq!(result.sources.len(), 1);
    assert!((result.confidence - 0.6).abs() < 1e-9);
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn list_intent_uses_relaxed_threshold() {
    // The same 0.4-similarity candidate clears the 0.35 list threshold
    // but not the 0.5 content threshold.
    let f = fixture(vec![chunk("c1", "d1", 0.4)]);

    let content = f
        .pipeline
        .answer(&Query::new("what is the Q1 revenue?", "u1"), &[])
        .await
        .unwrap();
    assert_eq!(content.confidence, 0.0);
    assert!(content.sources.is_empty());

    let listing = f
        .pipeline
        .answer(&Query::new("show me documents about taxes", "u1"), &[])
        .await
        .unwrap();
    assert_eq!(listing.domain, Domain::ListMetadata);
    assert_eq!(listing.sources.len(), 1);
    assert!(listing.answer.contains("d1.pdf"));
    // The listing is a literal enumeration — the generator is never
    // involved on either path.
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 0);
}

// ============ Source aggregation ============

#[tokio::test]
async fn sources_deduplicated_per_document_and_sorted() {
    let f = fixture(vec![
        chunk("c1", "d1", 0.95),
        chunk("c2", "d1", 0.85),
        chunk("c3", "d2", 0.7),
        chunk("c4", "d3", 0.9),
    ]);
    let result = f
        .pipeline
        .answer(&Query::new("what is the Q1 revenue?", "u1"), &[])
        .await
        .unwrap();

    let doc_ids: Vec<&str> = result
        .sources
        .chunks
        .iter()
        .map(|c| c.document_id.as_str())
        .collect();
    assert_eq!(doc_ids, vec!["d1", "d3", "d2"]);

    let sims: Vec<f64> = result.sources.chunks.iter().map(|c| c.similarity).collect();
    let mut sorted = sims.clone();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    assert_eq!(sims, sorted);
}

#[tokio::test]
async fn sources_capped_at_configured_maximum() {
    let chunks: Vec<RetrievedChunk> = (0..10)
        .map(|i| chunk(&format!("c{}", i), &format!("d{}", i), 0.9 - i as f64 * 0.01))
        .collect();
    let f = fixture(chunks);
    let result = f
        .pipeline
        .answer(&Query::new("what is the Q1 revenue?", "u1"), &[])
        .await
        .unwrap();

    assert_eq!(result.sources.len(), 5);
}

// ============ Cache ============

#[tokio::test]
async fn repeated_question_answers_from_cache() {
    let f = fixture(vec![chunk("c1", "d1", 0.8)]);
    let query = Query::new("what is the Q1 revenue?", "u1");

    let first = f.pipeline.answer(&query, &[]).await.unwrap();
    assert!(!first.cached);

    // Different surface form, same normalized fingerprint.
    let again = Query::new("  WHAT is   the q1 revenue? ", "u1");
    let second = f.pipeline.answer(&again, &[]).await.unwrap();
    assert!(second.cached);
    assert_eq!(second.answer, first.answer);

    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn insufficient_evidence_is_not_cached() {
    let f = fixture(vec![chunk("c1", "d1", 0.3)]);
    let query = Query::new("what is the Q1 revenue?", "u1");

    let first = f.pipeline.answer(&query, &[]).await.unwrap();
    assert_eq!(first.confidence, 0.0);

    let second = f.pipeline.answer(&query, &[]).await.unwrap();
    assert!(!second.cached);
    // Retrieval re-ran: the empty-evidence result did not stick.
    assert_eq!(f.index.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn concurrent_identical_requests_generate_once() {
    let f = fixture_with(
        vec![chunk("c1", "d1", 0.8)],
        MockGenerator::slow(Duration::from_millis(50)),
    );

    let mut handles = Vec::new();
    for _ in 0..6 {
        let pipeline = f.pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline
                .answer(&Query::new("what is the Q1 revenue?", "u1"), &[])
                .await
                .unwrap()
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert_eq!(result.answer, "The answer is 42.");
    }
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 1);
}

// ============ Scoped retrieval ============

#[tokio::test]
async fn single_document_scope_restricts_sources() {
    let f = fixture(vec![chunk("c1", "d1", 0.9), chunk("c2", "d2", 0.8)]);
    let mut query = Query::new("what is the Q1 revenue?", "u1");
    query.scope = QueryScope::Document("d2".to_string());

    let result = f.pipeline.answer(&query, &[]).await.unwrap();
    assert_eq!(result.sources.len(), 1);
    assert_eq!(result.sources.chunks[0].document_id, "d2");
}

#[tokio::test]
async fn scope_changes_cache_key() {
    let f = fixture(vec![chunk("c1", "d1", 0.9), chunk("c2", "d2", 0.8)]);

    let unscoped = Query::new("what is the Q1 revenue?", "u1");
    let mut scoped = Query::new("what is the Q1 revenue?", "u1");
    scoped.scope = QueryScope::Document("d2".to_string());

    let first = f.pipeline.answer(&unscoped, &[]).await.unwrap();
    let second = f.pipeline.answer(&scoped, &[]).await.unwrap();

    assert!(!second.cached);
    assert_ne!(
        first.sources.chunks[0].document_id,
        second.sources.chunks[0].document_id
    );
}

// ============ Navigation ============

#[tokio::test]
async fn navigation_found_and_not_found() {
    let f = fixture_with_store(vec![]).await;

    let found = f
        .pipeline
        .answer(&Query::new("where is passport.pdf", "u1"), &[])
        .await
        .unwrap();
    assert_eq!(found.domain, Domain::Navigation);
    assert!(found.answer.contains("Travel"));

    let missing = f
        .pipeline
        .answer(&Query::new("where is visa.pdf", "u1"), &[])
        .await
        .unwrap();
    assert_eq!(missing.domain, Domain::Navigation);
    assert_eq!(missing.confidence, 0.0);
    assert!(missing.sources.is_empty());

    // Neither path touched retrieval or generation.
    assert_eq!(f.embedder.calls.load(Ordering::SeqCst), 0);
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn navigation_without_name_reroutes_to_content() {
    // A location question with no recognizable file name cannot execute
    // a partial lookup; it answers from document content instead.
    let f = fixture(vec![chunk("c1", "d1", 0.8)]);
    let result = f
        .pipeline
        .answer(&Query::new("where did I put the insurance papers", "u1"), &[])
        .await
        .unwrap();

    assert_eq!(result.domain, Domain::ContentQa);
    assert_eq!(result.sources.len(), 1);
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 1);
}

// ============ Generation failure ============

#[tokio::test]
async fn generation_failure_surfaces_single_error() {
    let f = fixture_with(vec![chunk("c1", "d1", 0.8)], MockGenerator::failing());
    let err = f
        .pipeline
        .answer(&Query::new("what is the Q1 revenue?", "u1"), &[])
        .await
        .unwrap_err();

    assert!(matches!(err, DocentError::UpstreamGeneration { .. }));
    // The mock fails immediately; the pipeline does not loop.
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 1);
}

// ============ Streaming ============

async fn collect_stream(f: &Fixture, query: Query) -> Vec<StreamEvent> {
    let (session, mut rx) = StreamSession::new();
    let pipeline = f.pipeline.clone();
    let task = tokio::spawn(async move {
        pipeline.answer_stream(&query, &[], session).await;
    });

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }
    task.await.unwrap();
    events
}

#[tokio::test]
async fn stream_delivers_ordered_fragments_then_done() {
    let f = fixture(vec![chunk("c1", "d1", 0.8)]);
    let events = collect_stream(&f, Query::new("what is the Q1 revenue?", "u1")).await;

    assert!(matches!(events.first().unwrap(), StreamEvent::Connected { .. }));
    for pair in events.windows(2) {
        assert!(pair[1].seq() > pair[0].seq());
    }

    let fragments: Vec<&str> = events
        .iter()
        .filter_map(|e| match e {
            StreamEvent::Content { text, .. } => Some(text.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(fragments, vec!["The answer ", "is 42."]);

    match events.last().unwrap() {
        StreamEvent::Done { answer, sources, .. } => {
            assert_eq!(answer, "The answer is 42.");
            assert_eq!(sources.len(), 1);
        }
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test]
async fn stream_insufficient_evidence_short_circuits() {
    let f = fixture(vec![chunk("c1", "d1", 0.3)]);
    let events = collect_stream(&f, Query::new("what is the Q1 revenue?", "u1")).await;

    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 0);
    match events.last().unwrap() {
        StreamEvent::Done { confidence, sources, .. } => {
            assert_eq!(*confidence, 0.0);
            assert!(sources.is_empty());
        }
        other => panic!("expected done, got {:?}", other),
    }
}

#[tokio::test]
async fn stream_generation_failure_emits_single_error() {
    let f = fixture_with(vec![chunk("c1", "d1", 0.8)], MockGenerator::failing());
    let events = collect_stream(&f, Query::new("what is the Q1 revenue?", "u1")).await;

    let errors = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Error { .. }))
        .count();
    assert_eq!(errors, 1);
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn stream_greeting_is_single_fragment() {
    let f = fixture(vec![]);
    let events = collect_stream(&f, Query::new("hello", "u1")).await;

    assert_eq!(f.index.calls.load(Ordering::SeqCst), 0);
    let fragments = events
        .iter()
        .filter(|e| matches!(e, StreamEvent::Content { .. }))
        .count();
    assert_eq!(fragments, 1);
    assert!(matches!(events.last().unwrap(), StreamEvent::Done { .. }));
}

#[tokio::test]
async fn stream_populates_cache_for_blocking_path() {
    let f = fixture(vec![chunk("c1", "d1", 0.8)]);
    collect_stream(&f, Query::new("what is the Q1 revenue?", "u1")).await;

    let result = f
        .pipeline
        .answer(&Query::new("what is the Q1 revenue?", "u1"), &[])
        .await
        .unwrap();
    assert!(result.cached);
    assert_eq!(f.generator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn stream_disconnect_does_not_panic_pipeline() {
    let f = fixture_with(
        vec![chunk("c1", "d1", 0.8)],
        MockGenerator::slow(Duration::from_millis(30)),
    );
    let (session, rx) = StreamSession::new();
    let query = Query::new("what is the Q1 revenue?", "u1");
    let pipeline = f.pipeline.clone();

    let task = tokio::spawn(async move {
        pipeline.answer_stream(&query, &[], session).await;
    });

    // Client disconnects immediately.
    drop(rx);

    // The pipeline task completes without panicking.
    task.await.unwrap();
}
