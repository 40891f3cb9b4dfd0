use std::{
	sync::{Arc, Mutex},
	thread::{self, ThreadId},
};

use futures::StreamExt;
use time::{Duration, OffsetDateTime};

use docqa_service::{
	AnswerEvent, DocqaService, Error, IngestRequest, IngestResponse, IngestSource,
	NO_RELEVANT_ANSWER, Providers, QueryRequest, Splitter,
};
use docqa_testkit::{PageLoader, ScriptedGenerator, VocabEmbedder, test_config, test_service};

const FRANCE: &str = "Paris is the capital of France.";
const TOKYO: &str = "Sushi and ramen are popular dishes in Tokyo.";

/// Keeps the whole text as one chunk and records which thread split it.
#[derive(Default)]
struct ThreadRecordingSplitter {
	threads: Mutex<Vec<ThreadId>>,
}

impl Splitter for ThreadRecordingSplitter {
	fn split(&self, text: &str, _max_chars: u32, _overlap_chars: u32) -> Vec<String> {
		self.threads.lock().unwrap_or_else(|err| err.into_inner()).push(thread::current().id());

		vec![text.trim().to_string()]
	}
}

struct Harness {
	service: DocqaService,
	embedder: Arc<VocabEmbedder>,
	generator: Arc<ScriptedGenerator>,
}

fn harness() -> Harness {
	harness_with(ScriptedGenerator::new(&["Paris", "."]))
}

fn harness_with(generator: Arc<ScriptedGenerator>) -> Harness {
	let embedder = VocabEmbedder::new();
	let service = test_service(test_config(), embedder.clone(), generator.clone());

	Harness { service, embedder, generator }
}

async fn upload(
	service: &DocqaService,
	session_id: &str,
	filename: &str,
	body: &str,
) -> docqa_service::Result<IngestResponse> {
	service
		.ingest(IngestRequest {
			session_id: session_id.to_string(),
			source: IngestSource::Upload {
				filename: filename.to_string(),
				bytes: body.as_bytes().to_vec(),
			},
		})
		.await
}

fn question(session_id: &str, q: &str, doc_ids: Option<Vec<String>>) -> QueryRequest {
	QueryRequest { session_id: session_id.to_string(), question: q.to_string(), doc_ids }
}

#[tokio::test]
async fn ingest_indexes_every_chunk() {
	let Harness { service, .. } = harness();
	let session_id = service.create_session().session_id;
	let body = "The quick brown fox jumps over the lazy dog. ".repeat(30);
	let ingested =
		upload(&service, &session_id, "fox.txt", &body).await.expect("Failed to ingest document.");
	let handle = service.sessions.get(&session_id).expect("Failed to get session.");
	let session = handle.session.lock().await;
	let doc = session.get_document(&ingested.doc_id).expect("Document must be stored.");

	assert!(ingested.chunk_count > 1);
	assert_eq!(ingested.source, "fox.txt");
	assert_eq!(doc.chunks().len(), ingested.chunk_count);
	assert_eq!(doc.vector_count(), doc.chunks().len());
	assert!(doc.chunks().iter().all(|chunk| chunk.chars().count() <= 200));
}

#[tokio::test]
async fn identical_text_is_embedded_once_per_session() {
	let Harness { service, embedder, .. } = harness();
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "a.txt", FRANCE).await.expect("Failed to ingest document.");

	let calls = embedder.calls();
	let embedded = embedder.embedded();
	let second =
		upload(&service, &session_id, "b.md", FRANCE).await.expect("Failed to ingest document.");

	assert_eq!(second.chunk_count, 1);
	assert_eq!(embedder.calls(), calls);
	assert_eq!(embedder.embedded(), embedded);
	assert_eq!(embedded, vec![FRANCE.to_string()]);

	let documents =
		service.list_documents(&session_id).await.expect("Failed to list documents.");

	assert_eq!(documents.len(), 2);
}

#[tokio::test]
async fn sessions_do_not_share_embedding_caches() {
	let Harness { service, embedder, .. } = harness();
	let first = service.create_session().session_id;
	let second = service.create_session().session_id;

	upload(&service, &first, "a.txt", FRANCE).await.expect("Failed to ingest document.");
	upload(&service, &second, "a.txt", FRANCE).await.expect("Failed to ingest document.");

	assert_eq!(embedder.embedded(), vec![FRANCE.to_string(), FRANCE.to_string()]);
}

#[tokio::test]
async fn last_accessed_never_decreases() {
	let Harness { service, .. } = harness();
	let session_id = service.create_session().session_id;
	let clock = service.sessions.get(&session_id).expect("Failed to get session.").clock;
	let mut previous = clock.last_accessed();
	let ingested =
		upload(&service, &session_id, "a.txt", FRANCE).await.expect("Failed to ingest document.");

	assert!(clock.last_accessed() >= previous);

	previous = clock.last_accessed();

	service
		.query(question(&session_id, "What is the capital of France?", None))
		.await
		.expect("Failed to query.");

	assert!(clock.last_accessed() >= previous);

	previous = clock.last_accessed();

	service.refresh(&session_id).expect("Failed to refresh.");

	assert!(clock.last_accessed() >= previous);

	previous = clock.last_accessed();

	service.delete_document(&session_id, &ingested.doc_id).await.expect("Failed to delete.");

	assert!(clock.last_accessed() >= previous);
}

#[tokio::test]
async fn query_answers_from_relevant_chunks_only() {
	let Harness { service, generator, .. } = harness();
	let session_id = service.create_session().session_id;
	let france =
		upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	upload(&service, &session_id, "tokyo.txt", TOKYO).await.expect("Failed to ingest.");

	let response = service
		.query(question(&session_id, "What is the capital of France?", None))
		.await
		.expect("Failed to query.");

	assert_eq!(response.answer, "Paris.");
	assert_eq!(response.sources.len(), 1);
	assert_eq!(response.sources[0].doc_id, france.doc_id);
	assert_eq!(response.sources[0].source, "france.txt");
	assert!(response.sources[0].score > 0.5 && response.sources[0].score <= 1.0);
	assert_eq!(generator.contexts(), vec![vec![FRANCE.to_string()]]);
}

#[tokio::test]
async fn unknown_document_filter_is_not_an_error() {
	let Harness { service, generator, .. } = harness();
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	let response = service
		.query(question(
			&session_id,
			"What is the capital of France?",
			Some(vec!["nonexistent".to_string()]),
		))
		.await
		.expect("Failed to query.");

	assert!(response.sources.is_empty());
	assert_eq!(response.answer, NO_RELEVANT_ANSWER);
	assert!(generator.contexts().is_empty());
}

#[tokio::test]
async fn document_filter_restricts_candidates() {
	let Harness { service, .. } = harness();
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	let tokyo = upload(&service, &session_id, "tokyo.txt", TOKYO).await.expect("Failed to ingest.");
	let response = service
		.query(question(&session_id, "What is the capital of France?", Some(vec![tokyo.doc_id])))
		.await
		.expect("Failed to query.");

	assert!(response.sources.is_empty());
	assert_eq!(response.answer, NO_RELEVANT_ANSWER);
}

#[tokio::test]
async fn sessions_are_isolated() {
	let Harness { service, .. } = harness();
	let first = service.create_session().session_id;
	let second = service.create_session().session_id;

	upload(&service, &first, "france.txt", FRANCE).await.expect("Failed to ingest.");
	upload(&service, &second, "tokyo.txt", TOKYO).await.expect("Failed to ingest.");

	let response = service
		.query(question(&first, "Where are sushi and ramen popular?", None))
		.await
		.expect("Failed to query.");

	assert!(response.sources.is_empty());
	assert_eq!(response.answer, NO_RELEVANT_ANSWER);
}

#[tokio::test]
async fn streaming_emits_sources_tokens_then_end() {
	let Harness { service, .. } = harness();
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	let events: Vec<AnswerEvent> = service
		.query_stream(question(&session_id, "What is the capital of France?", None))
		.await
		.expect("Failed to start stream.")
		.collect()
		.await;
	let names: Vec<&str> = events.iter().map(AnswerEvent::name).collect();

	assert_eq!(names, vec!["sources", "token", "token", "end"]);
	assert!(matches!(&events[0], AnswerEvent::Sources(sources) if sources.len() == 1));
	assert_eq!(events[1], AnswerEvent::Token("Paris".to_string()));
}

#[tokio::test]
async fn streaming_reports_generator_failure_in_band() {
	let Harness { service, .. } =
		harness_with(ScriptedGenerator::failing_after(&["Par", "is", "."], 1));
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	let events: Vec<AnswerEvent> = service
		.query_stream(question(&session_id, "What is the capital of France?", None))
		.await
		.expect("Failed to start stream.")
		.collect()
		.await;
	let names: Vec<&str> = events.iter().map(AnswerEvent::name).collect();

	assert_eq!(names, vec!["sources", "token", "error", "end"]);
}

#[tokio::test]
async fn streaming_without_context_sends_fallback_answer() {
	let Harness { service, generator, .. } = harness();
	let session_id = service.create_session().session_id;
	let events: Vec<AnswerEvent> = service
		.query_stream(question(&session_id, "Anything?", None))
		.await
		.expect("Failed to start stream.")
		.collect()
		.await;

	assert_eq!(events, vec![
		AnswerEvent::Sources(Vec::new()),
		AnswerEvent::Token(NO_RELEVANT_ANSWER.to_string()),
		AnswerEvent::End,
	]);
	assert!(generator.contexts().is_empty());
}

#[tokio::test]
async fn buffered_generation_failure_is_upstream() {
	let Harness { service, .. } = harness_with(ScriptedGenerator::failing_after(&["x"], 0));
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	let err = service
		.query(question(&session_id, "What is the capital of France?", None))
		.await
		.expect_err("Expected generation failure.");

	assert!(matches!(err, Error::Upstream { .. }));
}

#[tokio::test]
async fn failed_ingest_leaves_no_document() {
	let Harness { service, embedder, .. } = harness();
	let session_id = service.create_session().session_id;

	embedder.set_failing(true);

	let err = upload(&service, &session_id, "france.txt", FRANCE)
		.await
		.expect_err("Expected embedding failure.");

	assert!(matches!(err, Error::Upstream { .. }));
	assert!(service.list_documents(&session_id).await.expect("Failed to list.").is_empty());

	embedder.set_failing(false);

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	assert_eq!(service.list_documents(&session_id).await.expect("Failed to list.").len(), 1);
}

#[tokio::test]
async fn ingest_rejects_bad_input() {
	let Harness { service, .. } = harness();
	let session_id = service.create_session().session_id;
	let unsupported = upload(&service, &session_id, "setup.exe", "MZ").await;
	let blank = upload(&service, &session_id, "blank.txt", " \n\t ").await;
	let oversized = upload(&service, &session_id, "big.txt", &"x".repeat(64 * 1024 + 1)).await;
	let unknown = upload(&service, "missing", "a.txt", FRANCE).await;
	let no_url = service
		.ingest(IngestRequest {
			session_id: session_id.clone(),
			source: IngestSource::Url { url: "  ".to_string() },
		})
		.await;

	assert!(matches!(unsupported, Err(Error::InvalidInput { .. })));
	assert!(matches!(blank, Err(Error::InvalidInput { .. })));
	assert!(matches!(oversized, Err(Error::PayloadTooLarge { .. })));
	assert!(matches!(unknown, Err(Error::NotFound { .. })));
	assert!(matches!(no_url, Err(Error::InvalidInput { .. })));
}

#[tokio::test]
async fn ingest_splits_text_off_the_async_worker() {
	let splitter = Arc::new(ThreadRecordingSplitter::default());
	let mut providers =
		Providers::with_models(VocabEmbedder::new(), ScriptedGenerator::new(&["ok"]));

	providers.splitter = splitter.clone();

	let service = DocqaService::with_providers(test_config(), providers);
	let session_id = service.create_session().session_id;
	let ingested =
		upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");
	let threads = splitter.threads.lock().unwrap_or_else(|err| err.into_inner()).clone();

	assert_eq!(ingested.chunk_count, 1);
	// The default test runtime is single-threaded, so any other thread is the blocking pool.
	assert_eq!(threads.len(), 1);
	assert_ne!(threads[0], thread::current().id());
}

#[tokio::test]
async fn ingests_fetched_pages() {
	let embedder = VocabEmbedder::new();
	let generator = ScriptedGenerator::new(&["ok"]);
	let mut providers = Providers::with_models(embedder, generator);

	providers.loader = Arc::new(PageLoader::default().with_page(
		"https://example.com/france",
		"<html><head><script>var x = 1;</script></head><body><p>Paris is the capital of \
		 France.</p></body></html>",
		"html",
	));

	let service = DocqaService::with_providers(test_config(), providers);
	let session_id = service.create_session().session_id;
	let ingested = service
		.ingest(IngestRequest {
			session_id: session_id.clone(),
			source: IngestSource::Url { url: "https://example.com/france".to_string() },
		})
		.await
		.expect("Failed to ingest page.");
	let missing = service
		.ingest(IngestRequest {
			session_id: session_id.clone(),
			source: IngestSource::Url { url: "https://example.com/missing".to_string() },
		})
		.await;
	let response = service
		.query(question(&session_id, "What is the capital of France?", None))
		.await
		.expect("Failed to query.");

	assert_eq!(ingested.source, "https://example.com/france");
	assert!(matches!(missing, Err(Error::Upstream { .. })));
	assert_eq!(response.sources[0].text, FRANCE);
}

#[tokio::test]
async fn deleted_documents_are_no_longer_retrieved() {
	let Harness { service, .. } = harness();
	let session_id = service.create_session().session_id;
	let france =
		upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	service.delete_document(&session_id, &france.doc_id).await.expect("Failed to delete.");

	let again = service.delete_document(&session_id, &france.doc_id).await;
	let response = service
		.query(question(&session_id, "What is the capital of France?", None))
		.await
		.expect("Failed to query.");

	assert!(matches!(again, Err(Error::NotFound { .. })));
	assert_eq!(response.answer, NO_RELEVANT_ANSWER);
}

#[tokio::test]
async fn status_and_health_track_idle_time() {
	let Harness { service, .. } = harness();
	let now = OffsetDateTime::now_utc();
	let live = service.create_session().session_id;
	let stale = service.sessions.create(now - Duration::minutes(16));
	let live_status = service.status(&live, now);
	let stale_status = service.status(&stale, now);
	let unknown_status = service.status("missing", now);

	assert!(live_status.active);
	assert!(live_status.remaining_secs.is_some_and(|secs| secs > 890 && secs <= 900));
	assert!(live_status.created_at.is_some_and(|created_at| created_at >= now));
	assert!(!stale_status.active);
	assert_eq!(stale_status.created_at, Some(now - Duration::minutes(16)));
	assert!(stale_status.last_accessed.is_some());
	assert!(!unknown_status.active);
	assert!(unknown_status.created_at.is_none());
	assert!(unknown_status.last_accessed.is_none());

	assert_eq!(service.health(&live, now).expect("Session must be healthy.").status, "active");
	assert!(matches!(service.health(&stale, now), Err(Error::Gone { .. })));
	assert!(matches!(service.health("missing", now), Err(Error::NotFound { .. })));
}

#[tokio::test]
async fn query_rejects_vectors_from_another_embedding_space() {
	let Harness { mut service, generator, .. } = harness();
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	service.cfg.providers.embedding.dimensions = 32;

	let result = service.query(question(&session_id, "What is the capital of France?", None)).await;

	assert!(matches!(result, Err(Error::Upstream { .. })));
	assert!(generator.contexts().is_empty());
}

#[tokio::test]
async fn status_does_not_wait_for_the_session_lock() {
	let Harness { service, .. } = harness();
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");

	let handle = service.sessions.get(&session_id).expect("Failed to get session.");
	// Held the way an ingest holds it while waiting on the embedder.
	let _guard = handle.session.lock().await;
	let status = service.status(&session_id, OffsetDateTime::now_utc());

	assert!(status.active);
	assert_eq!(status.document_count, Some(1));
}

#[tokio::test]
async fn expired_sessions_serve_until_swept_by_default() {
	let Harness { service, .. } = harness();
	let stale = service.sessions.create(OffsetDateTime::now_utc() - Duration::minutes(16));

	upload(&service, &stale, "france.txt", FRANCE).await.expect("Failed to ingest.");

	let refreshed = service.refresh(&stale).expect("Failed to refresh.");

	assert_eq!(refreshed.remaining_secs, 900);
	assert!(service.health(&stale, OffsetDateTime::now_utc()).is_ok());
}

#[tokio::test]
async fn expired_sessions_can_be_rejected_on_access() {
	let mut cfg = test_config();

	cfg.session.reject_expired_on_access = true;

	let service =
		test_service(cfg, VocabEmbedder::new(), ScriptedGenerator::new(&["unused"]));
	let stale = service.sessions.create(OffsetDateTime::now_utc() - Duration::minutes(16));
	let ingest = upload(&service, &stale, "france.txt", FRANCE).await;
	let query = service.query(question(&stale, "Anything?", None)).await;

	assert!(matches!(ingest, Err(Error::Gone { .. })));
	assert!(matches!(query, Err(Error::Gone { .. })));
	assert!(matches!(service.refresh(&stale), Err(Error::Gone { .. })));
}

#[tokio::test]
async fn deleted_sessions_are_unreachable() {
	let Harness { service, .. } = harness();
	let session_id = service.create_session().session_id;

	upload(&service, &session_id, "france.txt", FRANCE).await.expect("Failed to ingest.");
	service.delete_session(&session_id).expect("Failed to delete session.");

	assert!(matches!(service.delete_session(&session_id), Err(Error::NotFound { .. })));
	assert!(matches!(
		service.query(question(&session_id, "Anything?", None)).await,
		Err(Error::NotFound { .. })
	));
	assert_eq!(service.service_health().active_sessions, 0);
}
