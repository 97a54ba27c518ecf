//! Query routing.
//!
//! Dispatches a classified query to the handler for its domain. The
//! greeting, navigation, mentions, and listing handlers answer from
//! structured lookups — no retrieval, and no generative backend when the
//! answer is a literal formatted enumeration. "Not found" is a success
//! path: a deterministic AnswerResult with empty sources and confidence
//! zero, never an error.
//!
//! A file-action intent that is missing its required slot re-routes to
//! content QA rather than executing a partial action; the caller falls
//! through to the content pipeline when this module returns `None`.

use std::sync::Arc;
use tracing::debug;

use crate::adapters::{DocumentStore, ListFilters};
use crate::error::Result;
use crate::models::{AnswerResult, Domain, IntentClassification, Query};

const GREETINGS: &[&str] = &[
    "Hello! Ask me anything about your documents.",
    "Hi there! What would you like to know about your documents?",
    "Hello! I can answer questions about your uploaded documents, find files, or search for mentions.",
];

/// Try to answer through a specialized handler.
///
/// Returns `Ok(None)` when the query belongs on the content path —
/// either because its domain is generative or because a required entity
/// slot is missing (malformed entities re-route rather than half-act).
pub async fn route_shortcut(
    query: &Query,
    classification: &IntentClassification,
    store: &Arc<dyn DocumentStore>,
) -> Result<Option<AnswerResult>> {
    match classification.domain {
        Domain::Greeting => Ok(Some(greeting_answer(query, classification))),
        Domain::Navigation => navigation_answer(query, classification, store).await,
        Domain::MentionsSearch => mentions_answer(query, classification, store).await,
        Domain::ListMetadata => list_answer(query, classification, store).await,
        Domain::GeneralKnowledge | Domain::ContentQa => Ok(None),
    }
}

/// Canned greeting, chosen deterministically from the query text.
fn greeting_answer(query: &Query, classification: &IntentClassification) -> AnswerResult {
    let index = query.text.bytes().map(|b| b as usize).sum::<usize>() % GREETINGS.len();
    let mut result = AnswerResult::without_sources(GREETINGS[index], Domain::Greeting);
    result.confidence = classification.confidence;
    result
}

async fn navigation_answer(
    query: &Query,
    classification: &IntentClassification,
    store: &Arc<dyn DocumentStore>,
) -> Result<Option<AnswerResult>> {
    let name = classification
        .entities
        .filename
        .as_deref()
        .or(classification.entities.target_name.as_deref());

    let Some(name) = name else {
        // Location question with no recognizable file name: let the
        // content pipeline try to answer it from document text.
        debug!("navigation intent without a name slot, re-routing to content QA");
        return Ok(None);
    };

    match store.lookup_file_location(&query.user_id, name).await? {
        Some(location) => {
            let mut result = AnswerResult::without_sources(
                format!(
                    "\"{}\" is in the {} folder.",
                    location.file_name, location.folder_path
                ),
                Domain::Navigation,
            );
            result.confidence = classification.confidence;
            Ok(Some(result))
        }
        None => Ok(Some(AnswerResult::without_sources(
            format!("I couldn't find a file named \"{}\" in your collection.", name),
            Domain::Navigation,
        ))),
    }
}

async fn mentions_answer(
    query: &Query,
    classification: &IntentClassification,
    store: &Arc<dyn DocumentStore>,
) -> Result<Option<AnswerResult>> {
    let Some(phrase) = classification.entities.search_phrase.as_deref() else {
        debug!("mentions intent without a phrase slot, re-routing to content QA");
        return Ok(None);
    };

    let mentions = store.search_mentions(&query.user_id, phrase).await?;

    if mentions.is_empty() {
        return Ok(Some(AnswerResult::without_sources(
            format!("I didn't find any mentions of \"{}\" in your documents.", phrase),
            Domain::MentionsSearch,
        )));
    }

    let mut lines = vec![format!(
        "Found {} mention{} of \"{}\":",
        mentions.len(),
        if mentions.len() == 1 { "" } else { "s" },
        phrase
    )];
    for mention in &mentions {
        let location = mention
            .location
            .tag()
            .map(|tag| format!(" ({})", tag))
            .unwrap_or_default();
        lines.push(format!(
            "- {}{}: \"{}\"",
            mention.document_name,
            location,
            mention.snippet.trim()
        ));
    }

    let mut result =
        AnswerResult::without_sources(lines.join("\n"), Domain::MentionsSearch);
    result.confidence = classification.confidence;
    Ok(Some(result))
}

async fn list_answer(
    query: &Query,
    classification: &IntentClassification,
    store: &Arc<dyn DocumentStore>,
) -> Result<Option<AnswerResult>> {
    let filters = ListFilters {
        folder_name: classification.entities.folder_name.clone(),
        document_type: classification.entities.document_type.clone(),
    };

    // A topical listing ("documents about taxes") has nothing to filter
    // on structurally — it goes to the semantic listing path, which
    // retrieves at the relaxed list threshold.
    if filters.folder_name.is_none()
        && filters.document_type.is_none()
        && classification.entities.search_phrase.is_some()
    {
        debug!("topical list query, deferring to semantic listing");
        return Ok(None);
    }

    let files = store.list_files(&query.user_id, &filters).await?;

    if files.is_empty() {
        let scope_phrase = filters
            .folder_name
            .as_deref()
            .map(|f| format!(" in the {} folder", f))
            .unwrap_or_default();
        return Ok(Some(AnswerResult::without_sources(
            format!("You don't have any matching files{}.", scope_phrase),
            Domain::ListMetadata,
        )));
    }

    let mut lines = vec![format!(
        "You have {} file{}:",
        files.len(),
        if files.len() == 1 { "" } else { "s" }
    )];
    for file in &files {
        lines.push(format!("- {} ({})", file.file_name, file.folder_path));
    }

    let mut result = AnswerResult::without_sources(lines.join("\n"), Domain::ListMetadata);
    result.confidence = classification.confidence;
    Ok(Some(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{FileEntry, InMemoryDocumentStore, Mention};
    use crate::models::{ChunkLocation, Entities, Style};

    fn classification(domain: Domain, entities: Entities) -> IntentClassification {
        IntentClassification {
            domain,
            style: Style::FastAnswer,
            confidence: 0.9,
            entities,
            reasoning: String::new(),
        }
    }

    async fn store_with_passport() -> Arc<dyn DocumentStore> {
        let store = InMemoryDocumentStore::new();
        store
            .add_file(FileEntry {
                document_id: "d1".into(),
                file_name: "passport.pdf".into(),
                folder_path: "Travel".into(),
                content_type: "pdf".into(),
                updated_at: chrono::Utc::now(),
            })
            .await;
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_greeting_is_classification_only() {
        let store = store_with_passport().await;
        let query = Query::new("hello", "u1");
        let result = route_shortcut(
            &query,
            &classification(Domain::Greeting, Entities::default()),
            &store,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result.domain, Domain::Greeting);
        assert!(result.sources.is_empty());
        assert!(!result.answer.is_empty());
    }

    #[tokio::test]
    async fn test_greeting_deterministic() {
        let store = store_with_passport().await;
        let query = Query::new("hello", "u1");
        let c = classification(Domain::Greeting, Entities::default());
        let a = route_shortcut(&query, &c, &store).await.unwrap().unwrap();
        let b = route_shortcut(&query, &c, &store).await.unwrap().unwrap();
        assert_eq!(a.answer, b.answer);
    }

    #[tokio::test]
    async fn test_navigation_found() {
        let store = store_with_passport().await;
        let query = Query::new("where is passport.pdf", "u1");
        let entities = Entities {
            filename: Some("passport".into()),
            ..Default::default()
        };
        let result = route_shortcut(
            &query,
            &classification(Domain::Navigation, entities),
            &store,
        )
        .await
        .unwrap()
        .unwrap();
        assert!(result.answer.contains("passport.pdf"));
        assert!(result.answer.contains("Travel"));
        assert!(result.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_navigation_not_found_is_success() {
        let store = store_with_passport().await;
        let query = Query::new("where is visa.pdf", "u1");
        let entities = Entities {
            filename: Some("visa".into()),
            ..Default::default()
        };
        let result = route_shortcut(
            &query,
            &classification(Domain::Navigation, entities),
            &store,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(result.confidence, 0.0);
        assert!(result.sources.is_empty());
        assert!(result.answer.contains("couldn't find"));
    }

    #[tokio::test]
    async fn test_navigation_without_slot_reroutes() {
        let store = store_with_passport().await;
        let query = Query::new("where are my things", "u1");
        let result = route_shortcut(
            &query,
            &classification(Domain::Navigation, Entities::default()),
            &store,
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_mentions_enumeration() {
        let store = InMemoryDocumentStore::new();
        store
            .add_chunk_text(Mention {
                document_id: "d1".into(),
                document_name: "contract.pdf".into(),
                snippet: "subject to force majeure provisions".into(),
                location: ChunkLocation::Page(12),
            })
            .await;
        let store: Arc<dyn DocumentStore> = Arc::new(store);

        let query = Query::new("find all mentions of force majeure", "u1");
        let entities = Entities {
            search_phrase: Some("force majeure".into()),
            ..Default::default()
        };
        let result = route_shortcut(
            &query,
            &classification(Domain::MentionsSearch, entities),
            &store,
        )
        .await
        .unwrap()
        .unwrap();
        assert!(result.answer.contains("Found 1 mention"));
        assert!(result.answer.contains("contract.pdf"));
        assert!(result.answer.contains("page 12"));
    }

    #[tokio::test]
    async fn test_mentions_without_phrase_reroutes() {
        let store = store_with_passport().await;
        let query = Query::new("find the mentions", "u1");
        let result = route_shortcut(
            &query,
            &classification(Domain::MentionsSearch, Entities::default()),
            &store,
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_list_with_folder_filter() {
        let store = InMemoryDocumentStore::new();
        for (name, folder) in [("a.pdf", "Reports"), ("b.pdf", "Travel")] {
            store
                .add_file(FileEntry {
                    document_id: name.into(),
                    file_name: name.into(),
                    folder_path: folder.into(),
                    content_type: "pdf".into(),
                    updated_at: chrono::Utc::now(),
                })
                .await;
        }
        let store: Arc<dyn DocumentStore> = Arc::new(store);

        let query = Query::new("show me files in the Reports folder", "u1");
        let entities = Entities {
            folder_name: Some("Reports".into()),
            ..Default::default()
        };
        let result = route_shortcut(
            &query,
            &classification(Domain::ListMetadata, entities),
            &store,
        )
        .await
        .unwrap()
        .unwrap();
        assert!(result.answer.contains("a.pdf"));
        assert!(!result.answer.contains("b.pdf"));
    }

    #[tokio::test]
    async fn test_topical_list_defers_to_semantic_listing() {
        let store = store_with_passport().await;
        let query = Query::new("show me documents about taxes", "u1");
        let entities = Entities {
            search_phrase: Some("taxes".into()),
            ..Default::default()
        };
        let result = route_shortcut(
            &query,
            &classification(Domain::ListMetadata, entities),
            &store,
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_content_qa_falls_through() {
        let store = store_with_passport().await;
        let query = Query::new("what is the Q1 revenue?", "u1");
        let result = route_shortcut(
            &query,
            &classification(Domain::ContentQa, Entities::default()),
            &store,
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }
}
