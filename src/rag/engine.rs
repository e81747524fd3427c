//! Answer pipeline: embed the question, fetch the closest corpus chunks,
//! filter them by relevance, and synthesize a grounded answer.

use std::time::Instant;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::RetrievalSettings;
use crate::rag::{
    RagResult,
    chroma::{ChromaClient, QueryResult},
    openai::{ChatMessage, OpenAiClient},
};

/// Answer returned when no chunk clears the similarity threshold. The
/// completion API is not called in that case.
pub const NO_CONTEXT_ANSWER: &str = "I could not find any relevant mission documents for that \
     question. Try rephrasing it, or ask about a specific mission in the knowledge base.";

const SYSTEM_PROMPT: &str = "You are a space mission design assistant answering questions about \
     historical and planned space missions. Ground every answer in the provided context passages \
     and say so explicitly when the context does not cover the question.";

/// Corpus chunk retained for answering, exposed to the client as a citation.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    /// Mission or document title taken from the chunk metadata.
    pub title: String,
    /// Chunk text fed to the model.
    pub text: String,
    /// Relevance score in `[0, 1]`, derived from the query distance.
    pub score: f32,
}

/// Outcome of one answered question.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    /// Synthesized answer text.
    pub answer: String,
    /// Chunks the answer is grounded on, best match first.
    pub sources: Vec<SourceDocument>,
    /// Wall-clock time spent answering.
    pub elapsed_ms: u64,
}

/// Retrieval pipeline wiring the vector store and the language model.
pub struct QueryEngine {
    chroma: ChromaClient,
    openai: OpenAiClient,
    settings: RetrievalSettings,
    /// Resolved collection id, cached after the first successful lookup.
    collection_id: RwLock<Option<String>>,
}

impl QueryEngine {
    /// Wire the pipeline together. No network traffic happens here; the
    /// collection id is resolved lazily on first use.
    pub fn new(chroma: ChromaClient, openai: OpenAiClient, settings: RetrievalSettings) -> Self {
        Self {
            chroma,
            openai,
            settings,
            collection_id: RwLock::new(None),
        }
    }

    /// Answer `question` against the mission corpus.
    pub async fn answer(&self, question: &str) -> RagResult<QueryOutcome> {
        let started = Instant::now();

        let embedding = self
            .openai
            .embed(&self.settings.embedding_model, question)
            .await?;
        let collection_id = self.collection_id().await?;
        let result = self
            .chroma
            .query(&collection_id, &embedding, self.settings.top_k)
            .await?;

        let sources = retain_relevant(result, self.settings.similarity_threshold);
        if sources.is_empty() {
            return Ok(QueryOutcome {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        }

        let messages = [
            ChatMessage {
                role: "system",
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage {
                role: "user",
                content: build_prompt(question, &sources),
            },
        ];
        let answer = self
            .openai
            .complete(
                &self.settings.llm_model,
                self.settings.temperature,
                &messages,
            )
            .await?;

        Ok(QueryOutcome {
            answer,
            sources,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Probe the vector store, used by the healthcheck.
    pub async fn heartbeat(&self) -> RagResult<()> {
        self.chroma.heartbeat().await?;
        Ok(())
    }

    async fn collection_id(&self) -> RagResult<String> {
        if let Some(id) = self.collection_id.read().await.clone() {
            return Ok(id);
        }

        let info = self
            .chroma
            .resolve_collection(&self.settings.collection)
            .await?;
        let mut slot = self.collection_id.write().await;
        *slot = Some(info.id.clone());
        Ok(info.id)
    }
}

/// Convert the raw query result into scored sources, dropping chunks below
/// `threshold`. Chroma reports distances; score is `1 - distance`.
fn retain_relevant(result: QueryResult, threshold: f32) -> Vec<SourceDocument> {
    let ids = result.ids.into_iter().next().unwrap_or_default();
    let documents = result
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();
    let metadatas = result
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default();
    let distances = result
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    let mut sources = Vec::new();
    for index in 0..ids.len() {
        let Some(distance) = distances.get(index).copied() else {
            continue;
        };
        let score = 1.0 - distance;
        if score < threshold {
            continue;
        }

        let text = documents
            .get(index)
            .and_then(|document| document.clone())
            .unwrap_or_default();
        let title = metadatas
            .get(index)
            .and_then(|metadata| metadata.as_ref())
            .and_then(|metadata| metadata.get("title"))
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();

        sources.push(SourceDocument { title, text, score });
    }
    sources
}

/// Compact synthesis prompt: every retained chunk inlined above the question.
fn build_prompt(question: &str, sources: &[SourceDocument]) -> String {
    let mut context = String::new();
    for source in sources {
        context.push_str(&format!("[{}]\n{}\n\n", source.title, source.text));
    }

    format!(
        "Context information is below.\n\
         ---------------------\n\
         {context}\
         ---------------------\n\
         Given the context information and not prior knowledge, answer the query.\n\
         Query: {question}\n\
         Answer:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture(distances: Vec<f32>) -> QueryResult {
        let n = distances.len();
        serde_json::from_value(json!({
            "ids": [(0..n).map(|i| format!("chunk-{i}")).collect::<Vec<_>>()],
            "documents": [(0..n).map(|i| format!("passage {i}")).collect::<Vec<_>>()],
            "metadatas": [(0..n)
                .map(|i| json!({ "title": format!("Mission {i}") }))
                .collect::<Vec<_>>()],
            "distances": [distances],
        }))
        .expect("fixture must deserialize")
    }

    #[test]
    fn chunks_below_the_threshold_are_dropped() {
        let sources = retain_relevant(fixture(vec![0.2, 0.5, 0.9]), 0.35);

        let scores: Vec<f32> = sources.iter().map(|s| s.score).collect();
        assert_eq!(sources.len(), 2);
        assert!((scores[0] - 0.8).abs() < 1e-6);
        assert!((scores[1] - 0.5).abs() < 1e-6);
        assert_eq!(sources[0].title, "Mission 0");
        assert_eq!(sources[0].text, "passage 0");
    }

    #[test]
    fn all_chunks_below_threshold_yield_no_sources() {
        let sources = retain_relevant(fixture(vec![0.8, 0.95]), 0.35);
        assert!(sources.is_empty());
    }

    #[test]
    fn missing_metadata_falls_back_to_unknown_title() {
        let result: QueryResult = serde_json::from_value(json!({
            "ids": [["chunk-0"]],
            "documents": [["passage"]],
            "metadatas": [[null]],
            "distances": [[0.1]],
        }))
        .unwrap();

        let sources = retain_relevant(result, 0.35);
        assert_eq!(sources[0].title, "Unknown");
    }

    #[test]
    fn result_without_distances_keeps_nothing() {
        let result: QueryResult = serde_json::from_value(json!({
            "ids": [["chunk-0"]],
            "documents": [["passage"]],
        }))
        .unwrap();

        assert!(retain_relevant(result, 0.35).is_empty());
    }

    #[test]
    fn prompt_inlines_every_source_and_the_question() {
        let sources = vec![
            SourceDocument {
                title: "Voyager 1".to_string(),
                text: "Launched in 1977.".to_string(),
                score: 0.9,
            },
            SourceDocument {
                title: "Cassini".to_string(),
                text: "Orbited Saturn.".to_string(),
                score: 0.6,
            },
        ];

        let prompt = build_prompt("When did Voyager 1 launch?", &sources);

        assert!(prompt.starts_with("Context information is below."));
        assert!(prompt.contains("[Voyager 1]\nLaunched in 1977."));
        assert!(prompt.contains("[Cassini]\nOrbited Saturn."));
        assert!(prompt.contains("Query: When did Voyager 1 launch?"));
        assert!(prompt.ends_with("Answer:"));
    }
}
