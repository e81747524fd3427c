//! Retrieval-augmented answering: embed the question, search the mission
//! corpus in ChromaDB Cloud, then synthesize an answer with the OpenAI API.

pub mod chroma;
pub mod engine;
pub mod openai;

pub use chroma::{ChromaClient, ChromaError};
pub use engine::{QueryEngine, QueryOutcome, SourceDocument};
pub use openai::{OpenAiClient, OpenAiError};

use thiserror::Error;

/// Result alias for retrieval pipeline operations.
pub type RagResult<T> = Result<T, RagError>;

/// Failure anywhere in the retrieval pipeline.
#[derive(Debug, Error)]
pub enum RagError {
    /// The vector store could not be reached or rejected the request.
    #[error("vector store error: {0}")]
    Chroma(#[from] ChromaError),
    /// The embeddings or completions API failed.
    #[error("language model error: {0}")]
    OpenAi(#[from] OpenAiError),
}
