//! Learning subsystem: knowledge store, learning engine, confidence
//! decay, semantic pattern matching.

pub mod decay;
pub mod engine;
pub mod semantic;
pub mod store;

pub use engine::{
    FailurePatterns, LearnSource, LearningEngine, MatchKind, PatternMatch, SuccessSample,
    SEVERE_DEMOTION_CATEGORIES,
};
pub use semantic::{
    cosine_similarity, url_signature, EmbeddingProvider, MemoryVectorStore, PatternVectorStore,
    SemanticMatch, SemanticPatternMatcher, StoredPatternEmbedding,
};
pub use store::{KnowledgeDocument, KnowledgeStore, LearningEvent, MAX_LEARNING_EVENTS};
