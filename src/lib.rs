//! k3s-ops-rag - K3s 운영 지식 검색 엔진
//!
//! 자동 장애 진단 어시스턴트에 과거 사건, 검증된 해결책, 참고 문서를
//! 제공하는 검색/인덱싱 코어입니다. 문서 청킹, 카테고리 필터 벡터 검색,
//! 선택적 리랭킹, 하이브리드 병합/중복 제거, 그리고 정식 기록과 벡터
//! 인덱스의 동기화를 담당합니다.

pub mod cli;
pub mod embedding;
pub mod error;
pub mod knowledge;

// Re-exports
pub use embedding::{get_api_key, has_api_key, EmbeddingConfig, EmbeddingProvider, GeminiEmbedding};
pub use error::RagError;
pub use knowledge::{
    content_hash, cosine_similarity, default_chunker, default_data_dir, generate_id,
    matches_filter, ChunkConfig, Chunker, CohereReranker, DocCategory, Document, IncidentRecord,
    KnowledgeBaseManager, KnowledgeBaseStats, LanceVectorStore, MemoryVectorStore, Metadata,
    NullReranker, Reranker, RetrievalEngine, ScoredDocument, SeparatorChunker, SolutionRecord,
    VectorEntry, VectorStore, NO_CONTEXT_MESSAGE,
};
