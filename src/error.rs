//! 에러 타입 정의
//!
//! 검색 경로의 에러(임베딩/인덱스/리랭커)는 RetrievalEngine 경계에서
//! 흡수되어 빈 결과로 변환됩니다. 영속화 에러는 호출자에게 그대로
//! 전파됩니다 - 내구 저장 실패를 조용히 삼키면 안 됩니다.

use thiserror::Error;

/// RAG 코어 에러 분류
#[derive(Debug, Error)]
pub enum RagError {
    /// 청킹 실패 (텍스트 입력에서는 사실상 도달 불가)
    #[error("chunking failed: {0}")]
    Chunking(String),

    /// 임베딩 프로바이더 장애 (타임아웃/재시도 소진)
    #[error("embedding provider unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// 벡터 인덱스 백엔드 장애
    #[error("vector index unavailable: {0}")]
    IndexUnavailable(String),

    /// 리랭커 장애 (선택 컴포넌트)
    #[error("reranker unavailable: {0}")]
    RerankUnavailable(String),

    /// 내구 저장 실패 (디스크/권한/직렬화)
    #[error("record persistence failed: {0}")]
    RecordPersistence(String),

    /// ID로 조회한 기록이 없음
    #[error("record not found: {0}")]
    RecordNotFound(String),
}

impl From<std::io::Error> for RagError {
    fn from(e: std::io::Error) -> Self {
        RagError::RecordPersistence(e.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(e: serde_json::Error) -> Self {
        RagError::RecordPersistence(e.to_string())
    }
}
