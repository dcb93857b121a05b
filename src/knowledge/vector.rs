//! Vector Store - 벡터 인덱스 트레이트 및 유틸리티
//!
//! (벡터, 텍스트, 메타데이터) 삼중항을 저장하고 메타데이터 필터가 적용된
//! 최근접 이웃 검색을 제공합니다. 영속 백엔드(LanceDB)와 휘발성 백엔드
//! (인메모리)가 동일한 계약을 구현하며, 선택은 생성 시점에 이뤄집니다.

use async_trait::async_trait;

use crate::error::RagError;

use super::document::{Metadata, ScoredDocument};

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 청크 텍스트
    pub content: String,
    /// 문서 메타데이터 (doc_type 필수)
    pub metadata: Metadata,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// 벡터 인덱스 공통 인터페이스
///
/// 필터는 메타데이터 키/값의 conjunctive exact match입니다.
/// 매칭 결과가 limit보다 적으면 있는 만큼만 반환합니다 -
/// 빈 결과는 정상이며 에러가 아닙니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 엔트리 배치 저장, 할당된 ID 목록 반환
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<Vec<String>, RagError>;

    /// 유사도 순 상위 limit개 검색 (필터 적용)
    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredDocument>, RagError>;

    /// 저장된 엔트리 개수
    async fn count(&self) -> Result<usize, RagError>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산 (-1.0 ~ 1.0)
///
/// 길이가 다르거나 빈 벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - -1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty_or_mismatched() {
        let empty: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&empty, &empty), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0, 0.0, 0.0]), 0.0);
    }
}
