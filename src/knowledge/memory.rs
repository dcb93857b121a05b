//! 인메모리 벡터 스토어 - 휘발성 백엔드
//!
//! 개발/테스트용 프로세스 로컬 백엔드입니다. 재시작 시 데이터가 사라지며,
//! 전수 코사인 유사도 비교로 검색합니다. 계약은 LanceVectorStore와 동일하고
//! 모드 선택은 생성 시점에 이뤄집니다.

use std::sync::RwLock;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::RagError;

use super::document::{matches_filter, Document, Metadata, ScoredDocument};
use super::vector::{cosine_similarity, VectorEntry, VectorStore};

/// 저장된 엔트리
struct StoredEntry {
    id: String,
    content: String,
    metadata: Metadata,
    embedding: Vec<f32>,
}

/// 인메모리 벡터 스토어
pub struct MemoryVectorStore {
    entries: RwLock<Vec<StoredEntry>>,
}

impl MemoryVectorStore {
    /// 빈 스토어 생성
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<Vec<String>, RagError> {
        let mut stored = self
            .entries
            .write()
            .map_err(|e| RagError::IndexUnavailable(format!("lock poisoned: {}", e)))?;

        let mut ids = Vec::with_capacity(entries.len());
        for entry in entries {
            let id = Uuid::new_v4().to_string();
            stored.push(StoredEntry {
                id: id.clone(),
                content: entry.content.clone(),
                metadata: entry.metadata.clone(),
                embedding: entry.embedding.clone(),
            });
            ids.push(id);
        }

        Ok(ids)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        let stored = self
            .entries
            .read()
            .map_err(|e| RagError::IndexUnavailable(format!("lock poisoned: {}", e)))?;

        let mut results: Vec<ScoredDocument> = stored
            .iter()
            .filter(|e| filter.map(|f| matches_filter(&e.metadata, f)).unwrap_or(true))
            .map(|e| ScoredDocument {
                document: Document::new(e.content.clone(), e.metadata.clone()),
                score: cosine_similarity(query_embedding, &e.embedding),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn count(&self) -> Result<usize, RagError> {
        let stored = self
            .entries
            .read()
            .map_err(|e| RagError::IndexUnavailable(format!("lock poisoned: {}", e)))?;
        Ok(stored.len())
    }
}

// ============================================================================
// Tests
// ============================================================================
