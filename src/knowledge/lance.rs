//! LanceDB Vector Store - 영속 백엔드
//!
//! ANN (Approximate Nearest Neighbor) 검색을 제공하는 영속 모드입니다.
//! ref: https://lancedb.github.io/lancedb/
//!
//! doc_type 필터는 LanceDB 측 predicate로 내려보내고, 전체 필터는 조회 후
//! 프로세스 내에서 한 번 더 적용합니다 - 임의 메타데이터 키에 대해서도
//! 필터 계약이 성립합니다.

use std::path::Path;
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use uuid::Uuid;

use crate::error::RagError;

use super::document::{matches_filter, Document, Metadata, ScoredDocument};
use super::vector::{VectorEntry, VectorStore};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "knowledge";

/// 필터에 doc_type 외의 키가 있을 때 사후 필터링을 위한 초과 조회 배수
const POST_FILTER_FETCH_FACTOR: usize = 4;

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// Apache Arrow 기반 columnar 저장소로, 인덱스는 정식 기록으로부터 언제든
/// 재구축 가능한 파생 캐시입니다.
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원 (배포별 고정)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self, RagError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    RagError::IndexUnavailable(format!("failed to create index directory: {}", e))
                })?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::IndexUnavailable("invalid path encoding".to_string()))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("connect failed: {}", e)))?;

        Ok(Self {
            db,
            dimension: dimension as i32,
        })
    }

    /// 벡터 테이블 스키마
    fn schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("doc_type", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("content", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(
        &self,
        ids: &[String],
        entries: &[VectorEntry],
    ) -> Result<RecordBatch, RagError> {
        let doc_types: Vec<&str> = entries
            .iter()
            .map(|e| {
                e.metadata
                    .get("doc_type")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
            })
            .collect();
        let sources: Vec<&str> = entries
            .iter()
            .map(|e| {
                e.metadata
                    .get("source")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
            })
            .collect();
        let contents: Vec<&str> = entries.iter().map(|e| e.content.as_str()).collect();
        let metadata_json: Vec<String> = entries
            .iter()
            .map(|e| serde_json::Value::Object(e.metadata.clone()).to_string())
            .collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(|e| RagError::IndexUnavailable(format!("bad embedding array: {}", e)))?;

        let id_refs: Vec<&str> = ids.iter().map(|s| s.as_str()).collect();
        let metadata_refs: Vec<&str> = metadata_json.iter().map(|s| s.as_str()).collect();

        RecordBatch::try_new(
            Arc::new(self.schema()),
            vec![
                Arc::new(StringArray::from(id_refs)),
                Arc::new(StringArray::from(doc_types)),
                Arc::new(StringArray::from(sources)),
                Arc::new(StringArray::from(contents)),
                Arc::new(StringArray::from(metadata_refs)),
                Arc::new(embeddings_list),
            ],
        )
        .map_err(|e| RagError::IndexUnavailable(format!("failed to build batch: {}", e)))
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.contains(&TABLE_NAME.to_string()))
            .unwrap_or(false)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert(&self, entries: &[VectorEntry]) -> Result<Vec<String>, RagError> {
        if entries.is_empty() {
            return Ok(vec![]);
        }

        let ids: Vec<String> = entries.iter().map(|_| Uuid::new_v4().to_string()).collect();
        let batch = self.entries_to_batch(&ids, entries)?;
        let schema = batch.schema();

        if self.table_exists().await {
            let table = self
                .db
                .open_table(TABLE_NAME)
                .execute()
                .await
                .map_err(|e| RagError::IndexUnavailable(format!("open table failed: {}", e)))?;

            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            table
                .add(batches)
                .execute()
                .await
                .map_err(|e| RagError::IndexUnavailable(format!("add failed: {}", e)))?;
        } else {
            let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
            self.db
                .create_table(TABLE_NAME, batches)
                .execute()
                .await
                .map_err(|e| RagError::IndexUnavailable(format!("create table failed: {}", e)))?;
        }

        Ok(ids)
    }

    async fn search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        if limit == 0 || !self.table_exists().await {
            return Ok(vec![]);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("open table failed: {}", e)))?;

        // doc_type 외의 키는 사후 필터링되므로 여유분을 더 가져옴
        let has_residual_filter = filter
            .map(|f| f.keys().any(|k| k != "doc_type"))
            .unwrap_or(false);
        let fetch_limit = if has_residual_filter {
            limit * POST_FILTER_FETCH_FACTOR
        } else {
            limit
        };

        let mut query = table
            .vector_search(query_embedding.to_vec())
            .map_err(|e| RagError::IndexUnavailable(format!("bad query vector: {}", e)))?
            .limit(fetch_limit);

        if let Some(doc_type) = filter
            .and_then(|f| f.get("doc_type"))
            .and_then(|v| v.as_str())
        {
            query = query.only_if(format!("doc_type = '{}'", escape_sql_literal(doc_type)));
        }

        let stream = query
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("search failed: {}", e)))?;

        use futures::TryStreamExt;
        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("result stream failed: {}", e)))?;

        let mut results = Vec::new();

        for batch in batches {
            let contents = batch
                .column_by_name("content")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| RagError::IndexUnavailable("missing content column".to_string()))?;

            let metadata_col = batch
                .column_by_name("metadata")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| RagError::IndexUnavailable("missing metadata column".to_string()))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| RagError::IndexUnavailable("missing _distance column".to_string()))?;

            for i in 0..batch.num_rows() {
                let metadata: Metadata = serde_json::from_str(metadata_col.value(i))
                    .unwrap_or_default();

                // 전체 필터 재적용 (임의 키에 대한 계약 보장)
                if let Some(f) = filter {
                    if !matches_filter(&metadata, f) {
                        continue;
                    }
                }

                // 거리를 유사도로 변환 (L2 거리 -> 유사도 근사)
                let similarity = 1.0 / (1.0 + distances.value(i));

                results.push(ScoredDocument {
                    document: Document::new(contents.value(i).to_string(), metadata),
                    score: similarity,
                });
            }
        }

        results.truncate(limit);
        Ok(results)
    }

    async fn count(&self) -> Result<usize, RagError> {
        if !self.table_exists().await {
            return Ok(0);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("open table failed: {}", e)))?;

        table
            .count_rows(None)
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("count failed: {}", e)))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// SQL 문자열 리터럴 이스케이프 (작은따옴표)
fn escape_sql_literal(s: &str) -> String {
    s.replace('\'', "''")
}

// ============================================================================
// Tests
// ============================================================================
