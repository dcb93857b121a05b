//! 검색 엔진 - 카테고리 필터링 벡터 검색과 하이브리드 병합
//!
//! 임베딩 → 필터 검색 → (선택) 리랭킹 → 병합/중복 제거를 오케스트레이션합니다.
//! 검색 경로의 장애(임베딩/인덱스/리랭커)는 이 경계에서 흡수되어 빈 결과로
//! 변환됩니다 - 검색 품질 저하가 상위 워크플로(헬스체크/진단)를 중단시키면
//! 안 됩니다. 생성 후 상태가 없으므로 여러 요청이 동시에 사용해도 안전합니다.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::embedding::EmbeddingProvider;
use crate::error::RagError;

use super::chunker::{default_chunker, Chunker};
use super::document::{content_hash, DocCategory, Document, Metadata};
use super::rerank::Reranker;
use super::vector::{VectorEntry, VectorStore};

/// 하이브리드 검색 고정 서브 예산 (결정성을 위해 k와 무관)
const INCIDENT_QUOTA: usize = 2;
const SOLUTION_QUOTA: usize = 2;
const BEST_PRACTICE_QUOTA: usize = 1;

/// 벡터 검색 기본 타임아웃 - 코어 어디에도 무한 대기는 없음
const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// 검색 결과가 없을 때의 고정 컨텍스트 문구
pub const NO_CONTEXT_MESSAGE: &str = "관련된 과거 사례나 문서를 찾지 못했습니다.";

// ============================================================================
// RetrievalEngine
// ============================================================================

/// 검색 엔진
///
/// 임베딩 프로바이더/벡터 인덱스/리랭커는 프로세스 전역에서 공유되는
/// 핸들이며 시작 시 한 번 생성되어 모든 요청이 재사용합니다.
pub struct RetrievalEngine {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    chunker: Box<dyn Chunker>,
    search_timeout: Duration,
}

impl RetrievalEngine {
    /// 새 검색 엔진 생성 (기본 청커)
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
    ) -> Self {
        Self {
            embedder,
            index,
            reranker,
            chunker: default_chunker(),
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
        }
    }

    /// 청커 교체
    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// 벡터 검색 타임아웃 조정
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// 문서 추가 (청킹 → 임베딩 → 인덱스 저장)
    ///
    /// 검색 경로와 달리 실패를 그대로 전파합니다 - 정책(전파/로깅)은
    /// 호출자인 KnowledgeBaseManager가 결정합니다.
    pub async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>, RagError> {
        let chunks = self.chunker.split(&documents);
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let mut entries = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let embedding = self.embedder.embed(&chunk.content).await?;
            entries.push(VectorEntry {
                content: chunk.content,
                metadata: chunk.metadata,
                embedding,
            });
        }

        let ids = self.index.upsert(&entries).await?;
        tracing::info!("Indexed {} chunks", ids.len());
        Ok(ids)
    }

    /// 관련 문서 검색
    ///
    /// 임베딩/인덱스/리랭커 장애는 여기서 잡혀 빈 결과가 됩니다.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Vec<Document> {
        match self.try_retrieve(query, k, filter).await {
            Ok(docs) => {
                tracing::debug!("Retrieved {} documents for query", docs.len());
                docs
            }
            Err(e) => {
                tracing::warn!("Retrieval degraded to empty result: {}", e);
                Vec::new()
            }
        }
    }

    async fn try_retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<&Metadata>,
    ) -> Result<Vec<Document>, RagError> {
        if k == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(query).await?;

        // 리랭커가 있으면 재정렬할 후보 풀을 위해 초과 샘플링
        let fetch_limit = k * self.reranker.oversample();

        let scored = tokio::time::timeout(
            self.search_timeout,
            self.index.search(&query_embedding, fetch_limit, filter),
        )
        .await
        .map_err(|_| RagError::IndexUnavailable("vector search timed out".to_string()))??;

        let candidates: Vec<Document> = scored.into_iter().map(|s| s.document).collect();

        let mut docs = self.reranker.rerank(query, candidates, k).await?;
        docs.truncate(k);
        Ok(docs)
    }

    /// 카테고리 필터 검색 (doc_type 고정 매핑)
    pub async fn retrieve_by_category(
        &self,
        query: &str,
        category: DocCategory,
        k: usize,
    ) -> Vec<Document> {
        let mut filter = Metadata::new();
        filter.insert(
            "doc_type".to_string(),
            serde_json::Value::String(category.doc_type().to_string()),
        );
        self.retrieve(query, k, Some(&filter)).await
    }

    /// 하이브리드 검색 - 카테고리별 검색 병합
    ///
    /// 고정 서브 예산(사건 2, 해결책 2, 모범 사례 1)으로 세 번 검색하고
    /// 구체성이 높은 순서(사건 우선)로 이어붙인 뒤, 콘텐츠 해시로 중복을
    /// 제거하고 k개로 자릅니다. 서브 예산이 k와 무관한 것은 의도된
    /// 결정성 선택입니다. 한 카테고리의 장애가 다른 카테고리를
    /// 막지 않습니다.
    pub async fn hybrid_retrieve(&self, query: &str, k: usize) -> Vec<Document> {
        let mut merged = Vec::new();

        merged.extend(
            self.retrieve_by_category(query, DocCategory::Incident, INCIDENT_QUOTA)
                .await,
        );
        merged.extend(
            self.retrieve_by_category(query, DocCategory::Solution, SOLUTION_QUOTA)
                .await,
        );
        merged.extend(
            self.retrieve_by_category(query, DocCategory::BestPractice, BEST_PRACTICE_QUOTA)
                .await,
        );

        let mut unique = deduplicate_documents(merged);
        unique.truncate(k);
        unique
    }

    /// 검색 결과를 프롬프트용 컨텍스트 블록으로 렌더링
    ///
    /// 외부 완성(completion) 계층에 전달되는 렌더링 계약일 뿐,
    /// 코어 내부에서 파싱되지 않습니다.
    pub fn format_context(&self, docs: &[Document]) -> String {
        if docs.is_empty() {
            return NO_CONTEXT_MESSAGE.to_string();
        }

        let mut parts = Vec::with_capacity(docs.len());
        for (i, doc) in docs.iter().enumerate() {
            let doc_type = doc.doc_type().unwrap_or("unknown");
            let source = doc.source().unwrap_or("unknown");

            parts.push(format!(
                "### 참고 자료 {} ({})\n출처: {}\n내용:\n{}\n",
                i + 1,
                doc_type,
                source,
                doc.content
            ));
        }

        parts.join("\n")
    }

    /// 인덱스에 저장된 엔트리 개수
    pub async fn index_size(&self) -> Result<usize, RagError> {
        self.index.count().await
    }
}

// ============================================================================
// Deduplication
// ============================================================================

/// 콘텐츠 해시 기반 중복 제거
///
/// 첫 출현이 승리하고 이후 중복은 탈락하며, 그 외 순서는 보존됩니다.
/// 바이트 단위로 동일한 콘텐츠만 중복으로 취급합니다 (O(n)).
fn deduplicate_documents(docs: Vec<Document>) -> Vec<Document> {
    let mut seen = HashSet::new();
    docs.into_iter()
        .filter(|doc| seen.insert(content_hash(&doc.content)))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::memory::MemoryVectorStore;
    use crate::knowledge::rerank::NullReranker;
    use async_trait::async_trait;
    use serde_json::json;

    /// 결정적 의사 임베딩 - 바이트를 차원별로 접어 넣음
    struct HashEmbedding {
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for HashEmbedding {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
            let mut v = vec![0.0f32; self.dimension];
            for (i, b) in text.bytes().enumerate() {
                v[i % self.dimension] += b as f32 / 255.0;
            }
            Ok(v)
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn name(&self) -> &str {
            "hash-test"
        }
    }

    /// 항상 실패하는 임베딩 프로바이더
    struct FailingEmbedding;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedding {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, RagError> {
            Err(RagError::EmbeddingUnavailable("simulated outage".to_string()))
        }

        fn dimension(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "failing-test"
        }
    }

    /// 항상 실패하는 벡터 인덱스
    struct FailingIndex;

    #[async_trait]
    impl VectorStore for FailingIndex {
        async fn upsert(&self, _entries: &[VectorEntry]) -> Result<Vec<String>, RagError> {
            Err(RagError::IndexUnavailable("simulated outage".to_string()))
        }

        async fn search(
            &self,
            _query_embedding: &[f32],
            _limit: usize,
            _filter: Option<&Metadata>,
        ) -> Result<Vec<crate::knowledge::document::ScoredDocument>, RagError> {
            Err(RagError::IndexUnavailable("simulated outage".to_string()))
        }

        async fn count(&self) -> Result<usize, RagError> {
            Err(RagError::IndexUnavailable("simulated outage".to_string()))
        }
    }

    fn test_engine() -> RetrievalEngine {
        RetrievalEngine::new(
            Arc::new(HashEmbedding { dimension: 8 }),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(NullReranker),
        )
    }

    fn doc(content: &str, doc_type: &str) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert("doc_type".to_string(), json!(doc_type));
        metadata.insert("source".to_string(), json!(format!("{}.md", doc_type)));
        Document::new(content, metadata)
    }

    async fn seed(engine: &RetrievalEngine) {
        let docs = vec![
            doc("사건: etcd 디스크 가득 참", "incident"),
            doc("사건: 노드 NotReady 전환", "incident"),
            doc("사건: 인그레스 504 폭증", "incident"),
            doc("해결책: PVC 용량 확장 절차", "solution"),
            doc("해결책: kubelet 재시작 절차", "solution"),
            doc("해결책: 백엔드 타임아웃 조정", "solution"),
            doc("모범 사례: 리소스 limits 설정", "best_practice"),
            doc("모범 사례: liveness probe 구성", "best_practice"),
        ];
        engine.add_documents(docs).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_and_retrieve() {
        let engine = test_engine();
        seed(&engine).await;

        let docs = engine.retrieve("디스크 가득", 3, None).await;
        assert!(!docs.is_empty());
        assert!(docs.len() <= 3);
    }

    #[tokio::test]
    async fn test_retrieve_by_category_filters() {
        let engine = test_engine();
        seed(&engine).await;

        let docs = engine
            .retrieve_by_category("재시작", DocCategory::Solution, 5)
            .await;

        assert!(!docs.is_empty());
        for d in &docs {
            assert_eq!(d.doc_type(), Some("solution"));
        }
    }

    #[tokio::test]
    async fn test_hybrid_quota_and_priority_order() {
        let engine = test_engine();
        seed(&engine).await;

        let docs = engine.hybrid_retrieve("노드 장애", 10).await;

        // 고정 예산 2+2+1 = 최대 5개
        assert!(docs.len() <= 5);

        // 절단 전 우선순위: incident < solution < best_practice 순서로 등장
        let types: Vec<&str> = docs.iter().filter_map(|d| d.doc_type()).collect();
        let first_solution = types.iter().position(|t| *t == "solution");
        let last_incident = types.iter().rposition(|t| *t == "incident");
        if let (Some(sol), Some(inc)) = (first_solution, last_incident) {
            assert!(inc < sol, "incidents must precede solutions: {:?}", types);
        }
        let first_bp = types.iter().position(|t| *t == "best_practice");
        if let (Some(bp), Some(sol)) = (first_bp, types.iter().rposition(|t| *t == "solution")) {
            assert!(sol < bp, "solutions must precede best practices: {:?}", types);
        }
    }

    #[tokio::test]
    async fn test_hybrid_truncates_to_k() {
        let engine = test_engine();
        seed(&engine).await;

        let docs = engine.hybrid_retrieve("노드", 2).await;
        assert!(docs.len() <= 2);
    }

    #[tokio::test]
    async fn test_hybrid_deduplicates_identical_content() {
        let engine = test_engine();

        // 동일한 콘텐츠가 서로 다른 카테고리에 인덱싱된 경우
        let same = "OOMKilled 파드는 memory limits를 올려 해결";
        engine
            .add_documents(vec![doc(same, "incident"), doc(same, "solution")])
            .await
            .unwrap();

        let docs = engine.hybrid_retrieve("OOMKilled", 5).await;

        let matching: Vec<_> = docs.iter().filter(|d| d.content == same).collect();
        assert_eq!(matching.len(), 1);
        // 첫 출현 승리 - 우선순위가 높은 incident가 남음
        assert_eq!(matching[0].doc_type(), Some("incident"));
    }

    #[tokio::test]
    async fn test_dedup_idempotence() {
        let docs = vec![
            doc("alpha", "incident"),
            doc("beta", "incident"),
            doc("alpha", "solution"),
            doc("gamma", "best_practice"),
        ];

        let once = deduplicate_documents(docs);
        let contents: Vec<String> = once.iter().map(|d| d.content.clone()).collect();
        let twice = deduplicate_documents(once);

        assert_eq!(
            contents,
            twice.iter().map(|d| d.content.clone()).collect::<Vec<_>>()
        );
        assert_eq!(twice.len(), 3);
    }

    #[tokio::test]
    async fn test_embedding_failure_degrades_to_empty() {
        let engine = RetrievalEngine::new(
            Arc::new(FailingEmbedding),
            Arc::new(MemoryVectorStore::new()),
            Arc::new(NullReranker),
        );

        let docs = engine.retrieve("any query", 5, None).await;
        assert!(docs.is_empty());

        let docs = engine.hybrid_retrieve("any query", 5).await;
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_index_failure_degrades_to_empty() {
        let engine = RetrievalEngine::new(
            Arc::new(HashEmbedding { dimension: 8 }),
            Arc::new(FailingIndex),
            Arc::new(NullReranker),
        );

        let docs = engine.retrieve("any query", 5, None).await;
        assert!(docs.is_empty());
    }

    #[tokio::test]
    async fn test_add_documents_propagates_index_failure() {
        let engine = RetrievalEngine::new(
            Arc::new(HashEmbedding { dimension: 8 }),
            Arc::new(FailingIndex),
            Arc::new(NullReranker),
        );

        let result = engine.add_documents(vec![doc("text", "incident")]).await;
        assert!(matches!(result, Err(RagError::IndexUnavailable(_))));
    }

    #[tokio::test]
    async fn test_retrieve_zero_k() {
        let engine = test_engine();
        seed(&engine).await;
        assert!(engine.retrieve("query", 0, None).await.is_empty());
    }

    #[test]
    fn test_format_context_empty_sentinel() {
        let engine = test_engine();
        let rendered = engine.format_context(&[]);
        assert_eq!(rendered, NO_CONTEXT_MESSAGE);
        assert!(!rendered.is_empty());
    }

    #[test]
    fn test_format_context_numbered_blocks() {
        let engine = test_engine();
        let docs = vec![
            doc("첫 번째 내용", "incident"),
            doc("두 번째 내용", "solution"),
        ];

        let rendered = engine.format_context(&docs);
        assert!(rendered.contains("### 참고 자료 1 (incident)"));
        assert!(rendered.contains("### 참고 자료 2 (solution)"));
        assert!(rendered.contains("출처: incident.md"));
        assert!(rendered.contains("첫 번째 내용"));
        assert!(rendered.contains("두 번째 내용"));
    }
}
