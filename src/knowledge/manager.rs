//! 지식 베이스 관리자 - 정식 기록 저장과 인덱스 동기화
//!
//! 네 개의 내구 카테고리(incidents/solutions/best_practices/k8s_docs)를
//! 소유하고 벡터 인덱스가 그 내용을 반영하도록 유지합니다.
//!
//! 기록 상태 전이: 생성(메모리) → 영속화(디스크) → 인덱싱(벡터 스토어).
//! 내구 저장이 검색 가능성보다 우선합니다 - 인덱스 쓰기가 실패해도 정식
//! 기록은 남고, 다음 `initialize()`에서 다시 인덱싱됩니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ignore::WalkBuilder;

use crate::error::RagError;

use super::document::{DocCategory, Document, Metadata};
use super::engine::RetrievalEngine;
use super::records::{IncidentRecord, SolutionRecord};

// ============================================================================
// Data Directory
// ============================================================================

/// 기본 지식 베이스 루트 (~/.local/share/k3s-ops-rag/kb)
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("k3s-ops-rag")
        .join("kb")
}

// ============================================================================
// Statistics
// ============================================================================

/// 카테고리별 기록 개수
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBaseStats {
    pub incidents: usize,
    pub solutions: usize,
    pub best_practices: usize,
    pub k8s_docs: usize,
}

// ============================================================================
// KnowledgeBaseManager
// ============================================================================

/// 지식 베이스 관리자
///
/// 정식 기록(디스크)의 유일한 소유자입니다. 벡터 인덱스는 여기서 언제든
/// 재구축 가능한 파생 캐시입니다. 생성 후 상태가 없으므로 동시 읽기에
/// 안전하며, 쓰기는 기록마다 새 ID를 받으므로 충돌하지 않습니다.
pub struct KnowledgeBaseManager {
    engine: Arc<RetrievalEngine>,
    root: PathBuf,
    incidents_dir: PathBuf,
    solutions_dir: PathBuf,
    best_practices_dir: PathBuf,
    k8s_docs_dir: PathBuf,
}

impl KnowledgeBaseManager {
    /// 루트 디렉토리에 지식 베이스 생성/열기
    ///
    /// 네 개의 하위 컬렉션 디렉토리를 만듭니다.
    pub fn new(engine: Arc<RetrievalEngine>, root: impl Into<PathBuf>) -> Result<Self, RagError> {
        let root = root.into();

        let incidents_dir = root.join("incidents");
        let solutions_dir = root.join("solutions");
        let best_practices_dir = root.join("best_practices");
        let k8s_docs_dir = root.join("k8s_docs");

        for dir in [
            &incidents_dir,
            &solutions_dir,
            &best_practices_dir,
            &k8s_docs_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }

        tracing::info!("Knowledge base initialized at {}", root.display());

        Ok(Self {
            engine,
            root,
            incidents_dir,
            solutions_dir,
            best_practices_dir,
            k8s_docs_dir,
        })
    }

    /// 지식 베이스 루트 경로
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 내부 검색 엔진 접근
    pub fn engine(&self) -> &Arc<RetrievalEngine> {
        &self.engine
    }

    // ------------------------------------------------------------------
    // Bulk Load
    // ------------------------------------------------------------------

    /// 전체 기록을 읽어 벡터 인덱스에 적재 (멱등)
    ///
    /// 재실행해도 안전합니다. 재시작마다 인덱스에 중복 엔트리가 쌓일 수
    /// 있으나 검색이 콘텐츠 기준으로 중복을 제거하므로 허용됩니다.
    /// 파일 하나의 실패는 건너뛰고, 카테고리 하나의 인덱싱 실패가
    /// 나머지 카테고리 적재를 막지 않습니다.
    pub async fn initialize(&self) -> Result<(), RagError> {
        tracing::info!("Initializing knowledge base...");

        if let Err(e) = self.seed_k8s_docs() {
            tracing::warn!("Failed to seed sample k8s docs: {}", e);
        }

        self.index_category(
            self.load_markdown_docs(&self.k8s_docs_dir, DocCategory::K8sDoc),
            DocCategory::K8sDoc,
        )
        .await;
        self.index_category(
            self.load_markdown_docs(&self.best_practices_dir, DocCategory::BestPractice),
            DocCategory::BestPractice,
        )
        .await;
        self.index_category(self.load_incidents(), DocCategory::Incident)
            .await;
        self.index_category(self.load_solutions(), DocCategory::Solution)
            .await;

        tracing::info!("Knowledge base initialization complete");
        Ok(())
    }

    /// 한 카테고리의 문서들을 인덱싱 (실패는 로깅만)
    async fn index_category(&self, documents: Vec<Document>, category: DocCategory) {
        if documents.is_empty() {
            return;
        }

        let count = documents.len();
        match self.engine.add_documents(documents).await {
            Ok(_) => {
                tracing::info!("Loaded {} {} documents", count, category.doc_type());
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to index {} documents (will retry on next initialize): {}",
                    category.doc_type(),
                    e
                );
            }
        }
    }

    /// 디렉토리의 마크다운/텍스트 문서 로드 (재귀, gitignore 존중)
    fn load_markdown_docs(&self, dir: &Path, category: DocCategory) -> Vec<Document> {
        let mut documents = Vec::new();

        let walker = WalkBuilder::new(dir).hidden(true).build();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let is_doc = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| matches!(e.to_lowercase().as_str(), "md" | "markdown" | "txt"))
                .unwrap_or(false);
            if !is_doc {
                continue;
            }

            match std::fs::read_to_string(path) {
                Ok(content) => {
                    let mut metadata = Metadata::new();
                    metadata.insert("doc_type".to_string(), category.doc_type().into());
                    metadata.insert("source".to_string(), path.display().to_string().into());
                    documents.push(Document::new(content, metadata));
                }
                Err(e) => {
                    tracing::warn!("Failed to read document {}: {}", path.display(), e);
                }
            }
        }

        documents
    }

    /// 사건 기록 JSON 파일 로드 (파일당 하나, id로 명명)
    fn load_incidents(&self) -> Vec<Document> {
        self.load_records(&self.incidents_dir, |content, source| {
            serde_json::from_str::<IncidentRecord>(content).map(|r| r.to_document(source))
        })
    }

    /// 해결책 기록 JSON 파일 로드
    fn load_solutions(&self) -> Vec<Document> {
        self.load_records(&self.solutions_dir, |content, source| {
            serde_json::from_str::<SolutionRecord>(content).map(|r| r.to_document(source))
        })
    }

    fn load_records<F>(&self, dir: &Path, parse: F) -> Vec<Document>
    where
        F: Fn(&str, &str) -> Result<Document, serde_json::Error>,
    {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read directory {}: {}", dir.display(), e);
                return vec![];
            }
        };

        let mut documents = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let source = path.display().to_string();
            match std::fs::read_to_string(&path) {
                Ok(content) => match parse(&content, &source) {
                    Ok(doc) => documents.push(doc),
                    Err(e) => tracing::warn!("Failed to parse record {}: {}", source, e),
                },
                Err(e) => tracing::warn!("Failed to read record {}: {}", source, e),
            }
        }

        documents
    }

    /// k8s_docs가 비어 있으면 내장 샘플 문서로 시드
    ///
    /// 부트스트랩 편의일 뿐 정합성 요건은 아닙니다.
    fn seed_k8s_docs(&self) -> std::io::Result<()> {
        let has_docs = std::fs::read_dir(&self.k8s_docs_dir)?
            .flatten()
            .any(|e| e.path().extension().and_then(|x| x.to_str()) == Some("md"));
        if has_docs {
            return Ok(());
        }

        tracing::warn!("No k8s docs found, creating sample docs");
        for (filename, content) in SAMPLE_K8S_DOCS {
            std::fs::write(self.k8s_docs_dir.join(filename), content)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// 새 사건 기록 추가
    ///
    /// 내구 저장 실패는 그대로 전파됩니다. 저장 성공 후의 인덱스 쓰기
    /// 실패는 로깅만 합니다 - 정식 기록이 남아 있으므로 다음
    /// `initialize()`에서 복구됩니다.
    pub async fn add_incident(&self, mut record: IncidentRecord) -> Result<String, RagError> {
        record.ensure_identity();
        let id = record.id.clone().unwrap_or_default();

        let path = self.incidents_dir.join(format!("{}.json", id));
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, json)?;

        let doc = record.to_document(&path.display().to_string());
        if let Err(e) = self.engine.add_documents(vec![doc]).await {
            tracing::warn!("Incident {} persisted but indexing failed: {}", id, e);
        }

        tracing::info!("Added incident: {}", id);
        Ok(id)
    }

    /// 새 해결책 기록 추가
    pub async fn add_solution(&self, mut record: SolutionRecord) -> Result<String, RagError> {
        record.ensure_identity();
        let id = record.id.clone().unwrap_or_default();

        let path = self.solutions_dir.join(format!("{}.json", id));
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, json)?;

        let doc = record.to_document(&path.display().to_string());
        if let Err(e) = self.engine.add_documents(vec![doc]).await {
            tracing::warn!("Solution {} persisted but indexing failed: {}", id, e);
        }

        tracing::info!("Added solution: {}", id);
        Ok(id)
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    /// ID로 사건 기록 조회
    pub fn get_incident(&self, id: &str) -> Result<IncidentRecord, RagError> {
        let path = self.incidents_dir.join(format!("{}.json", id));
        if !path.exists() {
            return Err(RagError::RecordNotFound(id.to_string()));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// ID로 해결책 기록 조회
    pub fn get_solution(&self, id: &str) -> Result<SolutionRecord, RagError> {
        let path = self.solutions_dir.join(format!("{}.json", id));
        if !path.exists() {
            return Err(RagError::RecordNotFound(id.to_string()));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 지식 베이스 검색 (하이브리드)
    pub async fn search(&self, query: &str, k: usize) -> Vec<Document> {
        self.engine.hybrid_retrieve(query, k).await
    }

    /// 카테고리별 기록 개수
    pub fn stats(&self) -> KnowledgeBaseStats {
        KnowledgeBaseStats {
            incidents: count_files(&self.incidents_dir, "json"),
            solutions: count_files(&self.solutions_dir, "json"),
            best_practices: count_files(&self.best_practices_dir, "md"),
            k8s_docs: count_files(&self.k8s_docs_dir, "md"),
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn count_files(dir: &Path, extension: &str) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| {
                    e.path().extension().and_then(|x| x.to_str()) == Some(extension)
                })
                .count()
        })
        .unwrap_or(0)
}

// ============================================================================
// Sample Documents
// ============================================================================

/// 첫 실행 시드용 내장 K8s 문서
const SAMPLE_K8S_DOCS: &[(&str, &str)] = &[
    (
        "pod_lifecycle.md",
        "# Pod 생명주기\n\n\
         ## Pod 단계 (Phase)\n\
         - Pending: Pod가 수락되었으나 컨테이너 이미지가 아직 생성되지 않음\n\
         - Running: Pod가 노드에 바인딩되고 모든 컨테이너가 생성됨\n\
         - Succeeded: 모든 컨테이너가 성공적으로 종료됨\n\
         - Failed: 최소 하나의 컨테이너가 실패로 종료됨\n\
         - Unknown: Pod 상태를 가져올 수 없음\n\n\
         ## 자주 발생하는 문제\n\
         ### CrashLoopBackOff\n\
         원인: 컨테이너가 시작 직후 반복적으로 크래시\n\
         점검: 컨테이너 로그, 리소스 제한, 설정 오류 확인\n\n\
         ### ImagePullBackOff\n\
         원인: 이미지를 가져올 수 없음\n\
         점검: 이미지 이름, 레지스트리 인증, 네트워크 연결 확인\n",
    ),
    (
        "resource_management.md",
        "# 리소스 관리\n\n\
         ## CPU와 메모리 제한\n\
         - requests: 컨테이너가 요청하는 최소 리소스\n\
         - limits: 컨테이너가 사용할 수 있는 최대 리소스\n\n\
         ## 자주 발생하는 문제\n\
         ### OOMKilled\n\
         원인: 컨테이너 메모리 사용량이 limits 초과\n\
         해결: memory limits 상향 또는 애플리케이션 메모리 사용 최적화\n\n\
         ### CPU 스로틀링\n\
         원인: CPU 사용량이 limits 초과\n\
         해결: CPU limits 상향 또는 애플리케이션 CPU 사용 최적화\n",
    ),
];

// ============================================================================
// Tests
// ============================================================================
