//! CLI 모듈
//!
//! k3s-ops-rag 운영 명령어 정의 및 구현

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::embedding::{has_api_key, EmbeddingConfig, EmbeddingProvider, GeminiEmbedding};
use crate::knowledge::{
    default_data_dir, CohereReranker, DocCategory, IncidentRecord, KnowledgeBaseManager,
    LanceVectorStore, MemoryVectorStore, NullReranker, Reranker, RetrievalEngine, SolutionRecord,
    VectorStore,
};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "k3s-ops-rag")]
#[command(version, about = "K3s 운영 지식 검색 엔진", long_about = None)]
pub struct Cli {
    /// 지식 베이스 루트 디렉토리 (기본: ~/.local/share/k3s-ops-rag/kb)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 휘발성 인메모리 인덱스 사용 (개발/테스트용, 재시작 시 소실)
    #[arg(long, global = true)]
    pub memory: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 지식 베이스 초기화: 모든 기록을 읽어 벡터 인덱스에 적재
    Init,

    /// 새 사건 기록 추가
    AddIncident {
        /// 문제 설명
        #[arg(long)]
        description: String,

        /// 심각도 (low/medium/high/critical)
        #[arg(long, default_value = "medium")]
        severity: String,

        /// 영향 범위
        #[arg(long, default_value = "")]
        impact: String,

        /// 근본 원인
        #[arg(long, default_value = "")]
        root_cause: String,

        /// 적용한 해결 방법
        #[arg(long, default_value = "")]
        solution: String,

        /// 해결 소요 시간
        #[arg(long, default_value = "")]
        resolution_time: String,

        /// 해결 완료 여부
        #[arg(long)]
        resolved: bool,
    },

    /// 새 해결책 기록 추가
    AddSolution {
        /// 문제 유형 (예: crashloop, oom)
        #[arg(long)]
        problem_type: String,

        /// 문제 패턴 (증상 특징)
        #[arg(long, default_value = "")]
        problem_pattern: String,

        /// 해결 단계
        #[arg(long, default_value = "")]
        solution_steps: String,

        /// 예방 조치
        #[arg(long, default_value = "")]
        prevention: String,

        /// 참고 사항
        #[arg(long, default_value = "")]
        notes: String,

        /// 성공률 (0.0 ~ 1.0)
        #[arg(long)]
        success_rate: Option<f64>,
    },

    /// 지식 베이스 검색 (하이브리드)
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short = 'k', long, default_value = "5")]
        limit: usize,

        /// 단일 카테고리 검색 (incident/solution/best_practice/k8s_doc)
        #[arg(long)]
        category: Option<String>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);

    match cli.command {
        Commands::Init => cmd_init(&data_dir, cli.memory).await,
        Commands::AddIncident {
            description,
            severity,
            impact,
            root_cause,
            solution,
            resolution_time,
            resolved,
        } => {
            let record = IncidentRecord {
                id: None,
                description,
                severity,
                impact,
                root_cause,
                solution,
                resolution_time,
                resolved,
                timestamp: None,
            };
            cmd_add_incident(&data_dir, cli.memory, record).await
        }
        Commands::AddSolution {
            problem_type,
            problem_pattern,
            solution_steps,
            prevention,
            notes,
            success_rate,
        } => {
            let record = SolutionRecord {
                id: None,
                problem_type,
                problem_pattern,
                solution_steps,
                prevention,
                notes,
                success_rate,
            };
            cmd_add_solution(&data_dir, cli.memory, record).await
        }
        Commands::Query {
            query,
            limit,
            category,
        } => cmd_query(&data_dir, cli.memory, &query, limit, category).await,
        Commands::Status => cmd_status(&data_dir, cli.memory).await,
    }
}

// ============================================================================
// Engine Construction
// ============================================================================

/// 지식 베이스 관리자 구성
///
/// 인덱스 모드(영속/휘발)와 리랭커 유무는 여기서, 즉 생성 시점에
/// 결정됩니다.
async fn build_manager(data_dir: &Path, memory: bool) -> Result<KnowledgeBaseManager> {
    if !has_api_key() {
        anyhow::bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }

    let embedder = Arc::new(
        GeminiEmbedding::new(EmbeddingConfig::from_env()?).context("임베딩 프로바이더 생성 실패")?,
    );

    let index: Arc<dyn VectorStore> = if memory {
        tracing::warn!("Using in-memory vector index (development only)");
        Arc::new(MemoryVectorStore::new())
    } else {
        let lance_path = data_dir.join("vectors.lance");
        Arc::new(
            LanceVectorStore::open(&lance_path, embedder.dimension())
                .await
                .context("벡터 인덱스 열기 실패")?,
        )
    };

    let reranker: Arc<dyn Reranker> = match CohereReranker::from_env()? {
        Some(r) => {
            tracing::info!("Reranking enabled (cohere)");
            Arc::new(r)
        }
        None => Arc::new(NullReranker),
    };

    let engine = Arc::new(RetrievalEngine::new(embedder, index, reranker));
    KnowledgeBaseManager::new(engine, data_dir).context("지식 베이스 열기 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 초기화 명령어 (init)
async fn cmd_init(data_dir: &Path, memory: bool) -> Result<()> {
    println!("[*] 지식 베이스 초기화 중: {}", data_dir.display());

    let manager = build_manager(data_dir, memory).await?;
    manager.initialize().await.context("초기화 실패")?;

    let stats = manager.stats();
    println!("[OK] 초기화 완료");
    println!(
        "     사건 {} / 해결책 {} / 모범 사례 {} / K8s 문서 {}",
        stats.incidents, stats.solutions, stats.best_practices, stats.k8s_docs
    );

    if let Ok(count) = manager.engine().index_size().await {
        println!("     벡터 인덱스: {} 엔트리", count);
    }

    Ok(())
}

/// 사건 추가 명령어 (add-incident)
async fn cmd_add_incident(data_dir: &Path, memory: bool, record: IncidentRecord) -> Result<()> {
    let manager = build_manager(data_dir, memory).await?;

    let id = manager
        .add_incident(record)
        .await
        .context("사건 기록 추가 실패")?;

    println!("[OK] 사건 기록이 추가되었습니다 (ID: {})", id);
    Ok(())
}

/// 해결책 추가 명령어 (add-solution)
async fn cmd_add_solution(data_dir: &Path, memory: bool, record: SolutionRecord) -> Result<()> {
    let manager = build_manager(data_dir, memory).await?;

    let id = manager
        .add_solution(record)
        .await
        .context("해결책 추가 실패")?;

    println!("[OK] 해결책이 추가되었습니다 (ID: {})", id);
    Ok(())
}

/// 검색 명령어 (query)
async fn cmd_query(
    data_dir: &Path,
    memory: bool,
    query: &str,
    limit: usize,
    category: Option<String>,
) -> Result<()> {
    println!("[*] 검색 중: \"{}\"", query);

    let manager = build_manager(data_dir, memory).await?;

    let results = match category.as_deref() {
        Some(name) => {
            let category = DocCategory::parse(name).with_context(|| {
                format!(
                    "알 수 없는 카테고리: {} (incident/solution/best_practice/k8s_doc)",
                    name
                )
            })?;
            manager
                .engine()
                .retrieve_by_category(query, category, limit)
                .await
        }
        None => manager.search(query, limit).await,
    };

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, doc) in results.iter().enumerate() {
        println!(
            "{}. [{}] {}",
            i + 1,
            doc.doc_type().unwrap_or("unknown"),
            doc.source().unwrap_or("unknown")
        );
        println!("   {}", truncate_text(&doc.content, 200));
        println!();
    }

    println!("--- 컨텍스트 블록 ---");
    println!("{}", manager.engine().format_context(&results));

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(data_dir: &Path, memory: bool) -> Result<()> {
    println!("k3s-ops-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 지식 베이스: {}", data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match build_manager(data_dir, memory).await {
        Ok(manager) => {
            let stats = manager.stats();
            println!("[OK] 저장된 기록:");
            println!("     사건: {} 건", stats.incidents);
            println!("     해결책: {} 건", stats.solutions);
            println!("     모범 사례: {} 건", stats.best_practices);
            println!("     K8s 문서: {} 건", stats.k8s_docs);

            match manager.engine().index_size().await {
                Ok(count) => println!("[OK] 벡터 인덱스: {} 엔트리", count),
                Err(e) => println!("[!] 벡터 인덱스 조회 실패: {}", e),
            }
        }
        Err(e) => {
            println!("[!] 지식 베이스 열기 실패: {:#}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        assert_eq!(truncate_text(korean, 5), "안녕하세요...");
    }

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from(["k3s-ops-rag", "query", "pod crashloop", "-k", "3"]).unwrap();
        match cli.command {
            Commands::Query { query, limit, .. } => {
                assert_eq!(query, "pod crashloop");
                assert_eq!(limit, 3);
            }
            _ => panic!("expected query command"),
        }
    }

    #[test]
    fn test_cli_parses_memory_flag() {
        let cli = Cli::try_parse_from(["k3s-ops-rag", "--memory", "status"]).unwrap();
        assert!(cli.memory);
    }
}
