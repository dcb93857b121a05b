//! 텍스트 청킹 모듈
//!
//! 문서를 임베딩/검색 단위의 청크로 분할합니다.
//! 구분자 우선순위(문단 → 줄 → 문장 → 공백)에 따라 자연스러운 경계에서
//! 자르고, 경계가 없으면 chunk_size에서 강제로 자릅니다.

use super::document::Document;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 연속 청크 간 겹침 크기 (overlap < chunk_size)
    pub chunk_overlap: usize,
    /// 구분자 우선순위. 빈 문자열은 강제 문자 단위 절단을 의미
    pub separators: Vec<String>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            separators: default_separators(),
        }
    }
}

impl ChunkConfig {
    /// 크기/겹침을 지정하여 생성
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        assert!(
            chunk_overlap < chunk_size,
            "chunk_overlap must be smaller than chunk_size"
        );
        Self {
            chunk_size,
            chunk_overlap,
            separators: default_separators(),
        }
    }
}

/// 기본 구분자 우선순위: 문단, 줄, 문장 종결(한중일/라틴), 공백, 문자
fn default_separators() -> Vec<String> {
    vec![
        "\n\n".to_string(),
        "\n".to_string(),
        "。".to_string(),
        ". ".to_string(),
        " ".to_string(),
        String::new(),
    ]
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 문서들을 청크로 분할
    ///
    /// 각 청크는 원본 문서의 메타데이터를 상속하고 `chunk_index`를 추가로
    /// 가집니다. 빈 입력은 빈 결과를 반환하며 실패하지 않습니다.
    fn split(&self, documents: &[Document]) -> Vec<Document>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SeparatorChunker
// ============================================================================

/// 구분자 우선순위 기반 청커
pub struct SeparatorChunker {
    config: ChunkConfig,
}

impl SeparatorChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    /// 단일 텍스트 분할
    ///
    /// chunk_size 이하의 문서는 내용 그대로 청크 하나가 됩니다.
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }
        if text.len() <= self.config.chunk_size {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < text.len() {
            let mut hard_end = floor_char_boundary(text, start + self.config.chunk_size);
            if hard_end <= start {
                // chunk_size가 문자 하나보다 작은 퇴화 설정: 최소 한 문자는 전진
                hard_end = ceil_char_boundary(text, start + 1);
            }
            let end = if hard_end >= text.len() {
                text.len()
            } else {
                self.break_point(text, start, hard_end)
            };

            let piece = text[start..end].trim();
            if !piece.is_empty() {
                chunks.push(piece.to_string());
            }

            if end >= text.len() {
                break;
            }

            // 다음 청크는 overlap 만큼 뒤로 물러나서 시작
            let overlap_start =
                floor_char_boundary(text, end.saturating_sub(self.config.chunk_overlap));
            start = if overlap_start > start { overlap_start } else { end };
        }

        chunks
    }

    /// (start, hard_end] 구간에서 가장 좋은 절단 위치 탐색
    ///
    /// 우선순위가 높은 구분자의 마지막 출현 직후에서 자릅니다.
    /// 아무 구분자도 없으면 hard_end에서 강제 절단합니다.
    fn break_point(&self, text: &str, start: usize, hard_end: usize) -> usize {
        let window = &text[start..hard_end];

        for sep in &self.config.separators {
            if sep.is_empty() {
                return hard_end;
            }
            if let Some(pos) = window.rfind(sep.as_str()) {
                let cut = start + pos + sep.len();
                if cut > start {
                    return cut;
                }
            }
        }

        hard_end
    }
}

impl Chunker for SeparatorChunker {
    fn split(&self, documents: &[Document]) -> Vec<Document> {
        let mut out = Vec::new();

        for doc in documents {
            for (i, piece) in self.split_text(&doc.content).into_iter().enumerate() {
                let mut metadata = doc.metadata.clone();
                metadata.insert("chunk_index".to_string(), serde_json::Value::from(i as u64));
                out.push(Document::new(piece, metadata));
            }
        }

        out
    }

    fn name(&self) -> &'static str {
        "SeparatorChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// UTF-8 경계 조정 (인덱스 이하로)
#[inline]
fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

/// UTF-8 경계 조정 (인덱스 이상으로)
#[inline]
fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i < s.len() && !s.is_char_boundary(i) {
            i += 1;
        }
        i
    }
}

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SeparatorChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================
