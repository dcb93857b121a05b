//! 문서 모델 - 검색 단위와 메타데이터
//!
//! 인덱싱되는 모든 문서는 `doc_type` 메타데이터를 가져야 합니다.
//! 카테고리 필터링은 이 불변식 위에서만 의미가 있습니다.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// 문서 메타데이터 (키 → 스칼라/문자열 값)
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Document
// ============================================================================

/// 검색 가능한 문서 단위
///
/// 청킹 또는 구조화 기록의 텍스트 렌더링으로 생성됩니다.
/// 인덱싱 후에는 불변입니다 - 수정은 항상 새 Document로 표현합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// 본문 텍스트
    pub content: String,
    /// 메타데이터 (doc_type, source 등)
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    /// 새 문서 생성
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// doc_type 메타데이터 조회
    pub fn doc_type(&self) -> Option<&str> {
        self.metadata.get("doc_type").and_then(|v| v.as_str())
    }

    /// source 메타데이터 조회
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// 유사도 스코어가 붙은 검색 결과
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    /// 유사도 스코어 (높을수록 관련성 높음)
    pub score: f32,
}

// ============================================================================
// Document Categories
// ============================================================================

/// 지식 베이스 카테고리
///
/// 각 카테고리는 고정된 `doc_type` 문자열로 매핑됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocCategory {
    /// 과거 사건 기록
    Incident,
    /// 검증된 해결책
    Solution,
    /// 모범 사례 문서
    BestPractice,
    /// K8s 참고 문서
    K8sDoc,
}

impl DocCategory {
    /// 카테고리 → doc_type 고정 매핑
    pub fn doc_type(&self) -> &'static str {
        match self {
            DocCategory::Incident => "incident",
            DocCategory::Solution => "solution",
            DocCategory::BestPractice => "best_practice",
            DocCategory::K8sDoc => "k8s_doc",
        }
    }

    /// doc_type 문자열에서 카테고리 파싱
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incident" => Some(DocCategory::Incident),
            "solution" => Some(DocCategory::Solution),
            "best_practice" => Some(DocCategory::BestPractice),
            "k8s_doc" => Some(DocCategory::K8sDoc),
            _ => None,
        }
    }
}

// ============================================================================
// Filtering & Deduplication
// ============================================================================

/// 메타데이터가 필터를 만족하는지 확인
///
/// 필터의 모든 키/값이 정확히 일치해야 합니다 (conjunctive exact match).
pub fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

/// 콘텐츠 해시 (SHA-256, 중복 제거용)
///
/// 정확히 같은 바이트의 콘텐츠만 중복으로 취급합니다.
/// 유사 문서(패러프레이즈)는 병합하지 않습니다.
pub fn content_hash(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: &[(&str, serde_json::Value)]) -> Metadata {
        let mut m = Metadata::new();
        for (k, v) in pairs {
            m.insert(k.to_string(), v.clone());
        }
        m
    }

    #[test]
    fn test_doc_type_accessor() {
        let doc = Document::new("text", meta(&[("doc_type", json!("incident"))]));
        assert_eq!(doc.doc_type(), Some("incident"));
        assert_eq!(doc.source(), None);
    }

    #[test]
    fn test_category_table() {
        assert_eq!(DocCategory::Incident.doc_type(), "incident");
        assert_eq!(DocCategory::Solution.doc_type(), "solution");
        assert_eq!(DocCategory::BestPractice.doc_type(), "best_practice");
        assert_eq!(DocCategory::parse("incident"), Some(DocCategory::Incident));
        assert_eq!(DocCategory::parse("unknown"), None);
    }

    #[test]
    fn test_matches_filter_conjunctive() {
        let m = meta(&[
            ("doc_type", json!("incident")),
            ("severity", json!("high")),
        ]);

        assert!(matches_filter(&m, &meta(&[])));
        assert!(matches_filter(&m, &meta(&[("doc_type", json!("incident"))])));
        assert!(matches_filter(
            &m,
            &meta(&[("doc_type", json!("incident")), ("severity", json!("high"))])
        ));

        // 하나라도 불일치하면 탈락
        assert!(!matches_filter(
            &m,
            &meta(&[("doc_type", json!("incident")), ("severity", json!("low"))])
        ));
        // 없는 키도 탈락
        assert!(!matches_filter(&m, &meta(&[("resolved", json!(true))])));
    }

    #[test]
    fn test_matches_filter_value_types() {
        let m = meta(&[("resolved", json!(true)), ("severity", json!("high"))]);
        assert!(matches_filter(&m, &meta(&[("resolved", json!(true))])));
        // 타입이 다르면 불일치 ("true" != true)
        assert!(!matches_filter(&m, &meta(&[("resolved", json!("true"))])));
    }

    #[test]
    fn test_content_hash() {
        let a = content_hash("pod crashlooping");
        let b = content_hash("pod crashlooping");
        let c = content_hash("pod crashlooping!");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
