//! 정식 기록 - 사건/해결책의 내구 저장 표현
//!
//! 기록은 이중 표현을 가집니다: 디스크의 구조화 JSON이 정식(source of
//! truth)이고, 비정규화 텍스트 렌더링이 벡터 인덱스에 들어갑니다.
//! 생성/수정은 항상 정식 기록을 먼저 쓰고 다시 렌더링해 인덱싱합니다.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::document::{Document, Metadata};

/// 사건 기록 ID 접두사
pub const INCIDENT_ID_PREFIX: &str = "INC";

/// 해결책 기록 ID 접두사
pub const SOLUTION_ID_PREFIX: &str = "SOL";

// ============================================================================
// Incident Record
// ============================================================================

/// 사건 기록
///
/// `id`/`timestamp`가 없으면 저장 시점에 생성됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncidentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 문제 설명
    #[serde(default)]
    pub description: String,
    /// 심각도 (low/medium/high/critical)
    #[serde(default)]
    pub severity: String,
    /// 영향 범위
    #[serde(default)]
    pub impact: String,
    /// 근본 원인
    #[serde(default)]
    pub root_cause: String,
    /// 적용한 해결 방법
    #[serde(default)]
    pub solution: String,
    /// 해결 소요 시간
    #[serde(default)]
    pub resolution_time: String,
    /// 해결 여부
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl IncidentRecord {
    /// id/timestamp가 비어 있으면 채움
    pub fn ensure_identity(&mut self) {
        if self.id.is_none() {
            self.id = Some(generate_id(INCIDENT_ID_PREFIX));
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(Utc::now().to_rfc3339());
        }
    }

    /// 인덱싱용 텍스트 렌더링
    pub fn render(&self) -> String {
        format!(
            "【과거 사건 기록】\n\
             사건 ID: {}\n\
             발생 시각: {}\n\
             심각도: {}\n\n\
             문제 설명:\n{}\n\n\
             영향 범위:\n{}\n\n\
             근본 원인:\n{}\n\n\
             해결 방법:\n{}\n\n\
             해결 소요 시간: {}",
            self.id.as_deref().unwrap_or("-"),
            self.timestamp.as_deref().unwrap_or("-"),
            self.severity,
            self.description,
            self.impact,
            self.root_cause,
            self.solution,
            self.resolution_time,
        )
    }

    /// 인덱싱용 Document 변환
    pub fn to_document(&self, source: &str) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert("doc_type".to_string(), "incident".into());
        metadata.insert("source".to_string(), source.into());
        if let Some(id) = &self.id {
            metadata.insert("incident_id".to_string(), id.as_str().into());
        }
        metadata.insert("severity".to_string(), self.severity.as_str().into());
        metadata.insert("resolved".to_string(), self.resolved.into());
        if let Some(ts) = &self.timestamp {
            metadata.insert("timestamp".to_string(), ts.as_str().into());
        }

        Document::new(self.render(), metadata)
    }
}

// ============================================================================
// Solution Record
// ============================================================================

/// 해결책 기록
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolutionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// 문제 유형 (예: crashloop, oom, disk_pressure)
    #[serde(default)]
    pub problem_type: String,
    /// 문제 패턴 (증상 특징)
    #[serde(default)]
    pub problem_pattern: String,
    /// 해결 단계
    #[serde(default)]
    pub solution_steps: String,
    /// 예방 조치
    #[serde(default)]
    pub prevention: String,
    /// 참고 사항
    #[serde(default)]
    pub notes: String,
    /// 성공률 (0.0 ~ 1.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_rate: Option<f64>,
}

impl SolutionRecord {
    /// id가 비어 있으면 채움
    pub fn ensure_identity(&mut self) {
        if self.id.is_none() {
            self.id = Some(generate_id(SOLUTION_ID_PREFIX));
        }
    }

    /// 인덱싱용 텍스트 렌더링
    pub fn render(&self) -> String {
        let success_rate = self
            .success_rate
            .map(|r| format!("{:.2}", r))
            .unwrap_or_else(|| "N/A".to_string());

        format!(
            "【해결책】\n\
             해결책 ID: {}\n\
             문제 유형: {}\n\
             성공률: {}\n\n\
             문제 패턴:\n{}\n\n\
             해결 단계:\n{}\n\n\
             예방 조치:\n{}\n\n\
             참고 사항:\n{}",
            self.id.as_deref().unwrap_or("-"),
            self.problem_type,
            success_rate,
            self.problem_pattern,
            self.solution_steps,
            self.prevention,
            self.notes,
        )
    }

    /// 인덱싱용 Document 변환
    pub fn to_document(&self, source: &str) -> Document {
        let mut metadata = Metadata::new();
        metadata.insert("doc_type".to_string(), "solution".into());
        metadata.insert("source".to_string(), source.into());
        if let Some(id) = &self.id {
            metadata.insert("solution_id".to_string(), id.as_str().into());
        }
        metadata.insert(
            "problem_type".to_string(),
            self.problem_type.as_str().into(),
        );
        if let Some(rate) = self.success_rate {
            metadata.insert("success_rate".to_string(), rate.into());
        }

        Document::new(self.render(), metadata)
    }
}

// ============================================================================
// ID Generation
// ============================================================================

/// 기록 ID 생성: `<접두사>-<YYYYmmddHHMMSS>-<랜덤 8자리>`
///
/// 타임스탬프는 사람이 정렬해 보기 위한 것이고, 랜덤 접미사가
/// 동일 초 내 동시 쓰기에서의 충돌을 막습니다.
pub fn generate_id(prefix: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%d%H%M%S");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}-{}", prefix, timestamp, &suffix[..8])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_id_format() {
        let id = generate_id("INC");
        assert!(id.starts_with("INC-"));

        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 14);
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 8);
    }

    #[test]
    fn test_generate_id_unique_within_same_second() {
        let ids: HashSet<String> = (0..100).map(|_| generate_id("SOL")).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_incident_ensure_identity() {
        let mut record = IncidentRecord {
            description: "pod crashlooping".to_string(),
            severity: "high".to_string(),
            ..Default::default()
        };

        record.ensure_identity();
        assert!(record.id.as_deref().unwrap().starts_with("INC-"));
        assert!(record.timestamp.is_some());

        // 이미 있는 값은 보존
        let existing = record.id.clone();
        record.ensure_identity();
        assert_eq!(record.id, existing);
    }

    #[test]
    fn test_incident_render_contains_fields() {
        let mut record = IncidentRecord {
            description: "pod crashlooping".to_string(),
            severity: "high".to_string(),
            root_cause: "이미지 설정 오류".to_string(),
            ..Default::default()
        };
        record.ensure_identity();

        let rendered = record.render();
        assert!(rendered.contains("【과거 사건 기록】"));
        assert!(rendered.contains("pod crashlooping"));
        assert!(rendered.contains("심각도: high"));
        assert!(rendered.contains("이미지 설정 오류"));
        assert!(rendered.contains(record.id.as_deref().unwrap()));
    }

    #[test]
    fn test_incident_to_document_metadata() {
        let mut record = IncidentRecord {
            description: "node not ready".to_string(),
            severity: "critical".to_string(),
            resolved: true,
            ..Default::default()
        };
        record.ensure_identity();

        let doc = record.to_document("incidents/x.json");
        assert_eq!(doc.doc_type(), Some("incident"));
        assert_eq!(doc.source(), Some("incidents/x.json"));
        assert_eq!(
            doc.metadata.get("severity").and_then(|v| v.as_str()),
            Some("critical")
        );
        assert_eq!(
            doc.metadata.get("resolved").and_then(|v| v.as_bool()),
            Some(true)
        );
        assert!(doc.metadata.contains_key("incident_id"));
    }

    #[test]
    fn test_solution_render_missing_success_rate() {
        let record = SolutionRecord {
            problem_type: "crashloop".to_string(),
            solution_steps: "로그 확인 후 이미지 태그 수정".to_string(),
            ..Default::default()
        };

        let rendered = record.render();
        assert!(rendered.contains("【해결책】"));
        assert!(rendered.contains("성공률: N/A"));
        assert!(rendered.contains("crashloop"));
    }

    #[test]
    fn test_solution_to_document_metadata() {
        let mut record = SolutionRecord {
            problem_type: "oom".to_string(),
            success_rate: Some(0.85),
            ..Default::default()
        };
        record.ensure_identity();

        let doc = record.to_document("solutions/y.json");
        assert_eq!(doc.doc_type(), Some("solution"));
        assert_eq!(
            doc.metadata.get("problem_type").and_then(|v| v.as_str()),
            Some("oom")
        );
        assert_eq!(
            doc.metadata.get("success_rate").and_then(|v| v.as_f64()),
            Some(0.85)
        );
    }

    #[test]
    fn test_record_json_roundtrip() {
        let mut record = IncidentRecord {
            description: "etcd alarm".to_string(),
            severity: "high".to_string(),
            ..Default::default()
        };
        record.ensure_identity();

        let json = serde_json::to_string_pretty(&record).unwrap();
        let parsed: IncidentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, record.id);
        assert_eq!(parsed.description, "etcd alarm");
    }
}
