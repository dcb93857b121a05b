//! 리랭커 - 선택적 2차 관련성 스코어링
//!
//! 벡터 유사도 순서를 외부 스코어링 서비스로 재정렬합니다.
//! 설정 유무에 따라 생성 시점에 변형이 선택됩니다:
//! - `NullReranker`: 항등 통과 (벡터 유사도 순서 신뢰)
//! - `CohereReranker`: Cohere Rerank API로 재정렬, k × oversample 후보 필요
//!
//! ref: https://docs.cohere.com/reference/rerank

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::RagError;

use super::document::Document;

/// Cohere Rerank API 엔드포인트
const COHERE_RERANK_URL: &str = "https://api.cohere.ai/v1/rerank";

/// 기본 리랭크 모델 (다국어 지원)
const DEFAULT_RERANK_MODEL: &str = "rerank-multilingual-v3.0";

/// 기본 초과 샘플링 배수 (리랭커가 의미있게 재정렬할 후보 풀 확보, >= 2)
const DEFAULT_OVERSAMPLE_FACTOR: usize = 2;

/// 기본 요청 타임아웃
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Reranker Trait
// ============================================================================

/// 리랭커 트레이트
#[async_trait]
pub trait Reranker: Send + Sync {
    /// 후보를 쿼리 관련성 순으로 재정렬하여 상위 top_n 반환
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Document>,
        top_n: usize,
    ) -> Result<Vec<Document>, RagError>;

    /// 엔진이 인덱스에서 가져와야 하는 후보 배수 (비활성 시 1)
    fn oversample(&self) -> usize {
        1
    }

    /// 리랭커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// NullReranker
// ============================================================================

/// 항등 리랭커 - 벡터 유사도 순서를 그대로 통과
pub struct NullReranker;

#[async_trait]
impl Reranker for NullReranker {
    async fn rerank(
        &self,
        _query: &str,
        candidates: Vec<Document>,
        _top_n: usize,
    ) -> Result<Vec<Document>, RagError> {
        Ok(candidates)
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

// ============================================================================
// CohereReranker
// ============================================================================

/// Cohere Rerank API 기반 외부 리랭커
pub struct CohereReranker {
    api_key: String,
    client: reqwest::Client,
    model: String,
    oversample_factor: usize,
}

impl CohereReranker {
    /// API 키로 생성
    pub fn new(api_key: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            client,
            model: DEFAULT_RERANK_MODEL.to_string(),
            oversample_factor: DEFAULT_OVERSAMPLE_FACTOR,
        })
    }

    /// COHERE_API_KEY 환경변수가 설정된 경우에만 생성
    pub fn from_env() -> anyhow::Result<Option<Self>> {
        match std::env::var("COHERE_API_KEY") {
            Ok(key) if !key.is_empty() => Ok(Some(Self::new(key)?)),
            _ => Ok(None),
        }
    }
}

/// Cohere Rerank 요청 본문
#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    model: &'a str,
    query: &'a str,
    documents: Vec<&'a str>,
    top_n: usize,
}

/// Cohere Rerank 응답
#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Debug, Deserialize)]
struct RerankResult {
    index: usize,
    #[allow(dead_code)]
    relevance_score: f32,
}

#[async_trait]
impl Reranker for CohereReranker {
    async fn rerank(
        &self,
        query: &str,
        candidates: Vec<Document>,
        top_n: usize,
    ) -> Result<Vec<Document>, RagError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let request = RerankRequest {
            model: &self.model,
            query,
            documents: candidates.iter().map(|d| d.content.as_str()).collect(),
            top_n,
        };

        let response = self
            .client
            .post(COHERE_RERANK_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::RerankUnavailable(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::RerankUnavailable(format!(
                "API error ({}): {}",
                status, body
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RagError::RerankUnavailable(format!("bad response: {}", e)))?;

        let ranked_indices: Vec<usize> = parsed.results.iter().map(|r| r.index).collect();
        Ok(apply_ranking(candidates, &ranked_indices, top_n))
    }

    fn oversample(&self) -> usize {
        self.oversample_factor
    }

    fn name(&self) -> &'static str {
        "cohere-rerank"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 랭킹 인덱스 순서로 후보를 재배열
///
/// 범위를 벗어나거나 중복된 인덱스는 무시합니다.
fn apply_ranking(candidates: Vec<Document>, ranked_indices: &[usize], top_n: usize) -> Vec<Document> {
    let mut slots: Vec<Option<Document>> = candidates.into_iter().map(Some).collect();
    let mut ranked = Vec::with_capacity(top_n.min(slots.len()));

    for &index in ranked_indices {
        if ranked.len() >= top_n {
            break;
        }
        if let Some(doc) = slots.get_mut(index).and_then(|s| s.take()) {
            ranked.push(doc);
        }
    }

    ranked
}

// ============================================================================
// Tests
// ============================================================================
