//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 텍스트를 고정 차원 벡터로 변환합니다. 타임아웃과 재시도 횟수는
//! 필수 설정이며, 소진되면 `RagError::EmbeddingUnavailable`로 실패합니다.
//! 이 에러는 RetrievalEngine 경계에서 빈 결과로 흡수됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::new(EmbeddingConfig::from_env()?)?;
//! let embedding = embedder.embed("Pod가 재시작을 반복합니다").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::RagError;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Configuration
// ============================================================================

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 기본 요청 타임아웃
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// 기본 최대 재시도 횟수
const DEFAULT_MAX_RETRIES: u32 = 3;

/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001)
/// ref: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 임베딩 프로바이더 설정
///
/// 타임아웃과 재시도 한도는 필수입니다 - 코어 어디에도 무한 대기는 없습니다.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// Google AI API 키
    pub api_key: String,
    /// 임베딩 차원 (768, 1536, 3072 중 선택)
    pub dimension: usize,
    /// 요청 타임아웃
    pub timeout: Duration,
    /// 최대 재시도 횟수
    pub max_retries: u32,
}

impl EmbeddingConfig {
    /// 환경변수에서 API 키를 읽어 기본 설정 생성
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            api_key: get_api_key()?,
            dimension: DEFAULT_DIMENSION,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    config: EmbeddingConfig,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// 슬라이딩 윈도우 Rate Limiter
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
        }
    }

    /// 윈도우에 자리가 날 때까지 대기 후 요청 기록
    async fn acquire(&mut self) {
        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        self.requests.push(Instant::now());
    }
}

impl GeminiEmbedding {
    /// 설정으로 임베딩 프로바이더 생성
    pub fn new(config: EmbeddingConfig) -> anyhow::Result<Self> {
        if ![768, 1536, 3072].contains(&config.dimension) {
            anyhow::bail!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                config.dimension
            );
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
        )));

        Ok(Self {
            config,
            client,
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(EmbeddingConfig::from_env()?)
    }
}

/// Gemini API 요청 본문
/// ref: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        // 빈 텍스트는 네트워크 호출 없이 영벡터
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.config.dimension]);
        }

        let request = EmbedRequest {
            model: "models/gemini-embedding-001".to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: "RETRIEVAL_DOCUMENT".to_string(),
            output_dimensionality: self.config.dimension,
        };

        let mut last_error = String::new();

        // 재시도 루프 (429/전송 오류 시 지수 백오프)
        for attempt in 0..=self.config.max_retries {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(GEMINI_EMBED_URL)
                .header("x-goog-api-key", &self.config.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = format!("request failed: {}", e);
                    if attempt < self.config.max_retries {
                        let backoff =
                            Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Embedding request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            self.config.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| RagError::EmbeddingUnavailable(e.to_string()))?;

            if status.is_success() {
                let embed_response: EmbedResponse = serde_json::from_str(&body)
                    .map_err(|e| RagError::EmbeddingUnavailable(format!("bad response: {}", e)))?;
                return Ok(embed_response.embedding.values);
            }

            if status.as_u16() == 429 {
                last_error = "rate limit exceeded (429)".to_string();
                if attempt < self.config.max_retries {
                    let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                    tracing::warn!(
                        "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                        backoff,
                        attempt + 1,
                        self.config.max_retries
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                // 재시도 불가 에러 - 즉시 실패
                return Err(RagError::EmbeddingUnavailable(format!(
                    "API error ({}): {}",
                    status, body
                )));
            }
        }

        Err(RagError::EmbeddingUnavailable(format!(
            "exhausted {} retries: {}",
            self.config.max_retries, last_error
        )))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn name(&self) -> &str {
        "gemini-embedding-001"
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> anyhow::Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"]
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(dimension: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            api_key: "fake_key".to_string(),
            dimension,
            timeout: Duration::from_secs(5),
            max_retries: 1,
        }
    }

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::new(test_config(999));
        assert!(result.is_err());
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("Invalid dimension"));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            assert!(GeminiEmbedding::new(test_config(dim)).is_ok());
        }
    }

    #[tokio::test]
    async fn test_empty_text_yields_zero_vector() {
        let embedder = GeminiEmbedding::new(test_config(768)).unwrap();
        let v = embedder.embed("   ").await.unwrap();
        assert_eq!(v.len(), 768);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_has_api_key() {
        // 환경변수 설정 여부에 따라 결과가 달라짐
        let _ = has_api_key();
    }
}
