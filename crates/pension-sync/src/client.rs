//! 예측 결과 전송 클라이언트.
//!
//! 예측 수익률을 `[{id, profit}]` JSON 배열로 백엔드에 전송합니다.
//! 실패는 로그를 남기고 [`PushOutcome`]으로 돌려주며, 재시도는 하지 않습니다
//! (다음 실행 주기에 다시 전송).

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use pension_core::{AssetForecast, PushMethod, SyncConfig};
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// 자산 하나의 수익률 갱신 항목.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitUpdate {
    pub id: String,
    pub profit: f64,
}

impl From<&AssetForecast> for ProfitUpdate {
    fn from(forecast: &AssetForecast) -> Self {
        Self {
            id: forecast.asset_id.clone(),
            profit: forecast.predicted_return,
        }
    }
}

/// 전송 결과.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushOutcome {
    pub success: bool,
    /// HTTP 상태 코드 (응답을 받은 경우)
    pub status: Option<u16>,
    pub message: String,
    /// 전송한 항목 수
    pub sent: usize,
}

impl PushOutcome {
    fn skipped(message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: None,
            message: message.into(),
            sent: 0,
        }
    }
}

/// 예측 결과를 받는 대상.
#[async_trait]
pub trait PredictionSink: Send + Sync {
    /// 예측 결과를 전송합니다. 실패해도 에러를 반환하지 않습니다.
    async fn publish(&self, forecasts: &[AssetForecast]) -> PushOutcome;

    /// 전송이 활성화되어 있는지 여부.
    fn is_enabled(&self) -> bool;

    /// 대상 이름.
    fn name(&self) -> &str;
}

/// HTTP 전송 클라이언트.
pub struct PushClient {
    base_url: String,
    endpoint: String,
    auth_scheme: String,
    token: Option<SecretString>,
    method: PushMethod,
    enabled: bool,
    client: reqwest::Client,
}

impl std::fmt::Debug for PushClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushClient")
            .field("url", &self.url())
            .field("method", &self.method)
            .field("enabled", &self.enabled)
            .field("has_token", &self.token.is_some())
            .finish()
    }
}

impl PushClient {
    /// 설정으로 클라이언트를 생성합니다.
    ///
    /// 토큰은 설정 파일, 없으면 `PENSION_SYNC_TOKEN` 환경 변수에서 읽습니다.
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        if config.base_url.trim().is_empty() {
            return Err(SyncError::Config("base_url이 비어 있습니다".to_string()));
        }

        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            endpoint: config.endpoint.clone(),
            auth_scheme: config.auth_scheme.clone(),
            token: config.resolve_token().map(SecretString::from),
            method: config.method,
            enabled: config.enabled,
            client,
        })
    }

    /// 전송 대상 전체 URL.
    pub fn url(&self) -> String {
        if self.endpoint.starts_with('/') || self.endpoint.is_empty() {
            format!("{}{}", self.base_url, self.endpoint)
        } else {
            format!("{}/{}", self.base_url, self.endpoint)
        }
    }

    /// 예측 결과를 전송합니다.
    pub async fn push(&self, forecasts: &[AssetForecast]) -> PushOutcome {
        let updates: Vec<ProfitUpdate> = forecasts.iter().map(ProfitUpdate::from).collect();
        self.push_updates(&updates).await
    }

    /// 수익률 갱신 목록을 전송합니다.
    pub async fn push_updates(&self, updates: &[ProfitUpdate]) -> PushOutcome {
        if !self.enabled {
            debug!("예측 전송이 비활성화되어 건너뜁니다");
            return PushOutcome::skipped("전송 비활성화");
        }
        if updates.is_empty() {
            return PushOutcome {
                success: true,
                status: None,
                message: "전송할 예측 없음".to_string(),
                sent: 0,
            };
        }

        match self.send(updates).await {
            Ok(status) => {
                info!(count = updates.len(), status, url = %self.url(), "예측 결과 전송 완료");
                PushOutcome {
                    success: true,
                    status: Some(status),
                    message: "ok".to_string(),
                    sent: updates.len(),
                }
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(error = %e, url = %self.url(), "예측 전송 실패, 다음 주기에 재시도합니다");
                } else {
                    error!(error = %e, url = %self.url(), "예측 전송 거부됨");
                }
                PushOutcome {
                    success: false,
                    status: e.status(),
                    message: e.to_string(),
                    sent: 0,
                }
            }
        }
    }

    async fn send(&self, updates: &[ProfitUpdate]) -> SyncResult<u16> {
        let url = self.url();
        let request = match self.method {
            PushMethod::Put => self.client.put(&url),
            PushMethod::Post => self.client.post(&url),
        };
        let request = match &self.token {
            Some(token) => request.header(
                AUTHORIZATION,
                format!("{} {}", self.auth_scheme, token.expose_secret()),
            ),
            None => request,
        };

        debug!(count = updates.len(), url = %url, "예측 결과 전송 중");
        let response = request.json(updates).send().await?;

        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SyncError::Http {
                status: status.as_u16(),
                body,
            })
        }
    }

    /// 기본 URL에 GET 요청을 보내 응답 여부를 확인합니다.
    ///
    /// 2xx 응답이면 true.
    pub async fn health_check(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(response) => {
                let ok = response.status().is_success();
                debug!(status = response.status().as_u16(), "백엔드 상태 확인");
                ok
            }
            Err(e) => {
                warn!(error = %e, "백엔드 상태 확인 실패");
                false
            }
        }
    }
}

#[async_trait]
impl PredictionSink for PushClient {
    async fn publish(&self, forecasts: &[AssetForecast]) -> PushOutcome {
        self.push(forecasts).await
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "http"
    }
}
