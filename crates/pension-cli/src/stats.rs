//! 파이프라인 단계 통계.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// 단계 결과 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    /// 모든 항목 성공
    Succeeded,
    /// 일부 항목 실패 또는 대체값 사용
    Degraded,
    /// 실행하지 않음 (비활성화, 재사용)
    Skipped,
    /// 사용할 수 있는 출력 없음
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Succeeded => "succeeded",
            StageStatus::Degraded => "degraded",
            StageStatus::Skipped => "skipped",
            StageStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 단계 하나의 실행 통계.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: String,
    pub status: StageStatus,
    /// 처리 대상 수
    pub total: usize,
    /// 성공 수
    pub success: usize,
    /// 건너뛴 수
    pub skipped: usize,
    /// 실패 수
    pub errors: usize,
    pub message: Option<String>,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl StageReport {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            status: StageStatus::Succeeded,
            total: 0,
            success: 0,
            skipped: 0,
            errors: 0,
            message: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn counts(mut self, total: usize, success: usize, skipped: usize, errors: usize) -> Self {
        self.total = total;
        self.success = success;
        self.skipped = skipped;
        self.errors = errors;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// 상태와 소요 시간을 기록합니다.
    pub fn finish(mut self, status: StageStatus, started: Instant) -> Self {
        self.status = status;
        self.elapsed = started.elapsed();
        self
    }

    /// 성공률 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self) {
        let message = self.message.as_deref().unwrap_or("");
        match self.status {
            StageStatus::Failed | StageStatus::Degraded => tracing::warn!(
                stage = %self.stage,
                status = %self.status,
                total = self.total,
                success = self.success,
                skipped = self.skipped,
                errors = self.errors,
                elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
                "{message}"
            ),
            _ => tracing::info!(
                stage = %self.stage,
                status = %self.status,
                total = self.total,
                success = self.success,
                skipped = self.skipped,
                success_rate = format!("{:.1}%", self.success_rate()),
                elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
                "{message}"
            ),
        }
    }
}

/// 전체 파이프라인 실행 통계.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub stages: Vec<StageReport>,
    /// 출력이 없어 중단된 단계
    pub halted_at: Option<String>,
}

impl Default for PipelineReport {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineReport {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stages: Vec::new(),
            halted_at: None,
        }
    }

    /// 단계 결과를 기록하고 로그로 남깁니다.
    pub fn record(&mut self, report: StageReport) {
        report.log_summary();
        self.stages.push(report);
    }

    /// 마지막 단계에서 중단되었음을 기록합니다.
    pub fn halt(&mut self) {
        self.halted_at = self.stages.last().map(|s| s.stage.clone());
    }

    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == name)
    }

    /// 중단 없이 끝났고 실패한 단계가 없는지 여부.
    pub fn is_success(&self) -> bool {
        self.halted_at.is_none() && self.stages.iter().all(|s| s.status != StageStatus::Failed)
    }

    pub fn elapsed(&self) -> Duration {
        self.stages.iter().map(|s| s.elapsed).sum()
    }
}
