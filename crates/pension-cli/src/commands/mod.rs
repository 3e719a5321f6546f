//! CLI 명령어 구현 모듈.

pub mod models;
pub mod portfolio;
pub mod predict;
pub mod train;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

/// 결과를 JSON 파일로 저장합니다.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}
