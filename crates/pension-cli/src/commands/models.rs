//! 저장된 모델 관리 명령어.

use anyhow::{bail, Result};
use pension_ml::{LoadOutcome, ModelHash, ModelManager, ModelMetadata};

/// 저장된 모델 목록 (최신순).
pub fn list(manager: &ModelManager) -> Result<Vec<ModelMetadata>> {
    Ok(manager.list()?)
}

pub fn print_list(metadata: &[ModelMetadata]) {
    if metadata.is_empty() {
        println!("저장된 모델이 없습니다");
        return;
    }
    println!(
        "\n{:<10} {:<6} {:<22} {:>6} {:<30}",
        "해시", "분류", "생성 시각", "길이", "아티팩트"
    );
    for m in metadata {
        let artifacts: Vec<String> = m.artifacts.iter().map(|a| format!("{a:?}")).collect();
        println!(
            "{:<10} {:<6} {:<22} {:>6} {:<30}",
            m.model_hash.to_string(),
            m.asset_class.to_string(),
            m.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            m.config.sequence_length,
            artifacts.join(",")
        );
    }
}

/// 모델 메타데이터를 JSON으로 돌려줍니다.
pub fn show(manager: &ModelManager, hash: &str) -> Result<String> {
    let hash: ModelHash = hash.parse()?;
    match manager.load(&hash)? {
        LoadOutcome::Found(loaded) => Ok(serde_json::to_string_pretty(&loaded.metadata)?),
        LoadOutcome::NotFound => bail!("model {hash} not found in {}", manager.base_dir().display()),
    }
}

/// 모델 파일을 삭제하고 지운 파일 수를 돌려줍니다.
pub fn delete(manager: &ModelManager, hash: &str) -> Result<usize> {
    let hash: ModelHash = hash.parse()?;
    Ok(manager.delete(&hash)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pension_core::AssetClass;

    #[test]
    fn test_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path(), AssetClass::Etf);

        assert!(list(&manager).unwrap().is_empty());
        assert!(show(&manager, "deadbeef").is_err());
        assert_eq!(delete(&manager, "deadbeef").unwrap(), 0);
        assert!(delete(&manager, "not-a-hash").is_err());
    }
}
