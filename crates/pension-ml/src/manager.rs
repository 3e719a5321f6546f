//! 해시 기반 모델 저장소.
//!
//! 디렉토리 구조:
//!
//! ```text
//! {root}/{asset_class}/
//! ├── index.json                          # 최신 모델 조회용 목록
//! ├── sequence_models/sequence_{hash}.bin
//! ├── trend_models/trend_{hash}.bin
//! ├── scalers/feature_scaler_{hash}.json
//! ├── scalers/target_scaler_{hash}.json
//! └── metadata/metadata_{hash}.json       # 마지막에 기록
//! ```
//!
//! 저장은 트랜잭션이 아닙니다. 아티팩트별 실패는 기록 후 건너뛰고,
//! 메타데이터를 마지막에 씁니다. 로드는 메타데이터 목록을 믿지 않고
//! 파일 존재를 직접 확인합니다.

use crate::cache::ModelCache;
use crate::ensemble::EnsembleWeights;
use crate::error::{MlError, MlResult};
use crate::identity::{ModelHash, TrainingIdentity};
use crate::lstm::LstmRegressor;
use crate::metrics::ModelEvaluation;
use crate::scaler::Scaler;
use crate::trend::TrendModelSet;
use chrono::{DateTime, Utc};
use pension_core::AssetClass;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const METADATA_DIR: &str = "metadata";
const INDEX_FILE: &str = "index.json";

/// 모델 번들을 구성하는 아티팩트 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    SequenceModel,
    TrendModel,
    FeatureScaler,
    TargetScaler,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::SequenceModel,
        ArtifactKind::TrendModel,
        ArtifactKind::FeatureScaler,
        ArtifactKind::TargetScaler,
    ];

    fn dir(&self) -> &'static str {
        match self {
            ArtifactKind::SequenceModel => "sequence_models",
            ArtifactKind::TrendModel => "trend_models",
            ArtifactKind::FeatureScaler | ArtifactKind::TargetScaler => "scalers",
        }
    }

    fn file_name(&self, hash: &ModelHash) -> String {
        match self {
            ArtifactKind::SequenceModel => format!("sequence_{hash}.bin"),
            ArtifactKind::TrendModel => format!("trend_{hash}.bin"),
            ArtifactKind::FeatureScaler => format!("feature_scaler_{hash}.json"),
            ArtifactKind::TargetScaler => format!("target_scaler_{hash}.json"),
        }
    }
}

/// 학습된 모델 구성 요소. 학습하지 않은 요소는 `None`.
#[derive(Debug, Clone, Default)]
pub struct ModelBundle {
    pub sequence_model: Option<LstmRegressor>,
    pub trend_model: Option<TrendModelSet>,
    pub feature_scaler: Option<Scaler>,
    pub target_scaler: Option<Scaler>,
}

impl ModelBundle {
    pub fn has(&self, kind: ArtifactKind) -> bool {
        match kind {
            ArtifactKind::SequenceModel => self.sequence_model.is_some(),
            ArtifactKind::TrendModel => self.trend_model.is_some(),
            ArtifactKind::FeatureScaler => self.feature_scaler.is_some(),
            ArtifactKind::TargetScaler => self.target_scaler.is_some(),
        }
    }

    /// 존재하는 아티팩트 종류.
    pub fn present(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL.into_iter().filter(|k| self.has(*k)).collect()
    }

    /// 아티팩트를 저장 형식의 바이트로 직렬화합니다. 없으면 `None`.
    fn encode(&self, kind: ArtifactKind) -> Option<MlResult<Vec<u8>>> {
        match kind {
            ArtifactKind::SequenceModel => self.sequence_model.as_ref().map(|m| m.to_bytes()),
            ArtifactKind::TrendModel => self
                .trend_model
                .as_ref()
                .map(|m| bincode::serialize(m).map_err(MlError::from)),
            ArtifactKind::FeatureScaler => self
                .feature_scaler
                .as_ref()
                .map(|s| serde_json::to_vec_pretty(s).map_err(MlError::from)),
            ArtifactKind::TargetScaler => self
                .target_scaler
                .as_ref()
                .map(|s| serde_json::to_vec_pretty(s).map_err(MlError::from)),
        }
    }

    fn decode_into(&mut self, kind: ArtifactKind, bytes: &[u8]) -> MlResult<()> {
        match kind {
            ArtifactKind::SequenceModel => {
                self.sequence_model = Some(LstmRegressor::from_bytes(bytes)?)
            }
            ArtifactKind::TrendModel => self.trend_model = Some(bincode::deserialize(bytes)?),
            ArtifactKind::FeatureScaler => self.feature_scaler = Some(serde_json::from_slice(bytes)?),
            ArtifactKind::TargetScaler => self.target_scaler = Some(serde_json::from_slice(bytes)?),
        }
        Ok(())
    }
}

/// 아티팩트 존재 여부 요약.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub has_sequence_model: bool,
    pub has_trend_model: bool,
    pub has_feature_scaler: bool,
    pub has_target_scaler: bool,
}

impl ModelInfo {
    fn from_kinds(kinds: &[ArtifactKind]) -> Self {
        Self {
            has_sequence_model: kinds.contains(&ArtifactKind::SequenceModel),
            has_trend_model: kinds.contains(&ArtifactKind::TrendModel),
            has_feature_scaler: kinds.contains(&ArtifactKind::FeatureScaler),
            has_target_scaler: kinds.contains(&ArtifactKind::TargetScaler),
        }
    }
}

/// 모델 메타데이터 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_hash: ModelHash,
    pub asset_class: AssetClass,
    pub created_at: DateTime<Utc>,
    /// 해시의 원천인 학습 구성
    pub config: TrainingIdentity,
    /// 시퀀스 입력 특성 이름 (학습 시 컬럼 순서)
    #[serde(default)]
    pub input_features: Vec<String>,
    /// 실제로 기록에 성공한 아티팩트
    pub artifacts: Vec<ArtifactKind>,
    pub model_info: ModelInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Vec<ModelEvaluation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensemble_weights: Option<EnsembleWeights>,
}

/// 메타데이터에 함께 기록할 학습 결과.
#[derive(Debug, Clone, Default)]
pub struct SaveExtras {
    pub input_features: Vec<String>,
    pub evaluation: Option<Vec<ModelEvaluation>>,
    pub ensemble_weights: Option<EnsembleWeights>,
}

/// 저장 결과.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveReport {
    pub hash: ModelHash,
    pub written: Vec<ArtifactKind>,
    pub failed: Vec<ArtifactKind>,
    pub metadata_written: bool,
}

impl SaveReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.metadata_written
    }
}

/// 메타데이터와 실제로 읽어 온 아티팩트.
#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub metadata: ModelMetadata,
    pub bundle: ModelBundle,
}

/// 로드 결과. 메타데이터가 없으면 `NotFound`.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    Found(Arc<LoadedBundle>),
    NotFound,
}

impl LoadOutcome {
    pub fn found(self) -> Option<Arc<LoadedBundle>> {
        match self {
            LoadOutcome::Found(bundle) => Some(bundle),
            LoadOutcome::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, LoadOutcome::Found(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IndexEntry {
    hash: ModelHash,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ModelIndex {
    entries: Vec<IndexEntry>,
}

/// 공유 모델 캐시 핸들.
pub type SharedModelCache = Arc<Mutex<ModelCache<LoadedBundle>>>;

/// 자산 클래스 하나의 모델 저장소.
#[derive(Debug, Clone)]
pub struct ModelManager {
    asset_class: AssetClass,
    base: PathBuf,
    cache: Option<SharedModelCache>,
}

/// 임시 파일에 쓴 뒤 이름을 바꿉니다.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn remove_if_exists(path: &Path) -> std::io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

impl ModelManager {
    pub fn new(root: impl AsRef<Path>, asset_class: AssetClass) -> Self {
        Self {
            asset_class,
            base: root.as_ref().join(asset_class.as_str()),
            cache: None,
        }
    }

    /// 로드 결과를 공유 캐시에 보관합니다.
    pub fn with_cache(mut self, cache: SharedModelCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn asset_class(&self) -> AssetClass {
        self.asset_class
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    pub fn artifact_path(&self, kind: ArtifactKind, hash: &ModelHash) -> PathBuf {
        self.base.join(kind.dir()).join(kind.file_name(hash))
    }

    pub fn metadata_path(&self, hash: &ModelHash) -> PathBuf {
        self.base.join(METADATA_DIR).join(format!("metadata_{hash}.json"))
    }

    fn index_path(&self) -> PathBuf {
        self.base.join(INDEX_FILE)
    }

    /// 학습 구성의 모델 해시.
    pub fn hash(identity: &TrainingIdentity) -> MlResult<ModelHash> {
        identity.hash()
    }

    /// 같은 구성으로 학습한 모델의 메타데이터가 있는지 확인합니다.
    pub fn exists(&self, identity: &TrainingIdentity) -> MlResult<(bool, ModelHash)> {
        let hash = identity.hash()?;
        let present = self.metadata_path(&hash).is_file();
        debug!(model_hash = %hash, present, "모델 존재 확인");
        Ok((present, hash))
    }

    /// 번들을 저장합니다.
    ///
    /// 개별 아티팩트 실패는 `SaveReport::failed`에 남기고 계속 진행합니다.
    /// 해시 계산 실패만 에러로 반환합니다.
    pub fn save(
        &self,
        bundle: &ModelBundle,
        identity: &TrainingIdentity,
        extras: SaveExtras,
    ) -> MlResult<SaveReport> {
        let hash = identity.hash()?;
        let mut written = Vec::new();
        let mut failed = Vec::new();

        for kind in ArtifactKind::ALL {
            let Some(encoded) = bundle.encode(kind) else {
                continue;
            };
            let path = self.artifact_path(kind, &hash);
            let result = encoded.and_then(|bytes| write_atomic(&path, &bytes).map_err(MlError::from));
            match result {
                Ok(()) => {
                    debug!(model_hash = %hash, artifact = ?kind, path = %path.display(), "아티팩트 저장");
                    written.push(kind);
                }
                Err(e) => {
                    warn!(model_hash = %hash, artifact = ?kind, error = %e, "아티팩트 저장 실패, 건너뜀");
                    failed.push(kind);
                }
            }
        }

        let created_at = Utc::now();
        let metadata = ModelMetadata {
            model_hash: hash.clone(),
            asset_class: self.asset_class,
            created_at,
            config: identity.clone(),
            input_features: extras.input_features,
            model_info: ModelInfo::from_kinds(&written),
            artifacts: written.clone(),
            evaluation: extras.evaluation,
            ensemble_weights: extras.ensemble_weights,
        };

        let metadata_written = match serde_json::to_vec_pretty(&metadata)
            .map_err(MlError::from)
            .and_then(|bytes| write_atomic(&self.metadata_path(&hash), &bytes).map_err(MlError::from))
        {
            Ok(()) => true,
            Err(e) => {
                warn!(model_hash = %hash, error = %e, "메타데이터 저장 실패");
                false
            }
        };

        if metadata_written {
            if let Err(e) = self.upsert_index(&hash, created_at) {
                warn!(model_hash = %hash, error = %e, "모델 인덱스 갱신 실패");
            }
        }
        self.invalidate_cache(&hash);

        info!(
            asset_class = %self.asset_class,
            model_hash = %hash,
            written = written.len(),
            failed = failed.len(),
            metadata_written,
            "모델 저장 완료"
        );

        Ok(SaveReport {
            hash,
            written,
            failed,
            metadata_written,
        })
    }

    fn read_metadata(&self, path: &Path) -> MlResult<ModelMetadata> {
        let bytes = fs::read(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| MlError::ModelLoad(format!("{}: {}", path.display(), e)))
    }

    /// 해시로 번들을 읽습니다.
    ///
    /// 메타데이터가 없으면 `NotFound`. 아티팩트는 파일 존재를 직접 확인해
    /// 읽을 수 있는 것만 담고, 나머지는 경고 후 생략합니다.
    pub fn load(&self, hash: &ModelHash) -> MlResult<LoadOutcome> {
        let key = (self.asset_class, hash.clone());
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                if let Some(hit) = cache.get(&key) {
                    debug!(model_hash = %hash, "모델 캐시 적중");
                    return Ok(LoadOutcome::Found(hit));
                }
            }
        }

        let meta_path = self.metadata_path(hash);
        if !meta_path.is_file() {
            debug!(model_hash = %hash, "메타데이터 없음");
            return Ok(LoadOutcome::NotFound);
        }
        let metadata = self.read_metadata(&meta_path)?;

        let mut bundle = ModelBundle::default();
        for kind in ArtifactKind::ALL {
            let path = self.artifact_path(kind, hash);
            let listed = metadata.artifacts.contains(&kind);
            if !path.is_file() {
                if listed {
                    warn!(model_hash = %hash, artifact = ?kind, "메타데이터에 있는 아티팩트 파일이 없습니다");
                }
                continue;
            }

            let result = fs::read(&path)
                .map_err(MlError::from)
                .and_then(|bytes| bundle.decode_into(kind, &bytes));
            if let Err(e) = result {
                warn!(model_hash = %hash, artifact = ?kind, error = %e, "아티팩트 로드 실패, 생략");
            }
        }

        let loaded = Arc::new(LoadedBundle { metadata, bundle });
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.insert(key, Arc::clone(&loaded));
            }
        }

        info!(
            model_hash = %hash,
            artifacts = ?loaded.bundle.present(),
            "모델 로드 완료"
        );
        Ok(LoadOutcome::Found(loaded))
    }

    /// 저장된 모든 메타데이터 (최신순).
    pub fn list(&self) -> MlResult<Vec<ModelMetadata>> {
        let dir = self.base.join(METADATA_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if !is_metadata_file(&path) {
                continue;
            }
            match self.read_metadata(&path) {
                Ok(meta) => records.push(meta),
                Err(e) => warn!(path = %path.display(), error = %e, "메타데이터 읽기 실패, 건너뜀"),
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// 해시에 연결된 모든 파일을 지웁니다. 없는 해시도 에러가 아니며 지운 파일 수를 반환합니다.
    pub fn delete(&self, hash: &ModelHash) -> MlResult<usize> {
        let mut removed = 0usize;
        for kind in ArtifactKind::ALL {
            if remove_if_exists(&self.artifact_path(kind, hash))? {
                removed += 1;
            }
        }
        if remove_if_exists(&self.metadata_path(hash))? {
            removed += 1;
        }

        if let Err(e) = self.remove_from_index(hash) {
            warn!(model_hash = %hash, error = %e, "모델 인덱스 갱신 실패");
        }
        self.invalidate_cache(hash);

        info!(model_hash = %hash, removed, "모델 삭제");
        Ok(removed)
    }

    /// 가장 최근 모델 해시.
    ///
    /// `index.json`을 우선 사용하고, 없거나 읽을 수 없으면 메타데이터
    /// 파일의 수정 시각으로 찾습니다.
    pub fn latest(&self) -> MlResult<Option<ModelHash>> {
        match self.read_index() {
            Ok(Some(index)) => {
                let latest = index
                    .entries
                    .iter()
                    .filter(|e| self.metadata_path(&e.hash).is_file())
                    .max_by_key(|e| e.created_at)
                    .map(|e| e.hash.clone());
                if latest.is_some() {
                    return Ok(latest);
                }
                debug!("인덱스에 유효한 항목이 없어 파일 시각으로 조회합니다");
            }
            Ok(None) => info!("모델 인덱스가 없어 파일 수정 시각으로 조회합니다"),
            Err(e) => warn!(error = %e, "모델 인덱스를 읽을 수 없어 파일 수정 시각으로 조회합니다"),
        }
        self.latest_by_mtime()
    }

    fn latest_by_mtime(&self) -> MlResult<Option<ModelHash>> {
        let dir = self.base.join(METADATA_DIR);
        if !dir.is_dir() {
            return Ok(None);
        }

        let mut newest: Option<(SystemTime, ModelHash)> = None;
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(hash) = hash_from_metadata_path(&path) else {
                continue;
            };
            let modified = entry.metadata()?.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
                newest = Some((modified, hash));
            }
        }
        Ok(newest.map(|(_, hash)| hash))
    }

    fn read_index(&self) -> MlResult<Option<ModelIndex>> {
        let path = self.index_path();
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    fn write_index(&self, index: &ModelIndex) -> MlResult<()> {
        write_atomic(&self.index_path(), &serde_json::to_vec_pretty(index)?)?;
        Ok(())
    }

    fn upsert_index(&self, hash: &ModelHash, created_at: DateTime<Utc>) -> MlResult<()> {
        let mut index = self.read_index().unwrap_or_default().unwrap_or_default();
        index.entries.retain(|e| &e.hash != hash);
        index.entries.push(IndexEntry {
            hash: hash.clone(),
            created_at,
        });
        self.write_index(&index)
    }

    fn remove_from_index(&self, hash: &ModelHash) -> MlResult<()> {
        let Some(mut index) = self.read_index()? else {
            return Ok(());
        };
        let before = index.entries.len();
        index.entries.retain(|e| &e.hash != hash);
        if index.entries.len() != before {
            self.write_index(&index)?;
        }
        Ok(())
    }

    fn invalidate_cache(&self, hash: &ModelHash) {
        if let Some(cache) = &self.cache {
            if let Ok(mut cache) = cache.lock() {
                cache.invalidate(hash);
            }
        }
    }
}

fn hash_from_metadata_path(path: &Path) -> Option<ModelHash> {
    let name = path.file_name()?.to_str()?;
    let hash = name.strip_prefix("metadata_")?.strip_suffix(".json")?;
    hash.parse().ok()
}

fn is_metadata_file(path: &Path) -> bool {
    hash_from_metadata_path(path).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pension_core::ScalerKind;
    use tempfile::TempDir;

    fn identity(seq_len: usize) -> TrainingIdentity {
        TrainingIdentity::new(["kospi", "return"], seq_len, vec![10, seq_len, 2], "0011223344556677")
    }

    fn scaler_bundle() -> ModelBundle {
        ModelBundle {
            target_scaler: Some(Scaler::fit_column(ScalerKind::Standard, &[1.0, 2.0, 3.0]).unwrap()),
            ..ModelBundle::default()
        }
    }

    #[test]
    fn test_save_then_exists_and_load() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path(), AssetClass::Etf);
        let id = identity(12);

        assert!(!manager.exists(&id).unwrap().0);
        let report = manager.save(&scaler_bundle(), &id, SaveExtras::default()).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.written, vec![ArtifactKind::TargetScaler]);

        let (present, hash) = manager.exists(&id).unwrap();
        assert!(present);
        assert_eq!(hash, report.hash);

        let loaded = manager.load(&hash).unwrap().found().unwrap();
        assert_eq!(loaded.bundle.target_scaler, scaler_bundle().target_scaler);
        assert!(loaded.bundle.sequence_model.is_none());
        assert!(loaded.metadata.model_info.has_target_scaler);
        assert!(!loaded.metadata.model_info.has_trend_model);
    }

    #[test]
    fn test_load_missing_metadata_is_not_found() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path(), AssetClass::Fund);
        let outcome = manager.load(&"deadbeef".parse().unwrap()).unwrap();
        assert!(!outcome.is_found());
    }

    #[test]
    fn test_corrupt_artifact_is_omitted() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path(), AssetClass::Etf);
        let report = manager.save(&scaler_bundle(), &identity(12), SaveExtras::default()).unwrap();

        fs::write(manager.artifact_path(ArtifactKind::TargetScaler, &report.hash), b"not json").unwrap();
        let loaded = manager.load(&report.hash).unwrap().found().unwrap();
        assert!(loaded.bundle.target_scaler.is_none());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path(), AssetClass::Etf);
        let report = manager.save(&scaler_bundle(), &identity(12), SaveExtras::default()).unwrap();

        assert_eq!(manager.delete(&report.hash).unwrap(), 2);
        assert!(!manager.exists(&identity(12)).unwrap().0);
        assert_eq!(manager.delete(&report.hash).unwrap(), 0);
        assert!(manager.list().unwrap().is_empty());
    }

    #[test]
    fn test_list_newest_first_and_latest() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path(), AssetClass::Etf);
        let first = manager.save(&scaler_bundle(), &identity(6), SaveExtras::default()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));
        let second = manager.save(&scaler_bundle(), &identity(12), SaveExtras::default()).unwrap();

        let listed = manager.list().unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].model_hash, second.hash);
        assert_eq!(listed[1].model_hash, first.hash);
        assert_eq!(manager.latest().unwrap(), Some(second.hash.clone()));

        // 인덱스가 없으면 수정 시각으로 대체
        fs::remove_file(manager.base_dir().join(INDEX_FILE)).unwrap();
        assert_eq!(manager.latest().unwrap(), Some(second.hash));
    }

    #[test]
    fn test_cache_invalidated_on_delete() {
        let dir = TempDir::new().unwrap();
        let cache: SharedModelCache = Arc::new(Mutex::new(ModelCache::new(2)));
        let manager = ModelManager::new(dir.path(), AssetClass::Etf).with_cache(Arc::clone(&cache));
        let report = manager.save(&scaler_bundle(), &identity(12), SaveExtras::default()).unwrap();

        manager.load(&report.hash).unwrap();
        assert_eq!(cache.lock().unwrap().len(), 1);
        manager.delete(&report.hash).unwrap();
        assert_eq!(cache.lock().unwrap().len(), 0);
        assert!(!manager.load(&report.hash).unwrap().is_found());
    }
}
