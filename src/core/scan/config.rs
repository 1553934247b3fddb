use serde::{Deserialize, Serialize};

use super::error::ScanError;
use super::ocr::OcrConfig;
use super::region_filter::TargetZone;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub target_zone: TargetZone,
    /// 同一字符串需要出现的次数
    pub consensus_threshold: u32,
    /// 候选行长度必须大于此值
    pub min_candidate_len: usize,
    pub ocr: OcrConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            target_zone: TargetZone::default(),
            consensus_threshold: 10,
            min_candidate_len: 5,
            ocr: OcrConfig::default(),
        }
    }
}

impl ScanConfig {
    /// 光线好、对焦稳定时更快确认
    pub fn for_quick_scan() -> Self {
        Self {
            consensus_threshold: 5,
            ..Default::default()
        }
    }

    /// 抖动或反光严重时要求更多重复
    pub fn for_noisy_conditions() -> Self {
        Self {
            consensus_threshold: 15,
            ..Default::default()
        }
    }

    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> Result<Self, ScanError> {
        let config: ScanConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ScanError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ScanError> {
        if self.consensus_threshold == 0 {
            return Err(ScanError::InvalidConfig(
                "consensus_threshold must be at least 1".into(),
            ));
        }
        self.target_zone.validate()?;
        self.ocr.validate()
    }
}
