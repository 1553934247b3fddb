use serde::{Deserialize, Serialize};

use crate::core::scan::{
    CharacterBox, CropRect, DisplayRect, NormalizedRect, OcrConfig, ScanConfig, TargetZone,
    TextRegion,
};

/// 扫描参数，缺省值与 `ScanConfig::default()` 一致
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    pub consensus_threshold: u32,
    pub min_candidate_len: u32,
    /// 目标区域，归一化、左下原点
    pub zone_min_x: f32,
    pub zone_min_y: f32,
    pub zone_max_x: f32,
    pub zone_max_y: f32,
    pub language: String,
    pub char_whitelist: String,
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanConfig::default().into()
    }
}

impl From<ScanConfig> for ScanSettings {
    fn from(config: ScanConfig) -> Self {
        Self {
            consensus_threshold: config.consensus_threshold,
            min_candidate_len: config.min_candidate_len as u32,
            zone_min_x: config.target_zone.min_x,
            zone_min_y: config.target_zone.min_y,
            zone_max_x: config.target_zone.max_x,
            zone_max_y: config.target_zone.max_y,
            language: config.ocr.language,
            char_whitelist: config.ocr.char_whitelist,
        }
    }
}

impl From<ScanSettings> for ScanConfig {
    fn from(settings: ScanSettings) -> Self {
        Self {
            target_zone: TargetZone {
                min_x: settings.zone_min_x,
                min_y: settings.zone_min_y,
                max_x: settings.zone_max_x,
                max_y: settings.zone_max_y,
            },
            consensus_threshold: settings.consensus_threshold,
            min_candidate_len: settings.min_candidate_len as usize,
            ocr: OcrConfig {
                language: settings.language,
                char_whitelist: settings.char_whitelist,
                ..Default::default()
            },
        }
    }
}

/// 单个字符框的边界
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectedCharacter {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

/// 平台侧检测器给出的文字区域（方向校正后、归一化、左下原点）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedRegion {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
    #[serde(default)]
    pub characters: Vec<DetectedCharacter>,
}

impl From<DetectedRegion> for TextRegion {
    fn from(region: DetectedRegion) -> Self {
        TextRegion::new(
            NormalizedRect::new(region.min_x, region.min_y, region.max_x, region.max_y),
            region
                .characters
                .iter()
                .map(|c| CharacterBox::from_edges(c.min_x, c.min_y, c.max_x, c.max_y))
                .collect(),
        )
    }
}

/// 一个待 OCR 的裁剪框
///
/// `x/y/width/height` 是左上原点的像素坐标，`display_*` 是左上原点的归一化坐标，用于叠加层。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropPlan {
    pub region_index: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub display_x: f32,
    pub display_y: f32,
    pub display_width: f32,
    pub display_height: f32,
}

impl CropPlan {
    pub(crate) fn new(region_index: usize, crop: CropRect, display: DisplayRect) -> Self {
        Self {
            region_index: region_index as u32,
            x: crop.x,
            y: crop.y,
            width: crop.width,
            height: crop.height,
            display_x: display.x,
            display_y: display.y,
            display_width: display.width,
            display_height: display.height,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStatus {
    /// 达成共识的值，确认后不再变化
    pub confirmed: Option<String>,
    pub leader: Option<String>,
    pub leader_count: u32,
    pub distinct_values: u32,
    pub threshold: u32,
    pub stopped: bool,
}
