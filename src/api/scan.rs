//! 文字扫描器 - 平台侧检测与 OCR，Rust 侧过滤、裁剪规划与共识投票

use crate::api::models::scan::{CropPlan, DetectedRegion, ScanSettings, ScanStatus};
use crate::core::scan::{
    normalize_text, to_crop_rect, to_display_rect, to_pixel_rect, union_box, ConsensusVoter,
    RegionFilter, RegionStore, ScanConfig, ScanError, StoreUpdate, TextRegion, Vote,
};
use flutter_rust_bridge::frb;
use log::{debug, info};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// 文字扫描器
///
/// ```dart
/// final scanner = TextScanner.create(settings: ScanSettings.default_());
/// scanner.updateRegions(regions: detected);
/// for (final plan in scanner.takeCropPlans(imageWidth: w, imageHeight: h)) {
///   final status = scanner.submitText(raw: await ocr(plan));
///   if (status.confirmed != null) break;
/// }
/// ```
#[frb(opaque)]
pub struct TextScanner {
    config: ScanConfig,
    state: Mutex<ScannerState>,
}

struct ScannerState {
    filter: RegionFilter,
    store: RegionStore,
    voter: ConsensusVoter,
    confirmed: Option<String>,
}

impl ScannerState {
    fn new(config: &ScanConfig) -> Self {
        Self {
            filter: RegionFilter::new(config.target_zone),
            store: RegionStore::new(),
            voter: ConsensusVoter::with_threshold(config.consensus_threshold),
            confirmed: None,
        }
    }

    fn status(&self) -> ScanStatus {
        let leader = self.voter.leader();
        ScanStatus {
            confirmed: self.confirmed.clone(),
            leader: leader.map(|r| r.value.clone()),
            leader_count: leader.map(|r| r.count).unwrap_or(0),
            distinct_values: self.voter.len() as u32,
            threshold: self.voter.threshold(),
            stopped: self.confirmed.is_some(),
        }
    }
}

impl TextScanner {
    /// 创建扫描器，参数非法时返回错误
    #[frb(sync)]
    pub fn create(settings: ScanSettings) -> Result<Self, ScanError> {
        crate::init_logging();
        Self::with_config(settings.into())
    }

    /// 从 JSON 创建，缺省字段使用默认值
    #[frb(sync)]
    pub fn create_from_json(json: String) -> Result<Self, ScanError> {
        crate::init_logging();
        Self::with_config(ScanConfig::from_json(&json)?)
    }

    fn with_config(config: ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        info!(
            "📷 TextScanner: created (threshold {}, min length {})",
            config.consensus_threshold, config.min_candidate_len
        );
        Ok(Self {
            state: Mutex::new(ScannerState::new(&config)),
            config,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ScannerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 提交一次检测结果
    ///
    /// 只保留目标区域内的区域；过滤后为空时沿用上一次的结果。返回是否替换了已存区域。
    #[frb(sync)]
    pub fn update_regions(&self, regions: Vec<DetectedRegion>) -> bool {
        let mut state = self.lock();
        if state.confirmed.is_some() {
            return false;
        }

        let detected = regions.len();
        let regions: Vec<TextRegion> = regions.into_iter().map(TextRegion::from).collect();
        let kept = state.filter.filter(regions);
        debug!("Regions: {} detected, {} in target zone", detected, kept.len());

        matches!(state.store.apply(kept), StoreUpdate::Replaced(_))
    }

    /// 取出已存区域并生成裁剪框（每组区域只能取一次）
    ///
    /// `image_width`/`image_height` 是方向校正后的图像尺寸。
    #[frb(sync)]
    pub fn take_crop_plans(&self, image_width: u32, image_height: u32) -> Vec<CropPlan> {
        let mut state = self.lock();
        if state.confirmed.is_some() {
            return Vec::new();
        }
        let regions = match state.store.generation() {
            Some(generation) => state.store.take(generation).unwrap_or_default(),
            None => return Vec::new(),
        };

        let extent = (image_width, image_height);
        regions
            .iter()
            .enumerate()
            .filter_map(|(index, region)| {
                let union = union_box(&region.character_boxes)?;
                let rect = to_pixel_rect(&union, extent);
                match to_crop_rect(&rect, extent) {
                    Some(crop) => Some(CropPlan::new(index, crop, to_display_rect(&union))),
                    None => {
                        debug!("Region {} crop outside {}x{}, skipped", index, image_width, image_height);
                        None
                    }
                }
            })
            .collect()
    }

    /// 提交一个裁剪框的 OCR 原文
    ///
    /// 首次达到阈值即确认；确认后提交的文本全部丢弃。
    #[frb(sync)]
    pub fn submit_text(&self, raw: String) -> ScanStatus {
        let mut state = self.lock();
        if state.confirmed.is_none() {
            for candidate in normalize_text(&raw, self.config.min_candidate_len) {
                if let Vote::Reached(value) = state.voter.append_candidate(&candidate) {
                    state.confirmed = Some(value);
                    state.store.clear();
                    break;
                }
            }
        }
        state.status()
    }

    #[frb(sync, getter)]
    pub fn status(&self) -> ScanStatus {
        self.lock().status()
    }

    #[frb(sync, getter)]
    pub fn settings(&self) -> ScanSettings {
        self.config.clone().into()
    }

    /// 清空计票和已存区域，重新开始扫描
    #[frb(sync)]
    pub fn reset(&self) {
        *self.lock() = ScannerState::new(&self.config);
        info!("🔄 TextScanner: reset");
    }
}

impl Drop for TextScanner {
    fn drop(&mut self) {
        info!("🗑️ TextScanner: released");
    }
}
