use log::debug;
use serde::{Deserialize, Serialize};

use super::error::ScanError;
use super::geometry::TextRegion;

/// 目标区域（归一化，左下原点）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetZone {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Default for TargetZone {
    fn default() -> Self {
        Self {
            min_x: 0.2,
            min_y: 0.35,
            max_x: 0.8,
            max_y: 0.65,
        }
    }
}

impl TargetZone {
    pub fn validate(&self) -> Result<(), ScanError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if ![self.min_x, self.min_y, self.max_x, self.max_y]
            .into_iter()
            .all(in_unit)
        {
            return Err(ScanError::InvalidConfig(format!(
                "target zone {:?} leaves [0, 1]",
                self
            )));
        }
        if self.min_x >= self.max_x || self.min_y >= self.max_y {
            return Err(ScanError::InvalidConfig(format!(
                "target zone {:?} is empty",
                self
            )));
        }
        Ok(())
    }

    /// 严格包含：贴边的区域不算
    pub fn contains(&self, region: &TextRegion) -> bool {
        let b = &region.bounds;
        b.min_x > self.min_x && b.min_y > self.min_y && b.max_x < self.max_x && b.max_y < self.max_y
    }
}

pub struct RegionFilter {
    zone: TargetZone,
}

impl RegionFilter {
    pub fn new(zone: TargetZone) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> &TargetZone {
        &self.zone
    }

    pub fn filter(&self, regions: Vec<TextRegion>) -> Vec<TextRegion> {
        let total = regions.len();
        let kept: Vec<TextRegion> = regions
            .into_iter()
            .filter(|r| r.bounds.is_normalized() && self.zone.contains(r))
            .collect();

        debug!("Region filter kept {}/{} regions", kept.len(), total);
        kept
    }
}

impl Default for RegionFilter {
    fn default() -> Self {
        Self::new(TargetZone::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreUpdate {
    /// 新的区域集合替换了旧集合
    Replaced(u64),
    /// 空结果，已存的集合保持不变
    Kept,
}

#[derive(Debug)]
struct RegionSet {
    generation: u64,
    regions: Vec<TextRegion>,
}

/// 保存最近一次非空检测结果
///
/// 每个集合带 generation，只能按 generation 取出一次，过期的取用拿不到数据。
#[derive(Debug, Default)]
pub struct RegionStore {
    current: Option<RegionSet>,
    next_generation: u64,
}

impl RegionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, regions: Vec<TextRegion>) -> StoreUpdate {
        if regions.is_empty() {
            return StoreUpdate::Kept;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.current = Some(RegionSet {
            generation,
            regions,
        });
        StoreUpdate::Replaced(generation)
    }

    pub fn generation(&self) -> Option<u64> {
        self.current.as_ref().map(|set| set.generation)
    }

    pub fn regions(&self) -> &[TextRegion] {
        self.current
            .as_ref()
            .map(|set| set.regions.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Consume the stored set if it is still the given generation.
    pub fn take(&mut self, generation: u64) -> Option<Vec<TextRegion>> {
        if self.generation() != Some(generation) {
            return None;
        }
        self.current.take().map(|set| set.regions)
    }

    pub fn clear(&mut self) {
        self.current = None;
    }
}
