use std::sync::Arc;

use super::error::ScanError;
use super::frame::Frame;
use super::geometry::TextRegion;

/// 外部文字区域检测器
///
/// 返回的坐标基于方向校正后的图像，归一化、左下原点，且需带字符框。
pub trait TextRegionDetector: Send + Sync {
    fn detect(&self, frame: &Frame) -> Result<Vec<TextRegion>, ScanError>;
}

impl<D: TextRegionDetector + ?Sized> TextRegionDetector for Box<D> {
    fn detect(&self, frame: &Frame) -> Result<Vec<TextRegion>, ScanError> {
        (**self).detect(frame)
    }
}

impl<D: TextRegionDetector + ?Sized> TextRegionDetector for Arc<D> {
    fn detect(&self, frame: &Frame) -> Result<Vec<TextRegion>, ScanError> {
        (**self).detect(frame)
    }
}

type DetectFn = dyn Fn(u64) -> Result<Vec<TextRegion>, ScanError> + Send + Sync;

pub struct MockRegionDetector {
    // 按帧编号返回检测结果
    pattern: Option<Box<DetectFn>>,
}

impl MockRegionDetector {
    /// Detects nothing.
    pub fn new() -> Self {
        Self { pattern: None }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Result<Vec<TextRegion>, ScanError> + Send + Sync + 'static,
    {
        Self {
            pattern: Some(Box::new(pattern)),
        }
    }

    /// Same regions for every frame.
    pub fn with_regions(regions: Vec<TextRegion>) -> Self {
        Self::with_pattern(move |_| Ok(regions.clone()))
    }

    pub fn with_fixed_frames(frames: Vec<u64>, regions: Vec<TextRegion>) -> Self {
        Self::with_pattern(move |frame_num| {
            if frames.contains(&frame_num) {
                Ok(regions.clone())
            } else {
                Ok(Vec::new())
            }
        })
    }

    pub fn failing() -> Self {
        Self::with_pattern(|frame_num| {
            Err(ScanError::Detection(format!(
                "request failed for frame {}",
                frame_num
            )))
        })
    }
}

impl Default for MockRegionDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRegionDetector for MockRegionDetector {
    fn detect(&self, frame: &Frame) -> Result<Vec<TextRegion>, ScanError> {
        self.pattern
            .as_ref()
            .map(|p| p(frame.frame_number))
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}
