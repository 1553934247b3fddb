//! 候选提取 - 按区域裁剪、OCR、整理文本

use image::{imageops, RgbaImage};
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::error::ScanError;
use super::frame::Frame;
use super::geometry::{
    to_crop_rect, to_display_rect, to_pixel_rect, union_box, DisplayRect, PixelRect, TextRegion,
};
use super::ocr::{OcrConfig, OcrEngine};

/// LF, VT, FF, CR, NEL, LS, PS
const LINE_BREAKS: [char; 7] = [
    '\n', '\u{0B}', '\u{0C}', '\r', '\u{85}', '\u{2028}', '\u{2029}',
];

// CRLF 算一个换行
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    let class: String = LINE_BREAKS
        .iter()
        .map(|c| format!("\\x{{{:X}}}", u32::from(*c)))
        .collect();
    Regex::new(&format!(r"\r\n|[{}]", class)).expect("line break pattern")
});

/// 原始 OCR 文本 → 候选行
///
/// 去掉首尾换行，按行切分，逐行去空白，只保留长度大于 `min_len` 的行。
pub fn normalize_text(raw: &str, min_len: usize) -> Vec<String> {
    let text = raw.trim_matches(&LINE_BREAKS[..]);
    if text.is_empty() {
        return Vec::new();
    }

    LINE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|line| line.chars().count() > min_len)
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub text: String,
    pub rect: PixelRect,
    pub display_rect: DisplayRect,
    pub region_index: usize,
}

pub struct CandidateExtractor<E: OcrEngine> {
    engine: E,
    min_candidate_len: usize,
    ocr_calls: u64,
}

impl<E: OcrEngine> CandidateExtractor<E> {
    pub const DEFAULT_MIN_CANDIDATE_LEN: usize = 5;

    /// 配置 OCR 引擎（只配置这一次），失败则整个功能不可用
    pub fn new(mut engine: E, config: &OcrConfig, min_candidate_len: usize) -> Result<Self, ScanError> {
        config.validate()?;
        engine.configure(config)?;
        info!(
            "🔧 OCR engine configured: lang={}, segmentation={:?}, whitelist={} chars",
            config.language,
            config.segmentation,
            config.char_whitelist.chars().count()
        );

        Ok(Self {
            engine,
            min_candidate_len,
            ocr_calls: 0,
        })
    }

    /// 对一帧中的所有区域串行执行 OCR
    ///
    /// `cancelled` 在每次 OCR 调用前检查；取消后立即返回已有结果，由调用方丢弃。
    pub fn extract(
        &mut self,
        frame: &Frame,
        regions: &[TextRegion],
        cancelled: &dyn Fn() -> bool,
    ) -> Result<Vec<Candidate>, ScanError> {
        // 没有可裁剪的区域时不必复制、旋转整帧
        let extent = frame.oriented_extent();
        let croppable = regions.iter().any(|region| {
            union_box(&region.character_boxes)
                .and_then(|union| to_crop_rect(&to_pixel_rect(&union, extent), extent))
                .is_some()
        });
        if !croppable {
            debug!("Frame {}: no croppable region", frame.frame_number);
            return Ok(Vec::new());
        }

        let image = frame.oriented_image()?;
        let mut candidates = Vec::new();

        for (index, region) in regions.iter().enumerate() {
            if cancelled() {
                debug!("Extraction cancelled before region {}", index);
                break;
            }
            candidates.extend(self.extract_region(&image, index, region));
        }

        Ok(candidates)
    }

    /// Candidates from one region; an unusable crop yields none.
    pub fn extract_region(
        &mut self,
        image: &RgbaImage,
        region_index: usize,
        region: &TextRegion,
    ) -> Vec<Candidate> {
        let Some(union) = union_box(&region.character_boxes) else {
            debug!("Region {} has no character boxes, skipped", region_index);
            return Vec::new();
        };

        let extent = image.dimensions();
        let rect = to_pixel_rect(&union, extent);
        let Some(crop_rect) = to_crop_rect(&rect, extent) else {
            debug!(
                "Region {} crop {:?} outside {}x{}, skipped",
                region_index, rect, extent.0, extent.1
            );
            return Vec::new();
        };

        let crop = imageops::crop_imm(
            image,
            crop_rect.x,
            crop_rect.y,
            crop_rect.width,
            crop_rect.height,
        )
        .to_image();

        self.ocr_calls += 1;
        let Some(raw) = self.engine.recognize(&crop) else {
            return Vec::new();
        };

        let display_rect = to_display_rect(&union);
        normalize_text(&raw, self.min_candidate_len)
            .into_iter()
            .map(|text| Candidate {
                text,
                rect,
                display_rect,
                region_index,
            })
            .collect()
    }

    pub fn ocr_calls(&self) -> u64 {
        self.ocr_calls
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scan::geometry::{CharacterBox, NormalizedRect};
    use crate::core::scan::ocr::ScriptedOcrEngine;
    use std::sync::atomic::Ordering;

    fn region(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> TextRegion {
        TextRegion::new(
            NormalizedRect::new(min_x, min_y, max_x, max_y),
            vec![
                CharacterBox::from_edges(min_x, min_y, (min_x + max_x) / 2.0, max_y),
                CharacterBox::from_edges((min_x + max_x) / 2.0, min_y, max_x, max_y),
            ],
        )
    }

    fn frame() -> Frame {
        Frame::new(100, 80, vec![200u8; 100 * 80 * 4], 0, 1)
    }

    fn extractor(engine: ScriptedOcrEngine) -> CandidateExtractor<ScriptedOcrEngine> {
        CandidateExtractor::new(engine, &OcrConfig::default(), 5).unwrap()
    }

    #[test]
    fn test_normalize_length_boundary() {
        assert!(normalize_text("ABCDE", 5).is_empty());
        assert_eq!(normalize_text("ABCDEF", 5), vec!["ABCDEF"]);
    }

    #[test]
    fn test_normalize_splits_and_trims() {
        let raw = "\n\n  AB1234  \nXY\r\nCD5678\t\n\n";
        assert_eq!(normalize_text(raw, 5), vec!["AB1234", "CD5678"]);
    }

    #[test]
    fn test_normalize_splits_on_every_line_break() {
        for sep in LINE_BREAKS {
            let raw = format!("{sep}AB1234{sep}CD5678{sep}");
            assert_eq!(normalize_text(&raw, 5), vec!["AB1234", "CD5678"], "separator {:?}", sep);
        }
        assert_eq!(normalize_text("AB1234\r\nCD5678", 5), vec!["AB1234", "CD5678"]);
    }

    #[test]
    fn test_normalize_blank_input() {
        assert!(normalize_text("", 5).is_empty());
        assert!(normalize_text("\n\r\n", 5).is_empty());
        assert!(normalize_text("   ", 5).is_empty());
    }

    #[test]
    fn test_normalize_counts_characters_not_bytes() {
        assert!(normalize_text("ÄÖÜ12", 5).is_empty());
        assert_eq!(normalize_text("ÄÖÜ123", 5).len(), 1);
    }

    #[test]
    fn test_engine_configured_once_at_construction() {
        let extractor = extractor(ScriptedOcrEngine::repeating("AB1234"));
        let config = extractor.engine().configured().unwrap();
        assert_eq!(config.char_whitelist, "ABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890");
    }

    #[test]
    fn test_engine_init_failure() {
        let result = CandidateExtractor::new(ScriptedOcrEngine::failing(), &OcrConfig::default(), 5);
        assert!(matches!(result, Err(ScanError::OcrInit(_))));
    }

    #[test]
    fn test_extract_produces_candidate_per_line() {
        let mut extractor = extractor(ScriptedOcrEngine::new(vec![Some("AB1234\nCD5678\nXY")]));
        let candidates = extractor
            .extract(&frame(), &[region(0.3, 0.4, 0.7, 0.6)], &|| false)
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].text, "AB1234");
        assert_eq!(candidates[1].text, "CD5678");
        assert!((candidates[0].rect.x - 30.0).abs() < 1e-3);
        assert!((candidates[0].display_rect.y - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_extract_skips_region_outside_frame() {
        let engine = ScriptedOcrEngine::repeating("AB1234");
        let counter = engine.call_counter();
        let mut extractor = extractor(engine);

        let outside = TextRegion::new(
            NormalizedRect::new(0.3, 0.4, 0.7, 0.6),
            vec![CharacterBox::from_edges(1.5, 1.5, 1.8, 1.9)],
        );
        let candidates = extractor
            .extract(&frame(), &[outside, region(0.3, 0.4, 0.7, 0.6)], &|| false)
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].region_index, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extract_skips_region_without_boxes() {
        let mut extractor = extractor(ScriptedOcrEngine::repeating("AB1234"));
        let empty = TextRegion::new(NormalizedRect::new(0.3, 0.4, 0.7, 0.6), vec![]);
        let candidates = extractor.extract(&frame(), &[empty], &|| false).unwrap();
        assert!(candidates.is_empty());
        assert_eq!(extractor.ocr_calls(), 0);
    }

    #[test]
    fn test_extract_no_text() {
        let mut extractor = extractor(ScriptedOcrEngine::new(vec![None::<String>]));
        let candidates = extractor
            .extract(&frame(), &[region(0.3, 0.4, 0.7, 0.6)], &|| false)
            .unwrap();
        assert!(candidates.is_empty());
        assert_eq!(extractor.ocr_calls(), 1);
    }

    #[test]
    fn test_extract_stops_when_cancelled() {
        let mut extractor = extractor(ScriptedOcrEngine::repeating("AB1234"));
        let candidates = extractor
            .extract(
                &frame(),
                &[region(0.3, 0.4, 0.7, 0.6), region(0.3, 0.4, 0.6, 0.6)],
                &|| true,
            )
            .unwrap();
        assert!(candidates.is_empty());
        assert_eq!(extractor.ocr_calls(), 0);
    }

    #[test]
    fn test_extract_uses_oriented_extent() {
        let mut extractor = extractor(ScriptedOcrEngine::repeating("AB1234"));
        let rotated = frame().with_orientation(crate::core::scan::frame::Orientation::Right);
        let candidates = extractor
            .extract(&rotated, &[region(0.25, 0.4, 0.75, 0.6)], &|| false)
            .unwrap();

        // 校正后为 80x100
        assert_eq!(candidates[0].rect.x, 20.0);
        assert_eq!(candidates[0].rect.width, 40.0);
    }

    #[test]
    fn test_extract_skips_frame_without_croppable_region() {
        let mut extractor = extractor(ScriptedOcrEngine::repeating("AB1234"));
        // 缓冲区不完整，但没有区域落在图像内，所以不会去解码
        let bad = Frame::new(100, 80, vec![0u8; 16], 0, 3);
        let outside = TextRegion::new(
            NormalizedRect::new(0.3, 0.4, 0.7, 0.6),
            vec![CharacterBox::from_edges(1.5, 1.5, 1.8, 1.9)],
        );
        let candidates = extractor.extract(&bad, &[outside], &|| false).unwrap();
        assert!(candidates.is_empty());
        assert_eq!(extractor.ocr_calls(), 0);
    }

    #[test]
    fn test_extract_rejects_malformed_frame() {
        let mut extractor = extractor(ScriptedOcrEngine::repeating("AB1234"));
        let bad = Frame::new(100, 80, vec![0u8; 16], 0, 2);
        let result = extractor.extract(&bad, &[region(0.3, 0.4, 0.7, 0.6)], &|| false);
        assert!(matches!(result, Err(ScanError::InvalidFrame(_))));
    }
}
