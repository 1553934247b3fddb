use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::error::ScanError;

/// 页面分割模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// 零散文字，适合单个编号/单词
    #[default]
    SparseText,
    SingleLine,
    SingleBlock,
    Auto,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub language: String,
    pub char_whitelist: String,
    pub segmentation: SegmentationMode,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: "eng".to_string(),
            char_whitelist: "ABCDEFGHIJKLMNOPQRSTUVWXYZ1234567890".to_string(),
            segmentation: SegmentationMode::SparseText,
        }
    }
}

impl OcrConfig {
    pub fn validate(&self) -> Result<(), ScanError> {
        if self.language.trim().is_empty() {
            return Err(ScanError::InvalidConfig("OCR language is empty".into()));
        }
        if self.char_whitelist.is_empty() {
            return Err(ScanError::InvalidConfig("OCR whitelist is empty".into()));
        }
        Ok(())
    }
}

/// 外部 OCR 引擎
///
/// `&mut self` 保证同一实例不会被并发调用。
pub trait OcrEngine: Send {
    /// Called exactly once, before the first `recognize`.
    fn configure(&mut self, config: &OcrConfig) -> Result<(), ScanError>;

    /// Multi-line text found in the crop, if any.
    fn recognize(&mut self, crop: &RgbaImage) -> Option<String>;
}

impl<E: OcrEngine + ?Sized> OcrEngine for Box<E> {
    fn configure(&mut self, config: &OcrConfig) -> Result<(), ScanError> {
        (**self).configure(config)
    }

    fn recognize(&mut self, crop: &RgbaImage) -> Option<String> {
        (**self).recognize(crop)
    }
}

/// 按脚本返回结果的 OCR 引擎（用于测试和演示）
pub struct ScriptedOcrEngine {
    responses: VecDeque<Option<String>>,
    fallback: Option<String>,
    delay: Option<Duration>,
    fail_configure: bool,
    configured: Option<OcrConfig>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedOcrEngine {
    /// Returns the responses in order, then `None` forever.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(|r| r.map(Into::into)).collect(),
            fallback: None,
            delay: None,
            fail_configure: false,
            configured: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Returns the same text for every crop.
    pub fn repeating(text: impl Into<String>) -> Self {
        let mut engine = Self::new(Vec::<Option<String>>::new());
        engine.fallback = Some(text.into());
        engine
    }

    /// Fails in `configure`, like an engine whose language data is missing.
    pub fn failing() -> Self {
        let mut engine = Self::new(Vec::<Option<String>>::new());
        engine.fail_configure = true;
        engine
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// 调用次数计数器，引擎被移走后仍可读取
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }

    pub fn configured(&self) -> Option<&OcrConfig> {
        self.configured.as_ref()
    }
}

impl OcrEngine for ScriptedOcrEngine {
    fn configure(&mut self, config: &OcrConfig) -> Result<(), ScanError> {
        if self.fail_configure {
            return Err(ScanError::OcrInit(format!(
                "no trained data for language '{}'",
                config.language
            )));
        }
        self.configured = Some(config.clone());
        Ok(())
    }

    fn recognize(&mut self, _crop: &RgbaImage) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        match self.responses.pop_front() {
            Some(response) => response,
            None => self.fallback.clone(),
        }
    }
}
