use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Text detection failed: {0}")]
    Detection(String),
    #[error("OCR engine init failed: {0}")]
    OcrInit(String),
    #[error("Failed to spawn worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    #[error("Scan session closed")]
    SessionClosed,
}
