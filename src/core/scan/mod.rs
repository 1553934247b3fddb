pub mod config;
pub mod error;
pub mod extractor;
pub mod frame;
pub mod geometry;
pub mod ocr;
pub mod region_filter;
pub mod scheduler;
pub mod session;
pub mod state_machine;
pub mod text_detector;
pub mod voter;

pub use config::ScanConfig;
pub use error::ScanError;
pub use extractor::{normalize_text, Candidate, CandidateExtractor};
pub use frame::{Frame, Orientation, RawFrame};
pub use geometry::{
    to_crop_rect, to_display_rect, to_pixel_rect, union_box, CharacterBox, CropRect, DisplayRect,
    NormalizedRect, PixelRect, Point, TextRegion, UnionBox,
};
pub use ocr::{OcrConfig, OcrEngine, ScriptedOcrEngine, SegmentationMode};
pub use region_filter::{RegionFilter, RegionStore, StoreUpdate, TargetZone};
pub use scheduler::{FrameOutcome, FrameScheduler, ScanStats};
pub use session::{ScanSession, SubmitOutcome};
pub use state_machine::{ScanState, StateMachine};
pub use text_detector::{MockRegionDetector, TextRegionDetector};
pub use voter::{ConsensusVoter, Vote, VoteRecord};
