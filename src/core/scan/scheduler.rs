use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::config::ScanConfig;
use super::error::ScanError;
use super::extractor::CandidateExtractor;
use super::frame::Frame;
use super::geometry::TextRegion;
use super::ocr::OcrEngine;
use super::region_filter::{RegionFilter, RegionStore};
use super::state_machine::{ScanAction, ScanEvent, ScanState, StateMachine};
use super::text_detector::TextRegionDetector;
use super::voter::{ConsensusVoter, Vote};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// 会话已停止
    Ignored,
    /// 检测或提取进行中，丢弃此帧
    Dropped,
    /// 调用方需要用此帧发起检测，并带回 ticket
    DetectionRequested(u64),
    Extracted { candidates: usize },
    Confirmed(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub frames_seen: u64,
    pub frames_dropped: u64,
    pub detections: u64,
    pub detection_failures: u64,
    pub regions_extracted: u64,
    /// OCR 产生的候选行
    pub candidates: u64,
    /// 实际投出的票，确认后剩余的候选不计
    pub votes: u64,
}

/// 单帧调度：检测结果生命周期 + 提取 + 投票
///
/// 所有方法都在同一个执行上下文中调用；OCR 和投票因此天然串行。
pub struct FrameScheduler<E: OcrEngine> {
    machine: StateMachine,
    filter: RegionFilter,
    store: RegionStore,
    extractor: CandidateExtractor<E>,
    voter: ConsensusVoter,
    cancel: Arc<AtomicBool>,
    confirmed: Option<String>,
    stats: ScanStats,
}

impl<E: OcrEngine> FrameScheduler<E> {
    pub fn new(engine: E, config: &ScanConfig) -> Result<Self, ScanError> {
        config.validate()?;
        let extractor = CandidateExtractor::new(engine, &config.ocr, config.min_candidate_len)?;

        Ok(Self {
            machine: StateMachine::new(),
            filter: RegionFilter::new(config.target_zone),
            store: RegionStore::new(),
            extractor,
            voter: ConsensusVoter::with_threshold(config.consensus_threshold),
            cancel: Arc::new(AtomicBool::new(false)),
            confirmed: None,
            stats: ScanStats::default(),
        })
    }

    /// Share a stop flag with another thread.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn on_frame(&mut self, frame: &Frame) -> FrameOutcome {
        self.stats.frames_seen += 1;
        self.step(frame)
    }

    fn step(&mut self, frame: &Frame) -> FrameOutcome {
        if self.is_cancelled() && !self.machine.is_stopped() {
            self.stop();
        }

        match self.machine.process(ScanEvent::FrameArrived) {
            ScanAction::RequestDetection(ticket) => {
                debug!("Frame {}: detection requested (ticket {})", frame.frame_number, ticket);
                FrameOutcome::DetectionRequested(ticket)
            }
            ScanAction::Extract(generation) => self.extract(frame, generation),
            ScanAction::DropFrame => {
                self.stats.frames_dropped += 1;
                FrameOutcome::Dropped
            }
            _ => FrameOutcome::Ignored,
        }
    }

    /// 检测完成回调的结果
    ///
    /// 非空结果替换已存区域；空结果保留已存区域；错误不改变任何状态。
    pub fn on_detection(&mut self, ticket: u64, result: Result<Vec<TextRegion>, ScanError>) {
        if self.machine.awaiting() != Some(ticket) {
            debug!("Stale detection result (ticket {}) ignored", ticket);
            return;
        }

        match result {
            Ok(regions) => {
                self.stats.detections += 1;
                let kept = self.filter.filter(regions);
                self.store.apply(kept);
            }
            Err(e) => {
                self.stats.detection_failures += 1;
                warn!("Detection failed, frame skipped: {}", e);
            }
        }

        self.machine.process(ScanEvent::DetectionFinished {
            ticket,
            stored: self.store.generation(),
        });
    }

    fn extract(&mut self, frame: &Frame, generation: u64) -> FrameOutcome {
        let regions = self.store.take(generation).unwrap_or_default();
        self.stats.regions_extracted += regions.len() as u64;

        let cancel = &self.cancel;
        let candidates = match self
            .extractor
            .extract(frame, &regions, &|| cancel.load(Ordering::SeqCst))
        {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Frame {} skipped: {}", frame.frame_number, e);
                Vec::new()
            }
        };

        if self.is_cancelled() {
            debug!(
                "Stopped during OCR, discarding {} candidates from frame {}",
                candidates.len(),
                frame.frame_number
            );
            self.stop();
            return FrameOutcome::Ignored;
        }

        self.stats.candidates += candidates.len() as u64;

        let mut confirmed = None;
        for candidate in &candidates {
            self.stats.votes += 1;
            if let Vote::Reached(value) = self.voter.append_candidate(&candidate.text) {
                confirmed = Some(value);
                break;
            }
        }

        match confirmed {
            Some(value) => {
                self.machine
                    .process(ScanEvent::ExtractionFinished { confirmed: true });
                self.cancel.store(true, Ordering::SeqCst);
                info!(
                    "✅ Frame {}: confirmed '{}' after {} frames",
                    frame.frame_number, value, self.stats.frames_seen
                );
                self.confirmed = Some(value.clone());
                FrameOutcome::Confirmed(value)
            }
            None => {
                if self
                    .machine
                    .process(ScanEvent::ExtractionFinished { confirmed: false })
                    == ScanAction::ClearRegions
                {
                    self.store.clear();
                }
                FrameOutcome::Extracted {
                    candidates: candidates.len(),
                }
            }
        }
    }

    /// 同步检测：对同一帧先检测再提取
    pub fn process_frame(
        &mut self,
        frame: &Frame,
        detector: &dyn TextRegionDetector,
    ) -> Option<String> {
        match self.on_frame(frame) {
            FrameOutcome::DetectionRequested(ticket) => {
                self.on_detection(ticket, detector.detect(frame));
                if !matches!(self.machine.current_state(), ScanState::RegionsReady { .. }) {
                    return None;
                }
                match self.step(frame) {
                    FrameOutcome::Confirmed(value) => Some(value),
                    _ => None,
                }
            }
            FrameOutcome::Confirmed(value) => Some(value),
            _ => None,
        }
    }

    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        if self.machine.process(ScanEvent::Stop) == ScanAction::Halt {
            info!("🛑 Scan stopped");
        }
        self.store.clear();
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> &ScanState {
        self.machine.current_state()
    }

    pub fn is_stopped(&self) -> bool {
        self.machine.is_stopped()
    }

    pub fn confirmed(&self) -> Option<&str> {
        self.confirmed.as_deref()
    }

    pub fn stored_regions(&self) -> &[TextRegion] {
        self.store.regions()
    }

    pub fn voter(&self) -> &ConsensusVoter {
        &self.voter
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.machine.reset();
        self.store.clear();
        self.voter.reset();
        self.cancel.store(false, Ordering::SeqCst);
        self.confirmed = None;
        self.stats = ScanStats::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::scan::geometry::{CharacterBox, NormalizedRect};
    use crate::core::scan::ocr::ScriptedOcrEngine;
    use crate::core::scan::text_detector::MockRegionDetector;
    use std::sync::atomic::Ordering;

    fn create_test_frame(frame_number: u64) -> Frame {
        Frame::new(100, 100, vec![180u8; 100 * 100 * 4], frame_number * 33, frame_number)
    }

    fn region(min_x: f32, max_x: f32) -> TextRegion {
        TextRegion::new(
            NormalizedRect::new(min_x, 0.4, max_x, 0.6),
            vec![CharacterBox::from_edges(min_x, 0.4, max_x, 0.6)],
        )
    }

    fn scheduler(engine: ScriptedOcrEngine, threshold: u32) -> FrameScheduler<ScriptedOcrEngine> {
        let config = ScanConfig {
            consensus_threshold: threshold,
            ..Default::default()
        };
        FrameScheduler::new(engine, &config).unwrap()
    }

    #[test]
    fn test_threshold_scenario_through_pipeline() {
        let engine = ScriptedOcrEngine::new(vec![
            Some("AB1234"),
            Some("AB1234"),
            Some("XY"),
            Some("AB1234"),
        ]);
        let mut scheduler = scheduler(engine, 3);
        let detector = MockRegionDetector::with_regions(vec![region(0.3, 0.7)]);

        let mut results = Vec::new();
        for i in 1..=6 {
            results.push(scheduler.process_frame(&create_test_frame(i), &detector));
        }

        assert!(results[..3].iter().all(Option::is_none));
        assert_eq!(results[3], Some("AB1234".to_string()));
        assert_eq!(results[4], None);
        assert!(scheduler.is_stopped());
        assert_eq!(scheduler.confirmed(), Some("AB1234"));
        assert_eq!(scheduler.voter().count("AB1234"), 3);
        assert_eq!(scheduler.voter().count("XY"), 0);
    }

    #[test]
    fn test_first_crossing_discards_rest_of_frame() {
        let engine = ScriptedOcrEngine::new(vec![Some("AAAAAA\nBBBBBB"), Some("BBBBBB\nAAAAAA\nCCCCCC")]);
        let mut scheduler = scheduler(engine, 2);
        let detector = MockRegionDetector::with_regions(vec![region(0.3, 0.7)]);

        assert_eq!(scheduler.process_frame(&create_test_frame(1), &detector), None);
        assert_eq!(
            scheduler.process_frame(&create_test_frame(2), &detector),
            Some("BBBBBB".to_string())
        );
        assert_eq!(scheduler.voter().count("AAAAAA"), 1);
        assert_eq!(scheduler.voter().count("CCCCCC"), 0);

        // 第二帧三行候选，确认后只投了一票
        let stats = scheduler.stats();
        assert_eq!(stats.candidates, 5);
        assert_eq!(stats.votes, 3);
        assert_eq!(stats.frames_seen, 2);
    }

    #[test]
    fn test_async_flow_uses_next_frame() {
        let mut scheduler = scheduler(ScriptedOcrEngine::repeating("AB1234"), 10);

        let ticket = match scheduler.on_frame(&create_test_frame(1)) {
            FrameOutcome::DetectionRequested(t) => t,
            other => panic!("unexpected outcome {:?}", other),
        };
        assert_eq!(scheduler.on_frame(&create_test_frame(2)), FrameOutcome::Dropped);

        scheduler.on_detection(ticket, Ok(vec![region(0.3, 0.7), region(0.4, 0.6)]));
        assert!(matches!(scheduler.state(), ScanState::RegionsReady { .. }));

        assert_eq!(
            scheduler.on_frame(&create_test_frame(3)),
            FrameOutcome::Extracted { candidates: 2 }
        );
        assert!(scheduler.stored_regions().is_empty());
        assert_eq!(scheduler.state(), &ScanState::Idle);
        assert_eq!(scheduler.stats().frames_dropped, 1);
    }

    #[test]
    fn test_regions_outside_zone_are_not_stored() {
        let mut scheduler = scheduler(ScriptedOcrEngine::repeating("AB1234"), 10);
        let FrameOutcome::DetectionRequested(ticket) = scheduler.on_frame(&create_test_frame(1)) else {
            panic!("detection expected");
        };

        scheduler.on_detection(ticket, Ok(vec![region(0.1, 0.5)]));
        assert_eq!(scheduler.state(), &ScanState::Idle);
        assert!(scheduler.stored_regions().is_empty());
    }

    #[test]
    fn test_detection_error_skips_frame() {
        let mut scheduler = scheduler(ScriptedOcrEngine::repeating("AB1234"), 1);
        let detector = MockRegionDetector::failing();

        for i in 1..=3 {
            assert_eq!(scheduler.process_frame(&create_test_frame(i), &detector), None);
        }
        assert!(scheduler.voter().is_empty());
        assert_eq!(scheduler.stats().detection_failures, 3);
        assert_eq!(scheduler.state(), &ScanState::Idle);
    }

    #[test]
    fn test_stale_detection_ignored() {
        let mut scheduler = scheduler(ScriptedOcrEngine::repeating("AB1234"), 10);
        scheduler.on_frame(&create_test_frame(1));

        scheduler.on_detection(99, Ok(vec![region(0.3, 0.7)]));
        assert!(scheduler.stored_regions().is_empty());
        assert!(matches!(scheduler.state(), ScanState::Detecting { .. }));
    }

    #[test]
    fn test_crop_outside_frame_no_vote() {
        let mut scheduler = scheduler(ScriptedOcrEngine::repeating("AB1234"), 1);
        let bad_boxes = TextRegion::new(
            NormalizedRect::new(0.3, 0.4, 0.7, 0.6),
            vec![CharacterBox::from_edges(1.2, 1.2, 1.4, 1.4)],
        );
        let detector = MockRegionDetector::with_regions(vec![bad_boxes]);

        assert_eq!(scheduler.process_frame(&create_test_frame(1), &detector), None);
        assert!(scheduler.voter().is_empty());
        assert!(!scheduler.is_stopped());
    }

    #[test]
    fn test_stop_discards_and_ignores_frames() {
        let mut scheduler = scheduler(ScriptedOcrEngine::repeating("AB1234"), 1);
        let detector = MockRegionDetector::with_regions(vec![region(0.3, 0.7)]);

        scheduler.stop();
        assert_eq!(scheduler.process_frame(&create_test_frame(1), &detector), None);
        assert_eq!(scheduler.on_frame(&create_test_frame(2)), FrameOutcome::Ignored);
        assert!(scheduler.voter().is_empty());
    }

    #[test]
    fn test_external_cancel_flag() {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut scheduler =
            scheduler(ScriptedOcrEngine::repeating("AB1234"), 5).with_cancel_flag(Arc::clone(&cancel));
        let FrameOutcome::DetectionRequested(ticket) = scheduler.on_frame(&create_test_frame(1)) else {
            panic!("detection expected");
        };
        scheduler.on_detection(ticket, Ok(vec![region(0.3, 0.7)]));

        cancel.store(true, Ordering::SeqCst);
        assert_eq!(scheduler.on_frame(&create_test_frame(2)), FrameOutcome::Ignored);
        assert!(scheduler.is_stopped());
        assert!(scheduler.voter().is_empty());
    }

    #[test]
    fn test_reset_starts_new_session() {
        let mut scheduler = scheduler(ScriptedOcrEngine::repeating("AB1234"), 1);
        let detector = MockRegionDetector::with_regions(vec![region(0.3, 0.7)]);

        assert!(scheduler.process_frame(&create_test_frame(1), &detector).is_some());
        scheduler.reset();

        assert!(!scheduler.is_stopped());
        assert!(scheduler.confirmed().is_none());
        assert_eq!(scheduler.stats(), ScanStats::default());
        assert!(scheduler.process_frame(&create_test_frame(2), &detector).is_some());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ScanConfig {
            consensus_threshold: 0,
            ..Default::default()
        };
        assert!(FrameScheduler::new(ScriptedOcrEngine::repeating("AB1234"), &config).is_err());
    }
}
