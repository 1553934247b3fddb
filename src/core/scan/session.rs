//! 扫描会话 - 线程模型
//!
//! - 帧入口：深度为 1 的队列，忙时新帧直接丢弃
//! - 检测线程：执行外部检测器，结果以消息形式交回流水线线程
//! - 流水线线程：独占 `FrameScheduler`，OCR 与投票都在这里串行执行

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};

use super::config::ScanConfig;
use super::error::ScanError;
use super::frame::Frame;
use super::geometry::TextRegion;
use super::ocr::OcrEngine;
use super::scheduler::{FrameOutcome, FrameScheduler, ScanStats};
use super::text_detector::TextRegionDetector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// 上一帧还在处理，此帧被丢弃
    Busy,
    Stopped,
}

struct DetectionRequest {
    ticket: u64,
    frame: Arc<Frame>,
}

struct DetectionMessage {
    ticket: u64,
    result: Result<Vec<TextRegion>, ScanError>,
}

pub struct ScanSession {
    frame_tx: Option<SyncSender<Arc<Frame>>>,
    stopped: Arc<AtomicBool>,
    result: Arc<Mutex<Option<String>>>,
    stats: Arc<Mutex<ScanStats>>,
    busy_drops: AtomicU64,
    pipeline: Option<JoinHandle<()>>,
    detector: Option<JoinHandle<()>>,
}

impl ScanSession {
    /// 启动检测线程和流水线线程
    ///
    /// `on_complete` 最多调用一次，在流水线线程上执行；接收方负责停止相机。
    pub fn start<E, D, F>(
        config: &ScanConfig,
        engine: E,
        detector: D,
        on_complete: F,
    ) -> Result<Self, ScanError>
    where
        E: OcrEngine + 'static,
        D: TextRegionDetector + 'static,
        F: FnOnce(String) + Send + 'static,
    {
        let stopped = Arc::new(AtomicBool::new(false));
        let scheduler = FrameScheduler::new(engine, config)?.with_cancel_flag(Arc::clone(&stopped));

        let (frame_tx, frame_rx) = mpsc::sync_channel::<Arc<Frame>>(1);
        let (request_tx, request_rx) = mpsc::sync_channel::<DetectionRequest>(1);
        let (detection_tx, detection_rx) = mpsc::channel::<DetectionMessage>();

        let result = Arc::new(Mutex::new(None));
        let stats = Arc::new(Mutex::new(ScanStats::default()));

        let detector_handle = thread::Builder::new()
            .name("scan-detector".into())
            .spawn(move || run_detector(detector, request_rx, detection_tx))?;

        let worker = PipelineWorker {
            scheduler,
            frame_rx,
            request_tx,
            detection_rx,
            on_complete: Some(Box::new(on_complete)),
            result: Arc::clone(&result),
            stats: Arc::clone(&stats),
        };
        let pipeline_handle = thread::Builder::new()
            .name("scan-pipeline".into())
            .spawn(move || worker.run())?;

        info!(
            "📷 ScanSession: started (threshold {})",
            config.consensus_threshold
        );

        Ok(Self {
            frame_tx: Some(frame_tx),
            stopped,
            result,
            stats,
            busy_drops: AtomicU64::new(0),
            pipeline: Some(pipeline_handle),
            detector: Some(detector_handle),
        })
    }

    pub fn submit_frame(&self, frame: Frame) -> SubmitOutcome {
        if self.is_stopped() {
            return SubmitOutcome::Stopped;
        }
        let Some(tx) = &self.frame_tx else {
            return SubmitOutcome::Stopped;
        };

        match tx.try_send(Arc::new(frame)) {
            Ok(()) => SubmitOutcome::Accepted,
            Err(TrySendError::Full(frame)) => {
                self.busy_drops.fetch_add(1, Ordering::Relaxed);
                debug!("Pipeline busy, frame {} dropped", frame.frame_number);
                SubmitOutcome::Busy
            }
            Err(TrySendError::Disconnected(_)) => SubmitOutcome::Stopped,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// The confirmed value, once consensus has fired.
    pub fn result(&self) -> Option<String> {
        self.result.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn stats(&self) -> ScanStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }

    /// Frames rejected at intake because the pipeline was busy.
    pub fn busy_drops(&self) -> u64 {
        self.busy_drops.load(Ordering::Relaxed)
    }

    /// 只设置停止标志，不等待线程；任意线程可调用
    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// 停止会话并等待线程退出
    ///
    /// 正在进行的 OCR 调用会执行完，但结果被丢弃。在完成回调里调用时
    /// （即在流水线线程上）不等待，两个线程随后自行退出。
    pub fn stop(&mut self) {
        self.request_stop();
        self.frame_tx.take();

        let on_pipeline = self
            .pipeline
            .as_ref()
            .is_some_and(|h| h.thread().id() == thread::current().id());
        if on_pipeline {
            // 检测线程要等流水线线程释放请求通道才会退出，这里也不能 join
            debug!("ScanSession: stopped from pipeline worker, threads detached");
            self.pipeline.take();
            self.detector.take();
            return;
        }

        for (name, handle) in [("pipeline", self.pipeline.take()), ("detector", self.detector.take())] {
            if let Some(handle) = handle {
                if handle.join().is_err() {
                    error!("❌ ScanSession: {} worker panicked", name);
                }
            }
        }
    }
}

impl Drop for ScanSession {
    fn drop(&mut self) {
        self.stop();
        info!("🗑️ ScanSession: released");
    }
}

fn run_detector<D: TextRegionDetector>(
    detector: D,
    requests: Receiver<DetectionRequest>,
    results: Sender<DetectionMessage>,
) {
    for request in requests {
        let result = detector.detect(&request.frame);
        let message = DetectionMessage {
            ticket: request.ticket,
            result,
        };
        if results.send(message).is_err() {
            break;
        }
    }
    debug!("Detector worker exiting");
}

struct PipelineWorker<E: OcrEngine> {
    scheduler: FrameScheduler<E>,
    frame_rx: Receiver<Arc<Frame>>,
    request_tx: SyncSender<DetectionRequest>,
    detection_rx: Receiver<DetectionMessage>,
    on_complete: Option<Box<dyn FnOnce(String) + Send>>,
    result: Arc<Mutex<Option<String>>>,
    stats: Arc<Mutex<ScanStats>>,
}

impl<E: OcrEngine> PipelineWorker<E> {
    fn run(mut self) {
        while let Ok(frame) = self.frame_rx.recv() {
            for message in self.detection_rx.try_iter() {
                self.scheduler.on_detection(message.ticket, message.result);
            }

            let outcome = self.scheduler.on_frame(&frame);
            self.publish_stats();

            match outcome {
                FrameOutcome::DetectionRequested(ticket) => {
                    let request = DetectionRequest {
                        ticket,
                        frame: Arc::clone(&frame),
                    };
                    if let Err(e) = self.request_tx.try_send(request) {
                        let error = match e {
                            TrySendError::Full(_) => ScanError::Detection("detector busy".into()),
                            TrySendError::Disconnected(_) => ScanError::SessionClosed,
                        };
                        warn!("Detection request {} not sent: {}", ticket, error);
                        self.scheduler.on_detection(ticket, Err(error));
                    }
                }
                FrameOutcome::Confirmed(value) => {
                    self.complete(value);
                    break;
                }
                FrameOutcome::Ignored if self.scheduler.is_stopped() => break,
                _ => {}
            }
        }
        debug!("Pipeline worker exiting");
    }

    fn complete(&mut self, value: String) {
        if let Ok(mut slot) = self.result.lock() {
            *slot = Some(value.clone());
        }
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(value);
        }
    }

    fn publish_stats(&self) {
        if let Ok(mut stats) = self.stats.lock() {
            *stats = self.scheduler.stats();
        }
    }
}
