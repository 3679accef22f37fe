//! Frame replay pipeline
//!
//! A reader thread parses landmark frames (one JSON object per line) and
//! pushes them into the bounded frame queue; the calling thread drains the
//! queue through the [`DrowsinessMonitor`] one frame at a time. The loop can
//! be stopped at any frame boundary and always ends in a finalized session.

use std::io::BufRead;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dms::{DmsError, DrowsinessMonitor, FrameReport, LandmarkFrame, SessionRecord};
use frame_queue::{FrameConsumer, FrameProducer, PushOutcome, QueueConfig, QueueError};
use thiserror::Error;
use tracing::{debug, info, warn};

/// How often the consumer re-checks the stop conditions while idle
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Monitor error: {0}")]
    Monitor(#[from] DmsError),

    #[error("Failed to start frame reader: {0}")]
    Reader(#[from] std::io::Error),
}

/// When to stop a replay early
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    /// Stop after this many processed frames
    pub max_frames: Option<u64>,
    /// Stop after this much wall-clock time
    pub auto_stop: Option<Duration>,
}

/// Why the frame loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfInput,
    MaxFrames,
    AutoStop,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct ReplaySummary {
    pub record: SessionRecord,
    pub stop_reason: StopReason,
    /// Lines that were not valid landmark frames
    pub malformed_lines: u64,
    /// Frames evicted by drop-oldest backpressure
    pub dropped_frames: u64,
    /// Frames whose report carried at least one fault
    pub faulted_frames: u64,
}

#[derive(Default)]
struct ReaderStats {
    malformed: AtomicU64,
}

/// Run `input` through `monitor` until input ends or a stop condition hits.
/// `on_report` sees every frame report in order.
pub fn replay<R, F>(
    input: R,
    mut monitor: DrowsinessMonitor,
    queue: &QueueConfig,
    options: &ReplayOptions,
    stop: Arc<AtomicBool>,
    mut on_report: F,
) -> Result<ReplaySummary, ReplayError>
where
    R: BufRead + Send + 'static,
    F: FnMut(&FrameReport),
{
    let (producer, consumer) = frame_queue::bounded::<LandmarkFrame>(queue);
    let stats = Arc::new(ReaderStats::default());

    let reader = {
        let stats = stats.clone();
        let stop = stop.clone();
        thread::Builder::new()
            .name("frame-reader".to_string())
            .spawn(move || read_frames(input, producer, &stats, &stop))?
    };

    info!("Session {} started", monitor.session_id());
    let deadline = options.auto_stop.map(|d| Instant::now() + d);
    let mut processed = 0u64;
    let mut faulted_frames = 0u64;

    let stop_reason = loop {
        if stop.load(Ordering::SeqCst) {
            break StopReason::Interrupted;
        }
        if options.max_frames.is_some_and(|max| processed >= max) {
            break StopReason::MaxFrames;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break StopReason::AutoStop;
        }

        let frame = match consumer.recv_timeout(POLL_INTERVAL) {
            Ok(frame) => frame,
            Err(QueueError::Timeout) => continue,
            Err(QueueError::Disconnected) => break StopReason::EndOfInput,
        };

        let report = monitor.process(&frame)?;
        processed += 1;
        if report.has_faults() {
            faulted_frames += 1;
        }
        on_report(&report);
    };

    let dropped_frames = consumer.dropped();
    shutdown_reader(consumer, reader, &stop);

    let record = monitor.finish()?;
    info!(
        "Session {} finished ({:?}): {} frames, {} events, {:.1}% drowsy",
        record.session_id,
        stop_reason,
        record.total_frames,
        record.events.len(),
        record.drowsiness_percentage()
    );

    Ok(ReplaySummary {
        record,
        stop_reason,
        malformed_lines: stats.malformed.load(Ordering::Relaxed),
        dropped_frames,
        faulted_frames,
    })
}

fn read_frames<R: BufRead>(
    input: R,
    producer: FrameProducer<LandmarkFrame>,
    stats: &ReaderStats,
    stop: &AtomicBool,
) {
    for (line_no, line) in input.lines().enumerate() {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Frame input read failed: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame: LandmarkFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Skipping malformed frame on line {}: {}", line_no + 1, e);
                stats.malformed.fetch_add(1, Ordering::Relaxed);
                continue;
            }
        };

        match producer.push(frame) {
            Ok(PushOutcome::Queued) => {}
            Ok(PushOutcome::Evicted(n)) => {
                metrics::counter!("dms_queue_dropped_frames_total").increment(n as u64);
            }
            // Monitor stopped consuming
            Err(_) => break,
        }
    }
    debug!("Frame reader finished");
}

fn shutdown_reader(
    consumer: FrameConsumer<LandmarkFrame>,
    reader: thread::JoinHandle<()>,
    stop: &AtomicBool,
) {
    stop.store(true, Ordering::SeqCst);
    drop(consumer);

    // A reader blocked on an interactive stdin cannot be woken; leave it
    if reader.is_finished() {
        if reader.join().is_err() {
            warn!("Frame reader thread panicked");
        }
    } else {
        debug!("Frame reader still blocked on input, detaching");
    }
}
