//! Detection loop
//!
//! Single sequential stream: pull a frame, maybe classify it, maybe emit an
//! item. Runs on a dedicated thread because `FrameSource::next_frame` may
//! block. Operator commands arrive over an unbounded channel and are drained
//! once per iteration; finished items leave through a bounded channel and
//! are never waited on.
//!
//! **Modes:**
//! - `Idle`: frames are pulled and discarded
//! - `Continuous`: every `interval`-th frame is classified and emitted
//! - `ManualTrigger`: transient, held only while a trigger-once cycle runs

use crate::classifier::Classifier;
use crate::enrich::Enricher;
use crate::error::{Error, Result};
use crate::frame::{Frame, FrameSource};
use rand::rngs::StdRng;
use rand::Rng;
use smartbin_common::Item;
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tracing::{debug, error, info, warn};

/// Default number of frames between continuous detections
pub const DEFAULT_DETECTION_INTERVAL: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    ManualTrigger,
    Continuous,
}

/// Operator input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Classify the most recent frame now
    TriggerOnce,
    /// Flip between Idle and Continuous
    ToggleContinuous,
    Quit,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    EndOfStream,
    Quit,
    /// Nobody is left to receive items
    OutboundClosed,
}

/// Counters kept across the life of one loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub frames: u64,
    pub cycles: u64,
    pub emitted: u64,
    pub classify_failures: u64,
    pub enrich_failures: u64,
    /// Items discarded because the outbound buffer was full
    pub dropped: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopReport {
    pub exit: LoopExit,
    pub stats: LoopStats,
}

pub struct DetectionLoop<S, C, R = StdRng> {
    source: S,
    classifier: C,
    enricher: Enricher<R>,
    mode: Mode,
    interval: u32,
    counter: u32,
    commands: mpsc::UnboundedReceiver<Command>,
    outbound: mpsc::Sender<Item>,
    current: Option<Frame>,
    stats: LoopStats,
}

impl<S, C, R> DetectionLoop<S, C, R>
where
    S: FrameSource,
    C: Classifier,
    R: Rng,
{
    /// New loop in `Idle`; an interval of 0 is treated as 1
    pub fn new(
        source: S,
        classifier: C,
        enricher: Enricher<R>,
        interval: u32,
        commands: mpsc::UnboundedReceiver<Command>,
        outbound: mpsc::Sender<Item>,
    ) -> Self {
        Self {
            source,
            classifier,
            enricher,
            mode: Mode::Idle,
            interval: interval.max(1),
            counter: 0,
            commands,
            outbound,
            current: None,
            stats: LoopStats::default(),
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    /// Run until end of stream, quit, or a fatal source failure
    pub fn run(mut self) -> Result<LoopReport> {
        info!(
            "Detection loop started: source={}, model={}, interval={}",
            self.source.describe(),
            self.classifier.name(),
            self.interval
        );
        loop {
            if let Some(exit) = self.step()? {
                info!(
                    "Detection loop stopped ({:?}): {} frames, {} detections, {} failures",
                    exit,
                    self.stats.frames,
                    self.stats.emitted,
                    self.stats.classify_failures + self.stats.enrich_failures
                );
                return Ok(LoopReport {
                    exit,
                    stats: self.stats,
                });
            }
        }
    }

    /// One iteration: pull, continuous tick, then drain operator commands
    pub fn step(&mut self) -> Result<Option<LoopExit>> {
        match self.source.next_frame() {
            Ok(Some(frame)) => {
                self.stats.frames += 1;
                self.current = Some(frame);
            }
            Ok(None) => {
                info!("Frame source {} reached end of stream", self.source.describe());
                return Ok(Some(LoopExit::EndOfStream));
            }
            Err(e) => {
                error!("Frame source failure: {}", e);
                return Err(Error::Source(e));
            }
        }

        if self.mode == Mode::Continuous {
            self.counter += 1;
            if self.counter >= self.interval {
                self.counter = 0;
                if let Some(exit) = self.cycle() {
                    return Ok(Some(exit));
                }
            }
        }

        loop {
            let command = match self.commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            };
            if let Some(exit) = self.apply(command) {
                return Ok(Some(exit));
            }
        }

        Ok(None)
    }

    fn apply(&mut self, command: Command) -> Option<LoopExit> {
        match command {
            Command::Quit => {
                info!("Quit requested");
                Some(LoopExit::Quit)
            }
            Command::ToggleContinuous => {
                self.mode = match self.mode {
                    Mode::Continuous => Mode::Idle,
                    _ => Mode::Continuous,
                };
                self.counter = 0;
                let state = if self.mode == Mode::Continuous { "ON" } else { "OFF" };
                info!("Continuous detection {}", state);
                None
            }
            Command::TriggerOnce => {
                let previous = self.mode;
                self.mode = Mode::ManualTrigger;
                let exit = self.cycle();
                self.mode = previous;
                exit
            }
        }
    }

    /// Classify, enrich and emit the current frame
    fn cycle(&mut self) -> Option<LoopExit> {
        let frame = match self.current.as_ref() {
            Some(frame) => frame,
            None => {
                debug!("No frame captured yet, skipping detection");
                return None;
            }
        };
        self.stats.cycles += 1;

        let result = match self.classifier.classify(frame) {
            Ok(result) => result,
            Err(e) => {
                warn!("Classification failed on frame {}: {}", frame.sequence, e);
                self.stats.classify_failures += 1;
                return None;
            }
        };

        let item = match self.enricher.enrich(&result, frame) {
            Ok(item) => item,
            Err(e) => {
                warn!("Could not build item from frame {}: {}", frame.sequence, e);
                self.stats.enrich_failures += 1;
                return None;
            }
        };

        info!(
            mode = ?self.mode,
            confidence = result.confidence,
            "Detected {} | class={} recyclable={} bin={} weight={} at {}",
            item.item_type,
            item.class,
            item.recyclable,
            item.bin,
            item.weight,
            item.timestamp
        );

        match self.outbound.try_send(item) {
            Ok(()) => {
                self.stats.emitted += 1;
                None
            }
            Err(TrySendError::Full(item)) => {
                warn!("Outbound buffer full, dropping {}", item.label());
                self.stats.dropped += 1;
                None
            }
            Err(TrySendError::Closed(_)) => {
                warn!("Item forwarder has stopped");
                Some(LoopExit::OutboundClosed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::ClassificationResult;
    use crate::enrich::EnrichOptions;
    use crate::error::{ClassifyError, SourceError};
    use crate::taxonomy::Taxonomy;
    use image::RgbImage;
    use std::path::PathBuf;
    use std::sync::Arc;

    /// Yields `count` blank frames, then an optional failure, then end of stream
    struct ScriptedSource {
        remaining: u64,
        next: u64,
        fail_at_end: bool,
    }

    impl ScriptedSource {
        fn frames(count: u64) -> Self {
            Self {
                remaining: count,
                next: 0,
                fail_at_end: false,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn next_frame(&mut self) -> std::result::Result<Option<Frame>, SourceError> {
            if self.remaining == 0 {
                if self.fail_at_end {
                    return Err(SourceError::Open {
                        path: PathBuf::from("/dev/video0"),
                        reason: "device unplugged".to_string(),
                    });
                }
                return Ok(None);
            }
            self.remaining -= 1;
            let frame = Frame::new(RgbImage::new(4, 4), self.next);
            self.next += 1;
            Ok(Some(frame))
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    /// Always class 0, except on listed frame sequences where it fails
    struct ScriptedClassifier {
        failing: Vec<u64>,
    }

    impl Classifier for ScriptedClassifier {
        fn classify(&self, frame: &Frame) -> std::result::Result<ClassificationResult, ClassifyError> {
            if self.failing.contains(&frame.sequence) {
                return Err(ClassifyError::Inference("scripted failure".to_string()));
            }
            Ok(ClassificationResult {
                class_id: 0,
                confidence: 0.9,
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct Harness {
        detection: DetectionLoop<ScriptedSource, ScriptedClassifier>,
        commands: mpsc::UnboundedSender<Command>,
        items: mpsc::Receiver<Item>,
    }

    fn harness(source: ScriptedSource, failing: Vec<u64>, interval: u32, capacity: usize) -> Harness {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (item_tx, item_rx) = mpsc::channel(capacity);
        let enricher = Enricher::seeded(Arc::new(Taxonomy::builtin()), EnrichOptions::default(), 11);
        let detection = DetectionLoop::new(
            source,
            ScriptedClassifier { failing },
            enricher,
            interval,
            cmd_rx,
            item_tx,
        );
        Harness {
            detection,
            commands: cmd_tx,
            items: item_rx,
        }
    }

    fn drain(items: &mut mpsc::Receiver<Item>) -> Vec<Item> {
        let mut out = Vec::new();
        while let Ok(item) = items.try_recv() {
            out.push(item);
        }
        out
    }

    #[test]
    fn test_idle_emits_nothing() {
        let mut h = harness(ScriptedSource::frames(50), vec![], 5, 16);
        let report = h.detection.run().unwrap();
        assert_eq!(report.exit, LoopExit::EndOfStream);
        assert_eq!(report.stats.frames, 50);
        assert_eq!(report.stats.cycles, 0);
        assert!(drain(&mut h.items).is_empty());
    }

    #[test]
    fn test_continuous_emits_every_interval() {
        let mut h = harness(ScriptedSource::frames(7), vec![], 3, 16);
        h.commands.send(Command::ToggleContinuous).unwrap();

        let report = h.detection.run().unwrap();
        // toggled after frame 0; counter reaches 3 on frames 3 and 6
        assert_eq!(report.stats.emitted, 2);
        let items = drain(&mut h.items);
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|i| i.item_type == "Organic Waste"));
    }

    #[test]
    fn test_toggle_flips_and_resets_counter() {
        let mut h = harness(ScriptedSource::frames(100), vec![], 3, 16);
        h.commands.send(Command::ToggleContinuous).unwrap();
        h.detection.step().unwrap();
        assert_eq!(h.detection.mode(), Mode::Continuous);

        // one tick, then toggle off and on again: counter starts over
        h.detection.step().unwrap();
        h.commands.send(Command::ToggleContinuous).unwrap();
        h.commands.send(Command::ToggleContinuous).unwrap();
        h.detection.step().unwrap();
        assert_eq!(h.detection.mode(), Mode::Continuous);

        h.detection.step().unwrap();
        h.detection.step().unwrap();
        assert_eq!(h.detection.stats().cycles, 0);
        h.detection.step().unwrap();
        assert_eq!(h.detection.stats().cycles, 1);

        h.commands.send(Command::ToggleContinuous).unwrap();
        h.detection.step().unwrap();
        assert_eq!(h.detection.mode(), Mode::Idle);
    }

    #[test]
    fn test_trigger_once_keeps_mode() {
        let mut h = harness(ScriptedSource::frames(10), vec![], 30, 16);
        h.commands.send(Command::TriggerOnce).unwrap();
        assert_eq!(h.detection.step().unwrap(), None);

        assert_eq!(h.detection.mode(), Mode::Idle);
        assert_eq!(h.detection.stats().emitted, 1);
        assert_eq!(drain(&mut h.items).len(), 1);

        h.detection.step().unwrap();
        assert!(drain(&mut h.items).is_empty());
    }

    #[test]
    fn test_quit_stops_at_iteration_boundary() {
        let mut h = harness(ScriptedSource::frames(1000), vec![], 30, 16);
        h.detection.step().unwrap();
        h.commands.send(Command::Quit).unwrap();

        let report = h.detection.run().unwrap();
        assert_eq!(report.exit, LoopExit::Quit);
        assert_eq!(report.stats.frames, 2);
    }

    #[test]
    fn test_quit_on_interval_frame_emits_cycle_first() {
        let mut h = harness(ScriptedSource::frames(100), vec![], 2, 16);
        h.commands.send(Command::ToggleContinuous).unwrap();
        assert_eq!(h.detection.step().unwrap(), None);
        assert_eq!(h.detection.step().unwrap(), None);
        assert_eq!(h.detection.stats().cycles, 0);

        // interval elapses on the same iteration the quit is read
        h.commands.send(Command::Quit).unwrap();
        assert_eq!(h.detection.step().unwrap(), Some(LoopExit::Quit));

        assert_eq!(h.detection.stats().frames, 3);
        assert_eq!(h.detection.stats().emitted, 1);
        let items = drain(&mut h.items);
        assert_eq!(items.len(), 1);
        assert!(!items[0].image.is_empty());
    }

    #[test]
    fn test_classification_failure_keeps_running() {
        let mut h = harness(ScriptedSource::frames(4), vec![1], 1, 16);
        h.commands.send(Command::ToggleContinuous).unwrap();

        let report = h.detection.run().unwrap();
        assert_eq!(report.exit, LoopExit::EndOfStream);
        // frames 1..=3 are classified; frame 1 fails
        assert_eq!(report.stats.cycles, 3);
        assert_eq!(report.stats.classify_failures, 1);
        assert_eq!(report.stats.emitted, 2);
    }

    #[test]
    fn test_source_failure_is_fatal() {
        let mut source = ScriptedSource::frames(2);
        source.fail_at_end = true;
        let h = harness(source, vec![], 30, 16);

        let err = h.detection.run().unwrap_err();
        assert!(matches!(err, Error::Source(SourceError::Open { .. })));
    }

    #[test]
    fn test_full_outbound_drops_without_blocking() {
        let mut h = harness(ScriptedSource::frames(10), vec![], 30, 1);
        h.commands.send(Command::TriggerOnce).unwrap();
        h.commands.send(Command::TriggerOnce).unwrap();
        h.detection.step().unwrap();

        assert_eq!(h.detection.stats().emitted, 1);
        assert_eq!(h.detection.stats().dropped, 1);
        assert_eq!(drain(&mut h.items).len(), 1);
    }

    #[test]
    fn test_closed_outbound_stops_loop() {
        let h = harness(ScriptedSource::frames(10), vec![], 30, 4);
        let Harness {
            detection,
            commands,
            items,
        } = h;
        drop(items);
        commands.send(Command::TriggerOnce).unwrap();

        let report = detection.run().unwrap();
        assert_eq!(report.exit, LoopExit::OutboundClosed);
    }
}
