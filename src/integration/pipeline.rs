//! The analysis and export passes.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::analysis::Analysis;
use crate::config::PipelineConfig;
use crate::control::{CancellationToken, Pass, PassStatus, RunControl};
use crate::deadline::{Pending, WaitError};
use crate::diagnostics::{Diagnostic, Diagnostics, Stage};
use crate::error::{DetectError, ExportError, PipelineError, Result};
use crate::export::{CompositeError, ExportReport, SequenceWriter, composite, encode_png};
use crate::frame::{Frame, FrameSource, FrameStream, StreamEvent};
use crate::integration::context::ModelContext;
use crate::integration::detector::Detector;
use crate::integration::handle::{PassHandle, spawn_pass};
use crate::registry::TrackRegistry;
use crate::segmentation::{SegmentationAdapter, Segmented};
use crate::tracker::{Association, Associator, Detection, Rect, TrackSet};

/// Runs analysis and export against one [`ModelContext`].
///
/// Neither pass keeps state in the pipeline itself, so one pipeline can
/// serve any number of passes, including concurrently via
/// [`Pipeline::spawn_analyze`] and [`Pipeline::spawn_export`].
#[derive(Debug, Clone)]
pub struct Pipeline {
    context: ModelContext,
    config: PipelineConfig,
}

/// Outcome of pulling from the frame stream.
enum Pulled {
    Frame(Frame),
    End,
    Stalled,
    Cancelled,
}

/// Frame stream plus the bookkeeping both passes need: ordering checks
/// and the decode timeout budget.
struct FrameFeed {
    stream: FrameStream,
    timeout: Option<Duration>,
    max_timeouts: u32,
    consecutive_timeouts: u32,
    last_index: Option<u64>,
    pulled: u64,
}

impl FrameFeed {
    fn spawn<S: FrameSource + 'static>(source: S, config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            stream: FrameStream::spawn(source, config.prefetch)?,
            timeout: config.timeouts.decode(),
            max_timeouts: config.timeouts.max_decode_timeouts,
            consecutive_timeouts: 0,
            last_index: None,
            pulled: 0,
        })
    }

    fn pull(&mut self, cancel: &CancellationToken, diagnostics: &mut Diagnostics) -> Result<Pulled> {
        loop {
            if cancel.is_cancelled() {
                return Ok(Pulled::Cancelled);
            }
            match self.stream.next(self.timeout) {
                StreamEvent::Frame(frame) => {
                    self.consecutive_timeouts = 0;
                    if let Some(previous) = self.last_index {
                        if frame.index <= previous {
                            return Err(PipelineError::NonMonotonicFrame {
                                previous,
                                got: frame.index,
                            });
                        }
                    }
                    self.last_index = Some(frame.index);
                    self.pulled += 1;
                    return Ok(Pulled::Frame(frame));
                }
                StreamEvent::End => return Ok(Pulled::End),
                StreamEvent::Failed(err) => return Err(err.into()),
                StreamEvent::TimedOut => {
                    self.consecutive_timeouts += 1;
                    let expected = self.last_index.map_or(1, |i| i + 1);
                    diagnostics.record(
                        expected,
                        Stage::Decode,
                        format!(
                            "frame decode timed out ({} of {} allowed)",
                            self.consecutive_timeouts, self.max_timeouts
                        ),
                    );
                    if self.consecutive_timeouts >= self.max_timeouts {
                        return Ok(Pulled::Stalled);
                    }
                }
            }
        }
    }
}

/// Detection running for a frame that has not been associated yet.
struct InFlight {
    frame_index: u64,
    pending: Pending<std::result::Result<Vec<Detection>, DetectError>>,
}

impl InFlight {
    fn launch(detector: &Arc<dyn Detector>, frame: Frame, timeout: Option<Duration>) -> Self {
        let detector = Arc::clone(detector);
        let frame_index = frame.index;
        let pending = Pending::spawn("detect", timeout, move || detector.detect(&frame));
        Self {
            frame_index,
            pending,
        }
    }

    /// Detections tagged with their frame; any failure counts as none.
    fn collect(self, diagnostics: &mut Diagnostics) -> Vec<Detection> {
        let outcome = self.pending.wait().unwrap_or_else(|err| {
            Err(match err {
                WaitError::TimedOut(after) => DetectError::Timeout(after),
                WaitError::Aborted => DetectError::Unavailable("detector call aborted".into()),
            })
        });
        match outcome {
            Ok(detections) => detections
                .into_iter()
                .map(|d| d.with_frame(self.frame_index))
                .collect(),
            Err(err) => {
                diagnostics.record(
                    self.frame_index,
                    Stage::Detect,
                    format!("{err}; treating frame as empty"),
                );
                Vec::new()
            }
        }
    }
}

struct Job {
    seq: usize,
    frame: Frame,
    bbox: Rect,
}

struct Rendered {
    seq: usize,
    frame_index: u64,
    png: std::result::Result<Vec<u8>, CompositeError>,
    fallback: bool,
    diagnostic: Option<Diagnostic>,
}

/// Why the dispatcher stopped handing out frames.
enum DispatchEnd {
    /// Every eligible frame was dispatched.
    Finished,
    /// The source ended with this many eligible frames never seen.
    Exhausted(usize),
    Stalled,
    Cancelled,
    /// Workers or the writer went away first.
    Interrupted,
}

impl Pipeline {
    pub fn new(context: ModelContext, config: PipelineConfig) -> Self {
        Self { context, config }
    }

    pub fn with_default_config(context: ModelContext) -> Self {
        Self::new(context, PipelineConfig::default())
    }

    pub fn context(&self) -> &ModelContext {
        &self.context
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Detect and associate every frame of `source`, accumulating the
    /// per-id mapping and eligible-frame boxes.
    ///
    /// Detection of the next frame runs while the current one is being
    /// associated. Detector failures and timeouts leave the frame empty
    /// and are recorded as diagnostics.
    pub fn analyze<S>(&self, source: S, control: &mut RunControl<'_>) -> Result<Analysis>
    where
        S: FrameSource + 'static,
    {
        self.config.validate()?;
        let detector = self
            .context
            .detector()
            .ok_or(PipelineError::MissingCapability("detector"))?;
        let detect_timeout = self.config.timeouts.detect();
        let total = source.len_hint();
        let mut feed = FrameFeed::spawn(source, &self.config)?;
        let cancel = control.cancellation().clone();
        let watch = control.start(Pass::Analyze, total);

        let associator = Associator::new(self.config.tracker.clone());
        let mut tracks = TrackSet::new();
        let mut registry = TrackRegistry::new();
        let mut diagnostics = Diagnostics::new();
        let mut status = PassStatus::Completed;
        let mut frames_done = 0u64;
        let mut in_flight: Option<InFlight> = None;

        loop {
            let upcoming = match feed.pull(&cancel, &mut diagnostics)? {
                Pulled::Frame(frame) => Some(frame),
                Pulled::End => None,
                Pulled::Stalled => {
                    status = PassStatus::Stalled;
                    None
                }
                Pulled::Cancelled => {
                    status = PassStatus::Cancelled;
                    None
                }
            };
            let launched = upcoming.map(|frame| InFlight::launch(&detector, frame, detect_timeout));

            if let Some(current) = in_flight.take() {
                let frame_index = current.frame_index;
                let detections = current.collect(&mut diagnostics);
                let Association {
                    tracks: next,
                    diagnostics: found,
                } = associator.associate(tracks, &detections, frame_index);
                tracks = next;
                diagnostics.extend(found);
                registry.observe_set(&tracks);

                frames_done += 1;
                tracing::debug!(
                    frame = frame_index,
                    detections = detections.len(),
                    eligible = tracks.eligible().count(),
                    "frame associated"
                );
                control.report(&watch, frames_done);
            }

            match launched {
                Some(next) => in_flight = Some(next),
                None => break,
            }
        }

        if feed.pulled == 0 && status == PassStatus::Completed {
            return Err(PipelineError::EmptySource);
        }

        let mapping = registry.finalize();
        tracing::info!(
            frames = frames_done,
            tracks = mapping.len(),
            ids_allocated = tracks.ids_allocated(),
            diagnostics = diagnostics.len(),
            status = ?status,
            elapsed = ?watch.elapsed(),
            "analysis finished"
        );
        Ok(Analysis {
            mapping,
            history: registry.history(),
            diagnostics,
            status,
            frames_processed: frames_done,
        })
    }

    /// Render the matte sequence of `track_id` into `out_dir`.
    ///
    /// Only frames where the track was eligible during analysis are
    /// rendered, numbered densely from 1 in original order. Segmentation
    /// problems degrade to the track's box and are recorded as
    /// diagnostics. A write failure stops the pass; files already written
    /// stay on disk and are described by the partial report in
    /// [`PipelineError::Export`].
    pub fn export<S>(
        &self,
        source: S,
        analysis: &Analysis,
        track_id: u64,
        out_dir: &Path,
        control: &mut RunControl<'_>,
    ) -> Result<ExportReport>
    where
        S: FrameSource + 'static,
    {
        self.config.validate()?;
        let summary = analysis
            .mapping
            .get(track_id)
            .ok_or(PipelineError::UnknownTrack(track_id))?;
        let boxes: HashMap<u64, Rect> = analysis
            .history
            .observations(track_id)
            .filter(|obs| !obs.is_empty())
            .ok_or(PipelineError::MissingHistory(track_id))?
            .iter()
            .map(|obs| (obs.frame, obs.bbox))
            .collect();
        let segmenter = self
            .context
            .segmenter()
            .ok_or(PipelineError::MissingCapability("segmenter"))?;

        let cfg = &self.config.export;
        let adapter = SegmentationAdapter::new(
            segmenter,
            cfg.prompt_padding,
            self.config.timeouts.segment(),
        );
        let feed = FrameFeed::spawn(source, &self.config)?;

        let mut report = ExportReport::new(track_id, &summary.label, out_dir);
        let mut writer = match SequenceWriter::create(
            out_dir,
            cfg.file_prefix.clone(),
            cfg.index_width,
            report.manifest.clone(),
        ) {
            Ok(writer) => writer,
            Err(err) => {
                report.status = PassStatus::Failed;
                return Err(PipelineError::Export {
                    partial: Box::new(report),
                    source: err.into(),
                });
            }
        };

        let eligible = boxes.len();
        let watch = control.start(Pass::Export, Some(eligible as u64));
        let cancel = control.cancellation().clone();
        let halt = AtomicBool::new(false);
        let workers = cfg.workers.max(1);
        tracing::info!(
            track = track_id,
            label = %summary.label,
            frames = eligible,
            workers,
            out_dir = %out_dir.display(),
            "export started"
        );

        let mut export_error: Option<ExportError> = None;
        let outcome = thread::scope(|s| -> Result<_> {
            let (job_tx, job_rx) = bounded::<Job>(workers * 2);
            let (done_tx, done_rx) = bounded::<Rendered>(workers * 2);

            let mut handles = Vec::with_capacity(workers);
            for i in 0..workers {
                let (jobs, done, adapter) = (job_rx.clone(), done_tx.clone(), adapter.clone());
                let handle = thread::Builder::new()
                    .name(format!("export-worker-{i}"))
                    .spawn_scoped(s, move || render_jobs(&adapter, jobs, done))
                    .map_err(PipelineError::Spawn)?;
                handles.push(handle);
            }
            drop((job_rx, done_tx));

            let (cancel, halt) = (&cancel, &halt);
            let dispatcher = thread::Builder::new()
                .name("export-dispatch".into())
                .spawn_scoped(s, move || dispatch(feed, boxes, job_tx, cancel, halt))
                .map_err(PipelineError::Spawn)?;

            // Index assignment happens here and only here, in dispatch order.
            let mut reorder: BTreeMap<usize, Rendered> = BTreeMap::new();
            let mut next_seq = 0;
            'receive: for rendered in done_rx.iter() {
                reorder.insert(rendered.seq, rendered);
                while let Some(rendered) = reorder.remove(&next_seq) {
                    next_seq += 1;
                    if let Err(err) = write_rendered(&mut writer, &mut report, rendered) {
                        export_error = Some(err);
                        halt.store(true, Ordering::SeqCst);
                        break 'receive;
                    }
                    control.report(&watch, writer.manifest().len() as u64);
                }
            }
            drop(done_rx);

            let dispatched = dispatcher.join();
            let worker_panicked = handles.into_iter().any(|h| h.join().is_err());
            Ok((dispatched, worker_panicked))
        });

        report.manifest = writer.manifest().clone();
        let (dispatched, worker_panicked) = match outcome {
            Ok(joined) => joined,
            Err(err) => {
                save_partial(writer, &cfg.manifest_name);
                return Err(err);
            }
        };

        if let Some(source) = export_error {
            report.status = PassStatus::Failed;
            save_partial(writer, &cfg.manifest_name);
            tracing::warn!(
                track = track_id,
                written = report.manifest.len(),
                error = %source,
                "export stopped"
            );
            return Err(PipelineError::Export {
                partial: Box::new(report),
                source,
            });
        }

        let end = match dispatched {
            Ok(Ok((end, decode_diagnostics))) => {
                report.diagnostics.extend(decode_diagnostics);
                end
            }
            Ok(Err(err)) => {
                save_partial(writer, &cfg.manifest_name);
                return Err(err);
            }
            Err(_) => {
                save_partial(writer, &cfg.manifest_name);
                return Err(PipelineError::WorkerPanicked);
            }
        };
        if worker_panicked {
            save_partial(writer, &cfg.manifest_name);
            return Err(PipelineError::WorkerPanicked);
        }

        report.status = match end {
            DispatchEnd::Finished => PassStatus::Completed,
            DispatchEnd::Exhausted(missing) => {
                let last = report.manifest.entries().last().map_or(0, |e| e.frame_index);
                report.diagnostics.record(
                    last,
                    Stage::Export,
                    format!("{missing} eligible frame(s) never appeared in the source"),
                );
                PassStatus::Completed
            }
            DispatchEnd::Stalled => PassStatus::Stalled,
            DispatchEnd::Cancelled | DispatchEnd::Interrupted => PassStatus::Cancelled,
        };

        match writer.finish(&cfg.manifest_name) {
            Ok(manifest) => report.manifest = manifest,
            Err(err) => {
                report.status = PassStatus::Failed;
                return Err(PipelineError::Export {
                    partial: Box::new(report),
                    source: err.into(),
                });
            }
        }

        tracing::info!(
            track = track_id,
            written = report.manifest.len(),
            fallback = report.fallback_frames,
            diagnostics = report.diagnostics.len(),
            status = ?report.status,
            elapsed = ?watch.elapsed(),
            "export finished"
        );
        Ok(report)
    }

    /// Run [`Pipeline::analyze`] on its own thread.
    pub fn spawn_analyze<S>(
        &self,
        source: S,
        control: RunControl<'static>,
    ) -> Result<PassHandle<Analysis>>
    where
        S: FrameSource + 'static,
    {
        let pipeline = self.clone();
        spawn_pass(Pass::Analyze, control, move |control| {
            pipeline.analyze(source, control)
        })
    }

    /// Run [`Pipeline::export`] on its own thread.
    pub fn spawn_export<S>(
        &self,
        source: S,
        analysis: Analysis,
        track_id: u64,
        out_dir: impl Into<PathBuf>,
        control: RunControl<'static>,
    ) -> Result<PassHandle<ExportReport>>
    where
        S: FrameSource + 'static,
    {
        let pipeline = self.clone();
        let out_dir = out_dir.into();
        spawn_pass(Pass::Export, control, move |control| {
            pipeline.export(source, &analysis, track_id, &out_dir, control)
        })
    }
}

/// Walk the source and hand every eligible frame to the workers, tagged
/// with its dispatch sequence number.
fn dispatch(
    mut feed: FrameFeed,
    mut boxes: HashMap<u64, Rect>,
    jobs: Sender<Job>,
    cancel: &CancellationToken,
    halt: &AtomicBool,
) -> Result<(DispatchEnd, Diagnostics)> {
    let mut diagnostics = Diagnostics::new();
    let mut seq = 0;
    while !boxes.is_empty() {
        if halt.load(Ordering::SeqCst) {
            return Ok((DispatchEnd::Interrupted, diagnostics));
        }
        let frame = match feed.pull(cancel, &mut diagnostics)? {
            Pulled::Frame(frame) => frame,
            Pulled::End => return Ok((DispatchEnd::Exhausted(boxes.len()), diagnostics)),
            Pulled::Stalled => return Ok((DispatchEnd::Stalled, diagnostics)),
            Pulled::Cancelled => return Ok((DispatchEnd::Cancelled, diagnostics)),
        };
        let Some(bbox) = boxes.remove(&frame.index) else {
            continue;
        };
        if jobs.send(Job { seq, frame, bbox }).is_err() {
            return Ok((DispatchEnd::Interrupted, diagnostics));
        }
        seq += 1;
    }
    Ok((DispatchEnd::Finished, diagnostics))
}

fn render_jobs(adapter: &SegmentationAdapter, jobs: Receiver<Job>, done: Sender<Rendered>) {
    for job in jobs.iter() {
        let Segmented { mask, diagnostic } = adapter.segment(&job.frame, &job.bbox);
        let png = composite(&job.frame.image, &mask).and_then(|rgba| encode_png(&rgba));
        let rendered = Rendered {
            seq: job.seq,
            frame_index: job.frame.index,
            png,
            fallback: mask.is_fallback(),
            diagnostic,
        };
        if done.send(rendered).is_err() {
            break;
        }
    }
}

/// Write one rendered frame under the next output index. A frame that
/// cannot be rendered or written ends the export: skipping it would leave
/// a gap between the eligible frames and the files on disk.
fn write_rendered(
    writer: &mut SequenceWriter,
    report: &mut ExportReport,
    rendered: Rendered,
) -> std::result::Result<u32, ExportError> {
    if let Some(diagnostic) = rendered.diagnostic {
        report.diagnostics.push(diagnostic);
    }
    let png = rendered.png.map_err(|source| ExportError::Render {
        frame_index: rendered.frame_index,
        source,
    })?;
    let output_index = writer.write_next(rendered.frame_index, &png)?;
    if rendered.fallback {
        report.fallback_frames += 1;
    }
    tracing::debug!(
        frame = rendered.frame_index,
        output = output_index,
        fallback = rendered.fallback,
        "matte written"
    );
    Ok(output_index)
}

fn save_partial(writer: SequenceWriter, manifest_name: &str) {
    let dir = writer.dir().to_path_buf();
    if let Err(err) = writer.finish(manifest_name) {
        tracing::warn!(dir = %dir.display(), error = %err, "could not save partial manifest");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SegmentError;
    use crate::frame::MemorySource;
    use crate::integration::detector::ReplayDetector;
    use crate::segmentation::{BoxSegmenter, MaskCandidate, Segmenter};
    use image::RgbImage;

    fn frames(n: u64) -> MemorySource {
        MemorySource::from_images((0..n).map(|_| RgbImage::from_pixel(32, 24, image::Rgb([90, 120, 150]))))
    }

    fn replay(frames: impl IntoIterator<Item = u64>) -> ReplayDetector {
        ReplayDetector::new(frames.into_iter().map(|f| {
            Detection::from_rect(Rect::new(4.0, 4.0, 10.0, 12.0), 0.9)
                .with_label("cat")
                .with_frame(f)
        }))
    }

    fn pipeline(detector: ReplayDetector) -> Pipeline {
        let context = ModelContext::builder()
            .detector(detector)
            .segmenter(BoxSegmenter)
            .build();
        let mut config = PipelineConfig::default();
        config.export.workers = 2;
        Pipeline::new(context, config)
    }

    struct Failing;

    impl Detector for Failing {
        fn detect(&self, _frame: &Frame) -> std::result::Result<Vec<Detection>, DetectError> {
            Err(DetectError::Inference("gpu lost".into()))
        }
    }

    #[test]
    fn test_analyze_single_object() {
        let analysis = pipeline(replay(1..=5))
            .analyze(frames(5), &mut RunControl::new())
            .unwrap();
        assert_eq!(analysis.status, PassStatus::Completed);
        assert_eq!(analysis.frames_processed, 5);
        assert_eq!(analysis.mapping.get(1).unwrap().frames, 5);
        assert_eq!(analysis.mapping.get(1).unwrap().label, "cat");
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn test_analyze_empty_source() {
        let err = pipeline(replay([]))
            .analyze(MemorySource::default(), &mut RunControl::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::EmptySource));
    }

    #[test]
    fn test_detector_failure_is_per_frame() {
        let context = ModelContext::builder().detector(Failing).build();
        let analysis = Pipeline::with_default_config(context)
            .analyze(frames(3), &mut RunControl::new())
            .unwrap();
        assert_eq!(analysis.frames_processed, 3);
        assert!(analysis.mapping.is_empty());
        let detect: Vec<u64> = analysis
            .diagnostics
            .for_stage(Stage::Detect)
            .map(|d| d.frame_index)
            .collect();
        assert_eq!(detect, vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_capability() {
        let context = ModelContext::builder().segmenter(BoxSegmenter).build();
        let err = Pipeline::with_default_config(context)
            .analyze(frames(1), &mut RunControl::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::MissingCapability("detector")));
    }

    #[test]
    fn test_non_monotonic_source_rejected() {
        let source = MemorySource::new(vec![
            Frame::new(2, RgbImage::new(4, 4)),
            Frame::new(2, RgbImage::new(4, 4)),
        ]);
        let err = pipeline(replay([2]))
            .analyze(source, &mut RunControl::new())
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NonMonotonicFrame { previous: 2, got: 2 }
        ));
    }

    #[test]
    fn test_export_renumbers_densely() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(replay([1, 2, 3, 4, 7, 8, 9, 10]));
        let analysis = pipeline.analyze(frames(10), &mut RunControl::new()).unwrap();
        let report = pipeline
            .export(frames(10), &analysis, 1, dir.path(), &mut RunControl::new())
            .unwrap();
        assert_eq!(report.status, PassStatus::Completed);
        assert_eq!(report.files_written(), 8);
        assert_eq!(report.manifest.frame_for(5), Some(7));
        assert_eq!(report.fallback_frames, 0);
        assert!(dir.path().join("frame_00008.png").is_file());
        assert!(!dir.path().join("frame_00009.png").exists());
    }

    #[test]
    fn test_export_unknown_id_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let pipeline = pipeline(replay(1..=2));
        let analysis = pipeline.analyze(frames(2), &mut RunControl::new()).unwrap();
        let err = pipeline
            .export(frames(2), &analysis, 42, &out, &mut RunControl::new())
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTrack(42)));
        assert!(!out.exists());
    }

    #[test]
    fn test_render_failure_ends_export_without_gap() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = ExportReport::new(1, "cat", dir.path());
        let mut writer =
            SequenceWriter::create(dir.path(), "frame_", 5, report.manifest.clone()).unwrap();

        let ok = Rendered {
            seq: 0,
            frame_index: 2,
            png: Ok(b"png".to_vec()),
            fallback: true,
            diagnostic: None,
        };
        assert_eq!(write_rendered(&mut writer, &mut report, ok).unwrap(), 1);

        let broken = Rendered {
            seq: 1,
            frame_index: 3,
            png: Err(CompositeError::DimensionMismatch {
                frame: (32, 24),
                mask: (16, 12),
            }),
            fallback: false,
            diagnostic: Some(Diagnostic::new(3, Stage::Segment, "fell back to box")),
        };
        let err = write_rendered(&mut writer, &mut report, broken).unwrap_err();
        assert!(matches!(err, ExportError::Render { frame_index: 3, .. }));
        assert_eq!(writer.manifest().len(), 1);
        assert_eq!(report.fallback_frames, 1);
        assert_eq!(report.diagnostics.len(), 1);
        assert!(!dir.path().join("frame_00002.png").exists());
    }

    struct Sleepy;

    impl Segmenter for Sleepy {
        fn segment(
            &self,
            _frame: &Frame,
            _prompt: &Rect,
        ) -> std::result::Result<Vec<MaskCandidate>, SegmentError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(vec![])
        }
    }

    #[test]
    fn test_segment_timeout_falls_back_per_frame() {
        let dir = tempfile::tempdir().unwrap();
        let context = ModelContext::builder()
            .detector(replay(1..=3))
            .segmenter(Sleepy)
            .build();
        let mut config = PipelineConfig::default();
        config.timeouts.segment_ms = Some(10);
        let pipeline = Pipeline::new(context, config);
        let analysis = pipeline.analyze(frames(3), &mut RunControl::new()).unwrap();
        let report = pipeline
            .export(frames(3), &analysis, 1, dir.path(), &mut RunControl::new())
            .unwrap();
        assert_eq!(report.files_written(), 3);
        assert_eq!(report.fallback_frames, 3);
        assert_eq!(report.diagnostics.for_stage(Stage::Segment).count(), 3);
    }
}
