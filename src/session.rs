//! Concatenation session
//!
//! Runs one batch: negotiates the output from the first segment, writes the
//! header, transcodes every segment in input order and writes the trailer.
//!
//! Failures on the first segment end the session before the output file is
//! created. Failures on later segments skip that segment and are recorded in
//! the report; write failures are always fatal.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::capabilities::CodecCapabilities;
use crate::error::{ConcatError, Result, Stage};
use crate::ffmpeg_utils::utils::ts_to_secs;
use crate::mux::OutputSink;
use crate::negotiate::{ContainerKind, OutputCodec, OutputTarget};
use crate::probe::SegmentSource;
use crate::timeline::TimestampTracker;
use crate::transcode::{transcode_segment, SegmentStats};

/// An input that was left out (entirely or from the point of failure on)
#[derive(Debug, Clone, Serialize)]
pub struct SkippedSegment {
    pub path: PathBuf,
    pub stage: Stage,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// No duration declared; the next segment is placed after the last
    /// packet this one produced
    DurationUnknown,
    /// The segment decoded without producing any audio
    NoAudioDecoded,
}

/// A non-fatal condition on one segment
#[derive(Debug, Clone, Serialize)]
pub struct SegmentWarning {
    pub path: PathBuf,
    pub kind: WarningKind,
}

/// Outcome of a successful session
#[derive(Debug, Clone, Serialize)]
pub struct ConcatReport {
    pub session_id: String,
    pub output: PathBuf,
    pub codec: OutputCodec,
    pub container: ContainerKind,
    /// `.mp3` was requested but AAC was written
    pub substituted: bool,
    pub sample_rate: u32,
    pub channels: u16,
    pub bit_rate: u64,
    pub segments_written: usize,
    pub packets_written: u64,
    pub duration_secs: f64,
    pub skipped: Vec<SkippedSegment>,
    pub warnings: Vec<SegmentWarning>,
}

/// One concatenation call
pub struct ConcatSession<'a> {
    id: Uuid,
    inputs: Vec<PathBuf>,
    output: PathBuf,
    caps: &'a dyn CodecCapabilities,
}

/// Mutable bookkeeping while segments are processed
#[derive(Default)]
struct Progress {
    tracker: TimestampTracker,
    skipped: Vec<SkippedSegment>,
    warnings: Vec<SegmentWarning>,
    segments_written: usize,
}

impl<'a> ConcatSession<'a> {
    pub fn new<I, P>(inputs: I, output: impl Into<PathBuf>, caps: &'a dyn CodecCapabilities) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            id: Uuid::new_v4(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            output: output.into(),
            caps,
        }
    }

    /// Run the session to completion. Blocks until every segment has been
    /// processed or the session failed.
    pub fn run(self) -> Result<ConcatReport> {
        let span = tracing::info_span!("concat", session = %self.id);
        let _enter = span.enter();

        let started = std::time::Instant::now();
        let result = self.run_segments();
        match &result {
            Ok(report) => tracing::info!(
                output = %report.output.display(),
                segments = report.segments_written,
                skipped = report.skipped.len(),
                duration_secs = report.duration_secs,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "concatenation finished"
            ),
            Err(e) => tracing::error!(
                output = %self.output.display(),
                stage = %e.stage(),
                error = %e,
                "concatenation failed"
            ),
        }
        result
    }

    fn run_segments(&self) -> Result<ConcatReport> {
        let Some((first_path, rest)) = self.inputs.split_first() else {
            return Err(ConcatError::NoUsableSegments { skipped: 0 });
        };

        tracing::info!(
            segments = self.inputs.len(),
            output = %self.output.display(),
            "concatenation started"
        );

        // The first segment defines the output; nothing exists on disk until
        // it has been probed and the output negotiated.
        let mut first = SegmentSource::open(first_path)?;
        let target = OutputTarget::negotiate(&self.output, first.info(), self.caps)?;
        let mut sink = OutputSink::create(&self.output, &target)?;

        let mut progress = Progress::default();
        process_segment(&mut first, &target, &mut sink, &mut progress)?;
        drop(first);

        for path in rest {
            let outcome = SegmentSource::open(path).and_then(|mut source| {
                process_segment(&mut source, &target, &mut sink, &mut progress)
            });
            match outcome {
                Ok(_) => {}
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => progress.skip(path, e),
            }
        }

        // Dropping the sink on error removes the partial file.
        progress.ensure_usable()?;

        let end = progress.tracker.timeline_end();
        let summary = sink.finish()?;

        Ok(ConcatReport {
            session_id: self.id.to_string(),
            output: self.output.clone(),
            codec: target.codec,
            container: target.container.clone(),
            substituted: target.substituted,
            sample_rate: target.sample_rate,
            channels: target.channels(),
            bit_rate: target.bit_rate,
            segments_written: progress.segments_written,
            packets_written: summary.packets,
            duration_secs: ts_to_secs(end, summary.time_base),
            skipped: progress.skipped,
            warnings: progress.warnings,
        })
    }
}

/// Transcode one opened segment and move the timeline past it.
fn process_segment(
    source: &mut SegmentSource,
    target: &OutputTarget,
    sink: &mut OutputSink,
    progress: &mut Progress,
) -> Result<SegmentStats> {
    progress.tracker.begin_segment();
    let stats = match transcode_segment(source, target, sink, &mut progress.tracker) {
        Ok(stats) => stats,
        Err(e) => {
            // Keep whatever was written; continue after it.
            progress.tracker.end_segment(None);
            return Err(e);
        }
    };

    let duration = source.info().duration_in(sink.time_base());
    if duration.is_none() {
        tracing::warn!(
            segment = %source.path().display(),
            "segment duration unknown, placing next segment after its last packet"
        );
        progress.warn(source.path(), WarningKind::DurationUnknown);
    }
    progress.tracker.end_segment(duration);

    if stats.packets_written == 0 {
        tracing::warn!(segment = %source.path().display(), "segment produced no audio");
        progress.warn(source.path(), WarningKind::NoAudioDecoded);
    } else {
        progress.segments_written += 1;
    }

    tracing::debug!(
        segment = %source.path().display(),
        packets = stats.packets_written,
        total_packets = sink.packets_written(),
        offset = progress.tracker.offset(),
        adjusted = progress.tracker.adjusted_packets(),
        "segment appended"
    );

    Ok(stats)
}

impl Progress {
    fn skip(&mut self, path: &Path, error: ConcatError) {
        tracing::warn!(
            segment = %path.display(),
            stage = %error.stage(),
            error = %error,
            "skipping segment"
        );
        self.skipped.push(SkippedSegment {
            path: path.to_path_buf(),
            stage: error.stage(),
            reason: error.to_string(),
        });
    }

    /// A session is usable once at least one segment completed. Packets left
    /// behind by a segment that failed part-way do not count.
    fn ensure_usable(&self) -> Result<()> {
        if self.segments_written == 0 {
            return Err(ConcatError::NoUsableSegments {
                skipped: self.skipped.len(),
            });
        }
        Ok(())
    }

    fn warn(&mut self, path: &Path, kind: WarningKind) {
        self.warnings.push(SegmentWarning {
            path: path.to_path_buf(),
            kind,
        });
    }
}
