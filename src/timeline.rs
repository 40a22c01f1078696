//! Timestamp continuity across segments
//!
//! Every segment is encoded from timestamp zero. The tracker shifts each
//! segment's packets by the running offset, in output stream time base, so
//! segments play back to back.
//!
//! Encoders that prime (AAC starts at `-initial_padding`) make a segment's
//! first packets overlap the end of the previous one. The first packet of a
//! segment therefore fixes a per-segment shift that moves the whole segment
//! just past the last written decode timestamp. The shift is not carried into
//! the cumulative offset, so it never accumulates across segments.

/// Timestamps of one packet after stitching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamped {
    pub pts: i64,
    pub dts: i64,
}

#[derive(Debug, Default)]
pub struct TimestampTracker {
    /// Cumulative offset, advanced once per completed segment
    offset: i64,
    /// Shift applied on top of `offset` to the current segment
    segment_shift: i64,
    /// Whether the current segment has not emitted a packet yet
    awaiting_first: bool,
    /// End (pts + duration) of the latest packet in the current segment
    segment_end: Option<i64>,
    last_dts: Option<i64>,
    last_pts: Option<i64>,
    /// Packets whose timestamps had to be clamped individually
    adjusted: u64,
}

impl TimestampTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start stitching a new segment at the current offset.
    pub fn begin_segment(&mut self) {
        self.segment_shift = 0;
        self.awaiting_first = true;
        self.segment_end = None;
    }

    /// Shift one packet's timestamps onto the output timeline.
    ///
    /// Inputs are segment-relative and already rescaled to the output time
    /// base. The result has a decode timestamp strictly greater than any
    /// previously stamped one, and `pts >= dts`.
    pub fn stamp(&mut self, pts: Option<i64>, dts: Option<i64>, duration: i64) -> Stamped {
        let local_dts = dts.or(pts).unwrap_or_else(|| self.segment_end_local());
        let local_pts = pts.unwrap_or(local_dts);

        let mut dts = local_dts + self.offset + self.segment_shift;
        if self.awaiting_first {
            self.awaiting_first = false;
            if let Some(last) = self.last_dts {
                if dts <= last {
                    let shift = last + 1 - dts;
                    tracing::debug!(
                        shift,
                        offset = self.offset,
                        "segment overlaps previous one, shifting"
                    );
                    self.segment_shift += shift;
                    dts += shift;
                }
            }
        }

        let mut pts = local_pts + self.offset + self.segment_shift;
        if let Some(last) = self.last_dts {
            if dts <= last {
                self.adjusted += 1;
                dts = last + 1;
            }
        }
        if pts < dts {
            pts = dts;
        }
        if let Some(last) = self.last_pts {
            // mp3 and aac are intra-only: presentation order is decode order
            if pts < last {
                self.adjusted += 1;
                pts = last.max(dts);
            }
        }

        let end = pts + duration.max(0);
        self.segment_end = Some(self.segment_end.map_or(end, |e| e.max(end)));
        self.last_dts = Some(dts);
        self.last_pts = Some(pts);

        Stamped { pts, dts }
    }

    /// Finish the current segment and advance the cumulative offset.
    ///
    /// With a known `duration` (output time base) the offset moves by exactly
    /// that amount. Without one it moves to the end of the last packet the
    /// segment emitted, or stays put when it emitted nothing. Returns `true`
    /// when the fallback was used.
    pub fn end_segment(&mut self, duration: Option<i64>) -> bool {
        let fallback = duration.is_none();
        match duration {
            Some(d) => self.offset += d.max(0),
            None => {
                if let Some(end) = self.segment_end {
                    self.offset = self.offset.max(end);
                }
            }
        }
        self.awaiting_first = false;
        self.segment_shift = 0;
        fallback
    }

    /// Current cumulative offset in output time base
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// End of the written timeline: the furthest `pts + duration` seen.
    pub fn timeline_end(&self) -> i64 {
        self.segment_end.unwrap_or(self.offset).max(self.offset)
    }

    /// Number of packets that needed an individual correction
    pub fn adjusted_packets(&self) -> u64 {
        self.adjusted
    }

    fn segment_end_local(&self) -> i64 {
        self.segment_end
            .map(|end| end - self.offset - self.segment_shift)
            .unwrap_or(0)
    }
}
