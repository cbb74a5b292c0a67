//! # Frame Assembler
//!
//! Cuts frames out of the receive ring. One of four strategies is active at a
//! time, derived from the [`FramingConfig`] every time it changes:
//!
//! | Strategy          | Selected when          | A frame is                               |
//! |-------------------|------------------------|------------------------------------------|
//! | `FixedLength(n)`  | `expected_len != 0`    | the next `n` bytes                       |
//! | `StartDelimited`  | start only             | the bytes between two start sequences    |
//! | `EndDelimited`    | end only               | the bytes before each end sequence       |
//! | `StartAndEnd`     | start and end          | the bytes between a start and its end    |
//! |                   | start equal to end     | the bytes between two consecutive flags  |
//! | `Unconfigured`    | nothing                | never produced                           |
//!
//! ## Scan Bounds
//!
//! A scan works on a snapshot of the unread bytes. Delimiter searches stop
//! after the configured depth; when one is cut short only the snapshot prefix
//! before the last delimiter found is trusted and the scan asks to be run
//! again, even if no new byte arrives.
//!
//! ## Discard Policy
//!
//! Bytes are popped from the ring only up to the end of the last delimiter
//! that was resolved. With both delimiters configured, an end sequence with no
//! open start and a start superseded by a later start are garbage and are
//! discarded as well, so noise on the line cannot pin the ring.

use alloc::vec::Vec;

use crate::buffer::CircularBuffer;
use crate::config::{FramingConfig, MIN_SCAN_DEPTH};
use crate::escape::unescape_into;
use crate::frame::{Frame, FrameQueue};
use crate::pattern::{effective_escapes, find_delimiters, find_matches, MAX_SCAN_DEPTH};

/// Active framing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Triage {
    /// No framing configured, bytes accumulate
    Unconfigured,
    /// Frames of a fixed number of bytes
    FixedLength(usize),
    /// Frames separated by start sequences
    StartDelimited,
    /// Frames terminated by end sequences
    EndDelimited,
    /// Frames enclosed between start and end sequences
    StartAndEnd,
}

impl Triage {
    /// Derive the strategy from a framing configuration
    pub fn select(config: &FramingConfig) -> Self {
        match (config.expected_len, config.start.is_empty(), config.end.is_empty()) {
            (len, _, _) if len != 0 => Triage::FixedLength(len),
            (_, false, true) => Triage::StartDelimited,
            (_, true, false) => Triage::EndDelimited,
            (_, false, false) => Triage::StartAndEnd,
            (_, true, true) => Triage::Unconfigured,
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Triage::Unconfigured => "none",
            Triage::FixedLength(_) => "length",
            Triage::StartDelimited => "sof",
            Triage::EndDelimited => "eof",
            Triage::StartAndEnd => "sof+eof",
        }
    }
}

/// What one scan did
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanOutcome {
    /// Frames extracted, including dropped ones
    pub frames: usize,
    /// Frames dropped because the queue was full
    pub dropped: usize,
    /// Bytes popped from the ring
    pub consumed: usize,
    /// The scan was cut short and should run again
    pub pending: bool,
}

/// Half-open byte range of a frame body inside a scan snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// First body byte
    pub start: usize,
    /// One past the last body byte
    pub end: usize,
}

impl Interval {
    fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }
}

/// Frame bodies found in a snapshot and how many bytes they use up
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Cut {
    /// Bodies, in stream order
    pub intervals: heapless::Vec<Interval, MAX_SCAN_DEPTH>,
    /// Bytes to pop from the front of the ring
    pub consumed: usize,
}

/// Frames between consecutive start sequences
///
/// Everything before the last start is consumed; the last start opens the
/// next frame.
pub fn cut_start_delimited(starts: &[usize], start_len: usize) -> Cut {
    let mut cut = Cut::default();
    if starts.len() < 2 {
        return cut;
    }
    for pair in starts.windows(2) {
        let _ = cut.intervals.push(Interval::new(pair[0] + start_len, pair[1]));
    }
    cut.consumed = starts[starts.len() - 1];
    cut
}

/// Frames ending at each end sequence
///
/// The first frame starts at the front of the ring, each following one right
/// after the previous end sequence.
pub fn cut_end_delimited(ends: &[usize], end_len: usize) -> Cut {
    let mut cut = Cut::default();
    for &end in ends {
        let _ = cut.intervals.push(Interval::new(cut.consumed, end));
        cut.consumed = end + end_len;
    }
    cut
}

/// Frames enclosed between a start and an end sequence
///
/// Each end closes the most recently opened start that lies entirely before
/// it and after the previous end. An end without such a start closes nothing.
pub fn cut_start_and_end(
    starts: &[usize],
    ends: &[usize],
    start_len: usize,
    end_len: usize,
) -> Cut {
    let mut cut = Cut::default();
    let mut next_start = 0;

    for &end in ends {
        let mut open = None;
        while next_start < starts.len() && starts[next_start] + start_len <= end {
            if starts[next_start] >= cut.consumed {
                open = Some(starts[next_start]);
            }
            next_start += 1;
        }
        if let Some(start) = open {
            let _ = cut.intervals.push(Interval::new(start + start_len, end));
        }
        cut.consumed = end + end_len;
    }

    // Only the latest start still waiting for its end is worth keeping
    if let Some(&last) = starts.last() {
        if last > cut.consumed {
            cut.consumed = last;
        }
    }
    cut
}

/// Frames between flags, when start and end sequences are the same
///
/// Every flag closes the frame before it and opens the next one. Two adjacent
/// flags enclose nothing and produce no frame. The last flag is kept as the
/// opener of the next frame.
pub fn cut_shared_flag(flags: &[usize], flag_len: usize) -> Cut {
    let mut cut = Cut::default();
    for pair in flags.windows(2) {
        let body = Interval::new(pair[0] + flag_len, pair[1]);
        if body.start < body.end {
            let _ = cut.intervals.push(body);
        }
    }
    if let Some(&last) = flags.last() {
        cut.consumed = last;
    }
    cut
}

/// Extracts frames from the receive ring according to the framing configuration
#[derive(Debug, Clone)]
pub struct Assembler {
    config: FramingConfig,
    triage: Triage,
    depth: usize,
    snapshot: Vec<u8>,
    escapes: Vec<usize>,
}

impl Assembler {
    /// Create an assembler examining up to `depth` delimiters per scan
    pub fn new(config: FramingConfig, depth: usize) -> Self {
        let triage = Triage::select(&config);
        Self {
            config,
            triage,
            depth: depth.clamp(MIN_SCAN_DEPTH, MAX_SCAN_DEPTH),
            snapshot: Vec::new(),
            escapes: Vec::new(),
        }
    }

    /// Current framing configuration
    pub fn config(&self) -> &FramingConfig {
        &self.config
    }

    /// Strategy derived from the current configuration
    pub fn triage(&self) -> Triage {
        self.triage
    }

    /// Replace the configuration, returning the new strategy
    pub fn configure(&mut self, config: FramingConfig) -> Triage {
        self.update(|current| *current = config)
    }

    /// Edit the configuration in place, returning the new strategy
    pub fn update(&mut self, edit: impl FnOnce(&mut FramingConfig)) -> Triage {
        edit(&mut self.config);
        self.triage = Triage::select(&self.config);
        self.triage
    }

    /// Run the active strategy once over the unread bytes of `rx`
    ///
    /// Extracted frames are stamped with `now` and queued in `frames`; the
    /// bytes they came from are popped from `rx`.
    pub fn scan(
        &mut self,
        rx: &mut CircularBuffer<u8>,
        frames: &mut FrameQueue,
        now: u32,
    ) -> ScanOutcome {
        match self.triage {
            Triage::Unconfigured => ScanOutcome::default(),
            Triage::FixedLength(len) => scan_fixed(len, rx, frames, now),
            Triage::StartDelimited | Triage::EndDelimited | Triage::StartAndEnd => {
                self.scan_delimited(rx, frames, now)
            }
        }
    }

    fn scan_delimited(
        &mut self,
        rx: &mut CircularBuffer<u8>,
        frames: &mut FrameQueue,
        now: u32,
    ) -> ScanOutcome {
        let Self {
            config,
            triage,
            depth,
            snapshot,
            escapes,
        } = self;

        rx.snapshot_into(snapshot);
        let data = snapshot.as_slice();

        escapes.clear();
        if !config.escape.is_empty() {
            find_matches(&config.escape, data, 0, escapes);
            effective_escapes(escapes, config.escape.len());
        }

        let escape_len = config.escape.len();
        let (mut starts, starts_cut) =
            find_delimiters(&config.start, data, *depth, escapes.as_slice(), escape_len);
        let (mut ends, ends_cut) =
            find_delimiters(&config.end, data, *depth, escapes.as_slice(), escape_len);

        // A cut-short search hides what lies past its last match
        let mut limit = data.len();
        if starts_cut {
            limit = limit.min(starts.last().copied().unwrap_or(0));
        }
        if ends_cut {
            limit = limit.min(ends.last().copied().unwrap_or(0));
        }
        let (start_len, end_len) = (config.start.len(), config.end.len());
        starts.retain(|&o| o + start_len <= limit);
        ends.retain(|&o| o + end_len <= limit);

        let cut = match triage {
            Triage::StartDelimited => cut_start_delimited(&starts, start_len),
            Triage::EndDelimited => cut_end_delimited(&ends, end_len),
            _ if config.start == config.end => cut_shared_flag(&starts, start_len),
            _ => cut_start_and_end(&starts, &ends, start_len, end_len),
        };

        let specials: heapless::Vec<&[u8], 3> = config.specials().collect();
        let mut outcome = ScanOutcome {
            pending: starts_cut || ends_cut,
            ..ScanOutcome::default()
        };
        for interval in &cut.intervals {
            let mut content = Vec::with_capacity(interval.end - interval.start);
            unescape_into(
                &mut content,
                &data[interval.start..interval.end],
                &config.escape,
                &specials,
            );
            outcome.frames += 1;
            if !frames.push(Frame::new(content, now)) {
                outcome.dropped += 1;
            }
        }

        rx.pop_n(cut.consumed);
        outcome.consumed = cut.consumed;
        outcome
    }
}

fn scan_fixed(
    len: usize,
    rx: &mut CircularBuffer<u8>,
    frames: &mut FrameQueue,
    now: u32,
) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    while len <= rx.len() {
        let mut data = alloc::vec![0u8; len];
        rx.read(&mut data);
        outcome.frames += 1;
        outcome.consumed += len;
        if !frames.push(Frame::new(data, now)) {
            outcome.dropped += 1;
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(bytes: &[u8]) -> CircularBuffer<u8> {
        let mut rx = CircularBuffer::new(64);
        rx.push_slice(bytes);
        rx
    }

    fn drain(frames: &mut FrameQueue) -> Vec<Vec<u8>> {
        core::iter::from_fn(|| frames.pop_front()).map(|f| f.data).collect()
    }

    #[test]
    fn test_select_strategy() {
        assert_eq!(Triage::select(&FramingConfig::default()), Triage::Unconfigured);
        assert_eq!(Triage::select(&FramingConfig::fixed_length(4)), Triage::FixedLength(4));
        assert_eq!(Triage::select(&FramingConfig::start_delimited(b"<")), Triage::StartDelimited);
        assert_eq!(Triage::select(&FramingConfig::end_delimited(b">")), Triage::EndDelimited);
        assert_eq!(Triage::select(&FramingConfig::delimited(b"<", b">")), Triage::StartAndEnd);

        // Length wins over delimiters
        let mut config = FramingConfig::delimited(b"<", b">");
        config.expected_len = 8;
        assert_eq!(Triage::select(&config), Triage::FixedLength(8));

        // Escape alone frames nothing
        let config = FramingConfig::default().with_escape(b"\\");
        assert_eq!(Triage::select(&config), Triage::Unconfigured);
    }

    #[test]
    fn test_update_reselects() {
        let mut assembler = Assembler::new(FramingConfig::default(), 5);
        assert_eq!(assembler.update(|c| c.start = b"sof".to_vec()), Triage::StartDelimited);
        assert_eq!(assembler.update(|c| c.end = b"eof".to_vec()), Triage::StartAndEnd);
        assert_eq!(assembler.update(|c| c.start.clear()), Triage::EndDelimited);
        assert_eq!(assembler.update(|c| c.end.clear()), Triage::Unconfigured);
        assert_eq!(assembler.triage().name(), "none");
    }

    #[test]
    fn test_cut_start_delimited() {
        assert_eq!(cut_start_delimited(&[4], 3), Cut::default());

        let cut = cut_start_delimited(&[12, 18, 24], 3);
        assert_eq!(cut.intervals.as_slice(), &[Interval::new(15, 18), Interval::new(21, 24)]);
        assert_eq!(cut.consumed, 24);
    }

    #[test]
    fn test_cut_end_delimited() {
        let cut = cut_end_delimited(&[12, 18, 24], 3);
        assert_eq!(
            cut.intervals.as_slice(),
            &[Interval::new(0, 12), Interval::new(15, 18), Interval::new(21, 24)]
        );
        assert_eq!(cut.consumed, 27);
    }

    #[test]
    fn test_cut_start_and_end_pairs_latest_start() {
        // "[a[b]c]" -> "b", the orphan end at 6 is garbage
        let cut = cut_start_and_end(&[0, 2], &[4, 6], 1, 1);
        assert_eq!(cut.intervals.as_slice(), &[Interval::new(3, 4)]);
        assert_eq!(cut.consumed, 7);
    }

    #[test]
    fn test_cut_start_and_end_keeps_open_start() {
        // "xx]yy[ab" -> nothing yet, drop up to the open start
        let cut = cut_start_and_end(&[5], &[2], 1, 1);
        assert!(cut.intervals.is_empty());
        assert_eq!(cut.consumed, 5);

        // "[a][b" -> "a", keep "[b"
        let cut = cut_start_and_end(&[0, 3], &[2], 1, 1);
        assert_eq!(cut.intervals.as_slice(), &[Interval::new(1, 2)]);
        assert_eq!(cut.consumed, 3);
    }

    #[test]
    fn test_cut_shared_flag() {
        // "~abc~~def~" -> "abc", "def", keep the last flag
        let cut = cut_shared_flag(&[0, 4, 5, 9], 1);
        assert_eq!(cut.intervals.as_slice(), &[Interval::new(1, 4), Interval::new(6, 9)]);
        assert_eq!(cut.consumed, 9);

        // "xx~ab" -> nothing yet, drop up to the flag
        let cut = cut_shared_flag(&[2], 1);
        assert!(cut.intervals.is_empty());
        assert_eq!(cut.consumed, 2);

        assert_eq!(cut_shared_flag(&[], 1), Cut::default());
    }

    #[test]
    fn test_scan_shared_flag() {
        let mut assembler = Assembler::new(FramingConfig::delimited(b"~", b"~"), 5);
        let mut frames = FrameQueue::default();
        assert_eq!(assembler.triage(), Triage::StartAndEnd);

        let mut rx = ring(b"~abc~~def~");
        let outcome = assembler.scan(&mut rx, &mut frames, 0);
        assert_eq!(outcome.frames, 2);
        assert_eq!(rx.len(), 1);
        assert_eq!(drain(&mut frames), [b"abc".to_vec(), b"def".to_vec()]);

        // The kept flag opens the next frame
        rx.push_slice(b"ghi~");
        assert_eq!(assembler.scan(&mut rx, &mut frames, 0).frames, 1);
        assert_eq!(drain(&mut frames), [b"ghi".to_vec()]);
    }

    #[test]
    fn test_scan_start_delimited() {
        let mut assembler = Assembler::new(FramingConfig::start_delimited(b"sof"), 5);
        let mut frames = FrameQueue::default();

        let mut rx = ring(b"Hello World!");
        let outcome = assembler.scan(&mut rx, &mut frames, 1);
        assert_eq!(outcome.frames, 0);
        assert_eq!(rx.len(), 12);

        rx.push_slice(b"sofmsgsofsmgsof");
        let outcome = assembler.scan(&mut rx, &mut frames, 2);
        assert_eq!(outcome.frames, 2);
        assert_eq!(rx.len(), 3);
        assert_eq!(drain(&mut frames), [b"msg".to_vec(), b"smg".to_vec()]);
    }

    #[test]
    fn test_scan_end_delimited() {
        let mut assembler = Assembler::new(FramingConfig::end_delimited(b"eof"), 5);
        let mut frames = FrameQueue::default();
        let mut rx = ring(b"Hello World!eofmsgeofsmgeof");

        let outcome = assembler.scan(&mut rx, &mut frames, 9);
        assert_eq!(outcome.frames, 3);
        assert_eq!(outcome.consumed, 27);
        assert!(rx.is_empty());
        assert_eq!(frames.front().map(|f| f.timestamp), Some(9));
        assert_eq!(
            drain(&mut frames),
            [b"Hello World!".to_vec(), b"msg".to_vec(), b"smg".to_vec()]
        );
    }

    #[test]
    fn test_scan_fixed_length() {
        let mut assembler = Assembler::new(FramingConfig::fixed_length(10), 5);
        let mut frames = FrameQueue::default();
        let mut rx = ring(b"123456789");

        assert_eq!(assembler.scan(&mut rx, &mut frames, 0).frames, 0);
        rx.push_slice(b"0");
        assert_eq!(assembler.scan(&mut rx, &mut frames, 0).frames, 1);
        rx.push_slice(b"123456789012345678901");
        assert_eq!(assembler.scan(&mut rx, &mut frames, 0).frames, 2);
        assert_eq!(rx.len(), 1);
        assert_eq!(frames.len(), 3);
        assert!(drain(&mut frames).iter().all(|f| f == b"1234567890"));
    }

    #[test]
    fn test_scan_unconfigured_keeps_bytes() {
        let mut assembler = Assembler::new(FramingConfig::default(), 5);
        let mut frames = FrameQueue::default();
        let mut rx = ring(b"1234567890");
        assert_eq!(assembler.scan(&mut rx, &mut frames, 0), ScanOutcome::default());
        assert_eq!(rx.len(), 10);
    }

    #[test]
    fn test_scan_with_escapes() {
        let config = FramingConfig::delimited(b"[", b"]").with_escape(b"\\");
        let mut assembler = Assembler::new(config.clone(), 5);
        let mut frames = FrameQueue::default();

        let mut encoded = Vec::new();
        config.encode_into(b"a[b]c\\", &mut encoded);
        let mut rx = ring(b"noise");
        rx.push_slice(&encoded);

        let outcome = assembler.scan(&mut rx, &mut frames, 0);
        assert_eq!(outcome.frames, 1);
        assert!(rx.is_empty());
        assert_eq!(drain(&mut frames), [b"a[b]c\\".to_vec()]);
    }

    #[test]
    fn test_scan_depth_reschedules() {
        let mut assembler = Assembler::new(FramingConfig::end_delimited(b";"), 3);
        let mut frames = FrameQueue::default();
        let mut rx = ring(b"a;b;c;d;e;");

        // Three found and more behind: trust the prefix before the third
        let outcome = assembler.scan(&mut rx, &mut frames, 0);
        assert!(outcome.pending);
        assert_eq!(outcome.frames, 2);

        let outcome = assembler.scan(&mut rx, &mut frames, 0);
        assert!(!outcome.pending);
        assert_eq!(outcome.frames, 3);
        assert!(rx.is_empty());
        assert_eq!(
            drain(&mut frames),
            [b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]
        );
    }

    #[test]
    fn test_scan_counts_dropped_frames() {
        let mut assembler = Assembler::new(FramingConfig::fixed_length(1), 5);
        let mut frames = FrameQueue::new(2);
        let mut rx = ring(b"xyz");

        let outcome = assembler.scan(&mut rx, &mut frames, 0);
        assert_eq!(outcome.frames, 3);
        assert_eq!(outcome.dropped, 1);
        assert_eq!(frames.len(), 2);
    }
}
