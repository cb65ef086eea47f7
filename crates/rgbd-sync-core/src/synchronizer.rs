//! Three-stream approximate-time matching.
//!
//! The [`Synchronizer`] keeps one bounded [`PendingBuffer`] per stream.
//! Every ingested message triggers a search, against the other two
//! buffers, for the triple containing it whose pairwise timestamp
//! differences all fit within the tolerance and whose total pairwise
//! difference is the smallest. Ties go to the triple with the earliest reference
//! (color) timestamp.
//!
//! Once a triple is emitted, each stream's buffered messages older than
//! the one just matched are discarded, and later arrivals older than it
//! are rejected as late. Each stream's matched timestamps therefore
//! never decrease, which keeps emission in timestamp order.

use crate::{
    buffer::PendingBuffer,
    config::SyncConfig,
    types::{MatchedTriplet, StreamKind, WithTimestamp, total_offset},
};
use eyre::Result;
use indexmap::IndexMap;
use itertools::iproduct;
use std::time::Duration;
use tracing::debug;

/// The matching state for one color/depth/calibration source.
#[derive(Debug)]
pub struct Synchronizer<T>
where
    T: WithTimestamp,
{
    /// Buffers indexed by [StreamKind].
    buffers: [PendingBuffer<T>; 3],

    /// Maximum pairwise timestamp difference within a triplet.
    tolerance: Duration,

    /// Timestamp of the last matched message on each stream. Messages
    /// older than this are rejected.
    commit_ts: [Option<Duration>; 3],

    /// Reference timestamp of the last emitted triplet.
    last_reference: Option<Duration>,

    triplets_emitted: u64,
    late_rejected: u64,
    evicted: u64,
    superseded: u64,
}

impl<T> Synchronizer<T>
where
    T: WithTimestamp,
{
    pub fn new(config: SyncConfig) -> Result<Self> {
        config.validate()?;

        let SyncConfig {
            tolerance,
            queue_size,
        } = config;

        Ok(Self {
            buffers: std::array::from_fn(|_| PendingBuffer::with_capacity(queue_size)),
            tolerance,
            commit_ts: [None; 3],
            last_reference: None,
            triplets_emitted: 0,
            late_rejected: 0,
            evicted: 0,
            superseded: 0,
        })
    }

    /// Buffer a message and try to form a triplet containing it.
    ///
    /// Returns `None` when no triplet qualifies yet or when the message
    /// arrived too late to ever be matched. Neither case is an error.
    ///
    /// Only triples containing the new message are searched. As long as
    /// every message enters through `ingest`, no other triple can
    /// qualify, so at most one triplet forms per message.
    pub fn ingest(&mut self, kind: StreamKind, item: T) -> Option<MatchedTriplet<T>> {
        let index = match self.push(kind, item) {
            Ok(index) => index,
            Err(late) => {
                debug!(
                    stream = %kind,
                    timestamp = ?late.timestamp(),
                    commit_ts = ?self.commit_ts[kind.index()],
                    "Rejected late message"
                );
                return None;
            }
        };

        let indices = self.best_candidate(Some((kind, index)))?;
        self.emit(indices)
    }

    /// Insert a message into the buffer of its stream and return its
    /// position there.
    ///
    /// Returns `Err(item)` if the message is older than the last message
    /// already matched on the same stream.
    pub fn push(&mut self, kind: StreamKind, item: T) -> Result<usize, T> {
        let idx = kind.index();
        let timestamp = item.timestamp();

        match self.commit_ts[idx] {
            Some(commit_ts) if timestamp < commit_ts => {
                self.late_rejected += 1;
                return Err(item);
            }
            _ => {}
        }

        if let Some(evicted) = self.buffers[idx].push(item) {
            self.evicted += 1;
            debug!(
                stream = %kind,
                timestamp = ?evicted.timestamp(),
                capacity = self.buffers[idx].capacity(),
                "Evicted oldest unmatched message on buffer overflow"
            );
        }

        Ok(self.buffers[idx].len() - 1)
    }

    /// Try to form the best triplet from all buffered messages.
    ///
    /// Needed only after messages were added with [`push`](Self::push);
    /// [`ingest`](Self::ingest) already finds every triplet a new message
    /// completes.
    pub fn try_match(&mut self) -> Option<MatchedTriplet<T>> {
        let indices = self.best_candidate(None)?;
        self.emit(indices)
    }

    /// Search for the qualifying triple with the smallest total offset,
    /// optionally pinning one stream to a single buffered message.
    fn best_candidate(&self, pinned: Option<(StreamKind, usize)>) -> Option<[usize; 3]> {
        let candidates: [Vec<(usize, Duration)>; 3] = std::array::from_fn(|idx| {
            let buffer = &self.buffers[idx];
            match pinned {
                Some((kind, index)) if kind.index() == idx => buffer
                    .iter()
                    .nth(index)
                    .map(|item| vec![(index, item.timestamp())])
                    .unwrap_or_default(),
                _ => buffer
                    .iter()
                    .map(WithTimestamp::timestamp)
                    .enumerate()
                    .collect(),
            }
        });
        let [color, depth, calibration] = &candidates;
        let tolerance = self.tolerance;

        let (_, _, indices) = iproduct!(color, depth, calibration)
            .filter_map(|(&(ci, c), &(di, d), &(ki, k))| {
                let stamps = [c, d, k];
                let min = stamps.iter().min()?;
                let max = stamps.iter().max()?;
                (*max - *min <= tolerance).then_some((total_offset(stamps), c, [ci, di, ki]))
            })
            .min_by_key(|&(offset, reference, _)| (offset, reference))?;

        Some(indices)
    }

    /// Remove the messages at `[color, depth, calibration]` indices and
    /// commit their timestamps.
    fn emit(&mut self, [ci, di, ki]: [usize; 3]) -> Option<MatchedTriplet<T>> {
        let color = self.take(StreamKind::Color, ci)?;
        let depth = self.take(StreamKind::Depth, di)?;
        let calibration = self.take(StreamKind::Calibration, ki)?;
        let triplet = MatchedTriplet {
            color,
            depth,
            calibration,
        };

        for (kind, ts) in StreamKind::ALL.into_iter().zip(triplet.timestamps()) {
            let idx = kind.index();
            self.commit_ts[idx] = Some(self.commit_ts[idx].map_or(ts, |prev| prev.max(ts)));

            let dropped = self.buffers[idx].drop_before(ts);
            if dropped > 0 {
                self.superseded += dropped as u64;
                debug!(
                    stream = %kind,
                    dropped,
                    matched_ts = ?ts,
                    "Discarded superseded messages"
                );
            }
        }

        let reference = triplet.reference_timestamp();
        self.last_reference = Some(reference);
        self.triplets_emitted += 1;

        debug!(
            triplet_num = self.triplets_emitted,
            reference_ts = ?reference,
            total_offset = ?triplet.total_offset(),
            "Emitting matched triplet"
        );

        Some(triplet)
    }

    fn take(&mut self, kind: StreamKind, index: usize) -> Option<T> {
        self.buffers[kind.index()].remove(index)
    }

    /// The buffer of unmatched messages for a stream.
    pub fn buffer(&self, kind: StreamKind) -> &PendingBuffer<T> {
        &self.buffers[kind.index()]
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Get synchronization statistics.
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            triplets_emitted: self.triplets_emitted,
            late_rejected: self.late_rejected,
            evicted: self.evicted,
            superseded: self.superseded,
            last_reference: self.last_reference,
            buffer_sizes: StreamKind::ALL
                .into_iter()
                .map(|kind| (kind, self.buffer(kind).len()))
                .collect(),
        }
    }
}

/// Statistics about the synchronization state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Number of triplets emitted.
    pub triplets_emitted: u64,

    /// Number of messages rejected for being older than the last match
    /// on their stream.
    pub late_rejected: u64,

    /// Number of messages evicted on buffer overflow.
    pub evicted: u64,

    /// Number of messages discarded because a newer message on the same
    /// stream was matched.
    pub superseded: u64,

    /// Reference timestamp of the last emitted triplet.
    pub last_reference: Option<Duration>,

    /// Current buffer sizes per stream.
    pub buffer_sizes: IndexMap<StreamKind, usize>,
}
