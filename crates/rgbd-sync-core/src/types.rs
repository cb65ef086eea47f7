use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Creates a timestamp from the message passed to the synchronizer.
pub trait WithTimestamp: Send {
    fn timestamp(&self) -> Duration;
}

/// Identifies one of the three streams that make up an RGB-D frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Color,
    Depth,
    Calibration,
}

impl StreamKind {
    /// All stream kinds in buffer order.
    pub const ALL: [StreamKind; 3] = [StreamKind::Color, StreamKind::Depth, StreamKind::Calibration];

    pub(crate) fn index(self) -> usize {
        match self {
            StreamKind::Color => 0,
            StreamKind::Depth => 1,
            StreamKind::Calibration => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Color => "color",
            StreamKind::Depth => "depth",
            StreamKind::Calibration => "calibration",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message from each stream whose timestamps lie within the
/// tolerance window of each other.
#[derive(Debug, Clone)]
pub struct MatchedTriplet<T> {
    pub color: T,
    pub depth: T,
    pub calibration: T,
}

impl<T> MatchedTriplet<T>
where
    T: WithTimestamp,
{
    /// The timestamp the triplet is reported at, which is the color
    /// message's timestamp.
    pub fn reference_timestamp(&self) -> Duration {
        self.color.timestamp()
    }

    /// Sum of the three pairwise absolute timestamp differences.
    pub fn total_offset(&self) -> Duration {
        total_offset([
            self.color.timestamp(),
            self.depth.timestamp(),
            self.calibration.timestamp(),
        ])
    }

    /// Timestamps in (color, depth, calibration) order.
    pub fn timestamps(&self) -> [Duration; 3] {
        [
            self.color.timestamp(),
            self.depth.timestamp(),
            self.calibration.timestamp(),
        ]
    }
}

pub(crate) fn total_offset([a, b, c]: [Duration; 3]) -> Duration {
    a.abs_diff(b) + a.abs_diff(c) + b.abs_diff(c)
}

/// The stream returned by [sync](crate::sync()), emitting matched
/// triplets.
pub type TripletStream<'a, T> = BoxStream<'a, MatchedTriplet<T>>;
