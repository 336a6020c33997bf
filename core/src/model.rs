//! Data model shared by every component: quanta, segments, beats, edges,
//! tracks and the aggregate graph state.

use serde::{Deserialize, Serialize};

/// A half-open time interval `[start, start+duration)` shared by every
/// quantum kind (section, bar, beat, tatum).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: f64,
    pub duration: f64,
    pub confidence: f64,
}

impl Interval {
    #[must_use]
    #[inline]
    pub const fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Left-inclusive, right-exclusive overlap test.
    #[must_use]
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        self.start < other.end() && other.start < self.end()
    }
}

/// A short analysis frame carrying pitch/timbre/loudness features.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub start: f64,
    pub duration: f64,
    pub confidence: f64,
    pub loudness_start: f64,
    pub loudness_max: f64,
    pub loudness_max_time: f64,
    pub pitches: [f64; 12],
    pub timbre: [f64; 12],
}

impl Segment {
    #[must_use]
    #[inline]
    pub const fn interval(&self) -> Interval {
        Interval {
            start: self.start,
            duration: self.duration,
            confidence: self.confidence,
        }
    }
}

/// Which quantum kind a [`Quantum`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QuantumKind {
    Section,
    Bar,
    Beat,
    Tatum,
}

/// A generic time quantum: section, bar, beat or tatum. Parent/child links
/// are stored as index ranges rather than pointers, so the whole structure
/// lives in flat arrays on [`Track`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Quantum {
    pub kind: QuantumKind,
    pub interval: Interval,
    /// Index of this quantum within its own kind's array.
    pub which: usize,
    /// Index of the containing quantum of the next-coarser kind, if any.
    pub parent: Option<usize>,
    /// Position of this quantum among its parent's children.
    pub index_in_parent: usize,
}

impl Quantum {
    #[must_use]
    #[inline]
    pub const fn start(&self) -> f64 {
        self.interval.start
    }

    #[must_use]
    #[inline]
    pub const fn end(&self) -> f64 {
        self.interval.end()
    }

    /// Index of the preceding quantum of the same kind, if any.
    #[must_use]
    #[inline]
    pub const fn prev(&self) -> Option<usize> {
        self.which.checked_sub(1)
    }

    /// Index of the following quantum of the same kind. The caller must
    /// bound this against the length of the owning kind's array
    /// (`Track::sections`/`bars`/`beats`/`tatums`), since a flat quantum has
    /// no reference to its own sibling count.
    #[must_use]
    #[inline]
    pub const fn next(&self) -> usize {
        self.which + 1
    }
}

/// A directed similarity link between two beats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: usize,
    pub dest: usize,
    pub distance: f64,
    pub deleted: bool,
}

/// The primary playback entity: a beat quantum, augmented with its
/// overlapping segments and the outgoing edges survived by pruning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Beat {
    pub quantum: Quantum,
    /// Indices into `Track::segments`, in time order.
    pub overlapping_segments: Vec<usize>,
    /// Candidate outgoing edges sorted by distance ascending, before any
    /// threshold or fan-out limit is applied.
    pub all_neighbors: Vec<Edge>,
    /// Retained outgoing edges after pruning, rotated by the selector as it
    /// cycles through alternatives.
    pub neighbors: Vec<Edge>,
}

impl Beat {
    #[must_use]
    #[inline]
    pub const fn which(&self) -> usize {
        self.quantum.which
    }

    #[must_use]
    #[inline]
    pub const fn start(&self) -> f64 {
        self.quantum.start()
    }

    #[must_use]
    #[inline]
    pub const fn end(&self) -> f64 {
        self.quantum.end()
    }

    #[must_use]
    #[inline]
    pub const fn index_in_parent(&self) -> usize {
        self.quantum.index_in_parent
    }

    /// First non-deleted retained neighbor, if any.
    #[must_use]
    pub fn best_neighbor(&self) -> Option<&Edge> {
        self.neighbors.iter().find(|e| !e.deleted)
    }
}

/// Track-level metadata not tied to any single quantum.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackMeta {
    pub duration: f64,
    pub tempo: f64,
    pub time_signature: u8,
}

/// The fully normalized analysis: linked quanta plus segments.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub meta: TrackMeta,
    pub sections: Vec<Quantum>,
    pub bars: Vec<Quantum>,
    pub beats: Vec<Beat>,
    pub tatums: Vec<Quantum>,
    pub segments: Vec<Segment>,
}

impl Track {
    #[must_use]
    #[inline]
    pub fn total_beats(&self) -> usize {
        self.beats.len()
    }
}

/// Aggregate, recomputed-on-build state of the jump graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphState {
    pub computed_threshold: f64,
    pub current_threshold: f64,
    pub last_branch_point: usize,
    /// Whether `last_branch_point` actually has an outgoing edge to force a
    /// branch from. False means no safe branch point could be established
    /// (degenerate or entirely pruned graph); the driver must then never
    /// force a branch and should treat the constraint as satisfied
    /// vacuously.
    pub last_branch_point_enforced: bool,
    pub total_beats: usize,
    pub longest_reach: usize,
    /// Every edge ever produced by the builder, including deleted ones, for
    /// visualization/inspection purposes. Deduplicated across both
    /// directions of a deleted pair.
    pub all_edges: Vec<Edge>,
}
