//! Beat distance kernel: weighted similarity between two beats' overlapping
//! segments.

use serde::{Deserialize, Serialize};

use crate::model::{Beat, Segment, Track};

/// Per-feature weights used to combine segment-level differences into a
/// single distance. Defaults mirror the Canonizer's reference weighting.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistanceWeights {
    pub timbre: f64,
    pub pitch: f64,
    pub loudness_start: f64,
    pub loudness_max: f64,
    pub duration: f64,
    pub confidence: f64,
}

impl Default for DistanceWeights {
    fn default() -> Self {
        Self {
            timbre: 1.0,
            pitch: 10.0,
            loudness_start: 1.0,
            loudness_max: 1.0,
            duration: 100.0,
            confidence: 1.0,
        }
    }
}

/// Constant penalty applied per missing segment position, and for a beat
/// phase mismatch.
const MISSING_SEGMENT_PENALTY: f64 = 100.0;
const PHASE_MISMATCH_PENALTY: f64 = 100.0;

fn euclidean12(a: &[f64; 12], b: &[f64; 12]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

fn segment_distance(a: &Segment, b: &Segment, weights: &DistanceWeights) -> f64 {
    euclidean12(&a.timbre, &b.timbre) * weights.timbre
        + euclidean12(&a.pitches, &b.pitches) * weights.pitch
        + (a.loudness_start - b.loudness_start).abs() * weights.loudness_start
        + (a.loudness_max - b.loudness_max).abs() * weights.loudness_max
        + (a.duration - b.duration).abs() * weights.duration
        + (a.confidence - b.confidence).abs() * weights.confidence
}

/// Computes `B(a, b)`: the directed distance from beat `a` to beat `b`.
///
/// Returns `f64::INFINITY` when `a` has no overlapping segments (a mute or
/// unknown beat must never be treated as a viable jump source).
#[must_use]
pub fn beat_distance(track: &Track, a: &Beat, b: &Beat, weights: &DistanceWeights) -> f64 {
    let n = a.overlapping_segments.len();
    if n == 0 {
        return f64::INFINITY;
    }

    let mut sum = 0.0;
    for (i, &seg_a_idx) in a.overlapping_segments.iter().enumerate() {
        let seg_a = &track.segments[seg_a_idx];
        sum += match b.overlapping_segments.get(i) {
            Some(&seg_b_idx) => segment_distance(seg_a, &track.segments[seg_b_idx], weights),
            None => MISSING_SEGMENT_PENALTY,
        };
    }

    let mut distance = sum / n as f64;
    if a.index_in_parent() != b.index_in_parent() {
        distance += PHASE_MISMATCH_PENALTY;
    }
    distance
}
