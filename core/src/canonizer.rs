//! Canonizer: an alternate playback mode that blends the track against a
//! time-offset copy of itself, the offset chosen per-section to maximize
//! agreement with the nearest-neighbor structure.

use serde::{Deserialize, Serialize};

use crate::distance::{DistanceWeights, beat_distance};
use crate::model::Track;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonizerConfig {
    pub master_blend: f64,
    pub resync_skew_threshold: f64,
    pub weights: DistanceWeights,
}

impl Default for CanonizerConfig {
    fn default() -> Self {
        Self {
            master_blend: 0.5,
            resync_skew_threshold: 0.05,
            weights: DistanceWeights::default(),
        }
    }
}

/// The resolved pairing for a single beat: which other beat it is played
/// against, and at what gain.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonPairing {
    pub other_which: usize,
    pub other_gain: f64,
}

/// A per-beat table of canon pairings, one entry per beat in track order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonTable {
    pub pairings: Vec<CanonPairing>,
}

/// Computes, for each section, the dominant integer offset that maximizes
/// agreement with each beat's nearest neighbor, then builds a per-beat
/// pairing table with discontinuity-aware gain halving.
#[must_use]
pub fn build_canon_table(track: &Track, config: &CanonizerConfig) -> CanonTable {
    let n = track.total_beats();
    if n == 0 {
        return CanonTable {
            pairings: Vec::new(),
        };
    }

    let sections = if track.sections.is_empty() {
        vec![(0usize, n)]
    } else {
        section_beat_ranges(track)
    };

    let mut others = vec![0usize; n];
    for (start, end) in &sections {
        let offset = dominant_offset(track, *start, *end, &config.weights);
        for which in *start..*end {
            let candidate = which as i64 - offset;
            others[which] = if candidate >= 0 && (candidate as usize) < n {
                candidate as usize
            } else {
                which
            };
        }
    }

    let mut pairings = Vec::with_capacity(n);
    for which in 0..n {
        let other_which = others[which];
        let prev_ok = which == 0 || others[which - 1] + 1 == other_which;
        let next_ok = which + 1 == n || others[which + 1] == other_which + 1;
        let gain = if prev_ok && next_ok { 1.0 } else { 0.5 };
        pairings.push(CanonPairing {
            other_which,
            other_gain: gain,
        });
    }

    CanonTable { pairings }
}

fn section_beat_ranges(track: &Track) -> Vec<(usize, usize)> {
    let mut ranges = Vec::with_capacity(track.sections.len());
    let mut cursor = 0usize;
    for section in &track.sections {
        let start = cursor;
        while cursor < track.beats.len() && track.beats[cursor].start() < section.end() {
            cursor += 1;
        }
        if cursor > start {
            ranges.push((start, cursor));
        }
    }
    if cursor < track.beats.len() {
        ranges.push((cursor, track.beats.len()));
    }
    ranges
}

/// Finds the integer offset `delta` maximizing the count of beats in
/// `[start, end)` whose globally-nearest neighbor lies at `which - delta`.
fn dominant_offset(track: &Track, start: usize, end: usize, weights: &DistanceWeights) -> i64 {
    let n = track.total_beats() as i64;
    let mut votes: std::collections::HashMap<i64, usize> = std::collections::HashMap::new();

    for which in start..end {
        let mut best_delta = 0i64;
        let mut best_distance = f64::INFINITY;
        for candidate in 0..track.total_beats() {
            if candidate == which {
                continue;
            }
            let d = beat_distance(track, &track.beats[which], &track.beats[candidate], weights);
            if d < best_distance {
                best_distance = d;
                best_delta = which as i64 - candidate as i64;
            }
        }
        if best_distance.is_finite() && best_delta != 0 && best_delta.unsigned_abs() < n as u64 {
            *votes.entry(best_delta).or_insert(0) += 1;
        }
    }

    votes
        .into_iter()
        .max_by_key(|(_, count)| *count)
        .map_or(0, |(delta, _)| delta)
}
