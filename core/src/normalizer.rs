//! Analysis Normalizer: parses a raw analysis payload (flat, or nested under
//! an `analysis` key) into a fully linked [`Track`].

use serde::{Deserialize, Serialize};

use crate::errors::{AnalysisError, AnalysisResult};
use crate::model::{Beat, Interval, Quantum, QuantumKind, Segment, Track, TrackMeta};

#[derive(Debug, Deserialize, Serialize)]
struct RawInterval {
    start: f64,
    duration: f64,
    #[serde(default)]
    confidence: f64,
}

#[derive(Debug, Deserialize, Serialize)]
struct RawSegment {
    start: f64,
    duration: f64,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    loudness_start: f64,
    #[serde(default)]
    loudness_max: f64,
    #[serde(default)]
    loudness_max_time: f64,
    pitches: Vec<f64>,
    timbre: Vec<f64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct RawTrackMeta {
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    tempo: f64,
    #[serde(default = "default_time_signature")]
    time_signature: u8,
}

const fn default_time_signature() -> u8 {
    4
}

#[derive(Debug, Deserialize, Serialize)]
struct RawAnalysis {
    #[serde(default)]
    sections: Vec<RawInterval>,
    #[serde(default)]
    bars: Vec<RawInterval>,
    beats: Vec<RawInterval>,
    #[serde(default)]
    tatums: Vec<RawInterval>,
    #[serde(default)]
    segments: Vec<RawSegment>,
    #[serde(default)]
    track: RawTrackMeta,
}

#[derive(Debug, Deserialize)]
struct Wrapper {
    analysis: RawAnalysis,
}

/// Parses and normalizes a raw analysis payload (JSON bytes) into a [`Track`].
///
/// Accepts both a flat shape and one nested under an `analysis` field.
pub fn normalize(payload: &str) -> AnalysisResult<Track> {
    let raw = parse_raw(payload)?;
    build_track(raw)
}

fn parse_raw(payload: &str) -> AnalysisResult<RawAnalysis> {
    if let Ok(wrapper) = serde_json::from_str::<Wrapper>(payload) {
        return Ok(wrapper.analysis);
    }
    Ok(serde_json::from_str::<RawAnalysis>(payload)?)
}

fn build_track(raw: RawAnalysis) -> AnalysisResult<Track> {
    if raw.beats.is_empty() {
        return Err(AnalysisError::NoBeats);
    }

    for (index, seg) in raw.segments.iter().enumerate() {
        if seg.pitches.len() != 12 || seg.timbre.len() != 12 {
            return Err(AnalysisError::InvalidFeatureVector(index));
        }
    }

    check_monotonic("section", &raw.sections)?;
    check_monotonic("bar", &raw.bars)?;
    check_monotonic("beat", &raw.beats)?;
    check_monotonic("tatum", &raw.tatums)?;

    let sections = build_quanta(QuantumKind::Section, &raw.sections, None);
    let bars = build_quanta(QuantumKind::Bar, &raw.bars, Some(&sections));
    let mut beat_quanta = build_quanta(QuantumKind::Beat, &raw.beats, Some(&bars));
    let tatums = build_quanta(QuantumKind::Tatum, &raw.tatums, Some(&beat_quanta));

    if let Some(last) = beat_quanta.last_mut() {
        if raw.track.duration > 0.0 {
            let end = last.interval.start + last.interval.duration;
            if end < raw.track.duration {
                last.interval.duration = raw.track.duration - last.interval.start;
            }
        }
    }

    let segments: Vec<Segment> = raw
        .segments
        .into_iter()
        .map(|s| Segment {
            start: s.start,
            duration: s.duration,
            confidence: s.confidence,
            loudness_start: s.loudness_start,
            loudness_max: s.loudness_max,
            loudness_max_time: s.loudness_max_time,
            pitches: vec_to_array12(&s.pitches),
            timbre: vec_to_array12(&s.timbre),
        })
        .collect();

    let beats: Vec<Beat> = beat_quanta
        .into_iter()
        .map(|quantum| {
            let overlapping_segments = overlapping_segment_indices(&quantum, &segments);
            Beat {
                quantum,
                overlapping_segments,
                all_neighbors: Vec::new(),
                neighbors: Vec::new(),
            }
        })
        .collect();

    Ok(Track {
        meta: TrackMeta {
            duration: raw.track.duration,
            tempo: raw.track.tempo,
            time_signature: raw.track.time_signature,
        },
        sections,
        bars,
        beats,
        tatums,
        segments,
    })
}

fn vec_to_array12(v: &[f64]) -> [f64; 12] {
    let mut out = [0.0; 12];
    out.copy_from_slice(&v[..12]);
    out
}

fn check_monotonic(kind: &'static str, intervals: &[RawInterval]) -> AnalysisResult<()> {
    for (i, window) in intervals.windows(2).enumerate() {
        if window[1].start < window[0].start {
            return Err(AnalysisError::NonMonotonicQuanta { kind, index: i + 1 });
        }
    }
    Ok(())
}

/// Builds a flat quantum array, linking each quantum to the index of its
/// containing parent quantum (the last parent whose interval's start is
/// `<= this quantum's start`) and stamping `index_in_parent` monotonically
/// per parent.
fn build_quanta(kind: QuantumKind, intervals: &[RawInterval], parents: Option<&[Quantum]>) -> Vec<Quantum> {
    let mut per_parent_counter = vec![0usize; parents.map_or(0, <[Quantum]>::len)];
    let mut parent_cursor = 0usize;

    intervals
        .iter()
        .enumerate()
        .map(|(which, raw)| {
            let parent = parents.and_then(|parents| {
                while parent_cursor + 1 < parents.len()
                    && parents[parent_cursor + 1].start() <= raw.start
                {
                    parent_cursor += 1;
                }
                parents.get(parent_cursor).map(|_| parent_cursor)
            });

            let index_in_parent = if let Some(p) = parent {
                let idx = per_parent_counter[p];
                per_parent_counter[p] += 1;
                idx
            } else {
                which
            };

            Quantum {
                kind,
                interval: Interval {
                    start: raw.start,
                    duration: raw.duration,
                    confidence: raw.confidence,
                },
                which,
                parent,
                index_in_parent,
            }
        })
        .collect()
}

fn overlapping_segment_indices(beat: &Quantum, segments: &[Segment]) -> Vec<usize> {
    let beat_interval = beat.interval;
    segments
        .iter()
        .enumerate()
        .filter(|(_, seg)| beat_interval.intersects(&seg.interval()))
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample_payload(nested: bool) -> String {
        let body = serde_json::json!({
            "sections": [{"start": 0.0, "duration": 4.0, "confidence": 1.0}],
            "bars": [
                {"start": 0.0, "duration": 2.0, "confidence": 1.0},
                {"start": 2.0, "duration": 2.0, "confidence": 1.0}
            ],
            "beats": [
                {"start": 0.0, "duration": 1.0, "confidence": 1.0},
                {"start": 1.0, "duration": 1.0, "confidence": 1.0},
                {"start": 2.0, "duration": 1.0, "confidence": 1.0},
                {"start": 3.0, "duration": 1.0, "confidence": 1.0}
            ],
            "tatums": [],
            "segments": [
                {
                    "start": 0.0, "duration": 0.5, "confidence": 1.0,
                    "loudness_start": -10.0, "loudness_max": -5.0, "loudness_max_time": 0.1,
                    "pitches": [0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0],
                    "timbre": [0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0,0.0]
                }
            ],
            "track": {"duration": 4.0, "tempo": 120.0, "time_signature": 4}
        });
        if nested {
            serde_json::json!({ "analysis": body }).to_string()
        } else {
            body.to_string()
        }
    }

    #[rstest]
    #[case::flat(false)]
    #[case::nested(true)]
    fn accepts_flat_and_nested_payloads(#[case] nested: bool) {
        let track = normalize(&sample_payload(nested)).unwrap();
        assert_eq!(track.beats.len(), 4);
        assert_eq!(track.bars.len(), 2);
    }

    #[rstest]
    fn beat_quanta_link_to_bar_parent_with_stamped_index() {
        let track = normalize(&sample_payload(false)).unwrap();
        assert_eq!(track.beats[0].quantum.parent, Some(0));
        assert_eq!(track.beats[1].quantum.parent, Some(0));
        assert_eq!(track.beats[2].quantum.parent, Some(1));
        assert_eq!(track.beats[0].index_in_parent(), 0);
        assert_eq!(track.beats[1].index_in_parent(), 1);
        assert_eq!(track.beats[2].index_in_parent(), 0);
    }

    #[rstest]
    fn empty_beats_is_rejected() {
        let payload = serde_json::json!({
            "beats": [],
        })
        .to_string();
        assert!(matches!(normalize(&payload), Err(AnalysisError::NoBeats)));
    }

    #[rstest]
    fn bad_feature_vector_length_is_rejected() {
        let payload = serde_json::json!({
            "beats": [{"start": 0.0, "duration": 1.0}],
            "segments": [{
                "start": 0.0, "duration": 1.0,
                "pitches": [0.0, 1.0],
                "timbre": [0.0; 12]
            }]
        })
        .to_string();
        assert!(matches!(
            normalize(&payload),
            Err(AnalysisError::InvalidFeatureVector(0))
        ));
    }

    #[rstest]
    fn last_beat_extends_to_track_duration() {
        let payload = serde_json::json!({
            "beats": [
                {"start": 0.0, "duration": 1.0},
                {"start": 1.0, "duration": 0.5}
            ],
            "track": {"duration": 2.0, "tempo": 120.0, "time_signature": 4}
        })
        .to_string();
        let track = normalize(&payload).unwrap();
        assert_eq!(track.beats[1].end(), 2.0);
    }
}
