//! Utilities shared by the crate's test modules: logger/tracing init and a
//! small synthetic analysis fixture.

use std::sync::OnceLock;

use crate::logger::{init_logger, init_tracing};
use crate::model::{Beat, Interval, Quantum, QuantumKind, Segment, Track, TrackMeta};

static INIT: OnceLock<()> = OnceLock::new();

/// Initialize the logger and tracing subscriber.
///
/// # Panics
///
/// Panics if the tracing subscriber cannot be installed.
#[allow(clippy::missing_inline_in_public_items)]
pub fn init() {
    INIT.get_or_init(|| {
        init_logger(log::LevelFilter::Debug);
        if let Err(e) = tracing::subscriber::set_global_default(init_tracing()) {
            panic!("Error setting global default tracing subscriber: {e:?}")
        }
    });
}

/// Builds a synthetic, evenly spaced track of `n` one-second beats, each
/// with a single overlapping segment whose features drift slightly so that
/// distances between beats are small but nonzero.
#[must_use]
pub fn fixture_track(n: usize) -> Track {
    let beats: Vec<Beat> = (0..n)
        .map(|i| {
            let quantum = Quantum {
                kind: QuantumKind::Beat,
                interval: Interval {
                    start: i as f64,
                    duration: 1.0,
                    confidence: 1.0,
                },
                which: i,
                parent: None,
                index_in_parent: i % 4,
            };
            Beat {
                quantum,
                overlapping_segments: vec![i],
                all_neighbors: Vec::new(),
                neighbors: Vec::new(),
            }
        })
        .collect();

    let segments: Vec<Segment> = (0..n)
        .map(|i| {
            let drift = (i as f64) * 0.01;
            Segment {
                start: i as f64,
                duration: 1.0,
                confidence: 1.0,
                loudness_start: -10.0 + drift,
                loudness_max: -5.0 + drift,
                loudness_max_time: 0.1,
                pitches: [drift; 12],
                timbre: [drift; 12],
            }
        })
        .collect();

    Track {
        meta: TrackMeta {
            duration: n as f64,
            tempo: 120.0,
            time_signature: 4,
        },
        sections: Vec::new(),
        bars: Vec::new(),
        beats,
        tatums: Vec::new(),
        segments,
    }
}
