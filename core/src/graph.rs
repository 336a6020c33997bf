//! Jump Graph Builder: k-nearest-neighbor candidate generation, global
//! threshold selection, edge pruning, and last-branch-point reachability.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::distance::{DistanceWeights, beat_distance};
use crate::errors::{GraphError, GraphResult};
use crate::model::{Edge, GraphState, Track};

/// Tunables for the jump graph builder. Field defaults mirror the external
/// interface table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub max_branches: usize,
    pub max_branch_threshold: f64,
    pub current_threshold: f64,
    pub add_last_edge: bool,
    pub just_backwards: bool,
    pub just_long_branches: bool,
    pub remove_sequential_branches: bool,
    /// `None` means derive `floor(total_beats / 5)` at build time.
    pub min_long_branch: Option<usize>,
    pub weights: DistanceWeights,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_branches: 4,
            max_branch_threshold: 80.0,
            current_threshold: 60.0,
            add_last_edge: true,
            just_backwards: false,
            just_long_branches: false,
            remove_sequential_branches: false,
            min_long_branch: None,
            weights: DistanceWeights::default(),
        }
    }
}

/// Owns a normalized [`Track`] and the directed jump graph built over its
/// beats, plus the user's persistent edge-deletion set so rebuilds stay
/// idempotent.
#[derive(Clone, Debug)]
pub struct JumpGraph {
    pub track: Track,
    pub config: GraphConfig,
    pub state: GraphState,
    deleted: HashSet<(usize, usize)>,
}

impl JumpGraph {
    /// Builds a jump graph over `track`'s beats according to `config`.
    #[instrument(skip(track))]
    pub fn build(track: Track, config: GraphConfig) -> Self {
        let mut graph = Self {
            track,
            config,
            state: GraphState {
                computed_threshold: 0.0,
                current_threshold: 0.0,
                last_branch_point: 0,
                last_branch_point_enforced: false,
                total_beats: 0,
                longest_reach: 0,
                all_edges: Vec::new(),
            },
            deleted: HashSet::new(),
        };
        graph.rebuild();
        graph
    }

    #[must_use]
    pub fn total_beats(&self) -> usize {
        self.track.total_beats()
    }

    /// Marks `(src, dest)` and its reverse as deleted, then rebuilds.
    pub fn delete_edge(&mut self, src: usize, dest: usize) -> GraphResult<()> {
        if src >= self.total_beats() || dest >= self.total_beats() {
            return Err(GraphError::BeatIndexOutOfRange(src.max(dest)));
        }
        self.deleted.insert((src, dest));
        self.deleted.insert((dest, src));
        self.rebuild();
        Ok(())
    }

    /// Raises `current_threshold`, never above `max_branch_threshold`, then
    /// rebuilds the retained-neighbor lists (candidate lists are unaffected).
    pub fn raise_threshold(&mut self, new_threshold: f64) {
        self.config.current_threshold = new_threshold.min(self.config.max_branch_threshold);
        self.rebuild();
    }

    /// Recomputes candidate neighbors, threshold, retained edges and
    /// reachability from scratch, reapplying the persistent deletion set.
    #[instrument(skip(self))]
    pub fn rebuild(&mut self) {
        let n = self.total_beats();
        self.state.total_beats = n;

        if n < 2 {
            self.state.computed_threshold = self.config.max_branch_threshold;
            self.state.current_threshold = self.config.current_threshold;
            self.state.last_branch_point = n.saturating_sub(1);
            self.state.last_branch_point_enforced = false;
            self.state.longest_reach = 0;
            self.state.all_edges.clear();
            for beat in &mut self.track.beats {
                beat.all_neighbors.clear();
                beat.neighbors.clear();
            }
            return;
        }

        self.compute_candidates();
        self.state.computed_threshold = self.compute_threshold();
        self.state.current_threshold = self
            .state
            .computed_threshold
            .min(self.config.current_threshold);
        self.apply_pruning();
        self.reapply_deletions();
        self.compute_last_branch_point();
        self.collect_all_edges();
        self.state.longest_reach = self.compute_longest_reach();
    }

    fn compute_candidates(&mut self) {
        let n = self.total_beats();
        let weights = self.config.weights;
        let snapshot = self.track.beats.clone();

        for s in 0..n {
            let mut candidates: Vec<Edge> = Vec::with_capacity(n - 1);
            for d in 0..n {
                if d == s {
                    continue;
                }
                let distance = beat_distance(&self.track, &snapshot[s], &snapshot[d], &weights);
                if distance.is_finite() {
                    candidates.push(Edge {
                        src: s,
                        dest: d,
                        distance,
                        deleted: false,
                    });
                }
            }
            candidates.sort_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.dest.cmp(&b.dest))
            });
            dedupe_zero_distance(&mut candidates);
            self.track.beats[s].all_neighbors = candidates;
        }
    }

    /// Smallest threshold T (capped at `max_branch_threshold`) such that the
    /// count of candidate edges with `distance <= T` is at least
    /// `max_branches * total_beats`.
    fn compute_threshold(&self) -> f64 {
        let target = self.config.max_branches * self.total_beats();
        let mut all_distances: Vec<f64> = self
            .track
            .beats
            .iter()
            .flat_map(|b| b.all_neighbors.iter().map(|e| e.distance))
            .collect();
        all_distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        if all_distances.len() < target {
            return self.config.max_branch_threshold;
        }
        all_distances[target - 1].min(self.config.max_branch_threshold)
    }

    fn apply_pruning(&mut self) {
        let max_branches = self.config.max_branches;
        let threshold = self.state.current_threshold;
        let min_long_branch = self
            .config
            .min_long_branch
            .unwrap_or_else(|| self.total_beats() / 5);

        for beat in &mut self.track.beats {
            let src_which = beat.which();
            let mut retained: Vec<Edge> = Vec::with_capacity(max_branches);
            for edge in &beat.all_neighbors {
                if retained.len() >= max_branches {
                    break;
                }
                if edge.distance > threshold {
                    continue;
                }
                if self.config.just_backwards && edge.dest >= src_which {
                    continue;
                }
                let span = edge.dest.abs_diff(src_which);
                if self.config.just_long_branches && span < min_long_branch {
                    continue;
                }
                if self.config.remove_sequential_branches && span == 1 {
                    continue;
                }
                retained.push(edge.clone());
            }
            beat.neighbors = retained;
        }
    }

    fn reapply_deletions(&mut self) {
        if self.deleted.is_empty() {
            return;
        }
        for beat in &mut self.track.beats {
            for edge in &mut beat.neighbors {
                if self.deleted.contains(&(edge.src, edge.dest)) {
                    edge.deleted = true;
                }
            }
            for edge in &mut beat.all_neighbors {
                if self.deleted.contains(&(edge.src, edge.dest)) {
                    edge.deleted = true;
                }
            }
        }
    }

    /// Largest L such that beat L has a non-deleted outgoing neighbor,
    /// scanning backward from the last beat. Synthesizes a forced backward
    /// edge from the last beat when `add_last_edge` is set and none exists.
    fn compute_last_branch_point(&mut self) {
        let n = self.total_beats();
        for l in (0..n).rev() {
            if self.track.beats[l].best_neighbor().is_some() {
                self.state.last_branch_point = l;
                self.state.last_branch_point_enforced = true;
                return;
            }
        }

        if self.config.add_last_edge {
            self.insert_best_backward_branch();
            self.state.last_branch_point = n - 1;
            self.state.last_branch_point_enforced = self.track.beats[n - 1].best_neighbor().is_some();
            return;
        }

        self.state.last_branch_point = n - 1;
        self.state.last_branch_point_enforced = false;
    }

    /// Finds the beat whose distance *to* the last beat is smallest among
    /// all beats, and installs the reverse edge (last beat -> that beat) as
    /// a forced, non-deleted neighbor so the last beat never dead-ends.
    fn insert_best_backward_branch(&mut self) {
        let n = self.total_beats();
        if n < 2 {
            return;
        }
        let last = n - 1;

        let best = self
            .track
            .beats
            .iter()
            .take(last)
            .flat_map(|beat| beat.all_neighbors.iter())
            .filter(|edge| edge.dest == last)
            .min_by(|a, b| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .cloned();

        let Some(best) = best else { return };

        let synthesized = Edge {
            src: last,
            dest: best.src,
            distance: best.distance,
            deleted: false,
        };
        self.track.beats[last].neighbors.insert(0, synthesized.clone());
        self.track.beats[last].all_neighbors.insert(0, synthesized);
    }

    fn collect_all_edges(&mut self) {
        let mut seen = HashSet::new();
        let mut edges = Vec::new();
        for beat in &self.track.beats {
            for edge in &beat.neighbors {
                let key = (edge.src.min(edge.dest), edge.src.max(edge.dest));
                if seen.insert(key) {
                    edges.push(edge.clone());
                }
            }
        }
        self.state.all_edges = edges;
    }

    fn compute_longest_reach(&self) -> usize {
        self.track
            .beats
            .iter()
            .flat_map(|b| b.neighbors.iter())
            .filter(|e| !e.deleted)
            .map(|e| e.src.abs_diff(e.dest))
            .max()
            .unwrap_or(0)
    }
}

/// Drops candidates with `distance == 0.0` beyond the first, so a track with
/// many identical segments doesn't retain redundant zero-cost duplicates.
fn dedupe_zero_distance(candidates: &mut Vec<Edge>) {
    let mut seen_zero = false;
    candidates.retain(|edge| {
        if edge.distance == 0.0 {
            if seen_zero {
                return false;
            }
            seen_zero = true;
        }
        true
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fixture_track;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn neighbors_respect_max_branches_and_threshold() {
        let track = fixture_track(32);
        let config = GraphConfig::default();
        let graph = JumpGraph::build(track, config.clone());
        for beat in &graph.track.beats {
            assert!(beat.neighbors.len() <= config.max_branches);
            for edge in &beat.neighbors {
                assert!(edge.distance <= graph.state.current_threshold);
            }
        }
    }

    #[rstest]
    fn last_branch_point_has_reachable_forced_edge_when_enforced() {
        let track = fixture_track(16);
        let graph = JumpGraph::build(track, GraphConfig::default());
        if graph.state.last_branch_point_enforced {
            let l = graph.state.last_branch_point;
            assert!(graph.track.beats[l].best_neighbor().is_some());
        }
    }

    #[rstest]
    fn degenerate_graph_has_no_neighbors() {
        let track = fixture_track(1);
        let graph = JumpGraph::build(track, GraphConfig::default());
        assert!(graph.track.beats[0].neighbors.is_empty());
        assert!(!graph.state.last_branch_point_enforced);
    }

    #[rstest]
    fn deleting_edge_is_symmetric_after_rebuild() {
        let track = fixture_track(16);
        let mut graph = JumpGraph::build(track, GraphConfig::default());
        let (src, dest) = {
            let edge = graph.track.beats[3]
                .neighbors
                .first()
                .expect("fixture should have at least one neighbor")
                .clone();
            (edge.src, edge.dest)
        };
        graph.delete_edge(src, dest).unwrap();

        let forward_gone = graph.track.beats[src]
            .neighbors
            .iter()
            .all(|e| e.dest != dest || e.deleted);
        let backward_gone = graph.track.beats[dest]
            .neighbors
            .iter()
            .all(|e| e.dest != src || e.deleted);
        assert!(forward_gone);
        assert!(backward_gone);
    }

    #[rstest]
    fn rebuild_is_idempotent() {
        let track = fixture_track(16);
        let mut graph = JumpGraph::build(track, GraphConfig::default());
        let before = graph.state.clone();
        graph.rebuild();
        assert_eq!(before, graph.state);
    }

    #[rstest]
    fn raising_max_branches_never_decreases_edge_count() {
        let track = fixture_track(24);
        let mut low = GraphConfig::default();
        low.max_branches = 2;
        let mut high = low.clone();
        high.max_branches = 6;

        let low_graph = JumpGraph::build(track.clone(), low);
        let high_graph = JumpGraph::build(track, high);
        assert!(high_graph.state.all_edges.len() >= low_graph.state.all_edges.len());
    }
}
