//! Branch Selector: decides, at a beat boundary, whether to advance
//! linearly or jump to a neighbor.

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::graph::JumpGraph;
use crate::rng::BranchRng;

/// Tunables for the drifting random-branch probability.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub min_random_branch_chance: f64,
    pub max_random_branch_chance: f64,
    pub random_branch_chance_delta: f64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_random_branch_chance: 0.18,
            max_random_branch_chance: 0.5,
            random_branch_chance_delta: 0.018,
        }
    }
}

/// Selector-owned state that persists across calls (survives a whole
/// playback session, not just one tick).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BranchState {
    pub cur_random_branch_chance: f64,
}

impl BranchState {
    #[must_use]
    pub const fn new(config: &SelectorConfig) -> Self {
        Self {
            cur_random_branch_chance: config.min_random_branch_chance,
        }
    }
}

/// Outcome of one selector decision.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decision {
    pub next_index: usize,
    pub jumped: bool,
}

/// Chooses the next beat index given the seed (the natural linear-advance
/// candidate), the graph, rng and persistent branch state.
///
/// `force_branch` additionally forces a jump (distinct from the
/// `last_branch_point` rule, which is driven by `seed_index == last_branch_point`).
#[instrument(skip(graph, rng))]
#[allow(clippy::too_many_arguments)]
pub fn select_next_beat_index(
    seed_index: usize,
    graph: &mut JumpGraph,
    config: &SelectorConfig,
    state: &mut BranchState,
    rng: &mut dyn BranchRng,
    force_branch: bool,
) -> Decision {
    let is_last_branch_point =
        graph.state.last_branch_point_enforced && seed_index == graph.state.last_branch_point;

    let wants_jump = is_last_branch_point || force_branch || {
        let draw = rng.next_f64();
        draw < state.cur_random_branch_chance
    };

    let has_neighbors = graph.track.beats[seed_index].best_neighbor().is_some();

    if wants_jump && has_neighbors {
        let dest = jump_and_rotate(graph, seed_index);
        if !is_last_branch_point && !force_branch {
            state.cur_random_branch_chance = config.min_random_branch_chance;
        }
        return Decision {
            next_index: dest,
            jumped: true,
        };
    }

    state.cur_random_branch_chance = config
        .max_random_branch_chance
        .min(state.cur_random_branch_chance + config.random_branch_chance_delta);
    Decision {
        next_index: seed_index,
        jumped: false,
    }
}

/// Picks the first non-deleted neighbor, then rotates the neighbor list one
/// position left so the next jump from this beat tries the next
/// alternative in round-robin order.
fn jump_and_rotate(graph: &mut JumpGraph, seed_index: usize) -> usize {
    let beat = &mut graph.track.beats[seed_index];
    let chosen_pos = beat
        .neighbors
        .iter()
        .position(|e| !e.deleted)
        .expect("has_neighbors was checked by the caller");
    let dest = beat.neighbors[chosen_pos].dest;
    beat.neighbors.rotate_left(chosen_pos + 1);
    dest
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphConfig;
    use crate::rng::{RandomMode, SelectorRng};
    use crate::test_utils::fixture_track;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn forced_branch_at_last_branch_point_always_jumps() {
        let track = fixture_track(8);
        let mut graph = JumpGraph::build(track, GraphConfig::default());
        assume_enforced(&mut graph);
        let seed = graph.state.last_branch_point;

        let mut rng = SelectorRng::new(&RandomMode::Fixed(vec![0.99]));
        let config = SelectorConfig::default();
        let mut state = BranchState::new(&config);

        let decision = select_next_beat_index(seed, &mut graph, &config, &mut state, &mut rng, false);
        assert!(decision.jumped);
    }

    #[rstest]
    fn random_chance_below_threshold_jumps_and_resets_chance() {
        let track = fixture_track(8);
        let mut graph = JumpGraph::build(track, GraphConfig::default());
        let seed = 0usize;
        // ensure seed has at least one neighbor candidate to jump to
        if graph.track.beats[seed].neighbors.is_empty() {
            return; // fixture-dependent; nothing to assert when no candidate exists
        }

        let config = SelectorConfig::default();
        let mut state = BranchState::new(&config);
        let mut rng = SelectorRng::new(&RandomMode::Fixed(vec![0.01]));
        // avoid accidentally hitting the forced-branch path
        graph.state.last_branch_point_enforced = false;

        let decision = select_next_beat_index(seed, &mut graph, &config, &mut state, &mut rng, false);
        if graph.track.beats[seed].neighbors.is_empty() {
            assert!(!decision.jumped);
        } else {
            assert!(decision.jumped);
            assert_eq!(state.cur_random_branch_chance, config.min_random_branch_chance);
        }
    }

    #[rstest]
    fn fully_deleted_neighbor_list_advances_linearly_instead_of_panicking() {
        let track = fixture_track(8);
        let mut graph = JumpGraph::build(track, GraphConfig::default());
        let seed = 0usize;
        if graph.track.beats[seed].neighbors.is_empty() {
            return; // fixture-dependent; nothing to delete
        }
        for edge in &mut graph.track.beats[seed].neighbors {
            edge.deleted = true;
        }
        graph.state.last_branch_point_enforced = false;

        let config = SelectorConfig::default();
        let mut state = BranchState::new(&config);
        let mut rng = SelectorRng::new(&RandomMode::Fixed(vec![0.0]));

        let decision = select_next_beat_index(seed, &mut graph, &config, &mut state, &mut rng, false);
        assert!(!decision.jumped);
        assert_eq!(decision.next_index, seed);
    }

    #[rstest]
    fn linear_advance_increases_chance() {
        let track = fixture_track(8);
        let mut graph = JumpGraph::build(track, GraphConfig::default());
        graph.state.last_branch_point_enforced = false;
        let seed = 0usize;

        let config = SelectorConfig::default();
        let mut state = BranchState::new(&config);
        let mut rng = SelectorRng::new(&RandomMode::Fixed(vec![0.99]));

        let decision = select_next_beat_index(seed, &mut graph, &config, &mut state, &mut rng, false);
        assert!(!decision.jumped);
        assert_eq!(decision.next_index, seed);
        assert_eq!(
            state.cur_random_branch_chance,
            config.min_random_branch_chance + config.random_branch_chance_delta
        );
    }

    #[rstest]
    fn neighbor_rotation_cycles_alternatives() {
        let track = fixture_track(8);
        let mut graph = JumpGraph::build(track, GraphConfig::default());
        let seed = 0usize;
        if graph.track.beats[seed].neighbors.len() < 2 {
            return;
        }
        let first_dest = graph.track.beats[seed].neighbors[0].dest;
        let second_before = graph.track.beats[seed].neighbors[1].dest;

        let config = SelectorConfig::default();
        let mut state = BranchState::new(&config);
        let mut rng = SelectorRng::new(&RandomMode::Fixed(vec![0.0]));
        graph.state.last_branch_point_enforced = false;

        let decision = select_next_beat_index(seed, &mut graph, &config, &mut state, &mut rng, false);
        assert_eq!(decision.next_index, first_dest);
        assert_eq!(graph.track.beats[seed].neighbors[0].dest, second_before);
    }

    fn assume_enforced(graph: &mut JumpGraph) {
        if !graph.state.last_branch_point_enforced {
            let n = graph.total_beats();
            graph.track.beats[n - 1].neighbors.push(crate::model::Edge {
                src: n - 1,
                dest: 0,
                distance: 1.0,
                deleted: false,
            });
            graph.state.last_branch_point = n - 1;
            graph.state.last_branch_point_enforced = true;
        }
    }
}
