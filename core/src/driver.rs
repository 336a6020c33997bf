//! Playback Driver: the tick loop that reconciles the player's clock against
//! the current beat, consults the branch selector at each beat boundary, and
//! schedules jumps on the player contract.

use serde::{Deserialize, Serialize};
use tracing::{instrument, warn};

use crate::errors::{DriverError, DriverResult};
use crate::graph::JumpGraph;
use crate::player::PlayerContract;
use crate::rng::BranchRng;
use crate::selector::{BranchState, Decision, SelectorConfig, select_next_beat_index};

/// Tunables for the driver's tick/resync/jump-offset behavior.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Nominal tick interval in milliseconds.
    pub tick_interval_ms: f64,
    /// Resync tolerance, in seconds, around the current beat's interval.
    pub resync_tolerance: f64,
    pub jump_offset_fraction: f64,
    pub jump_offset_min: f64,
    pub jump_offset_max: f64,
    pub epsilon: f64,
    pub ignore_resync_floor_ms: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 50.0,
            resync_tolerance: 0.05,
            jump_offset_fraction: 0.06,
            jump_offset_min: 0.015,
            jump_offset_max: 0.05,
            epsilon: 0.001,
            ignore_resync_floor_ms: 200.0,
        }
    }
}

/// The payload broadcast to listeners on every tick.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    pub current_beat_index: Option<usize>,
    pub beats_played: u64,
    pub current_time: f64,
    pub last_jumped: bool,
    pub last_jump_time: Option<f64>,
    pub last_jump_from_index: Option<usize>,
    pub current_threshold: f64,
    pub last_branch_point: usize,
    pub cur_random_branch_chance: f64,
}

#[derive(Clone, Copy, Debug)]
struct DriverState {
    current_beat_index: Option<usize>,
    next_transition_time: f64,
    beats_played: u64,
    last_jump_time: Option<f64>,
    last_jump_from_index: Option<usize>,
    last_tick_time: Option<f64>,
    ignore_resync_until: f64,
}

impl DriverState {
    const fn new() -> Self {
        Self {
            current_beat_index: None,
            next_transition_time: 0.0,
            beats_played: 0,
            last_jump_time: None,
            last_jump_from_index: None,
            last_tick_time: None,
            ignore_resync_until: 0.0,
        }
    }
}

/// A listener receives the state payload emitted on every tick. There is
/// exactly one producer (the tick context), so a plain `FnMut` list is
/// sufficient; no channel or lock is needed.
pub type Listener = Box<dyn FnMut(&StatePayload) + Send>;

/// Drives playback against a [`JumpGraph`] and a [`PlayerContract`].
///
/// The graph is loaded in a separate step from construction so the driver
/// can be built once by an embedding application and handed an analysis
/// later, mirroring a `loadAnalysis`/`startJukebox` split: calling `tick`
/// before a graph has been loaded is an error rather than a panic.
pub struct PlaybackDriver {
    graph: Option<JumpGraph>,
    selector_config: SelectorConfig,
    branch_state: BranchState,
    config: DriverConfig,
    rng: Box<dyn BranchRng + Send>,
    state: DriverState,
    listeners: Vec<Listener>,
}

impl PlaybackDriver {
    #[must_use]
    pub fn new(
        selector_config: SelectorConfig,
        config: DriverConfig,
        rng: Box<dyn BranchRng + Send>,
    ) -> Self {
        let branch_state = BranchState::new(&selector_config);
        Self {
            graph: None,
            selector_config,
            branch_state,
            config,
            rng,
            state: DriverState::new(),
            listeners: Vec::new(),
        }
    }

    /// Loads a graph, resetting all per-session driver state. Equivalent to
    /// `loadAnalysis` followed by `startJukebox`.
    pub fn load_analysis(&mut self, graph: JumpGraph) {
        self.branch_state = BranchState::new(&self.selector_config);
        self.state = DriverState::new();
        self.graph = Some(graph);
    }

    /// Releases the loaded graph and resets driver state. Equivalent to
    /// `clearAnalysis`.
    pub fn clear_analysis(&mut self) {
        self.graph = None;
        self.state = DriverState::new();
    }

    #[must_use]
    pub fn graph(&self) -> Option<&JumpGraph> {
        self.graph.as_ref()
    }

    pub fn add_listener(&mut self, listener: Listener) {
        self.listeners.push(listener);
    }

    /// Runs one tick. `now_ms` is the caller's monotonically increasing
    /// wall-clock counter, in milliseconds, used only to gate resync
    /// suppression after a jump; it is independent of the player's own
    /// track-time clock.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::NotLoaded`] if no analysis has been loaded yet.
    #[instrument(skip(self, player))]
    pub fn tick(
        &mut self,
        player: &mut dyn PlayerContract,
        now_ms: f64,
    ) -> DriverResult<StatePayload> {
        if self.graph.is_none() {
            return Err(DriverError::NotLoaded);
        }

        if !player.is_playing() {
            self.state.last_tick_time = None;
            return Ok(self.emit(false));
        }

        let raw_t = player.get_current_time();
        if raw_t < 0.0 {
            warn!(raw_t, "player contract returned a negative cursor, clamping to 0 and skipping tick");
            self.state.last_tick_time = Some(0.0);
            return Ok(self.emit(false));
        }
        let t = raw_t;
        let prev = self.state.last_tick_time;
        self.state.last_tick_time = Some(t);

        if now_ms >= self.state.ignore_resync_until {
            self.maybe_resync(t);
        }

        let mut jumped = false;
        if let (Some(prev_t), Some(cur_idx)) = (prev, self.state.current_beat_index) {
            if prev_t < self.state.next_transition_time && self.state.next_transition_time <= t {
                jumped = self.advance_beat(cur_idx, t, now_ms, player);
            }
        }

        Ok(self.emit(jumped))
    }

    fn maybe_resync(&mut self, t: f64) {
        let graph = self.graph.as_ref().expect("checked by caller");
        let needs_resync = match self.state.current_beat_index {
            None => true,
            Some(idx) => {
                let beat = &graph.track.beats[idx];
                let tol = self.config.resync_tolerance;
                !(beat.start() - tol <= t && t <= beat.end() + tol)
            }
        };
        if !needs_resync {
            return;
        }
        let idx = self.reacquire_beat_index(t);
        self.state.current_beat_index = Some(idx);
        self.state.next_transition_time = graph.track.beats[idx].end();
    }

    /// Binary search over beat start times (beats are ordered by start per
    /// the track invariant) for the beat whose interval contains `t`,
    /// falling back to the last beat whose start is `<= t`.
    fn reacquire_beat_index(&self, t: f64) -> usize {
        let beats = &self.graph.as_ref().expect("checked by caller").track.beats;
        let pos = beats.partition_point(|b| b.start() <= t);
        pos.saturating_sub(1).min(beats.len() - 1)
    }

    fn advance_beat(
        &mut self,
        cur_idx: usize,
        t: f64,
        now_ms: f64,
        player: &mut dyn PlayerContract,
    ) -> bool {
        let graph = self.graph.as_mut().expect("checked by caller");
        let natural_next = (cur_idx + 1) % graph.total_beats();
        let decision: Decision = select_next_beat_index(
            natural_next,
            graph,
            &self.selector_config,
            &mut self.branch_state,
            self.rng.as_mut(),
            false,
        );

        let mut jumped = false;
        if decision.next_index != natural_next {
            let chosen = &graph.track.beats[decision.next_index];
            let duration = chosen.quantum.interval.duration;
            let offset = (self.config.jump_offset_fraction * duration)
                .clamp(self.config.jump_offset_min, self.config.jump_offset_max);
            let target_time = (chosen.start() + offset).min(chosen.end() - self.config.epsilon);

            player.schedule_jump(target_time, self.state.next_transition_time);
            self.state.ignore_resync_until =
                now_ms + (duration * 1000.0).max(self.config.ignore_resync_floor_ms);
            self.state.last_jump_time = Some(t);
            self.state.last_jump_from_index = Some(cur_idx);
            jumped = true;
        }

        self.state.current_beat_index = Some(decision.next_index);
        self.state.next_transition_time = graph.track.beats[decision.next_index].end();
        self.state.beats_played += 1;
        jumped
    }

    fn emit(&mut self, last_jumped: bool) -> StatePayload {
        let (current_threshold, last_branch_point) = self
            .graph
            .as_ref()
            .map_or((0.0, 0), |g| (g.state.current_threshold, g.state.last_branch_point));
        let payload = StatePayload {
            current_beat_index: self.state.current_beat_index,
            beats_played: self.state.beats_played,
            current_time: self.state.last_tick_time.unwrap_or(0.0),
            last_jumped,
            last_jump_time: self.state.last_jump_time,
            last_jump_from_index: self.state.last_jump_from_index,
            current_threshold,
            last_branch_point,
            cur_random_branch_chance: self.branch_state.cur_random_branch_chance,
        };
        for listener in &mut self.listeners {
            listener(&payload);
        }
        payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphConfig;
    use crate::player::MockPlayer;
    use crate::rng::{RandomMode, SelectorRng};
    use crate::test_utils::fixture_track;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn make_driver(beats: usize, fixed_draws: Vec<f64>) -> (PlaybackDriver, MockPlayer) {
        let track = fixture_track(beats);
        let graph = JumpGraph::build(track, GraphConfig::default());
        let rng = Box::new(SelectorRng::new(&RandomMode::Fixed(fixed_draws)));
        let mut driver = PlaybackDriver::new(SelectorConfig::default(), DriverConfig::default(), rng);
        driver.load_analysis(graph);
        (driver, MockPlayer::new())
    }

    #[rstest]
    fn tick_before_load_is_not_loaded() {
        let rng = Box::new(SelectorRng::new(&RandomMode::Fixed(vec![0.0])));
        let mut driver = PlaybackDriver::new(SelectorConfig::default(), DriverConfig::default(), rng);
        let mut player = MockPlayer::new();
        assert!(matches!(driver.tick(&mut player, 0.0), Err(DriverError::NotLoaded)));
    }

    #[rstest]
    fn not_playing_emits_idle_state() {
        let (mut driver, mut player) = make_driver(8, vec![0.99]);
        let state = driver.tick(&mut player, 0.0).unwrap();
        assert_eq!(state.current_beat_index, None);
        assert!(!state.last_jumped);
    }

    #[rstest]
    fn first_tick_acquires_beat_zero() {
        let (mut driver, mut player) = make_driver(8, vec![0.99]);
        player.play();
        let state = driver.tick(&mut player, 0.0).unwrap();
        assert_eq!(state.current_beat_index, Some(0));
    }

    #[rstest]
    fn crossing_a_beat_boundary_without_jump_advances_linearly() {
        let (mut driver, mut player) = make_driver(8, vec![0.99, 0.99, 0.99]);
        player.play();
        driver.tick(&mut player, 0.0).unwrap();
        player.tick(1.1);
        let state = driver.tick(&mut player, 50.0).unwrap();
        assert_eq!(state.current_beat_index, Some(1));
        assert!(!state.last_jumped);
    }

    /// A player contract stub that reports a fixed, possibly negative,
    /// cursor, used to exercise the `PlayerUnavailable` clamp-and-skip path
    /// without relying on `MockPlayer` (which never produces one).
    struct BrokenCursorPlayer {
        time: f64,
    }

    impl PlayerContract for BrokenCursorPlayer {
        fn play(&mut self) {}
        fn pause(&mut self) {}
        fn stop(&mut self) {}
        fn seek(&mut self, _time: f64) {}
        fn schedule_jump(&mut self, _target_time: f64, _transition_time: f64) {}
        fn get_current_time(&self) -> f64 {
            self.time
        }
        fn is_playing(&self) -> bool {
            true
        }
    }

    #[rstest]
    fn negative_cursor_is_clamped_and_tick_is_skipped() {
        let track = fixture_track(8);
        let graph = JumpGraph::build(track, GraphConfig::default());
        let rng = Box::new(SelectorRng::new(&RandomMode::Fixed(vec![0.99])));
        let mut driver = PlaybackDriver::new(SelectorConfig::default(), DriverConfig::default(), rng);
        driver.load_analysis(graph);
        let mut player = BrokenCursorPlayer { time: -1.0 };

        let state = driver.tick(&mut player, 0.0).unwrap();
        assert_eq!(state.current_time, 0.0);
        assert!(!state.last_jumped);
        // the cursor was never resynced against, so no beat was acquired
        assert_eq!(state.current_beat_index, None);
    }

    #[rstest]
    fn degenerate_graph_never_jumps() {
        let (mut driver, mut player) = make_driver(1, vec![0.0]);
        player.play();
        driver.tick(&mut player, 0.0).unwrap();
        player.tick(1.1);
        let state = driver.tick(&mut player, 50.0).unwrap();
        assert!(!state.last_jumped);
    }

    #[rstest]
    fn clear_analysis_resets_to_not_loaded() {
        let (mut driver, mut player) = make_driver(4, vec![0.99]);
        player.play();
        driver.tick(&mut player, 0.0).unwrap();
        driver.clear_analysis();
        assert!(matches!(driver.tick(&mut player, 0.0), Err(DriverError::NotLoaded)));
    }
}
