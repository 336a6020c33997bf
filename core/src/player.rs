//! Audio Player Contract: the minimal capability set the playback driver
//! depends on, plus an in-process mock implementation for tests and the CLI
//! demo harness.

/// A pending jump, shared between the tick context and whatever executes
/// playback. `None` means no jump is pending.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledJump {
    /// Track time at which the jump takes effect.
    pub transition_time: f64,
    /// Track time the cursor becomes once the jump takes effect.
    pub target_time: f64,
}

/// The capability set the [`crate::driver::PlaybackDriver`] requires from a
/// player. Implementations may be a real decoder/output pair or, as in
/// [`MockPlayer`], a virtual clock.
pub trait PlayerContract {
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, time: f64);
    /// At track time `transition_time`, the cursor becomes `target_time`. At
    /// most one scheduled jump is pending; a later call supersedes an
    /// earlier one.
    fn schedule_jump(&mut self, target_time: f64, transition_time: f64);
    fn get_current_time(&self) -> f64;
    fn is_playing(&self) -> bool;
}

/// A tick-driven virtual player: track time only advances when [`MockPlayer::tick`]
/// is called, never on a real wall clock. Used by tests and the CLI's `play`
/// subcommand so the driver can be exercised without a real audio backend.
#[derive(Clone, Copy, Debug, Default)]
pub struct MockPlayer {
    time: f64,
    playing: bool,
    pending: Option<ScheduledJump>,
}

impl MockPlayer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the virtual clock by `dt` seconds, applying any scheduled
    /// jump whose transition time falls within the advanced interval.
    pub fn tick(&mut self, dt: f64) {
        if !self.playing {
            return;
        }
        let target = self.time + dt;
        if let Some(jump) = self.pending {
            if jump.transition_time <= target {
                self.time = jump.target_time;
                self.pending = None;
                return;
            }
        }
        self.time = target;
    }
}

impl PlayerContract for MockPlayer {
    fn play(&mut self) {
        self.playing = true;
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn stop(&mut self) {
        self.playing = false;
        self.time = 0.0;
        self.pending = None;
    }

    fn seek(&mut self, time: f64) {
        self.time = time.max(0.0);
        self.pending = None;
    }

    fn schedule_jump(&mut self, target_time: f64, transition_time: f64) {
        self.pending = Some(ScheduledJump {
            transition_time,
            target_time,
        });
    }

    fn get_current_time(&self) -> f64 {
        self.time
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    fn clock_only_advances_while_playing() {
        let mut player = MockPlayer::new();
        player.tick(1.0);
        assert_eq!(player.get_current_time(), 0.0);

        player.play();
        player.tick(1.0);
        assert_eq!(player.get_current_time(), 1.0);
    }

    #[rstest]
    fn scheduled_jump_applies_at_transition_time() {
        let mut player = MockPlayer::new();
        player.play();
        player.schedule_jump(3.0, 1.5);
        player.tick(2.0);
        assert_eq!(player.get_current_time(), 3.0);
    }

    #[rstest]
    fn later_schedule_supersedes_earlier() {
        let mut player = MockPlayer::new();
        player.play();
        player.schedule_jump(3.0, 1.5);
        player.schedule_jump(5.0, 1.5);
        player.tick(2.0);
        assert_eq!(player.get_current_time(), 5.0);
    }

    #[rstest]
    fn stop_resets_clock_and_pending_jump() {
        let mut player = MockPlayer::new();
        player.play();
        player.tick(1.0);
        player.schedule_jump(9.0, 5.0);
        player.stop();
        assert_eq!(player.get_current_time(), 0.0);
        assert!(!player.is_playing());
        player.play();
        player.tick(1.0);
        assert_eq!(player.get_current_time(), 1.0);
    }
}
