//! Attribute animations built purely on timers.
//!
//! Every animation registers two timers: a one-shot completion timer at the
//! full duration and a per-frame handler that steps the value. Steps only
//! run while the elapsed time is short of the duration; the frame that
//! reaches it belongs to the completion timer, which writes the exact end
//! value and cancels the frame handler. A shared done flag keeps a step
//! that is still queued in the completion tick from writing.

use std::{cell::Cell, rc::Rc, time::Duration};

use crate::{
    player::TimerCallback, timeline::TimerHandle, AttrKey, AttrValue, NodeId, Player, Result,
};

#[derive(Debug, Default)]
struct AnimState {
    done: Cell<bool>,
    steps: Cell<u32>,
    step_timer: Cell<Option<TimerHandle>>,
    stop_timer: Cell<Option<TimerHandle>>,
}

impl AnimState {
    fn finish(&self, player: &mut Player) {
        self.done.set(true);
        if let Some(handle) = self.step_timer.take() {
            player.clear_interval(handle);
        }
        if let Some(handle) = self.stop_timer.take() {
            player.clear_interval(handle);
        }
    }
}

/// Handle to a running (or finished) animation. Dropping it does not stop
/// the animation.
#[derive(Debug, Clone)]
pub struct Anim {
    state: Rc<AnimState>,
}

impl Anim {
    fn new() -> Self {
        Self {
            state: Rc::new(AnimState::default()),
        }
    }

    /// True once the end value was written or the animation was aborted.
    pub fn is_done(&self) -> bool {
        self.state.done.get()
    }

    /// Number of interpolated values written so far, excluding the final
    /// snap to the end value.
    pub fn steps(&self) -> u32 {
        self.state.steps.get()
    }

    /// Stops the animation where it is, without writing the end value and
    /// without running the stop callback.
    pub fn abort(&self, player: &mut Player) {
        if !self.is_done() {
            self.state.finish(player);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    Linear,
    /// Cubic Hermite curve between the start and end values with the given
    /// speeds (value units per full duration) at either end.
    Spline { start_speed: f64, end_speed: f64 },
}

impl Curve {
    fn value_at(self, start: f64, end: f64, part: f64) -> f64 {
        match self {
            Curve::Linear => start + (end - start) * part,
            Curve::Spline {
                start_speed,
                end_speed,
            } => {
                let a = -2.0 * (end - start) + start_speed + end_speed;
                let b = 3.0 * (end - start) - 2.0 * start_speed - end_speed;
                ((a * part + b) * part + start_speed) * part + start
            }
        }
    }
}

/// Configures an attribute animation before starting it.
pub struct AnimBuilder {
    node: NodeId,
    key: AttrKey,
    start: f64,
    end: f64,
    duration: Duration,
    curve: Curve,
    use_int: bool,
    on_stop: Option<TimerCallback>,
}

impl AnimBuilder {
    pub fn linear(node: NodeId, key: AttrKey, start: f64, end: f64, duration_ms: u64) -> Self {
        Self {
            node,
            key,
            start,
            end,
            duration: Duration::from_millis(duration_ms),
            curve: Curve::Linear,
            use_int: false,
            on_stop: None,
        }
    }

    pub fn spline(
        node: NodeId,
        key: AttrKey,
        start: f64,
        start_speed: f64,
        end: f64,
        end_speed: f64,
        duration_ms: u64,
    ) -> Self {
        Self {
            curve: Curve::Spline {
                start_speed,
                end_speed,
            },
            ..Self::linear(node, key, start, end, duration_ms)
        }
    }

    /// Round every written value to the nearest integer.
    pub fn use_int(mut self, use_int: bool) -> Self {
        self.use_int = use_int;
        self
    }

    /// Runs after the end value has been written, e.g. to chain animations.
    pub fn on_stop<F>(mut self, on_stop: F) -> Self
    where
        F: FnMut(&mut Player) -> Result<()> + 'static,
    {
        self.on_stop = Some(Box::new(on_stop));
        self
    }

    /// Writes the start value and schedules the animation. Attribute errors
    /// surface here, synchronously.
    pub fn start(self, player: &mut Player) -> Result<Anim> {
        let anim = Anim::new();
        let Self {
            node,
            key,
            start,
            end,
            duration,
            curve,
            use_int,
            on_stop,
        } = self;
        let write = move |player: &mut Player, value: f64| {
            let value = if use_int {
                AttrValue::Int(value.round() as i64)
            } else {
                AttrValue::Float(value)
            };
            player.set_attr(node, key, value)
        };

        if duration.is_zero() {
            write(player, end)?;
            anim.state.done.set(true);
            if let Some(mut on_stop) = on_stop {
                on_stop(player)?;
            }
            return Ok(anim);
        }

        write(player, curve.value_at(start, end, 0.0))?;
        anim.state.steps.set(1);
        let started = player.frame_time();

        let state = anim.state.clone();
        let mut on_stop = on_stop;
        let stop_timer = player.schedule_timeout(duration, move |player| {
            if state.done.get() {
                return Ok(());
            }
            state.finish(player);
            write(player, end)?;
            match on_stop.take() {
                Some(mut on_stop) => on_stop(player),
                None => Ok(()),
            }
        });
        anim.state.stop_timer.set(Some(stop_timer));

        let state = anim.state.clone();
        let step_timer = player.set_on_frame_handler(move |player| {
            let elapsed = player.frame_time().saturating_sub(started);
            if state.done.get() || elapsed >= duration {
                return Ok(());
            }
            let part = elapsed.as_secs_f64() / duration.as_secs_f64();
            state.steps.set(state.steps.get() + 1);
            write(player, curve.value_at(start, end, part))
        });
        anim.state.step_timer.set(Some(step_timer));

        Ok(anim)
    }
}

/// Linearly interpolates a numeric attribute from `start` to `end` over
/// `duration_ms`, one step per frame, finishing exactly on `end`.
pub fn animate_attr(
    player: &mut Player,
    node: NodeId,
    key: AttrKey,
    start: f64,
    end: f64,
    duration_ms: u64,
) -> Result<Anim> {
    AnimBuilder::linear(node, key, start, end, duration_ms).start(player)
}

/// Fades a node's opacity from its current value down to zero.
pub fn fade_out(player: &mut Player, node: NodeId, duration_ms: u64) -> Result<Anim> {
    fade_to(player, node, duration_ms, 0.0)
}

/// Fades a node's opacity from its current value up to `target`.
pub fn fade_in(player: &mut Player, node: NodeId, duration_ms: u64, target: f64) -> Result<Anim> {
    fade_to(player, node, duration_ms, target)
}

/// Opacity ramp with a fixed per-frame delta, snapped to `target` by a
/// one-shot timer at `duration_ms`.
pub fn fade_to(player: &mut Player, node: NodeId, duration_ms: u64, target: f64) -> Result<Anim> {
    let target = target.clamp(0.0, 1.0);
    let anim = Anim::new();
    let current = player.scene()?.get_float(node, AttrKey::Opacity)?;
    let duration = Duration::from_millis(duration_ms);

    if duration.is_zero() {
        player.set_attr(node, AttrKey::Opacity, target)?;
        anim.state.done.set(true);
        return Ok(anim);
    }

    let frames = duration.as_secs_f64() * player.frame_rate();
    let started = player.frame_time();
    let delta = (target - current) / frames;
    tracing::trace!(?node, current, target, delta, "fade started");

    let state = anim.state.clone();
    let stop_timer = player.schedule_timeout(duration, move |player| {
        if state.done.get() {
            return Ok(());
        }
        state.finish(player);
        player.set_attr(node, AttrKey::Opacity, target)
    });
    anim.state.stop_timer.set(Some(stop_timer));

    let state = anim.state.clone();
    let step_timer = player.set_on_frame_handler(move |player| {
        if state.done.get() || player.frame_time().saturating_sub(started) >= duration {
            return Ok(());
        }
        let opacity = player.scene()?.get_float(node, AttrKey::Opacity)? + delta;
        let opacity = if delta >= 0.0 {
            opacity.min(target)
        } else {
            opacity.max(target)
        };
        state.steps.set(state.steps.get() + 1);
        player.set_attr(node, AttrKey::Opacity, opacity)
    });
    anim.state.step_timer.set(Some(step_timer));

    Ok(anim)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PlayerConfig, SceneDescriptor};

    fn player() -> (Player, NodeId) {
        player_at(PlayerConfig::default().frame_rate)
    }

    fn player_at(frame_rate: f64) -> (Player, NodeId) {
        let config = PlayerConfig {
            frame_rate,
            ..PlayerConfig::default()
        };
        let mut player = Player::new(config).unwrap();
        let descriptor = SceneDescriptor::from_json(
            r#"{ "root": { "type": "div", "children": [
                { "type": "words", "id": "caption", "text": "hello" }
            ]}}"#,
        )
        .unwrap();
        player.load_scene(&descriptor).unwrap();
        let caption = player.get_element_by_id("caption").unwrap();
        (player, caption)
    }

    fn opacity(player: &Player, node: NodeId) -> f64 {
        player.scene().unwrap().get_float(node, AttrKey::Opacity).unwrap()
    }

    #[test]
    fn animate_attr_steps_once_per_frame_and_lands_on_the_end_value() {
        for (duration, expected_steps) in [(1000, 25), (1010, 26), (30, 1), (40, 1), (90, 3)] {
            let (mut player, caption) = player();
            let anim = animate_attr(&mut player, caption, AttrKey::X, 0.0, 333.3, duration).unwrap();
            player.advance_to(Duration::from_millis(duration + 200));

            assert!(anim.is_done());
            assert_eq!(anim.steps(), expected_steps, "duration {duration}");
            let x = player.scene().unwrap().get_float(caption, AttrKey::X).unwrap();
            assert_eq!(x, 333.3);
            assert_eq!(player.pending_timers(), 0);
        }
    }

    #[test]
    fn step_count_is_duration_over_period_rounded_up_at_any_rate() {
        let cases = [
            (30.0, 1000, 30),
            (30.0, 1010, 31),
            (30.0, 90, 3),
            (50.0, 1000, 50),
            (50.0, 1010, 51),
            (50.0, 90, 5),
            (60.0, 1000, 60),
            (60.0, 1010, 61),
            (60.0, 90, 6),
        ];
        for (rate, duration, expected_steps) in cases {
            let (mut player, caption) = player_at(rate);
            let anim = animate_attr(&mut player, caption, AttrKey::X, 0.0, 333.3, duration).unwrap();
            player.advance_to(Duration::from_millis(duration + 200));

            assert!(anim.is_done());
            assert_eq!(anim.steps(), expected_steps, "{rate} fps, duration {duration}");
            let x = player.scene().unwrap().get_float(caption, AttrKey::X).unwrap();
            assert_eq!(x, 333.3);
        }
    }

    #[test]
    fn fade_out_is_zero_on_the_frame_reaching_its_duration() {
        for rate in [30.0, 50.0, 60.0] {
            let (mut player, caption) = player_at(rate);
            let anim = fade_out(&mut player, caption, 1000).unwrap();
            for _ in 0..rate as usize {
                player.step();
            }

            assert_eq!(player.frame_time(), Duration::from_millis(1000), "{rate} fps");
            assert!(anim.is_done(), "{rate} fps");
            assert_eq!(opacity(&player, caption), 0.0);
            assert_eq!(player.pending_timers(), 0);
        }
    }

    #[test]
    fn animate_attr_interpolates_linearly() {
        let (mut player, caption) = player();
        animate_attr(&mut player, caption, AttrKey::Y, 100.0, 200.0, 400).unwrap();
        player.advance_to(Duration::from_millis(120));
        let y = player.scene().unwrap().get_float(caption, AttrKey::Y).unwrap();
        assert!((y - 130.0).abs() < 1e-9);
    }

    #[test]
    fn zero_duration_sets_the_end_value_immediately() {
        let (mut player, caption) = player();
        let anim = animate_attr(&mut player, caption, AttrKey::X, 0.0, 5.0, 0).unwrap();
        assert!(anim.is_done());
        assert_eq!(player.scene().unwrap().get_float(caption, AttrKey::X).unwrap(), 5.0);
        assert_eq!(player.pending_timers(), 0);
    }

    #[test]
    fn invalid_attributes_fail_synchronously() {
        let (mut player, caption) = player();
        let err = animate_attr(&mut player, caption, AttrKey::Rotation, 0.0, 1.0, 100).unwrap_err();
        assert!(matches!(err, crate::PlayerError::UnsupportedAttribute { .. }));
        assert_eq!(player.pending_timers(), 0);
    }

    #[test]
    fn on_stop_chains_and_use_int_rounds() {
        let (mut player, caption) = player();
        let chained = Rc::new(Cell::new(false));
        let flag = chained.clone();
        AnimBuilder::linear(caption, AttrKey::Size, 10.0, 20.0, 200)
            .use_int(true)
            .on_stop(move |_| {
                flag.set(true);
                Ok(())
            })
            .start(&mut player)
            .unwrap();

        player.advance_to(Duration::from_millis(40));
        let size = player.get_attr(caption, AttrKey::Size).unwrap();
        assert_eq!(size, AttrValue::Int(12));
        player.advance_to(Duration::from_millis(200));
        assert!(chained.get());
        assert_eq!(player.get_attr(caption, AttrKey::Size).unwrap(), AttrValue::Int(20));
    }

    #[test]
    fn abort_freezes_the_attribute() {
        let (mut player, caption) = player();
        let anim = animate_attr(&mut player, caption, AttrKey::X, 0.0, 100.0, 1000).unwrap();
        player.advance_to(Duration::from_millis(200));
        anim.abort(&mut player);
        player.advance_to(Duration::from_millis(2000));

        assert!(anim.is_done());
        assert_eq!(player.scene().unwrap().get_float(caption, AttrKey::X).unwrap(), 20.0);
        assert_eq!(player.pending_timers(), 0);
    }

    #[test]
    fn spline_starts_and_ends_on_its_values() {
        let curve = Curve::Spline {
            start_speed: 0.0,
            end_speed: 0.0,
        };
        assert_eq!(curve.value_at(2.0, 10.0, 0.0), 2.0);
        assert!((curve.value_at(2.0, 10.0, 1.0) - 10.0).abs() < 1e-12);
        assert!((curve.value_at(2.0, 10.0, 0.5) - 6.0).abs() < 1e-12);
    }

    #[test]
    fn fade_out_ends_at_exactly_zero() {
        for duration in [1000, 333, 17] {
            let (mut player, caption) = player();
            player.set_attr(caption, AttrKey::Opacity, 0.7).unwrap();
            let anim = fade_out(&mut player, caption, duration).unwrap();
            player.advance_to(Duration::from_millis(duration + 80));

            assert!(anim.is_done());
            assert_eq!(opacity(&player, caption), 0.0);
        }
    }

    #[test]
    fn fade_in_is_monotonic_and_snaps_to_target() {
        let (mut player, caption) = player();
        player.set_attr(caption, AttrKey::Opacity, 0.0).unwrap();
        let anim = fade_in(&mut player, caption, 2000, 0.8).unwrap();

        let mut previous = 0.0;
        while !anim.is_done() {
            player.step();
            let current = opacity(&player, caption);
            assert!(current >= previous, "{current} < {previous}");
            assert!(current <= 0.8);
            previous = current;
        }
        assert_eq!(player.frame_time(), Duration::from_millis(2000));
        assert_eq!(opacity(&player, caption), 0.8);
        assert_eq!(anim.steps(), 49);
    }

    #[test]
    fn fades_on_different_nodes_run_independently() {
        let mut player = Player::new(PlayerConfig::default()).unwrap();
        let descriptor = SceneDescriptor::from_json(
            r#"{ "root": { "type": "div", "children": [
                { "type": "image", "id": "a" },
                { "type": "image", "id": "b", "opacity": 0.0 }
            ]}}"#,
        )
        .unwrap();
        player.load_scene(&descriptor).unwrap();
        let a = player.get_element_by_id("a").unwrap();
        let b = player.get_element_by_id("b").unwrap();

        fade_out(&mut player, a, 300).unwrap();
        fade_in(&mut player, b, 600, 1.0).unwrap();
        player.advance_to(Duration::from_millis(320));
        assert_eq!(opacity(&player, a), 0.0);
        assert!(opacity(&player, b) > 0.0 && opacity(&player, b) < 1.0);
        player.advance_to(Duration::from_millis(600));
        assert_eq!(opacity(&player, b), 1.0);
    }
}
