//! Simulated playback clock and the timer scheduler.
//!
//! The scheduler is generic over the callback it stores so it can be driven
//! without a player. All timing is in simulated time: the clock only moves
//! when the playback loop advances it by one frame period.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result};

/// Simulated time of the playback loop, advanced one frame at a time.
///
/// Frame times are derived from the frame count rather than accumulated, so
/// frame `n` at 30 fps lands on exactly `n / 30` seconds.
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    frame_rate: f64,
    now: Duration,
    frames: u64,
    /// Time and frame count at the last rate change.
    base: Duration,
    base_frames: u64,
}

impl PlaybackClock {
    pub fn new(frame_rate: f64) -> Result<Self> {
        validate_frame_rate(frame_rate)?;
        Ok(Self {
            frame_rate,
            now: Duration::ZERO,
            frames: 0,
            base: Duration::ZERO,
            base_frames: 0,
        })
    }

    fn time_at(&self, frames: u64) -> Duration {
        let elapsed = (frames - self.base_frames) as f64 * 1e9 / self.frame_rate;
        self.base + Duration::from_nanos(elapsed.round() as u64)
    }

    /// Moves the clock forward by one frame and returns the new time.
    pub fn advance(&mut self) -> Duration {
        self.frames += 1;
        self.now = self.time_at(self.frames);
        self.now
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    /// Time the next call to [`PlaybackClock::advance`] will return.
    pub fn next_frame_time(&self) -> Duration {
        self.time_at(self.frames + 1)
    }

    /// Nominal frame period, rounded to whole nanoseconds.
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos((1e9 / self.frame_rate).round() as u64)
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Changes the frame rate without moving the current time.
    pub fn set_frame_rate(&mut self, frame_rate: f64) -> Result<()> {
        validate_frame_rate(frame_rate)?;
        self.frame_rate = frame_rate;
        self.base = self.now;
        self.base_frames = self.frames;
        Ok(())
    }
}

fn validate_frame_rate(frame_rate: f64) -> Result<()> {
    if !frame_rate.is_finite() || frame_rate <= 0.0 {
        return Err(PlayerError::msg(format!(
            "frame rate must be a positive number, got {frame_rate}"
        )));
    }
    if (1e9 / frame_rate).round() < 1.0 {
        return Err(PlayerError::msg(format!(
            "frame rate {frame_rate} is too high for nanosecond frame times"
        )));
    }
    Ok(())
}

/// Opaque identifier of a registered timeout or interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Timer<C> {
    handle: TimerHandle,
    deadline: Duration,
    period: Option<Duration>,
    callback: C,
}

impl<C> Timer<C> {
    fn sort_key(&self) -> (Duration, TimerHandle) {
        (self.deadline, self.handle)
    }
}

/// A timer taken out of the scheduler to be fired.
#[derive(Debug)]
pub struct DueTimer<C> {
    pub handle: TimerHandle,
    pub deadline: Duration,
    pub period: Option<Duration>,
    pub callback: C,
}

/// Single-threaded timer queue.
///
/// While a tick is in progress (between [`Scheduler::begin_tick`] and
/// [`Scheduler::end_tick`]) new registrations and cancellations are
/// buffered and only applied when the tick ends, so nothing a callback does
/// changes which timers fire in the current tick.
#[derive(Debug)]
pub struct Scheduler<C> {
    pending: Vec<Timer<C>>,
    added: Vec<Timer<C>>,
    killed: Vec<TimerHandle>,
    /// Handle of the interval whose callback is currently running.
    firing: Option<TimerHandle>,
    next_handle: u64,
    in_tick: bool,
}

impl<C> Default for Scheduler<C> {
    fn default() -> Self {
        Self {
            pending: Vec::new(),
            added: Vec::new(),
            killed: Vec::new(),
            firing: None,
            next_handle: 1,
            in_tick: false,
        }
    }
}

impl<C> Scheduler<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `callback` once, `delay` after `now`.
    pub fn set_timeout(&mut self, now: Duration, delay: Duration, callback: C) -> TimerHandle {
        self.register(now + delay, None, callback)
    }

    /// Schedules `callback` every `period`, first at `now + period`.
    pub fn set_interval(&mut self, now: Duration, period: Duration, callback: C) -> TimerHandle {
        self.register(now + period, Some(period), callback)
    }

    /// Schedules `callback` on every tick, starting with the next one.
    pub fn set_on_frame(&mut self, now: Duration, callback: C) -> TimerHandle {
        self.register(now, Some(Duration::ZERO), callback)
    }

    fn register(&mut self, deadline: Duration, period: Option<Duration>, callback: C) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        let timer = Timer {
            handle,
            deadline,
            period,
            callback,
        };
        if self.in_tick {
            self.added.push(timer);
        } else {
            self.insert(timer);
        }
        handle
    }

    fn insert(&mut self, timer: Timer<C>) {
        let key = timer.sort_key();
        let position = self.pending.partition_point(|pending| pending.sort_key() < key);
        self.pending.insert(position, timer);
    }

    /// Cancels a timeout or interval. Returns whether a live timer was
    /// found; unknown and already-fired handles are ignored.
    pub fn clear(&mut self, handle: TimerHandle) -> bool {
        if self.in_tick {
            let live = self.contains(handle) || self.firing == Some(handle);
            if !live || self.killed.contains(&handle) {
                return false;
            }
            self.killed.push(handle);
            return true;
        }
        match self.pending.iter().position(|timer| timer.handle == handle) {
            Some(position) => {
                self.pending.remove(position);
                true
            }
            None => false,
        }
    }

    /// Whether the handle names a timer that can still fire.
    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.pending.iter().chain(&self.added).any(|timer| timer.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.added.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn begin_tick(&mut self) {
        self.in_tick = true;
    }

    /// Removes the earliest timer due at `now`, if any.
    pub fn pop_due(&mut self, now: Duration) -> Option<DueTimer<C>> {
        if self.pending.first()?.deadline > now {
            return None;
        }
        let timer = self.pending.remove(0);
        self.firing = timer.period.map(|_| timer.handle);
        Some(DueTimer {
            handle: timer.handle,
            deadline: timer.deadline,
            period: timer.period,
            callback: timer.callback,
        })
    }

    /// Puts a fired interval back in the queue. The next deadline is the
    /// first multiple of the period after `now`, counted from the deadline
    /// that just fired, so the rate does not drift with the frame period.
    /// The timer keeps its handle and becomes eligible from the next tick.
    pub fn reschedule(&mut self, now: Duration, fired: DueTimer<C>) {
        let Some(period) = fired.period else {
            return;
        };
        let deadline = if period.is_zero() {
            now
        } else {
            let mut deadline = fired.deadline + period;
            if deadline <= now {
                let missed = (now - deadline).as_nanos() / period.as_nanos() + 1;
                deadline += period * missed as u32;
            }
            deadline
        };
        self.added.push(Timer {
            handle: fired.handle,
            deadline,
            period: Some(period),
            callback: fired.callback,
        });
    }

    /// Applies registrations and cancellations buffered during the tick.
    pub fn end_tick(&mut self) {
        self.in_tick = false;
        self.firing = None;
        for timer in std::mem::take(&mut self.added) {
            self.insert(timer);
        }
        for handle in std::mem::take(&mut self.killed) {
            self.pending.retain(|timer| timer.handle != handle);
        }
    }

    pub fn clear_all(&mut self) {
        self.pending.clear();
        self.added.clear();
        self.killed.clear();
        self.firing = None;
        self.in_tick = false;
    }
}
