//! The playback loop.
//!
//! [`Player`] owns the loaded scene, the timer scheduler, the input queue and
//! the renderer. Every tick advances simulated time by one frame period,
//! fires due timers, advances playing videos, dispatches queued input events
//! and renders. Callbacks run to completion one after another on the calling
//! thread; an error returned by a callback is logged and never stops the loop.

use std::{
    collections::VecDeque,
    fmt,
    path::Path,
    time::{Duration, Instant},
};

use crate::{
    events::{HandlerId, HandlerRegistry},
    render::{RenderFrame, RenderGraph},
    scene::Scene,
    timeline::{PlaybackClock, Scheduler, TimerHandle},
    AttrKey, AttrValue, DebugFlags, Event, EventType, NodeId, PlayerConfig, PlayerError,
    Propagation, Result, SceneDescriptor,
};

/// Callback run by a timeout or interval.
pub type TimerCallback = Box<dyn FnMut(&mut Player) -> Result<()>>;

/// Callback run when an event reaches the node it is registered on.
pub type EventHandler = Box<dyn FnMut(&mut Player, &Event) -> Result<Propagation>>;

pub struct Player {
    config: PlayerConfig,
    clock: PlaybackClock,
    scheduler: Scheduler<TimerCallback>,
    handlers: HandlerRegistry<EventHandler>,
    removed_handlers: Vec<HandlerId>,
    dispatching: bool,
    scene: Option<Scene>,
    generation: u32,
    render: RenderGraph,
    queued_events: VecDeque<Event>,
    current_event: Option<Event>,
    hovered: Option<NodeId>,
    playing: bool,
    stopping: bool,
    callback_errors: u64,
}

impl Player {
    pub fn new(config: PlayerConfig) -> Result<Self> {
        let clock = PlaybackClock::new(config.frame_rate)?;
        if config.debug.contains(DebugFlags::CONFIG) {
            tracing::info!(?config, "player configuration");
        }
        Ok(Self {
            config,
            clock,
            scheduler: Scheduler::new(),
            handlers: HandlerRegistry::new(),
            removed_handlers: Vec::new(),
            dispatching: false,
            scene: None,
            generation: 0,
            render: RenderGraph::new(),
            queued_events: VecDeque::new(),
            current_event: None,
            hovered: None,
            playing: false,
            stopping: false,
            callback_errors: 0,
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn set_debug_flags(&mut self, flags: DebugFlags) {
        self.config.debug = flags;
    }

    pub fn set_event_debug_level(&mut self, level: u8) {
        tracing::debug!(level, "event debug level changed");
        self.config.event_debug_level = level;
    }

    /// Loads a scene description from disk, replacing the current scene.
    ///
    /// Returns false if the file is missing or malformed; the error is logged
    /// and the previously loaded scene stays in place.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        let loaded = SceneDescriptor::from_path(path).and_then(|descriptor| self.load_scene(&descriptor));
        match loaded {
            Ok(()) => {
                tracing::info!(path = %path.display(), "scene loaded");
                true
            }
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to load scene");
                false
            }
        }
    }

    /// Replaces the current scene. Handles into the old scene become stale;
    /// event handlers, hover state and queued input belong to the old scene
    /// and are dropped. Timers are kept.
    pub fn load_scene(&mut self, descriptor: &SceneDescriptor) -> Result<()> {
        let canvas = (self.config.canvas.width, self.config.canvas.height);
        let scene = Scene::build(descriptor, self.generation + 1, canvas)?;
        self.generation += 1;
        if self.config.debug.contains(DebugFlags::MEMORY) {
            tracing::info!(nodes = scene.len(), generation = self.generation, "scene built");
        }
        self.scene = Some(scene);
        self.handlers.clear();
        self.queued_events.clear();
        self.hovered = None;
        self.render.reset();
        Ok(())
    }

    /// Drops the scene and everything attached to it.
    pub fn unload(&mut self) {
        self.scene = None;
        self.handlers.clear();
        self.queued_events.clear();
        self.hovered = None;
        self.render.reset();
    }

    pub fn scene(&self) -> Result<&Scene> {
        self.scene.as_ref().ok_or(PlayerError::NoScene)
    }

    pub fn scene_mut(&mut self) -> Result<&mut Scene> {
        self.scene.as_mut().ok_or(PlayerError::NoScene)
    }

    pub fn get_element_by_id(&self, id: &str) -> Result<NodeId> {
        self.scene()?.get_element_by_id(id)
    }

    pub fn get_attr(&self, node: NodeId, key: AttrKey) -> Result<AttrValue> {
        self.scene()?.get_attr(node, key)
    }

    pub fn set_attr(&mut self, node: NodeId, key: AttrKey, value: impl Into<AttrValue>) -> Result<()> {
        self.scene_mut()?.set_attr(node, key, value)
    }

    pub fn frame_time(&self) -> Duration {
        self.clock.now()
    }

    pub fn frame_time_ms(&self) -> f64 {
        self.clock.now().as_secs_f64() * 1000.0
    }

    pub fn frame_period(&self) -> Duration {
        self.clock.frame_period()
    }

    /// Frame rate of the current play session, or the configured rate.
    pub fn frame_rate(&self) -> f64 {
        self.clock.frame_rate()
    }

    /// Runs `callback` once, no earlier than `delay_ms` from now.
    pub fn set_timeout<F>(&mut self, delay_ms: u64, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Player) -> Result<()> + 'static,
    {
        self.schedule_timeout(Duration::from_millis(delay_ms), callback)
    }

    /// Runs `callback` every `period_ms` until cleared.
    pub fn set_interval<F>(&mut self, period_ms: u64, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Player) -> Result<()> + 'static,
    {
        self.schedule_interval(Duration::from_millis(period_ms), callback)
    }

    pub fn schedule_timeout<F>(&mut self, delay: Duration, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Player) -> Result<()> + 'static,
    {
        let now = self.clock.now();
        self.scheduler.set_timeout(now, delay, Box::new(callback))
    }

    pub fn schedule_interval<F>(&mut self, period: Duration, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Player) -> Result<()> + 'static,
    {
        let now = self.clock.now();
        self.scheduler.set_interval(now, period, Box::new(callback))
    }

    /// Runs `callback` once per frame, starting with the next one. The
    /// handle is cancelled with [`Player::clear_interval`].
    pub fn set_on_frame_handler<F>(&mut self, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Player) -> Result<()> + 'static,
    {
        let now = self.clock.now();
        self.scheduler.set_on_frame(now, Box::new(callback))
    }

    /// Cancels a timeout or interval. Unknown or already fired handles are
    /// ignored; the return value tells whether anything was cancelled.
    pub fn clear_interval(&mut self, handle: TimerHandle) -> bool {
        self.scheduler.clear(handle)
    }

    pub fn pending_timers(&self) -> usize {
        self.scheduler.len()
    }

    pub fn add_event_handler<F>(&mut self, node: NodeId, kind: EventType, handler: F) -> Result<HandlerId>
    where
        F: FnMut(&mut Player, &Event) -> Result<Propagation> + 'static,
    {
        self.scene()?.node(node)?;
        Ok(self.handlers.add(node, kind, Box::new(handler)))
    }

    pub fn remove_event_handler(&mut self, id: HandlerId) -> bool {
        if self.handlers.remove(id) {
            return true;
        }
        if self.dispatching && !self.removed_handlers.contains(&id) {
            self.removed_handlers.push(id);
            return true;
        }
        false
    }

    /// Queues an input event for dispatch on the next tick.
    pub fn push_event(&mut self, event: Event) {
        self.queued_events.push_back(event);
    }

    /// The event currently being delivered, if called from an event handler.
    pub fn current_event(&self) -> Option<&Event> {
        self.current_event.as_ref()
    }

    /// Runs the playback loop until [`Player::stop`] is called. A frame rate
    /// passed here overrides the configured one for this session.
    pub fn play(&mut self, frame_rate: Option<f64>) -> Result<()> {
        if self.scene.is_none() {
            return Err(PlayerError::NoScene);
        }
        if let Some(rate) = frame_rate {
            self.clock.set_frame_rate(rate)?;
        }
        tracing::info!(frame_rate = self.clock.frame_rate(), "playback started");
        self.playing = true;
        self.stopping = false;

        let started = Instant::now();
        let started_at = self.clock.now();
        let ticks_before = self.clock.frames();
        while !self.stopping {
            self.step();
            if self.config.realtime {
                let due = started + (self.clock.now() - started_at);
                if let Some(wait) = due.checked_duration_since(Instant::now()) {
                    std::thread::sleep(wait);
                }
            }
        }

        self.teardown();
        tracing::info!(
            frames = self.clock.frames() - ticks_before,
            simulated_ms = self.frame_time_ms(),
            callback_errors = self.callback_errors,
            "playback stopped"
        );
        Ok(())
    }

    /// Ends playback after the current callback returns. Always valid.
    pub fn stop(&mut self) {
        if !self.stopping {
            tracing::debug!("stop requested");
        }
        self.stopping = true;
    }

    pub fn is_playing(&self) -> bool {
        self.playing && !self.stopping
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping
    }

    fn teardown(&mut self) {
        self.playing = false;
        if self.clock.frame_rate() != self.config.frame_rate {
            if let Err(err) = self.clock.set_frame_rate(self.config.frame_rate) {
                tracing::warn!(error = %err, "could not restore the configured frame rate");
            }
        }
        self.scheduler.clear_all();
        self.queued_events.clear();
        self.current_event = None;
    }

    /// Runs a single tick of the playback loop.
    pub fn step(&mut self) {
        let started = Instant::now();
        let now = self.clock.advance();

        self.handle_timers(now);
        if let Some(scene) = self.scene.as_mut() {
            scene.advance_videos(now);
        }
        self.dispatch_events();

        if let Some(scene) = self.scene.as_mut() {
            let frame = self.render.render(scene, now);
            if self.config.debug.contains(DebugFlags::BLTS) {
                tracing::info!(frame = frame.frame, items = frame.items.len(), changed = frame.changed, "blits");
            }
        }
        if self.config.debug.contains(DebugFlags::PROFILE) {
            tracing::info!(
                frame = self.clock.frames(),
                elapsed_us = started.elapsed().as_micros() as u64,
                "frame profile"
            );
        }
    }

    /// Runs ticks until simulated time reaches `until`.
    pub fn advance_to(&mut self, until: Duration) {
        while self.clock.next_frame_time() <= until && !self.stopping {
            self.step();
        }
    }

    pub fn last_frame(&self) -> Option<&RenderFrame> {
        self.render.last_frame()
    }

    pub fn frames_rendered(&self) -> u64 {
        self.render.frames_rendered()
    }

    /// Number of callbacks that returned an error so far.
    pub fn callback_errors(&self) -> u64 {
        self.callback_errors
    }

    fn handle_timers(&mut self, now: Duration) {
        self.scheduler.begin_tick();
        while !self.stopping {
            let Some(mut timer) = self.scheduler.pop_due(now) else {
                break;
            };
            if let Err(err) = (timer.callback)(self) {
                self.report_callback_error("timer", &err);
            }
            self.scheduler.reschedule(now, timer);
        }
        self.scheduler.end_tick();
    }

    fn dispatch_events(&mut self) {
        while !self.stopping {
            let Some(event) = self.queued_events.pop_front() else {
                break;
            };
            self.dispatch(event);
        }
    }

    fn dispatch(&mut self, event: Event) {
        let Some(scene) = self.scene.as_ref() else {
            return;
        };
        self.log_event(&event);

        if event.kind.is_key() {
            let root = scene.root();
            self.deliver(event.retarget(event.kind, root));
            return;
        }

        let target = event.position.and_then(|(x, y)| scene.hit_test(x, y));
        if target != self.hovered {
            if let Some(old) = self.hovered.filter(|old| scene.node(*old).is_ok()) {
                self.deliver(event.retarget(EventType::MouseOut, old));
            }
            if let Some(new) = target {
                self.deliver(event.retarget(EventType::MouseOver, new));
            }
            self.hovered = target;
        }
        if let Some(target) = target {
            self.deliver(event.retarget(event.kind, target));
        }
    }

    /// Delivers an event to its target and then to each ancestor until a
    /// handler stops propagation.
    fn deliver(&mut self, event: Event) {
        let Some(target) = event.target else {
            return;
        };
        let Ok(path) = self.scene().and_then(|scene| scene.path_to_root(target)) else {
            return;
        };
        let generation = self.generation;
        self.dispatching = true;
        self.current_event = Some(event.clone());

        'bubble: for node in path {
            if !self.handlers.has_handlers(node, event.kind) {
                continue;
            }
            let mut taken = self.handlers.take(node, event.kind);
            let mut propagation = Propagation::Continue;
            for (id, handler) in taken.iter_mut() {
                if self.removed_handlers.contains(id) {
                    continue;
                }
                match handler(self, &event) {
                    Ok(Propagation::Stop) => propagation = Propagation::Stop,
                    Ok(Propagation::Continue) => {}
                    Err(err) => self.report_callback_error(event.kind.name(), &err),
                }
            }
            if self.generation != generation {
                // A handler replaced the scene; the remaining path is gone.
                break 'bubble;
            }
            let removed = std::mem::take(&mut self.removed_handlers);
            self.handlers.restore(node, event.kind, taken, &removed);
            if propagation == Propagation::Stop {
                break;
            }
        }

        self.removed_handlers.clear();
        self.current_event = None;
        self.dispatching = false;
    }

    fn log_event(&self, event: &Event) {
        let level = self.config.event_debug_level;
        let verbose = self.config.debug.contains(DebugFlags::EVENTS);
        let wanted = match event.kind {
            EventType::MouseMove => level >= 2 || verbose,
            _ => level >= 1 || verbose,
        };
        if wanted {
            tracing::info!(
                kind = %event.kind,
                position = ?event.position,
                buttons = event.buttons.0,
                key = event.keystring(),
                "input event"
            );
        }
    }

    fn report_callback_error(&mut self, source: &str, err: &PlayerError) {
        self.callback_errors += 1;
        if self.config.debug.contains(DebugFlags::WARNING) {
            tracing::warn!(source, error = %err, "callback failed");
        } else {
            tracing::debug!(source, error = %err, "callback failed");
        }
    }
}

impl fmt::Debug for Player {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Player")
            .field("frame_time", &self.clock.now())
            .field("frame_rate", &self.clock.frame_rate())
            .field("pending_timers", &self.scheduler.len())
            .field("scene_nodes", &self.scene.as_ref().map(Scene::len))
            .field("playing", &self.playing)
            .finish()
    }
}
