//! Core library for the AVG media player.
//!
//! A player owns one scene graph at a time and drives it from a frame loop.
//! Scripts interact with the running scene through attribute reads and
//! writes, one-shot and repeating timers, and event handlers attached to
//! nodes. Everything runs on the thread that called [`Player::play`].
//! Rendering is headless: each frame produces a paint-ordered draw list.

pub mod anim;
pub mod config;
pub mod error;
pub mod events;
pub mod player;
pub mod presentation;
pub mod render;
pub mod scene;
pub mod timeline;

pub use anim::{animate_attr, fade_in, fade_out, fade_to, Anim, AnimBuilder, Curve};
pub use config::{CanvasConfig, DebugFlags, PlayerConfig, DEFAULT_FRAME_RATE};
pub use error::{PlayerError, Result};
pub use events::{Event, EventType, HandlerId, KeyInfo, MouseButtonState, Propagation};
pub use player::{EventHandler, Player, TimerCallback};
pub use presentation::{Chapter, Deck, Presentation, Slide};
pub use render::{DrawItem, RenderFrame, RenderGraph};
pub use scene::{
    AttrKey, AttrValue, Node, NodeId, NodeKind, Rect, Scene, SceneDescriptor, VideoState,
};
pub use timeline::{PlaybackClock, Scheduler, TimerHandle};
