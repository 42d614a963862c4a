//! Input events and the per-node handler registry.

use std::{collections::HashMap, fmt};

use serde::{Deserialize, Serialize};

use crate::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    MouseDown,
    MouseUp,
    MouseMove,
    MouseOver,
    MouseOut,
    KeyDown,
    KeyUp,
}

impl EventType {
    pub fn is_key(self) -> bool {
        matches!(self, EventType::KeyDown | EventType::KeyUp)
    }

    pub fn name(self) -> &'static str {
        match self {
            EventType::MouseDown => "MOUSEDOWN",
            EventType::MouseUp => "MOUSEUP",
            EventType::MouseMove => "MOUSEMOVE",
            EventType::MouseOver => "MOUSEOVER",
            EventType::MouseOut => "MOUSEOUT",
            EventType::KeyDown => "KEYDOWN",
            EventType::KeyUp => "KEYUP",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Bitmask of pressed mouse buttons: bit 0 left, bit 1 middle, bit 2 right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MouseButtonState(pub u8);

impl MouseButtonState {
    pub const LEFT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);
    pub const RIGHT: Self = Self(4);

    pub fn is_pressed(self, button: Self) -> bool {
        self.0 & button.0 != 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyInfo {
    /// Human readable key name, e.g. `page down` or `a`.
    pub keystring: String,
    pub keycode: u32,
}

/// An input event. `target` is filled in by the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventType,
    pub position: Option<(f64, f64)>,
    pub buttons: MouseButtonState,
    pub key: Option<KeyInfo>,
    pub target: Option<NodeId>,
}

impl Event {
    pub fn mouse(kind: EventType, x: f64, y: f64, buttons: MouseButtonState) -> Self {
        Self {
            kind,
            position: Some((x, y)),
            buttons,
            key: None,
            target: None,
        }
    }

    pub fn key(kind: EventType, keystring: impl Into<String>, keycode: u32) -> Self {
        Self {
            kind,
            position: None,
            buttons: MouseButtonState::default(),
            key: Some(KeyInfo {
                keystring: keystring.into(),
                keycode,
            }),
            target: None,
        }
    }

    pub fn keystring(&self) -> Option<&str> {
        self.key.as_ref().map(|key| key.keystring.as_str())
    }

    pub(crate) fn retarget(&self, kind: EventType, target: NodeId) -> Self {
        Self {
            kind,
            target: Some(target),
            ..self.clone()
        }
    }
}

/// What a handler wants to happen after it ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Let the event bubble on to the parent.
    Continue,
    /// Do not deliver the event to any further ancestor.
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// Handlers grouped by node and event type, kept in registration order.
#[derive(Debug)]
pub struct HandlerRegistry<H> {
    handlers: HashMap<(NodeId, EventType), Vec<(HandlerId, H)>>,
    next_id: u64,
}

impl<H> Default for HandlerRegistry<H> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<H> HandlerRegistry<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, node: NodeId, kind: EventType, handler: H) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.entry((node, kind)).or_default().push((id, handler));
        id
    }

    pub fn remove(&mut self, id: HandlerId) -> bool {
        for handlers in self.handlers.values_mut() {
            if let Some(position) = handlers.iter().position(|(handler_id, _)| *handler_id == id) {
                handlers.remove(position);
                return true;
            }
        }
        false
    }

    /// Takes the handlers out so they can be called with mutable access to
    /// their owner. Hand them back with [`HandlerRegistry::restore`].
    pub fn take(&mut self, node: NodeId, kind: EventType) -> Vec<(HandlerId, H)> {
        self.handlers.remove(&(node, kind)).unwrap_or_default()
    }

    /// Reinserts taken handlers ahead of any registered while they were out.
    /// Handlers removed in the meantime are passed in `removed` and dropped.
    pub fn restore(
        &mut self,
        node: NodeId,
        kind: EventType,
        mut taken: Vec<(HandlerId, H)>,
        removed: &[HandlerId],
    ) {
        taken.retain(|(id, _)| !removed.contains(id));
        let slot = self.handlers.entry((node, kind)).or_default();
        let added = std::mem::take(slot);
        taken.extend(added);
        *slot = taken;
    }

    pub fn has_handlers(&self, node: NodeId, kind: EventType) -> bool {
        self.handlers
            .get(&(node, kind))
            .is_some_and(|handlers| !handlers.is_empty())
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }
}
