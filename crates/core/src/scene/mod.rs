//! Scene graph: an arena of nodes built from a JSON scene description.
//!
//! Nodes are created in bulk when a description is loaded and are only
//! mutated through attribute writes afterwards; the tree structure never
//! changes during playback.

mod attr;
mod node;

use std::{collections::HashMap, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

pub use attr::{AttrKey, AttrValue};
pub use node::{
    CameraData, Node, NodeId, NodeKind, PanoramaData, Rect, RelayData, VideoData, VideoState,
    WordsData,
};

use crate::{PlayerError, Result};

/// Declarative description of a scene as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDescriptor {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    pub root: NodeDescriptor,
}

impl SceneDescriptor {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

fn full_opacity() -> f64 {
    1.0
}

fn enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default = "full_opacity")]
    pub opacity: f64,
    #[serde(default)]
    pub angle: f64,
    #[serde(default = "enabled")]
    pub active: bool,
    #[serde(flatten)]
    pub kind: KindDescriptor,
    #[serde(default)]
    pub children: Vec<NodeDescriptor>,
}

fn default_fps() -> f64 {
    25.0
}

fn default_font() -> String {
    "arial".to_string()
}

fn default_font_size() -> i64 {
    15
}

fn default_color() -> String {
    "FFFFFF".to_string()
}

fn default_max_rotation() -> f64 {
    360.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum KindDescriptor {
    Image {
        #[serde(default)]
        href: String,
    },
    Video {
        #[serde(default)]
        href: String,
        #[serde(default = "default_fps")]
        fps: f64,
        #[serde(default)]
        num_frames: Option<i64>,
        #[serde(default, rename = "loop")]
        looping: bool,
    },
    Words {
        #[serde(default)]
        text: String,
        #[serde(default = "default_font")]
        font: String,
        #[serde(default = "default_font_size")]
        size: i64,
        #[serde(default = "default_color")]
        color: String,
        #[serde(default)]
        parawidth: Option<i64>,
    },
    Div {},
    Excl {
        #[serde(default)]
        activechild: Option<usize>,
    },
    Camera {
        #[serde(default)]
        device: String,
        #[serde(default)]
        brightness: i64,
        #[serde(default)]
        exposure: i64,
        #[serde(default)]
        gain: i64,
        #[serde(default)]
        shutter: i64,
    },
    #[serde(rename = "panoimage")]
    Panorama {
        #[serde(default)]
        href: String,
        #[serde(default)]
        rotation: Option<f64>,
        #[serde(default = "default_max_rotation")]
        maxrotation: f64,
        #[serde(default)]
        sensorwidth: f64,
        #[serde(default)]
        sensorheight: f64,
        #[serde(default)]
        focallength: f64,
    },
    #[serde(rename = "conradrelais")]
    Relay {
        #[serde(default)]
        card: i64,
        #[serde(default)]
        states: u8,
    },
}

impl KindDescriptor {
    fn build(&self, child_count: usize) -> Result<NodeKind> {
        let kind = match self {
            KindDescriptor::Image { href } => NodeKind::Image { href: href.clone() },
            KindDescriptor::Video {
                href,
                fps,
                num_frames,
                looping,
            } => {
                if *fps <= 0.0 {
                    return Err(PlayerError::InvalidScene(format!(
                        "video `{href}` has non-positive fps {fps}"
                    )));
                }
                NodeKind::Video(VideoData {
                    href: href.clone(),
                    fps: *fps,
                    num_frames: *num_frames,
                    frame_num: 0,
                    looping: *looping,
                    state: VideoState::Stopped,
                    anchor: None,
                })
            }
            KindDescriptor::Words {
                text,
                font,
                size,
                color,
                parawidth,
            } => NodeKind::Words(WordsData {
                text: text.clone(),
                font: font.clone(),
                size: *size,
                color: node::parse_color(color)?,
                para_width: *parawidth,
            }),
            KindDescriptor::Div {} => NodeKind::Div,
            KindDescriptor::Excl { activechild } => {
                let active_child = match activechild {
                    Some(index) if *index >= child_count => {
                        return Err(PlayerError::InvalidScene(format!(
                            "active child {index} out of range for {child_count} children"
                        )));
                    }
                    Some(index) => Some(*index),
                    None if child_count > 0 => Some(0),
                    None => None,
                };
                NodeKind::Excl { active_child }
            }
            KindDescriptor::Camera {
                device,
                brightness,
                exposure,
                gain,
                shutter,
            } => NodeKind::Camera(CameraData {
                device: device.clone(),
                brightness: *brightness,
                exposure: *exposure,
                gain: *gain,
                shutter: *shutter,
            }),
            KindDescriptor::Panorama {
                href,
                rotation,
                maxrotation,
                sensorwidth,
                sensorheight,
                focallength,
            } => NodeKind::Panorama(PanoramaData {
                href: href.clone(),
                rotation: rotation
                    .unwrap_or(maxrotation / 2.0)
                    .clamp(0.0, maxrotation.max(0.0)),
                max_rotation: maxrotation.max(0.0),
                sensor_width: *sensorwidth,
                sensor_height: *sensorheight,
                focal_length: *focallength,
            }),
            KindDescriptor::Relay { card, states } => NodeKind::Relay(RelayData {
                card: *card,
                states: *states,
            }),
        };
        if !kind.is_container() && child_count > 0 {
            return Err(PlayerError::InvalidScene(format!(
                "{} nodes cannot have children",
                kind.name()
            )));
        }
        Ok(kind)
    }
}

/// A loaded scene. Owns every node; handles are only valid for the
/// generation that issued them.
#[derive(Debug)]
pub struct Scene {
    generation: u32,
    width: u32,
    height: u32,
    nodes: Vec<Node>,
    ids: HashMap<String, NodeId>,
    root: NodeId,
    dirty: Vec<NodeId>,
}

impl Scene {
    /// Builds a scene from its description. `generation` must differ from
    /// that of any scene whose handles may still be around.
    pub fn build(descriptor: &SceneDescriptor, generation: u32, canvas: (u32, u32)) -> Result<Self> {
        let width = descriptor.width.unwrap_or(canvas.0);
        let height = descriptor.height.unwrap_or(canvas.1);
        let mut scene = Self {
            generation,
            width,
            height,
            nodes: Vec::new(),
            ids: HashMap::new(),
            root: NodeId {
                index: 0,
                generation,
            },
            dirty: Vec::new(),
        };
        scene.root = scene.insert(&descriptor.root, None)?;

        let root = &mut scene.nodes[0];
        if root.rect.width == 0.0 && root.rect.height == 0.0 {
            root.rect.width = f64::from(width);
            root.rect.height = f64::from(height);
        }
        scene.dirty = (0..scene.nodes.len())
            .map(|index| scene.handle(index))
            .collect();
        Ok(scene)
    }

    fn insert(&mut self, desc: &NodeDescriptor, parent: Option<NodeId>) -> Result<NodeId> {
        let handle = self.handle(self.nodes.len());
        let kind = desc.kind.build(desc.children.len())?;
        let id = desc.id.clone().unwrap_or_default();
        if !id.is_empty() && self.ids.insert(id.clone(), handle).is_some() {
            return Err(PlayerError::InvalidScene(format!("duplicate node id `{id}`")));
        }

        let mut node = Node::new(id, kind);
        node.parent = parent;
        node.rect = Rect::new(desc.x, desc.y, desc.width.max(0.0), desc.height.max(0.0));
        node.opacity = node::clamp_opacity(desc.opacity);
        node.angle = desc.angle;
        node.active = desc.active;
        self.nodes.push(node);

        let mut children = Vec::with_capacity(desc.children.len());
        for child in &desc.children {
            children.push(self.insert(child, Some(handle))?);
        }
        self.nodes[handle.index()].children = children;
        Ok(handle)
    }

    fn handle(&self, index: usize) -> NodeId {
        NodeId {
            index: index as u32,
            generation: self.generation,
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get_element_by_id(&self, id: &str) -> Result<NodeId> {
        self.ids
            .get(id)
            .copied()
            .ok_or_else(|| PlayerError::NodeNotFound(id.to_string()))
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        if id.generation != self.generation {
            return Err(PlayerError::StaleNode);
        }
        self.nodes.get(id.index()).ok_or(PlayerError::StaleNode)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        if id.generation != self.generation {
            return Err(PlayerError::StaleNode);
        }
        self.nodes.get_mut(id.index()).ok_or(PlayerError::StaleNode)
    }

    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        Ok(self.node(id)?.parent)
    }

    pub fn num_children(&self, id: NodeId) -> Result<usize> {
        Ok(self.node(id)?.children.len())
    }

    pub fn child(&self, id: NodeId, index: usize) -> Result<NodeId> {
        let node = self.node(id)?;
        node.children
            .get(index)
            .copied()
            .ok_or_else(|| PlayerError::ChildIndexOutOfRange {
                parent: node.id.clone(),
                index,
                len: node.children.len(),
            })
    }

    /// The node followed by its ancestors up to the root.
    pub fn path_to_root(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut path = vec![id];
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            path.push(parent);
            current = self.node(parent)?.parent;
        }
        Ok(path)
    }

    pub fn get_attr(&self, id: NodeId, key: AttrKey) -> Result<AttrValue> {
        self.node(id)?.get(key)
    }

    pub fn set_attr(&mut self, id: NodeId, key: AttrKey, value: impl Into<AttrValue>) -> Result<()> {
        let node = self.node_mut(id)?;
        let was_dirty = node.dirty;
        node.set(key, value.into())?;
        if !was_dirty {
            self.dirty.push(id);
        }
        Ok(())
    }

    pub fn get_attr_by_name(&self, id: NodeId, name: &str) -> Result<AttrValue> {
        self.get_attr(id, name.parse()?)
    }

    pub fn set_attr_by_name(&mut self, id: NodeId, name: &str, value: impl Into<AttrValue>) -> Result<()> {
        self.set_attr(id, name.parse()?, value)
    }

    pub fn get_float(&self, id: NodeId, key: AttrKey) -> Result<f64> {
        self.get_attr(id, key)?.as_f64(key)
    }

    pub fn get_int(&self, id: NodeId, key: AttrKey) -> Result<i64> {
        self.get_attr(id, key)?.as_i64(key)
    }

    pub fn get_string(&self, id: NodeId, key: AttrKey) -> Result<String> {
        self.get_attr(id, key)?.into_string(key)
    }

    pub fn set_float(&mut self, id: NodeId, key: AttrKey, value: f64) -> Result<()> {
        self.set_attr(id, key, value)
    }

    pub fn set_int(&mut self, id: NodeId, key: AttrKey, value: i64) -> Result<()> {
        self.set_attr(id, key, value)
    }

    pub fn set_string(&mut self, id: NodeId, key: AttrKey, value: impl Into<String>) -> Result<()> {
        self.set_attr(id, key, value.into())
    }

    pub fn play_video(&mut self, id: NodeId) -> Result<()> {
        self.with_video(id, |video| {
            if video.state != VideoState::Playing {
                video.state = VideoState::Playing;
                video.anchor = None;
            }
        })
    }

    pub fn pause_video(&mut self, id: NodeId) -> Result<()> {
        self.with_video(id, |video| {
            if video.state == VideoState::Playing {
                video.state = VideoState::Paused;
                video.anchor = None;
            }
        })
    }

    pub fn stop_video(&mut self, id: NodeId) -> Result<()> {
        self.with_video(id, |video| {
            video.state = VideoState::Stopped;
            video.frame_num = 0;
            video.anchor = None;
        })
    }

    fn with_video(&mut self, id: NodeId, f: impl FnOnce(&mut VideoData)) -> Result<()> {
        let node = self.node_mut(id)?;
        match &mut node.kind {
            NodeKind::Video(video) => f(video),
            _ => {
                return Err(PlayerError::WrongNodeType {
                    id: node.id.clone(),
                    expected: "video",
                })
            }
        }
        if !node.dirty {
            node.dirty = true;
            self.dirty.push(id);
        }
        Ok(())
    }

    /// Switches a single relay of a relay card on or off.
    pub fn set_relay(&mut self, id: NodeId, index: u8, on: bool) -> Result<()> {
        if index >= 8 {
            return Err(PlayerError::InvalidValue {
                attr: AttrKey::States.name(),
                reason: format!("relay index {index} out of range 0..8"),
            });
        }
        let node = self.node(id)?;
        let NodeKind::Relay(relay) = &node.kind else {
            return Err(PlayerError::WrongNodeType {
                id: node.id.clone(),
                expected: "conradrelais",
            });
        };
        let states = if on {
            relay.states | (1 << index)
        } else {
            relay.states & !(1 << index)
        };
        self.set_attr(id, AttrKey::States, i64::from(states))
    }

    /// Moves every playing video to the frame matching `now`.
    pub(crate) fn advance_videos(&mut self, now: Duration) {
        for (index, node) in self.nodes.iter_mut().enumerate() {
            if let NodeKind::Video(video) = &mut node.kind {
                let before = (video.frame_num, video.state);
                video.advance(now);
                if before != (video.frame_num, video.state) && !node.dirty {
                    node.dirty = true;
                    self.dirty.push(NodeId {
                        index: index as u32,
                        generation: self.generation,
                    });
                }
            }
        }
    }

    /// Absolute rectangle of a node in canvas coordinates.
    pub fn absolute_rect(&self, id: NodeId) -> Result<Rect> {
        let mut rect = self.node(id)?.rect;
        let mut current = self.node(id)?.parent;
        while let Some(parent) = current {
            let node = self.node(parent)?;
            rect = rect.offset(node.rect.x, node.rect.y);
            current = node.parent;
        }
        Ok(rect)
    }

    /// Topmost visible, active node containing the point. Rotation is
    /// ignored; the axis-aligned rectangle is used.
    pub fn hit_test(&self, x: f64, y: f64) -> Option<NodeId> {
        self.hit_test_from(self.root, 0.0, 0.0, x, y)
    }

    fn hit_test_from(&self, id: NodeId, origin_x: f64, origin_y: f64, x: f64, y: f64) -> Option<NodeId> {
        let node = self.node(id).ok()?;
        if node.opacity <= 0.0 || !node.active {
            return None;
        }
        let rect = node.rect.offset(origin_x, origin_y);
        for child in node.visible_children().iter().rev() {
            if let Some(hit) = self.hit_test_from(*child, rect.x, rect.y, x, y) {
                return Some(hit);
            }
        }
        rect.contains(x, y).then_some(id)
    }

    /// Handles of nodes modified since the last call, in modification order.
    pub fn take_dirty(&mut self) -> Vec<NodeId> {
        let dirty = std::mem::take(&mut self.dirty);
        for id in &dirty {
            if let Some(node) = self.nodes.get_mut(id.index()) {
                node.dirty = false;
            }
        }
        dirty
    }

    /// Depth-first walk in paint order, yielding each node with its depth.
    pub fn walk(&self) -> Vec<(usize, NodeId)> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(0, self.root)];
        while let Some((depth, id)) = stack.pop() {
            out.push((depth, id));
            if let Ok(node) = self.node(id) {
                stack.extend(node.children.iter().rev().map(|child| (depth + 1, *child)));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENE: &str = r#"{
        "width": 800,
        "height": 600,
        "root": {
            "type": "div",
            "id": "main",
            "children": [
                { "type": "image", "id": "background", "href": "bg.png", "width": 800, "height": 600 },
                { "type": "excl", "id": "switch", "x": 100, "y": 50, "activechild": 1, "children": [
                    { "type": "words", "id": "first", "text": "one", "width": 100, "height": 20 },
                    { "type": "words", "id": "second", "text": "two", "width": 100, "height": 20 }
                ]},
                { "type": "video", "id": "clip", "href": "clip.mpg", "num_frames": 50 },
                { "type": "conradrelais", "id": "relais", "card": 0 }
            ]
        }
    }"#;

    fn scene() -> Scene {
        let descriptor = SceneDescriptor::from_json(SCENE).unwrap();
        Scene::build(&descriptor, 1, (640, 480)).unwrap()
    }

    #[test]
    fn looks_up_nodes_and_children() {
        let scene = scene();
        let switch = scene.get_element_by_id("switch").unwrap();
        assert_eq!(scene.num_children(switch).unwrap(), 2);
        let second = scene.child(switch, 1).unwrap();
        assert_eq!(scene.node(second).unwrap().id(), "second");
        assert_eq!(scene.parent(second).unwrap(), Some(switch));
        assert_eq!(scene.size(), (800, 600));
    }

    #[test]
    fn missing_ids_and_bad_indices_are_errors() {
        let scene = scene();
        assert!(scene.get_element_by_id("missing").unwrap_err().is_lookup());
        let switch = scene.get_element_by_id("switch").unwrap();
        assert!(scene.child(switch, 2).unwrap_err().is_range());
    }

    #[test]
    fn active_child_out_of_range_keeps_previous_value() {
        let mut scene = scene();
        let switch = scene.get_element_by_id("switch").unwrap();
        let err = scene.set_int(switch, AttrKey::ActiveChild, 2).unwrap_err();
        assert!(err.is_range());
        assert_eq!(scene.get_int(switch, AttrKey::ActiveChild).unwrap(), 1);
        scene.set_int(switch, AttrKey::ActiveChild, 0).unwrap();
        assert_eq!(scene.get_int(switch, AttrKey::ActiveChild).unwrap(), 0);
    }

    #[test]
    fn rejects_invalid_descriptions() {
        let duplicate = r#"{ "root": { "type": "div", "id": "a", "children": [
            { "type": "image", "id": "a" } ] } }"#;
        let descriptor = SceneDescriptor::from_json(duplicate).unwrap();
        assert!(Scene::build(&descriptor, 1, (640, 480)).is_err());

        let bad_excl = r#"{ "root": { "type": "excl", "activechild": 3, "children": [] } }"#;
        let descriptor = SceneDescriptor::from_json(bad_excl).unwrap();
        assert!(Scene::build(&descriptor, 1, (640, 480)).is_err());

        assert!(SceneDescriptor::from_json(r#"{ "root": { "type": "hologram" } }"#).is_err());
    }

    #[test]
    fn stale_handles_are_rejected() {
        let old = scene();
        let id = old.get_element_by_id("background").unwrap();
        let descriptor = SceneDescriptor::from_json(SCENE).unwrap();
        let new = Scene::build(&descriptor, 2, (640, 480)).unwrap();
        assert!(matches!(new.node(id), Err(PlayerError::StaleNode)));
    }

    #[test]
    fn hit_test_prefers_topmost_active_child() {
        let mut scene = scene();
        let second = scene.get_element_by_id("second").unwrap();
        assert_eq!(scene.hit_test(150.0, 60.0), Some(second));
        assert_eq!(scene.absolute_rect(second).unwrap(), Rect::new(100.0, 50.0, 100.0, 20.0));

        scene.set_float(second, AttrKey::Opacity, 0.0).unwrap();
        let background = scene.get_element_by_id("background").unwrap();
        assert_eq!(scene.hit_test(150.0, 60.0), Some(background));
        assert_eq!(scene.hit_test(900.0, 60.0), None);
    }

    #[test]
    fn writes_are_tracked_once_per_frame() {
        let mut scene = scene();
        scene.take_dirty();
        let first = scene.get_element_by_id("first").unwrap();
        scene.set_attr_by_name(first, "Left", 12).unwrap();
        scene.set_attr_by_name(first, "String", "hello").unwrap();
        assert_eq!(scene.take_dirty(), vec![first]);
        assert!(scene.take_dirty().is_empty());
        assert_eq!(scene.get_string(first, AttrKey::Text).unwrap(), "hello");
    }

    #[test]
    fn video_and_relay_operations_check_node_type() {
        let mut scene = scene();
        let clip = scene.get_element_by_id("clip").unwrap();
        let relais = scene.get_element_by_id("relais").unwrap();
        scene.play_video(clip).unwrap();
        scene.advance_videos(Duration::from_millis(0));
        scene.advance_videos(Duration::from_millis(400));
        assert_eq!(scene.get_int(clip, AttrKey::FrameNum).unwrap(), 10);
        scene.stop_video(clip).unwrap();
        assert_eq!(scene.get_int(clip, AttrKey::FrameNum).unwrap(), 0);

        assert!(matches!(
            scene.play_video(relais),
            Err(PlayerError::WrongNodeType { .. })
        ));
        scene.set_relay(relais, 3, true).unwrap();
        scene.set_relay(relais, 0, true).unwrap();
        scene.set_relay(relais, 3, false).unwrap();
        assert_eq!(scene.get_int(relais, AttrKey::States).unwrap(), 1);
    }

    #[test]
    fn walk_visits_in_paint_order() {
        let scene = scene();
        let ids: Vec<&str> = scene
            .walk()
            .into_iter()
            .map(|(_, id)| scene.node(id).unwrap().id())
            .collect();
        assert_eq!(
            ids,
            vec!["main", "background", "switch", "first", "second", "clip", "relais"]
        );
    }
}
