use std::time::Duration;

use crate::{AttrKey, AttrValue, PlayerError, Result};

/// Handle to a node of a loaded scene.
///
/// The generation ties the handle to the scene it was issued by, so a
/// handle kept across a reload is rejected instead of addressing whatever
/// node now occupies the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Half-open: the right and bottom edges are outside.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && y >= self.y && x < self.right() && y < self.bottom()
    }

    pub fn offset(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoState {
    Stopped,
    Paused,
    Playing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoData {
    pub href: String,
    pub fps: f64,
    pub num_frames: Option<i64>,
    pub frame_num: i64,
    pub looping: bool,
    pub state: VideoState,
    /// Simulated time and frame at which the current play run started.
    /// Cleared whenever the frame is moved so the next advance re-anchors.
    pub(crate) anchor: Option<(Duration, i64)>,
}

impl VideoData {
    pub(crate) fn advance(&mut self, now: Duration) {
        if self.state != VideoState::Playing {
            return;
        }
        let (start, start_frame) = *self.anchor.get_or_insert((now, self.frame_num));
        let elapsed = now.saturating_sub(start).as_secs_f64();
        let mut frame = start_frame + (elapsed * self.fps).floor() as i64;
        if let Some(total) = self.num_frames.filter(|total| *total > 0) {
            if frame >= total {
                if self.looping {
                    frame %= total;
                } else {
                    frame = total - 1;
                    self.state = VideoState::Stopped;
                    self.anchor = None;
                }
            }
        }
        self.frame_num = frame;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WordsData {
    pub text: String,
    pub font: String,
    pub size: i64,
    pub color: String,
    pub para_width: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraData {
    pub device: String,
    pub brightness: i64,
    pub exposure: i64,
    pub gain: i64,
    pub shutter: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanoramaData {
    pub href: String,
    /// Degrees.
    pub rotation: f64,
    pub max_rotation: f64,
    pub sensor_width: f64,
    pub sensor_height: f64,
    pub focal_length: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelayData {
    pub card: i64,
    pub states: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Image { href: String },
    Video(VideoData),
    Words(WordsData),
    Div,
    /// Exclusive switch: only the active child is shown.
    Excl { active_child: Option<usize> },
    Camera(CameraData),
    Panorama(PanoramaData),
    Relay(RelayData),
}

impl NodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            NodeKind::Image { .. } => "image",
            NodeKind::Video(_) => "video",
            NodeKind::Words(_) => "words",
            NodeKind::Div => "div",
            NodeKind::Excl { .. } => "excl",
            NodeKind::Camera(_) => "camera",
            NodeKind::Panorama(_) => "panoimage",
            NodeKind::Relay(_) => "conradrelais",
        }
    }

    pub fn is_container(&self) -> bool {
        matches!(self, NodeKind::Div | NodeKind::Excl { .. })
    }
}

/// A scene graph node. Children are owned by the scene arena; this struct
/// only holds their handles plus a back-reference to the parent.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: String,
    pub(crate) kind: NodeKind,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) rect: Rect,
    pub(crate) opacity: f64,
    pub(crate) angle: f64,
    pub(crate) active: bool,
    pub(crate) dirty: bool,
}

impl Node {
    pub(crate) fn new(id: String, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            parent: None,
            children: Vec::new(),
            rect: Rect::default(),
            opacity: 1.0,
            angle: 0.0,
            active: true,
            dirty: true,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Position relative to the parent.
    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn opacity(&self) -> f64 {
        self.opacity
    }

    pub fn angle(&self) -> f64 {
        self.angle
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Children that take part in rendering and hit-testing.
    pub fn visible_children(&self) -> &[NodeId] {
        match self.kind {
            NodeKind::Excl { active_child } => match active_child {
                Some(index) => &self.children[index..=index],
                None => &[],
            },
            _ => &self.children,
        }
    }

    pub fn get(&self, key: AttrKey) -> Result<AttrValue> {
        let value = match key {
            AttrKey::Id => AttrValue::Str(self.id.clone()),
            AttrKey::X | AttrKey::Left => AttrValue::Float(self.rect.x),
            AttrKey::Y | AttrKey::Top => AttrValue::Float(self.rect.y),
            AttrKey::Width => AttrValue::Float(self.rect.width),
            AttrKey::Height => AttrValue::Float(self.rect.height),
            AttrKey::Right => AttrValue::Float(self.rect.right()),
            AttrKey::Bottom => AttrValue::Float(self.rect.bottom()),
            AttrKey::Opacity => AttrValue::Float(self.opacity),
            AttrKey::Angle => AttrValue::Float(self.angle),
            AttrKey::Active => AttrValue::Bool(self.active),
            _ => return self.get_kind_attr(key),
        };
        Ok(value)
    }

    fn get_kind_attr(&self, key: AttrKey) -> Result<AttrValue> {
        let value = match (&self.kind, key) {
            (NodeKind::Image { href }, AttrKey::Href) => href.clone().into(),
            (NodeKind::Video(video), AttrKey::Href) => video.href.clone().into(),
            (NodeKind::Video(video), AttrKey::Fps) => video.fps.into(),
            (NodeKind::Video(video), AttrKey::FrameNum) => video.frame_num.into(),
            (NodeKind::Video(video), AttrKey::Loop) => video.looping.into(),
            (NodeKind::Words(words), AttrKey::Text) => words.text.clone().into(),
            (NodeKind::Words(words), AttrKey::Font) => words.font.clone().into(),
            (NodeKind::Words(words), AttrKey::Size) => words.size.into(),
            (NodeKind::Words(words), AttrKey::Color) => words.color.clone().into(),
            (NodeKind::Words(words), AttrKey::ParaWidth) => words.para_width.unwrap_or(-1).into(),
            (NodeKind::Excl { active_child }, AttrKey::ActiveChild) => {
                active_child.map_or(-1, |index| index as i64).into()
            }
            (NodeKind::Camera(camera), AttrKey::Device) => camera.device.clone().into(),
            (NodeKind::Camera(camera), AttrKey::Brightness) => camera.brightness.into(),
            (NodeKind::Camera(camera), AttrKey::Exposure) => camera.exposure.into(),
            (NodeKind::Camera(camera), AttrKey::Gain) => camera.gain.into(),
            (NodeKind::Camera(camera), AttrKey::Shutter) => camera.shutter.into(),
            (NodeKind::Panorama(pano), AttrKey::Href) => pano.href.clone().into(),
            (NodeKind::Panorama(pano), AttrKey::Rotation) => pano.rotation.into(),
            (NodeKind::Panorama(pano), AttrKey::MaxRotation) => pano.max_rotation.into(),
            (NodeKind::Panorama(pano), AttrKey::SensorWidth) => pano.sensor_width.into(),
            (NodeKind::Panorama(pano), AttrKey::SensorHeight) => pano.sensor_height.into(),
            (NodeKind::Panorama(pano), AttrKey::FocalLength) => pano.focal_length.into(),
            (NodeKind::Relay(relay), AttrKey::Card) => relay.card.into(),
            (NodeKind::Relay(relay), AttrKey::States) => i64::from(relay.states).into(),
            (kind, key) => return Err(unsupported(kind, key)),
        };
        Ok(value)
    }

    /// Writes an attribute. On error the node is left unchanged.
    pub fn set(&mut self, key: AttrKey, value: AttrValue) -> Result<()> {
        match key {
            AttrKey::Id => return Err(PlayerError::ReadOnlyAttribute(key.name())),
            AttrKey::X | AttrKey::Left => self.rect.x = value.as_f64(key)?,
            AttrKey::Y | AttrKey::Top => self.rect.y = value.as_f64(key)?,
            AttrKey::Width => self.rect.width = non_negative(key, value.as_f64(key)?)?,
            AttrKey::Height => self.rect.height = non_negative(key, value.as_f64(key)?)?,
            AttrKey::Right => self.rect.width = (value.as_f64(key)? - self.rect.x).max(0.0),
            AttrKey::Bottom => self.rect.height = (value.as_f64(key)? - self.rect.y).max(0.0),
            AttrKey::Opacity => self.opacity = clamp_opacity(value.as_f64(key)?),
            AttrKey::Angle => self.angle = value.as_f64(key)?,
            AttrKey::Active => self.active = value.as_bool(key)?,
            _ => self.set_kind_attr(key, value)?,
        }
        self.dirty = true;
        Ok(())
    }

    fn set_kind_attr(&mut self, key: AttrKey, value: AttrValue) -> Result<()> {
        let child_count = self.children.len();
        let node_id = &self.id;
        match (&mut self.kind, key) {
            (NodeKind::Image { href }, AttrKey::Href) => *href = value.into_string(key)?,
            (NodeKind::Video(video), AttrKey::Href) => video.href = value.into_string(key)?,
            (NodeKind::Video(video), AttrKey::FrameNum) => {
                let frame = value.as_i64(key)?;
                if frame < 0 || video.num_frames.is_some_and(|total| frame >= total) {
                    return Err(PlayerError::InvalidValue {
                        attr: key.name(),
                        reason: format!("frame {frame} is outside the video"),
                    });
                }
                video.frame_num = frame;
                video.anchor = None;
            }
            (NodeKind::Video(video), AttrKey::Loop) => video.looping = value.as_bool(key)?,
            (NodeKind::Words(words), AttrKey::Text) => words.text = value.into_string(key)?,
            (NodeKind::Words(words), AttrKey::Font) => words.font = value.into_string(key)?,
            (NodeKind::Words(words), AttrKey::Size) => {
                let size = value.as_i64(key)?;
                if size <= 0 {
                    return Err(PlayerError::InvalidValue {
                        attr: key.name(),
                        reason: format!("font size must be positive, got {size}"),
                    });
                }
                words.size = size;
            }
            (NodeKind::Words(words), AttrKey::Color) => {
                let color = value.into_string(key)?;
                words.color = parse_color(&color)?;
            }
            (NodeKind::Words(words), AttrKey::ParaWidth) => {
                let width = value.as_i64(key)?;
                words.para_width = (width >= 0).then_some(width);
            }
            (NodeKind::Excl { active_child }, AttrKey::ActiveChild) => {
                let index = value.as_i64(key)?;
                if index < 0 || index as usize >= child_count {
                    return Err(PlayerError::ActiveChildOutOfRange {
                        node: node_id.clone(),
                        index,
                        len: child_count,
                    });
                }
                *active_child = Some(index as usize);
            }
            (NodeKind::Camera(camera), AttrKey::Brightness) => camera.brightness = value.as_i64(key)?,
            (NodeKind::Camera(camera), AttrKey::Exposure) => camera.exposure = value.as_i64(key)?,
            (NodeKind::Camera(camera), AttrKey::Gain) => camera.gain = value.as_i64(key)?,
            (NodeKind::Camera(camera), AttrKey::Shutter) => camera.shutter = value.as_i64(key)?,
            (NodeKind::Panorama(pano), AttrKey::Href) => pano.href = value.into_string(key)?,
            (NodeKind::Panorama(pano), AttrKey::Rotation) => {
                pano.rotation = value.as_f64(key)?.clamp(0.0, pano.max_rotation);
            }
            (NodeKind::Panorama(pano), AttrKey::SensorWidth) => pano.sensor_width = value.as_f64(key)?,
            (NodeKind::Panorama(pano), AttrKey::SensorHeight) => {
                pano.sensor_height = value.as_f64(key)?
            }
            (NodeKind::Panorama(pano), AttrKey::FocalLength) => pano.focal_length = value.as_f64(key)?,
            (NodeKind::Relay(relay), AttrKey::States) => {
                let states = value.as_i64(key)?;
                relay.states = u8::try_from(states).map_err(|_| PlayerError::InvalidValue {
                    attr: key.name(),
                    reason: format!("relay bitmask {states} does not fit in 8 bits"),
                })?;
            }
            (NodeKind::Video(_), AttrKey::Fps)
            | (NodeKind::Camera(_), AttrKey::Device)
            | (NodeKind::Panorama(_), AttrKey::MaxRotation)
            | (NodeKind::Relay(_), AttrKey::Card) => {
                return Err(PlayerError::ReadOnlyAttribute(key.name()));
            }
            (kind, key) => return Err(unsupported(kind, key)),
        }
        Ok(())
    }
}

fn unsupported(kind: &NodeKind, key: AttrKey) -> PlayerError {
    PlayerError::UnsupportedAttribute {
        kind: kind.name(),
        attr: key.name(),
    }
}

pub(crate) fn clamp_opacity(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn non_negative(key: AttrKey, value: f64) -> Result<f64> {
    if value < 0.0 {
        return Err(PlayerError::InvalidValue {
            attr: key.name(),
            reason: format!("must not be negative, got {value}"),
        });
    }
    Ok(value)
}

/// Accepts `RRGGBB` with an optional leading `#` and normalises to upper case.
pub(crate) fn parse_color(color: &str) -> Result<String> {
    let hex = color.strip_prefix('#').unwrap_or(color);
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(PlayerError::InvalidValue {
            attr: AttrKey::Color.name(),
            reason: format!("`{color}` is not an RRGGBB colour"),
        });
    }
    Ok(hex.to_ascii_uppercase())
}
