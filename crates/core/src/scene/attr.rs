//! Attribute keys and values used by the typed get/set layer.
//!
//! Scripts historically addressed attributes by name (`"Left"`,
//! `"opacity"`, `"ActiveChild"`). [`AttrKey`] keeps that capability through
//! its [`FromStr`] implementation while the rest of the crate dispatches on
//! the enum.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{PlayerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrKey {
    Id,
    X,
    Y,
    Width,
    Height,
    /// Alias of [`AttrKey::X`] in the older left/top/right/bottom convention.
    Left,
    /// Alias of [`AttrKey::Y`].
    Top,
    /// Derived: `x + width`.
    Right,
    /// Derived: `y + height`.
    Bottom,
    Opacity,
    Angle,
    Active,
    Href,
    Fps,
    FrameNum,
    Loop,
    Text,
    Font,
    Size,
    Color,
    ParaWidth,
    ActiveChild,
    Device,
    Brightness,
    Exposure,
    Gain,
    Shutter,
    Rotation,
    MaxRotation,
    SensorWidth,
    SensorHeight,
    FocalLength,
    Card,
    States,
}

impl AttrKey {
    pub const ALL: [AttrKey; 34] = [
        AttrKey::Id,
        AttrKey::X,
        AttrKey::Y,
        AttrKey::Width,
        AttrKey::Height,
        AttrKey::Left,
        AttrKey::Top,
        AttrKey::Right,
        AttrKey::Bottom,
        AttrKey::Opacity,
        AttrKey::Angle,
        AttrKey::Active,
        AttrKey::Href,
        AttrKey::Fps,
        AttrKey::FrameNum,
        AttrKey::Loop,
        AttrKey::Text,
        AttrKey::Font,
        AttrKey::Size,
        AttrKey::Color,
        AttrKey::ParaWidth,
        AttrKey::ActiveChild,
        AttrKey::Device,
        AttrKey::Brightness,
        AttrKey::Exposure,
        AttrKey::Gain,
        AttrKey::Shutter,
        AttrKey::Rotation,
        AttrKey::MaxRotation,
        AttrKey::SensorWidth,
        AttrKey::SensorHeight,
        AttrKey::FocalLength,
        AttrKey::Card,
        AttrKey::States,
    ];

    /// Canonical lower-case name.
    pub fn name(self) -> &'static str {
        match self {
            AttrKey::Id => "id",
            AttrKey::X => "x",
            AttrKey::Y => "y",
            AttrKey::Width => "width",
            AttrKey::Height => "height",
            AttrKey::Left => "left",
            AttrKey::Top => "top",
            AttrKey::Right => "right",
            AttrKey::Bottom => "bottom",
            AttrKey::Opacity => "opacity",
            AttrKey::Angle => "angle",
            AttrKey::Active => "active",
            AttrKey::Href => "href",
            AttrKey::Fps => "fps",
            AttrKey::FrameNum => "framenum",
            AttrKey::Loop => "loop",
            AttrKey::Text => "text",
            AttrKey::Font => "font",
            AttrKey::Size => "size",
            AttrKey::Color => "color",
            AttrKey::ParaWidth => "parawidth",
            AttrKey::ActiveChild => "activechild",
            AttrKey::Device => "device",
            AttrKey::Brightness => "brightness",
            AttrKey::Exposure => "exposure",
            AttrKey::Gain => "gain",
            AttrKey::Shutter => "shutter",
            AttrKey::Rotation => "rotation",
            AttrKey::MaxRotation => "maxrotation",
            AttrKey::SensorWidth => "sensorwidth",
            AttrKey::SensorHeight => "sensorheight",
            AttrKey::FocalLength => "focallength",
            AttrKey::Card => "card",
            AttrKey::States => "states",
        }
    }
}

impl FromStr for AttrKey {
    type Err = PlayerError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let canonical = match lower.as_str() {
            "string" => "text",
            "framepos" | "curframe" => "framenum",
            "fontsize" => "size",
            other => other,
        };
        AttrKey::ALL
            .iter()
            .copied()
            .find(|key| key.name() == canonical)
            .ok_or_else(|| PlayerError::UnknownAttribute(s.to_string()))
    }
}

impl fmt::Display for AttrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Dynamically typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl AttrValue {
    /// Numeric view; ints widen to floats.
    pub fn as_f64(&self, attr: AttrKey) -> Result<f64> {
        match self {
            AttrValue::Float(v) => Ok(*v),
            AttrValue::Int(v) => Ok(*v as f64),
            _ => Err(type_error(attr, "numeric")),
        }
    }

    /// Integer view; floats are rounded to the nearest integer.
    pub fn as_i64(&self, attr: AttrKey) -> Result<i64> {
        match self {
            AttrValue::Int(v) => Ok(*v),
            AttrValue::Float(v) if v.is_finite() => Ok(v.round() as i64),
            _ => Err(type_error(attr, "integer")),
        }
    }

    pub fn as_bool(&self, attr: AttrKey) -> Result<bool> {
        match self {
            AttrValue::Bool(v) => Ok(*v),
            AttrValue::Int(v) => Ok(*v != 0),
            _ => Err(type_error(attr, "boolean")),
        }
    }

    pub fn into_string(self, attr: AttrKey) -> Result<String> {
        match self {
            AttrValue::Str(v) => Ok(v),
            _ => Err(type_error(attr, "string")),
        }
    }
}

fn type_error(attr: AttrKey, expected: &'static str) -> PlayerError {
    PlayerError::AttributeType {
        attr: attr.name(),
        expected,
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::Float(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value.into())
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Bool(v) => write!(f, "{v}"),
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Str(v) => f.write_str(v),
        }
    }
}
