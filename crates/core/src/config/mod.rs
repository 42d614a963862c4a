use std::path::Path;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Frame rate used when neither the config nor `play` names one.
pub const DEFAULT_FRAME_RATE: f64 = 25.0;

/// Top-level configuration structure for the player.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Target frames per second of the playback loop.
    pub frame_rate: f64,
    /// Sleep until each frame's deadline instead of running as fast as
    /// possible. Headless runs and tests leave this off.
    pub realtime: bool,
    pub debug: DebugFlags,
    /// 0 = silent, 1 = button and key events, 2 = everything incl. motion.
    pub event_debug_level: u8,
    pub canvas: CanvasConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            frame_rate: DEFAULT_FRAME_RATE,
            realtime: false,
            debug: DebugFlags::default(),
            event_debug_level: 0,
            canvas: CanvasConfig::default(),
        }
    }
}

impl PlayerConfig {
    pub fn headless_defaults() -> Self {
        Self::default()
    }

    /// Reads a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Fallback canvas size for scene descriptions that do not set one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
        }
    }
}

bitflags! {
    /// Diagnostic categories. They only control which details get logged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct DebugFlags: u32 {
        const PROFILE = 1;
        const WARNING = 1 << 1;
        const CONFIG = 1 << 2;
        const EVENTS = 1 << 3;
        const MEMORY = 1 << 4;
        const BLTS = 1 << 5;
    }
}

impl DebugFlags {
    /// Parses a flag name such as `events` or `DEBUG_EVENTS`.
    pub fn from_debug_name(name: &str) -> Option<Self> {
        let upper = name.trim().to_ascii_uppercase();
        let bare = upper.strip_prefix("DEBUG_").unwrap_or(&upper);
        Self::from_name(bare)
    }
}

impl Default for DebugFlags {
    fn default() -> Self {
        Self::WARNING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flag_names_with_and_without_prefix() {
        assert_eq!(DebugFlags::from_debug_name("events"), Some(DebugFlags::EVENTS));
        assert_eq!(DebugFlags::from_debug_name("DEBUG_BLTS"), Some(DebugFlags::BLTS));
        assert_eq!(DebugFlags::from_debug_name("nonsense"), None);
    }

    #[test]
    fn combines_flags() {
        let mut flags = DebugFlags::PROFILE | DebugFlags::EVENTS;
        assert!(flags.contains(DebugFlags::EVENTS));
        assert!(!flags.contains(DebugFlags::MEMORY));
        flags.insert(DebugFlags::MEMORY);
        assert_eq!(flags.bits(), 1 | 8 | 16);
        assert_eq!(DebugFlags::from_bits_truncate(0xff), DebugFlags::all());
    }

    #[test]
    fn debug_flags_load_by_name() {
        let config: PlayerConfig =
            serde_json::from_str(r#"{ "debug": "EVENTS | BLTS" }"#).unwrap();
        assert_eq!(config.debug, DebugFlags::EVENTS | DebugFlags::BLTS);
        let json = serde_json::to_string(&PlayerConfig::default()).unwrap();
        assert!(json.contains(r#""debug":"WARNING""#), "{json}");
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config: PlayerConfig = serde_json::from_str(r#"{ "frame_rate": 50.0 }"#).unwrap();
        assert_eq!(config.frame_rate, 50.0);
        assert!(!config.realtime);
        assert_eq!(config.debug, DebugFlags::WARNING);
        assert_eq!(config.canvas.width, 640);
    }
}
