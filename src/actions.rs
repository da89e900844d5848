//! Gesture to action mapping.
//!
//! The engine never performs actions itself. Hosts use [`ActionMap`] to look
//! up which media/assistant command a completed [`Gesture`] stands for and
//! dispatch it however their platform requires.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::types::{Gesture, GesturePole};

/// A host-side command bound to a gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PlayPause,
    Voice,
    Previous,
    Next,
    VolumeDown,
    VolumeUp,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::PlayPause => "play_pause",
            Action::Voice => "voice",
            Action::Previous => "previous",
            Action::Next => "next",
            Action::VolumeDown => "volume_down",
            Action::VolumeUp => "volume_up",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string names no known action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action '{}'", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            // "media" is the legacy name for play/pause
            "play_pause" | "media" => Ok(Action::PlayPause),
            "voice" => Ok(Action::Voice),
            "previous" => Ok(Action::Previous),
            "next" => Ok(Action::Next),
            "volume_down" => Ok(Action::VolumeDown),
            "volume_up" => Ok(Action::VolumeUp),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

/// Six action slots: north, south and combined poles, each short and long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawActionMap")]
pub struct ActionMap {
    pub n_short: Action,
    pub n_long: Action,
    pub s_short: Action,
    pub s_long: Action,
    pub all_short: Action,
    pub all_long: Action,
}

impl Default for ActionMap {
    fn default() -> Self {
        Self {
            n_short: Action::PlayPause,
            n_long: Action::Next,
            s_short: Action::Previous,
            s_long: Action::VolumeDown,
            all_short: Action::PlayPause,
            all_long: Action::Voice,
        }
    }
}

impl ActionMap {
    /// Action bound to a gesture. Pole `none` resolves through the `all` slots.
    pub fn resolve(&self, gesture: &Gesture) -> Action {
        self.lookup(gesture.pole, gesture.long_press)
    }

    pub fn lookup(&self, pole: GesturePole, long_press: bool) -> Action {
        match (pole, long_press) {
            (GesturePole::North, false) => self.n_short,
            (GesturePole::North, true) => self.n_long,
            (GesturePole::South, false) => self.s_short,
            (GesturePole::South, true) => self.s_long,
            (GesturePole::All | GesturePole::None, false) => self.all_short,
            (GesturePole::All | GesturePole::None, true) => self.all_long,
        }
    }
}

/// Wire form accepting arbitrary strings; unknown names keep the slot default.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawActionMap {
    n_short: Option<String>,
    n_long: Option<String>,
    s_short: Option<String>,
    s_long: Option<String>,
    all_short: Option<String>,
    all_long: Option<String>,
}

fn slot(name: &str, value: Option<String>, default: Action) -> Action {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|err: UnknownAction| {
            warn!(slot = name, %err, fallback = default.as_str(), "unknown action in config");
            default
        }),
    }
}

impl From<RawActionMap> for ActionMap {
    fn from(raw: RawActionMap) -> Self {
        let d = ActionMap::default();
        Self {
            n_short: slot("n_short", raw.n_short, d.n_short),
            n_long: slot("n_long", raw.n_long, d.n_long),
            s_short: slot("s_short", raw.s_short, d.s_short),
            s_long: slot("s_long", raw.s_long, d.s_long),
            all_short: slot("all_short", raw.all_short, d.all_short),
            all_long: slot("all_long", raw.all_long, d.all_long),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GestureKind;

    fn gesture(pole: GesturePole, long_press: bool) -> Gesture {
        Gesture {
            pole,
            long_press,
            kind: if long_press {
                GestureKind::LongPress
            } else {
                GestureKind::ShortPress
            },
            started_at_ms: 0,
            fired_at_ms: 100,
        }
    }

    #[test]
    fn test_default_mapping() {
        let map = ActionMap::default();
        assert_eq!(map.resolve(&gesture(GesturePole::North, false)), Action::PlayPause);
        assert_eq!(map.resolve(&gesture(GesturePole::North, true)), Action::Next);
        assert_eq!(map.resolve(&gesture(GesturePole::South, false)), Action::Previous);
        assert_eq!(map.resolve(&gesture(GesturePole::South, true)), Action::VolumeDown);
        assert_eq!(map.resolve(&gesture(GesturePole::All, true)), Action::Voice);
    }

    #[test]
    fn test_none_pole_uses_all_slots() {
        let map = ActionMap::default();
        assert_eq!(map.resolve(&gesture(GesturePole::None, false)), map.all_short);
        assert_eq!(map.resolve(&gesture(GesturePole::None, true)), map.all_long);
    }

    #[test]
    fn test_media_alias() {
        assert_eq!("media".parse::<Action>(), Ok(Action::PlayPause));
        assert!("launch_rockets".parse::<Action>().is_err());
    }

    #[test]
    fn test_unknown_names_fall_back_to_slot_default() {
        let json = r#"{ "n_short": "volume_up", "s_long": "bogus", "all_short": "media" }"#;
        let map: ActionMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.n_short, Action::VolumeUp);
        assert_eq!(map.s_long, Action::VolumeDown);
        assert_eq!(map.all_short, Action::PlayPause);
        assert_eq!(map.n_long, Action::Next);
    }

    #[test]
    fn test_serializes_as_snake_case() {
        let json = serde_json::to_value(ActionMap::default()).unwrap();
        assert_eq!(json["s_long"], "volume_down");
        let back: ActionMap = serde_json::from_value(json).unwrap();
        assert_eq!(back, ActionMap::default());
    }
}
