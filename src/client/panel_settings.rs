//! Writable system settings and the endpoint each one lives on

use crate::client::urls;
use crate::error::{AbodeError, Result};
use serde_json::{json, Value};

pub const CAMERA_RESOLUTION: &str = "ir_camera_resolution_t";
pub const CAMERA_GRAYSCALE: &str = "ir_camera_gray_scale";
pub const SILENCE_SOUNDS: &str = "beeper_mute";

pub const ENTRY_DELAY_AWAY: &str = "away_entry_delay";
pub const EXIT_DELAY_AWAY: &str = "away_exit_delay";
pub const ENTRY_DELAY_HOME: &str = "home_entry_delay";
pub const EXIT_DELAY_HOME: &str = "home_exit_delay";

pub const DOOR_CHIME: &str = "door_chime";
pub const WARNING_BEEP_HOME: &str = "warning_beep_home";
pub const WARNING_BEEP_AWAY: &str = "warning_beep_away";
pub const CONFIRM_SOUND: &str = "confirm_snd";
pub const ALARM_LENGTH: &str = "alarm_len";
pub const FINAL_BEEPS: &str = "final_beep";

pub const SIREN_ENTRY_EXIT_SOUNDS: &str = "entry";
pub const SIREN_CONFIRM_SOUNDS: &str = "confirm";
pub const SIREN_TAMPER_SOUNDS: &str = "tamper";

const TOGGLE: &[&str] = &["0", "1"];
const RESOLUTIONS: &[&str] = &["0", "2"];
const ENTRY_DELAYS: &[&str] = &["0", "10", "20", "30", "60", "120", "180", "240"];
const EXIT_DELAYS_AWAY: &[&str] = &["30", "60", "90", "120", "180", "240"];
const VOLUMES: &[&str] = &["none", "normal", "loud"];
const ALARM_LENGTHS: &[&str] = &["0", "60", "120", "180", "240", "300", "360", "420", "480", "540", "600", "660", "720", "780", "840", "900"];
const FINAL_BEEP_COUNTS: &[&str] = &["0", "1", "2", "3", "4", "5", "6", "7", "8", "9", "10"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Panel,
    Area,
    Sound,
    Siren,
}

fn lookup(name: &str) -> Option<(Group, &'static [&'static str])> {
    let entry = match name {
        CAMERA_RESOLUTION => (Group::Panel, RESOLUTIONS),
        CAMERA_GRAYSCALE | SILENCE_SOUNDS => (Group::Panel, TOGGLE),
        ENTRY_DELAY_AWAY | ENTRY_DELAY_HOME | EXIT_DELAY_HOME => (Group::Area, ENTRY_DELAYS),
        EXIT_DELAY_AWAY => (Group::Area, EXIT_DELAYS_AWAY),
        DOOR_CHIME | WARNING_BEEP_HOME | WARNING_BEEP_AWAY | CONFIRM_SOUND => (Group::Sound, VOLUMES),
        ALARM_LENGTH => (Group::Sound, ALARM_LENGTHS),
        FINAL_BEEPS => (Group::Sound, FINAL_BEEP_COUNTS),
        SIREN_ENTRY_EXIT_SOUNDS | SIREN_CONFIRM_SOUNDS | SIREN_TAMPER_SOUNDS => (Group::Siren, TOGGLE),
        _ => return None,
    };
    Some(entry)
}

/// A validated setting write
#[derive(Debug, Clone, PartialEq)]
pub struct SettingUpdate {
    pub path: &'static str,
    pub body: Value,
}

impl SettingUpdate {
    /// Validate `name`/`value` and build the request for it
    pub fn load(name: &str, value: &str, area: &str) -> Result<Self> {
        let name = name.trim().to_lowercase();
        let (group, allowed) = lookup(&name)
            .ok_or_else(|| AbodeError::invalid_input(format!("Unknown setting '{name}'")))?;

        if !allowed.contains(&value) {
            return Err(AbodeError::invalid_input(format!(
                "Invalid value '{value}' for setting '{name}', expected one of {}",
                allowed.join(", ")
            )));
        }

        let (path, body) = match group {
            Group::Panel => (urls::SETTINGS, json!({ name.as_str(): value })),
            Group::Area => (urls::AREAS, json!({ "area": area, name.as_str(): value })),
            Group::Sound => (urls::SOUNDS, json!({ "area": area, name.as_str(): value })),
            Group::Siren => (urls::SIREN, json!({ "action": name, "option": value })),
        };
        Ok(Self { path, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_area_setting_carries_area() {
        let update = SettingUpdate::load("Away_Entry_Delay", "30", "2").unwrap();
        assert_eq!(update.path, urls::AREAS);
        assert_eq!(update.body, json!({"area": "2", "away_entry_delay": "30"}));
    }

    #[test]
    fn test_panel_and_siren_settings() {
        let update = SettingUpdate::load(CAMERA_RESOLUTION, "2", "1").unwrap();
        assert_eq!(update.path, urls::SETTINGS);
        assert_eq!(update.body, json!({"ir_camera_resolution_t": "2"}));

        let update = SettingUpdate::load(SIREN_TAMPER_SOUNDS, "1", "1").unwrap();
        assert_eq!(update.path, urls::SIREN);
        assert_eq!(update.body, json!({"action": "tamper", "option": "1"}));
    }

    #[test]
    fn test_rejects_unknown_names_and_values() {
        assert!(matches!(
            SettingUpdate::load("volume_knob", "11", "1"),
            Err(AbodeError::InvalidInput(_))
        ));
        assert!(matches!(
            SettingUpdate::load(DOOR_CHIME, "deafening", "1"),
            Err(AbodeError::InvalidInput(_))
        ));
    }
}
