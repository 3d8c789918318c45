//! Domain documents returned by the client

use crate::error::{AbodeError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Alarm arming mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlarmMode {
    #[default]
    Standby,
    Home,
    Away,
    #[serde(untagged)]
    Other(String),
}

impl AlarmMode {
    /// Modes accepted as the default arming mode
    pub fn parse_default(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "away" => Ok(AlarmMode::Away),
            "home" => Ok(AlarmMode::Home),
            other => Err(AbodeError::invalid_input(format!(
                "Default alarm mode must be 'away' or 'home', got '{other}'"
            ))),
        }
    }

    fn from_panel(value: &str) -> Self {
        match value {
            "standby" => AlarmMode::Standby,
            "home" => AlarmMode::Home,
            "away" => AlarmMode::Away,
            other => AlarmMode::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for AlarmMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlarmMode::Standby => write!(f, "standby"),
            AlarmMode::Home => write!(f, "home"),
            AlarmMode::Away => write!(f, "away"),
            AlarmMode::Other(mode) => write!(f, "{mode}"),
        }
    }
}

/// Coarse device category derived from the `type_tag`
pub fn generic_type_for(type_tag: &str) -> Option<&'static str> {
    let tag = type_tag.strip_prefix("device_type.").unwrap_or(type_tag);
    let generic = match tag {
        "door_lock" | "lock" => "lock",
        "power_switch_sensor" | "power_switch_meter" | "siren" | "valve" => "switch",
        "dimmer" | "dimmer_meter" | "light_bulb" | "hue" => "light",
        "ir_camera" | "ir_camcoder" | "ipcam" | "out_view_720p" | "vdp" | "mini_cam"
        | "slim_cam" | "streaming_camera" => "camera",
        "door_contact" | "window_contact" | "occupancy" | "povs" | "pir" | "glass"
        | "water_sensor" | "smoke_detector" | "co_detector" | "keypad" | "remote_controller"
        | "keyfob" | "sos" => "connectivity",
        "temperature_sensor" | "lm" | "multi_sensor" => "sensor",
        "secure_barrier" => "cover",
        "thermostat" => "climate",
        "alarm" => "alarm",
        _ => return None,
    };
    Some(generic)
}

/// One device from the device listing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub id: String,
    pub name: String,
    pub type_tag: String,
    pub generic_type: String,
    pub status: Option<String>,
    /// Full server document
    pub raw: Value,
}

impl Device {
    /// Build from a server document. `None` for types the client does not
    /// know how to handle.
    pub fn from_doc(doc: &Value) -> Result<Option<Self>> {
        let id = doc
            .get("id")
            .map(id_string)
            .ok_or_else(|| AbodeError::api("Device document missing id"))?;
        let type_tag = doc
            .get("type_tag")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let Some(generic_type) = generic_type_for(&type_tag) else {
            return Ok(None);
        };

        Ok(Some(Self {
            id,
            name: doc
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            type_tag,
            generic_type: generic_type.to_string(),
            status: doc.get("status").and_then(Value::as_str).map(str::to_string),
            raw: doc.clone(),
        }))
    }
}

/// The security panel viewed as an armable device
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Alarm {
    pub id: String,
    pub area: String,
    pub name: String,
    pub mode: AlarmMode,
    pub battery: Option<bool>,
    pub is_cellular: Option<bool>,
    pub mac: Option<String>,
}

impl Alarm {
    pub fn device_id(area: &str) -> String {
        format!("area_{area}")
    }

    /// Synthesize the alarm for `area` from the panel document
    pub fn from_panel(panel: &Value, area: &str) -> Result<Self> {
        let id = Self::device_id(area);
        let mode = panel
            .get("mode")
            .and_then(|modes| modes.get(&id))
            .and_then(Value::as_str)
            .ok_or_else(|| AbodeError::api(format!("Panel has no mode for {id}")))?;

        Ok(Self {
            area: area.to_string(),
            name: panel
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or("Abode Alarm")
                .to_string(),
            mode: AlarmMode::from_panel(mode),
            battery: panel.get("battery").and_then(flag),
            is_cellular: panel.get("is_cellular").and_then(flag),
            mac: panel.get("mac").and_then(Value::as_str).map(str::to_string),
            id,
        })
    }
}

/// One automation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Automation {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub raw: Value,
}

impl Automation {
    pub fn from_doc(doc: &Value) -> Result<Self> {
        let id = doc
            .get("id")
            .map(id_string)
            .ok_or_else(|| AbodeError::api("Automation document missing id"))?;
        Ok(Self {
            id,
            name: doc
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            enabled: doc.get("enabled").and_then(flag).unwrap_or(false),
            raw: doc.clone(),
        })
    }
}

pub(crate) fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Booleans arrive as `true`, `1` or `"1"` depending on the endpoint
fn flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        Value::String(s) => match s.as_str() {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Documents may be a single object or a list of them
pub(crate) fn as_list(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    }
}
