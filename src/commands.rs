//! Per-domain command catalog.
//!
//! Maps an entity's domain (the part of `light.kitchen` before the dot) to the
//! commands that can be scheduled against it, the default command used for
//! legacy single-entity surfaces, and the parameters each command accepts.

use crate::error::{Result, TimerError};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Input shape of a single command parameter.
///
/// Each kind owns its own binding rule, so a surface never has to inspect a
/// raw value to decide how to coerce it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParameterKind {
    /// Numeric input clamped to `min..=max` and snapped to `step`.
    Number { min: f64, max: f64, step: f64 },
    /// One of a fixed set of options.
    Select { options: &'static [&'static str] },
    /// Free text up to `max_len` characters.
    Text { max_len: usize },
    /// Boolean switch.
    Toggle,
}

impl ParameterKind {
    /// Coerce a raw user-entered value into the JSON value sent to the backend.
    pub fn bind(&self, raw: &str) -> Result<Value> {
        let raw = raw.trim();
        match *self {
            Self::Number { min, max, step } => {
                let parsed: f64 = raw.parse().map_err(|_| {
                    TimerError::Validation(format!("`{raw}` is not a number"))
                })?;
                if !parsed.is_finite() {
                    return Err(TimerError::Validation(format!("`{raw}` is not finite")));
                }
                let snapped = if step > 0.0 {
                    min + ((parsed - min) / step).round() * step
                } else {
                    parsed
                };
                let clamped = snapped.clamp(min, max);
                if clamped.fract() == 0.0 && clamped.abs() < i64::MAX as f64 {
                    Ok(Value::from(clamped as i64))
                } else {
                    Ok(Value::from(clamped))
                }
            }
            Self::Select { options } => options
                .iter()
                .find(|option| option.eq_ignore_ascii_case(raw))
                .map(|option| Value::from(*option))
                .ok_or_else(|| {
                    TimerError::Validation(format!(
                        "`{raw}` is not one of {}",
                        options.join("/")
                    ))
                }),
            Self::Text { max_len } => {
                if raw.chars().count() > max_len {
                    return Err(TimerError::Validation(format!(
                        "text longer than {max_len} characters"
                    )));
                }
                Ok(Value::from(raw))
            }
            Self::Toggle => match raw.to_ascii_lowercase().as_str() {
                "true" | "on" | "1" | "yes" => Ok(Value::Bool(true)),
                "false" | "off" | "0" | "no" => Ok(Value::Bool(false)),
                _ => Err(TimerError::Validation(format!("`{raw}` is not a boolean"))),
            },
        }
    }
}

/// A parameter accepted by a command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    /// Key in the service data map.
    pub key: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Input shape.
    pub kind: ParameterKind,
    /// Whether the command is rejected without this parameter.
    pub required: bool,
}

/// A schedulable command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandSpec {
    /// Command identifier carried in actions (e.g. `"off"`).
    pub id: &'static str,
    /// Human-readable label.
    pub label: &'static str,
    /// Service data fixed by the command itself (e.g. `hvac_mode = heat`).
    pub fixed: &'static [(&'static str, &'static str)],
    /// User-supplied parameters.
    pub parameters: &'static [ParameterSpec],
}

impl CommandSpec {
    const fn plain(id: &'static str, label: &'static str) -> Self {
        Self {
            id,
            label,
            fixed: &[],
            parameters: &[],
        }
    }

    /// Bind raw parameter input into the service data map for this command.
    ///
    /// Unknown keys are ignored; blank optional values are skipped.
    pub fn bind_parameters(&self, raw: &BTreeMap<String, String>) -> Result<Map<String, Value>> {
        let mut data = Map::new();
        for (key, value) in self.fixed {
            data.insert((*key).to_owned(), Value::from(*value));
        }
        for spec in self.parameters {
            match raw.get(spec.key).map(|v| v.trim()).filter(|v| !v.is_empty()) {
                Some(value) => {
                    data.insert(spec.key.to_owned(), spec.kind.bind(value)?);
                }
                None if spec.required => {
                    return Err(TimerError::Validation(format!(
                        "command `{}` requires `{}`",
                        self.id, spec.key
                    )));
                }
                None => {}
            }
        }
        Ok(data)
    }
}

const BRIGHTNESS: ParameterSpec = ParameterSpec {
    key: "brightness_pct",
    label: "Brightness",
    kind: ParameterKind::Number {
        min: 1.0,
        max: 100.0,
        step: 1.0,
    },
    required: false,
};

const FAN_PERCENTAGE: ParameterSpec = ParameterSpec {
    key: "percentage",
    label: "Speed",
    kind: ParameterKind::Number {
        min: 0.0,
        max: 100.0,
        step: 1.0,
    },
    required: false,
};

const COVER_POSITION: ParameterSpec = ParameterSpec {
    key: "position",
    label: "Position",
    kind: ParameterKind::Number {
        min: 0.0,
        max: 100.0,
        step: 1.0,
    },
    required: true,
};

const TEMPERATURE: ParameterSpec = ParameterSpec {
    key: "temperature",
    label: "Temperature",
    kind: ParameterKind::Number {
        min: 5.0,
        max: 35.0,
        step: 0.5,
    },
    required: true,
};

const SWITCHABLE: &[CommandSpec] = &[
    CommandSpec::plain("on", "Turn on"),
    CommandSpec::plain("off", "Turn off"),
    CommandSpec::plain("toggle", "Toggle"),
];

const LIGHT: &[CommandSpec] = &[
    CommandSpec {
        id: "on",
        label: "Turn on",
        fixed: &[],
        parameters: &[BRIGHTNESS],
    },
    CommandSpec::plain("off", "Turn off"),
    CommandSpec::plain("toggle", "Toggle"),
];

const FAN: &[CommandSpec] = &[
    CommandSpec {
        id: "on",
        label: "Turn on",
        fixed: &[],
        parameters: &[FAN_PERCENTAGE],
    },
    CommandSpec::plain("off", "Turn off"),
    CommandSpec::plain("toggle", "Toggle"),
];

const COVER: &[CommandSpec] = &[
    CommandSpec::plain("open_cover", "Open"),
    CommandSpec::plain("close_cover", "Close"),
    CommandSpec::plain("stop_cover", "Stop"),
    CommandSpec {
        id: "set_cover_position",
        label: "Set position",
        fixed: &[],
        parameters: &[COVER_POSITION],
    },
];

const MEDIA_PLAYER: &[CommandSpec] = &[
    CommandSpec::plain("media_play", "Play"),
    CommandSpec::plain("media_stop", "Stop"),
    CommandSpec::plain("turn_off", "Turn off"),
];

const VACUUM: &[CommandSpec] = &[
    CommandSpec::plain("start", "Start"),
    CommandSpec::plain("return_to_base", "Return to base"),
];

const CLIMATE: &[CommandSpec] = &[
    CommandSpec {
        id: "set_hvac_mode_heat",
        label: "Heat",
        fixed: &[("hvac_mode", "heat")],
        parameters: &[],
    },
    CommandSpec {
        id: "set_hvac_mode_cool",
        label: "Cool",
        fixed: &[("hvac_mode", "cool")],
        parameters: &[],
    },
    CommandSpec {
        id: "set_hvac_mode_auto",
        label: "Auto",
        fixed: &[("hvac_mode", "auto")],
        parameters: &[],
    },
    CommandSpec {
        id: "set_temperature",
        label: "Set temperature",
        fixed: &[],
        parameters: &[TEMPERATURE],
    },
    CommandSpec::plain("turn_off", "Turn off"),
];

/// Domain part of an entity reference (`light.kitchen` -> `light`).
#[must_use]
pub fn domain_of(entity: &str) -> &str {
    entity.split_once('.').map_or(entity, |(domain, _)| domain)
}

/// Commands available for an entity, by domain. Empty when the domain has
/// nothing schedulable.
#[must_use]
pub fn commands_for(entity: &str) -> &'static [CommandSpec] {
    match domain_of(entity) {
        "light" => LIGHT,
        "fan" => FAN,
        "switch" | "input_boolean" | "automation" | "siren" | "humidifier" => SWITCHABLE,
        "cover" => COVER,
        "media_player" => MEDIA_PLAYER,
        "vacuum" => VACUUM,
        "climate" => CLIMATE,
        _ => &[],
    }
}

/// Look up one command for an entity.
#[must_use]
pub fn find_command(entity: &str, command: &str) -> Option<&'static CommandSpec> {
    commands_for(entity).iter().find(|spec| spec.id == command)
}

/// The command a legacy single-entity surface schedules when nothing else
/// was configured.
#[must_use]
pub fn default_command(entity: &str) -> &'static str {
    match domain_of(entity) {
        "cover" => "close_cover",
        "media_player" => "media_stop",
        "vacuum" => "return_to_base",
        "climate" => "turn_off",
        "light" | "fan" | "switch" | "input_boolean" | "automation" | "siren" | "humidifier" => {
            "off"
        }
        _ => "toggle",
    }
}

/// Command that undoes `command`, used to schedule the finish half of a
/// run-now task.
#[must_use]
pub fn reverse_command(command: &str) -> &'static str {
    match command {
        "on" => "off",
        "off" | "turn_off" => "on",
        "open_cover" => "close_cover",
        "close_cover" => "open_cover",
        "media_play" => "media_stop",
        "media_stop" => "media_play",
        "start" => "return_to_base",
        _ => "toggle",
    }
}
