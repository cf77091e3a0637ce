// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire ABI shared between the simulation kernel, the runner, the worker,
//! and any embedding host: part/wire configuration, the UI<->core message
//! surface, the shared pin-state encoding, and the diagnostic taxonomy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric encoding of a pin's drive state, as written into the shared
/// integer buffer the runner's guest program reads directly (spec §6).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum PinCode {
    Floating = 0,
    Low = 1,
    High = 2,
    Pulldown = 3,
    Pullup = 4,
    Pwm = 5,
}

impl PinCode {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::Floating,
            1 => Self::Low,
            2 => Self::High,
            3 => Self::Pulldown,
            4 => Self::Pullup,
            5 => Self::Pwm,
            _ => return None,
        })
    }
}

/// Numeric encoding the guest uses in `__tinygo_gpio_configure` to request
/// a pin mode (spec §6). Distinct from `PinCode`: there is no "high"/"low"
/// configure request, those come from `gpio_set` after configuring output.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum GpioConfigureCode {
    Floating = 0,
    Low = 1,
    Pullup = 2,
    Pulldown = 3,
}

impl GpioConfigureCode {
    pub fn from_u32(v: u32) -> Option<Self> {
        Some(match v {
            0 => Self::Floating,
            1 => Self::Low,
            2 => Self::Pullup,
            3 => Self::Pulldown,
            _ => return None,
        })
    }
}

/// I2C transfer result, returned to the guest as an error code (spec §4.3).
///
/// `ArbitrationLost` is not named in the distilled spec but is a real value
/// the original TinyGo I2C surface can return (two controllers contending
/// for the same bus); kept here since nothing excludes it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum I2cError {
    Success,
    NoAck,
    ArbitrationLost,
    Other,
}

/// A reference to a single pin, `"<partId>.<pinName>"` in wire form.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PinRef {
    pub part: String,
    pub pin: String,
}

impl PinRef {
    pub fn new(part: impl Into<String>, pin: impl Into<String>) -> Self {
        Self { part: part.into(), pin: pin.into() }
    }
}

impl std::fmt::Display for PinRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.part, self.pin)
    }
}

/// `{from, to}` wire declaration (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WireConfig {
    pub from: PinRef,
    pub to: PinRef,
}

/// Type-specific construction fields for a part (spec §6). Unknown fields on
/// a recognized type are a deserialization error; an unrecognized `type`
/// string is accepted here and rejected later, when the part is actually
/// constructed, so a single bad part in a batch doesn't fail the whole
/// config (see `Diagnostic::UnknownPartType`).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum PartConfig {
    Board { id: String, pins: Vec<String>, human_name: Option<String> },
    Mcu { id: String, pins: BTreeMap<String, u32>, human_name: Option<String> },
    Led { id: String, color: [u8; 3], current: f32, human_name: Option<String> },
    RgbLed { id: String, channel_current: [f32; 3], human_name: Option<String> },
    Button { id: String, human_name: Option<String> },
    Ws2812 { id: String, length: u32, channel_current: [f32; 3], human_name: Option<String> },
    Epd2in13 {
        id: String,
        width: u32,
        height: u32,
        #[serde(default)]
        third_color: bool,
        #[serde(default)]
        rotation: u8,
        human_name: Option<String>,
    },
    Epd2in13x {
        id: String,
        width: u32,
        height: u32,
        #[serde(default)]
        rotation: u8,
        human_name: Option<String>,
    },
    St7789 { id: String, width: u32, height: u32, human_name: Option<String> },
    Servo { id: String, human_name: Option<String> },
    Dummy { id: String, current: f32, human_name: Option<String> },
    #[serde(other)]
    Unknown,
}

impl PartConfig {
    pub fn id(&self) -> Option<&str> {
        match self {
            PartConfig::Board { id, .. }
            | PartConfig::Mcu { id, .. }
            | PartConfig::Led { id, .. }
            | PartConfig::RgbLed { id, .. }
            | PartConfig::Button { id, .. }
            | PartConfig::Ws2812 { id, .. }
            | PartConfig::Epd2in13 { id, .. }
            | PartConfig::Epd2in13x { id, .. }
            | PartConfig::St7789 { id, .. }
            | PartConfig::Servo { id, .. }
            | PartConfig::Dummy { id, .. } => Some(id),
            PartConfig::Unknown => None,
        }
    }
}

/// The binary source for a simulation run: either bytes the embedding host
/// already fetched, or a request the worker should issue itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinarySource {
    Inline(Vec<u8>),
    Fetch { url: String, #[serde(default)] method: Option<String>, #[serde(default)] body: Option<String> },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StartConfig {
    pub parts: Vec<PartConfig>,
    #[serde(default)]
    pub wires: Vec<WireConfig>,
    pub main_part: String,
}

/// UI -> core message surface (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    Start { config: StartConfig, binary: BinarySource, #[serde(default)] runner_url: Option<String> },
    Add { #[serde(default)] parts: Vec<PartConfig>, #[serde(default)] wires: Vec<WireConfig> },
    Remove { #[serde(default)] parts: Vec<String>, #[serde(default)] wires: Vec<WireConfig> },
    PlayPause,
    Input { id: String, event: InputEvent },
    GetUpdate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputEvent {
    Press,
    Release,
}

/// One per-LED entry of a `ledstrip` snapshot payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedStripEntry {
    pub color: [u8; 3],
    pub shadow: bool,
}

/// A raw pixel buffer plus its dimensions, for displays (spec §6 `canvas`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major, top-to-bottom.
    pub rgba: Vec<u8>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CssBlink {
    pub period_ms: f64,
    pub duty_cycle: f64,
    pub css_properties_off: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PowerSnapshot {
    pub current: f32,
    pub max_current: f32,
    pub avg_current: f32,
}

/// One dirty part's worth of UI state (spec §6 `PartSnapshot`). Every field
/// but `id` is optional so a part only pays for what it actually changed.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PartSnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_properties: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canvas: Option<Canvas>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledstrip: Option<Vec<LedStripEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css_blink: Option<CssBlink>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub power: Option<PowerSnapshot>,
}

impl PartSnapshot {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }
}

/// Core -> UI message surface (spec §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CoreEvent {
    Compiling,
    Loading,
    Started,
    Exited { exit_code: i32 },
    Error { message: String, #[serde(default)] source: Option<String> },
    Stdout { data: String },
    Connections { pin_lists: Vec<Vec<String>> },
    Properties { properties: Vec<PropertyDescriptor> },
    Power { power_tree: Vec<PowerSnapshot> },
    NotifyUpdate,
    Update { updates: Vec<PartSnapshot> },
    Speed { speed: u8 },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropertyDescriptor {
    pub part: String,
    pub label: String,
    pub value: String,
}

/// Every non-fatal error kind the simulator can encounter (spec §7). None of
/// these abort the run; they are recorded (see `diag`) and the documented
/// fallback behavior proceeds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Diagnostic {
    /// A structural command named a part type this crate doesn't implement.
    UnknownPartType,
    /// A wire or operation named a pin id that doesn't exist.
    UnknownPin,
    /// Two pins on the same net are both driven strong and disagree.
    Short,
    /// A floating pin was read; the result is non-deterministic.
    FloatingRead,
    /// An output pin was read (well-defined, but usually a logic error in
    /// the guest program).
    OutputRead,
    /// `set()` was called on a pin that isn't currently an output.
    SetOnInput,
    /// A second `setTimeout` was requested while one was already pending.
    DoubleTimeout,
    /// A host call arrived that this runner doesn't implement.
    UnsupportedHostCall,
    /// A CASET/RASET (or equivalent window command) had `start > end`.
    InvertedWindow,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Diagnostic::UnknownPartType => "unknown part type",
            Diagnostic::UnknownPin => "unknown pin",
            Diagnostic::Short => "short: two strong drivers disagree on one net",
            Diagnostic::FloatingRead => "read of a floating pin",
            Diagnostic::OutputRead => "read of an output pin",
            Diagnostic::SetOnInput => "set() called on a non-output pin",
            Diagnostic::DoubleTimeout => "setTimeout called while one was already pending",
            Diagnostic::UnsupportedHostCall => "unsupported host call",
            Diagnostic::InvertedWindow => "window command with start > end",
        };
        f.write_str(s)
    }
}

/// Pin electrical state, shared between `Pin` and `Net` (spec §3).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum ElectricalState {
    #[default]
    Floating,
    Low,
    High,
    Pullup,
    Pulldown,
    Pwm,
    /// Ohmic link through a closed switch (e.g. a pressed button); resolves
    /// like a net member with no opinion of its own, same as floating, but
    /// distinguished so button terminals can be told apart from true
    /// floating pins in diagnostics.
    Connected,
}

/// `(period_ms, duty_cycle)` carried alongside a `Pwm` state.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PwmExtra {
    pub period_ms: f64,
    pub duty_cycle: f64,
}
