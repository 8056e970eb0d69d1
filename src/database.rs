//! Signal database: frame and signal definitions plus the payload codec.
//!
//! Maps frame names to wire identifiers and directions, and converts
//! between named-signal mappings and encoded byte payloads. Definitions
//! come from the built-in eval network or from a JSON network description
//! file. Signals are unsigned little-endian bit fields; scaling beyond
//! raw packing is out of scope.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::{FrameData, FrameDirection, MAX_FRAME_DATA};

/// Highest usable frame identifier (0x3C..0x3F are diagnostic/reserved).
pub const MAX_FRAME_ID: u8 = 0x3B;

/// Identifier spacing per board in the eval network.
pub const FRAMES_PER_BOARD: u8 = 5;

/// Highest board identifier that still fits the eval id layout.
pub const MAX_BOARD: u8 = (MAX_FRAME_ID - 2) / FRAMES_PER_BOARD;

pub type SignalValues = BTreeMap<String, SignalValue>;

/// A named scalar signal value. One-bit signals decode as booleans,
/// everything else as unsigned integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalValue {
    Bool(bool),
    Int(u32),
}

impl SignalValue {
    /// Raw unsigned value as it is packed on the wire.
    pub fn raw(self) -> u32 {
        match self {
            SignalValue::Bool(b) => u32::from(b),
            SignalValue::Int(v) => v,
        }
    }
}

impl From<bool> for SignalValue {
    fn from(b: bool) -> Self {
        SignalValue::Bool(b)
    }
}

impl From<u32> for SignalValue {
    fn from(v: u32) -> Self {
        SignalValue::Int(v)
    }
}

impl core::fmt::Display for SignalValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.raw())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("unknown frame `{0}`")]
    UnknownFrame(String),
    #[error("unknown board {0}")]
    UnknownBoard(u8),
    #[error("frame `{0}` is not published by this node")]
    NotPublishable(String),
    #[error("frame `{frame}` has no signal `{signal}`")]
    UnknownSignal { frame: String, signal: String },
    #[error("value {value} does not fit signal `{signal}` ({width} bits)")]
    ValueOutOfRange {
        signal: String,
        value: u32,
        width: u16,
    },
    #[error("duplicate frame identifier {0:#04x}")]
    DuplicateId(u8),
    #[error("duplicate frame name `{0}`")]
    DuplicateName(String),
    #[error("invalid network description: {0}")]
    BadDescription(String),
}

/// One signal's placement within its frame payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalDef {
    pub name: String,
    pub start_bit: u16,
    pub bit_width: u16,
}

impl SignalDef {
    pub fn fits(&self, value: u32) -> bool {
        self.bit_width >= 32 || value < (1u32 << self.bit_width)
    }
}

/// One frame's identifier, direction, payload length and signal layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameDef {
    pub name: String,
    pub id: u8,
    pub direction: FrameDirection,
    pub byte_len: u8,
    pub signals: Vec<SignalDef>,
}

impl FrameDef {
    pub fn signal(&self, name: &str) -> Option<&SignalDef> {
        self.signals.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Deserialize)]
struct NetworkDescription {
    frames: Vec<FrameDef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatabaseStats {
    pub frames: usize,
    pub signals: usize,
    pub publishable: usize,
}

/// The queryable signal database, indexed by frame name and identifier.
#[derive(Debug, Default)]
pub struct SignalDatabase {
    frames: Vec<FrameDef>,
    by_name: HashMap<String, usize>,
    by_id: HashMap<u8, usize>,
}

impl SignalDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the built-in eval network for the given boards.
    ///
    /// Per board `b`: `eval_<b>_rgb` (publish, 3 bytes), `eval_<b>_leds`
    /// (publish, 1 byte, four 1-bit signals) and `eval_<b>_photores`
    /// (subscribe, 2 bytes, one 16-bit millivolt reading), with
    /// identifiers `5b`, `5b + 1` and `5b + 2`.
    pub fn eval_network(boards: &[u8]) -> Result<Self, ConfigError> {
        let mut db = Self::new();
        for &board in boards {
            if board > MAX_BOARD {
                return Err(ConfigError::UnknownBoard(board));
            }
            let base = board * FRAMES_PER_BOARD;
            db.add_frame(FrameDef {
                name: rgb_frame(board),
                id: base,
                direction: FrameDirection::Publish,
                byte_len: 3,
                signals: ["r", "g", "b"]
                    .iter()
                    .enumerate()
                    .map(|(i, ch)| SignalDef {
                        name: format!("eval_{board}_rgb_{ch}"),
                        start_bit: i as u16 * 8,
                        bit_width: 8,
                    })
                    .collect(),
            })?;
            db.add_frame(FrameDef {
                name: leds_frame(board),
                id: base + 1,
                direction: FrameDirection::Publish,
                byte_len: 1,
                signals: (0..4)
                    .map(|i| SignalDef {
                        name: led_signal(board, i),
                        start_bit: u16::from(i),
                        bit_width: 1,
                    })
                    .collect(),
            })?;
            db.add_frame(FrameDef {
                name: photores_frame(board),
                id: base + 2,
                direction: FrameDirection::Subscribe,
                byte_len: 2,
                signals: vec![SignalDef {
                    name: format!("eval_{board}_photores_val"),
                    start_bit: 0,
                    bit_width: 16,
                }],
            })?;
        }
        Ok(db)
    }

    /// Load a network description from its JSON form.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let description: NetworkDescription = serde_json::from_str(json)
            .map_err(|e| ConfigError::BadDescription(e.to_string()))?;
        let mut db = Self::new();
        for frame in description.frames {
            db.add_frame(frame)?;
        }
        Ok(db)
    }

    pub fn add_frame(&mut self, frame: FrameDef) -> Result<(), ConfigError> {
        if frame.id > MAX_FRAME_ID || frame.byte_len as usize > MAX_FRAME_DATA {
            return Err(ConfigError::BadDescription(format!(
                "frame `{}`: id {:#04x} / length {} out of range",
                frame.name, frame.id, frame.byte_len
            )));
        }
        for signal in &frame.signals {
            // Widen before adding: start_bit near u16::MAX must come back
            // as a bad description, not an arithmetic overflow.
            let end = u32::from(signal.start_bit) + u32::from(signal.bit_width);
            if signal.bit_width == 0 || signal.bit_width > 32 || end > u32::from(frame.byte_len) * 8
            {
                return Err(ConfigError::BadDescription(format!(
                    "signal `{}` does not fit frame `{}`",
                    signal.name, frame.name
                )));
            }
        }
        if self.by_name.contains_key(&frame.name) {
            return Err(ConfigError::DuplicateName(frame.name));
        }
        if self.by_id.contains_key(&frame.id) {
            return Err(ConfigError::DuplicateId(frame.id));
        }
        self.by_name.insert(frame.name.clone(), self.frames.len());
        self.by_id.insert(frame.id, self.frames.len());
        self.frames.push(frame);
        Ok(())
    }

    pub fn frame(&self, name: &str) -> Option<&FrameDef> {
        self.by_name.get(name).map(|&i| &self.frames[i])
    }

    pub fn frame_by_id(&self, id: u8) -> Option<&FrameDef> {
        self.by_id.get(&id).map(|&i| &self.frames[i])
    }

    /// Resolve a frame name to its wire identifier and direction.
    pub fn resolve(&self, name: &str) -> Result<(u8, FrameDirection), ConfigError> {
        self.frame(name)
            .map(|f| (f.id, f.direction))
            .ok_or_else(|| ConfigError::UnknownFrame(name.to_string()))
    }

    /// Names of every frame this node publishes, in identifier order.
    pub fn publishable_frames(&self) -> Vec<&str> {
        let mut frames: Vec<&FrameDef> = self
            .frames
            .iter()
            .filter(|f| f.direction == FrameDirection::Publish)
            .collect();
        frames.sort_by_key(|f| f.id);
        frames.iter().map(|f| f.name.as_str()).collect()
    }

    /// Encode the full signal set for a frame. Signals absent from
    /// `values` encode as zero.
    pub fn encode(&self, id: u8, values: &SignalValues) -> Result<FrameData, ConfigError> {
        let def = self
            .frame_by_id(id)
            .ok_or_else(|| ConfigError::UnknownFrame(format!("{id:#04x}")))?;
        let mut buf = [0u8; MAX_FRAME_DATA];
        for signal in &def.signals {
            let value = values.get(&signal.name).map_or(0, |v| v.raw());
            if !signal.fits(value) {
                return Err(ConfigError::ValueOutOfRange {
                    signal: signal.name.clone(),
                    value,
                    width: signal.bit_width,
                });
            }
            write_bits(&mut buf, signal.start_bit, signal.bit_width, value);
        }
        let mut data = FrameData::new();
        data.extend(buf.iter().copied().take(def.byte_len as usize));
        Ok(data)
    }

    /// Decode a payload into a named-signal mapping. Returns `None` when
    /// the identifier is unknown; bits beyond `data` read as zero.
    pub fn decode(&self, id: u8, data: &[u8]) -> Option<SignalValues> {
        let def = self.frame_by_id(id)?;
        let mut values = SignalValues::new();
        for signal in &def.signals {
            let raw = read_bits(data, signal.start_bit, signal.bit_width);
            let value = if signal.bit_width == 1 {
                SignalValue::Bool(raw != 0)
            } else {
                SignalValue::Int(raw)
            };
            values.insert(signal.name.clone(), value);
        }
        Some(values)
    }

    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            frames: self.frames.len(),
            signals: self.frames.iter().map(|f| f.signals.len()).sum(),
            publishable: self
                .frames
                .iter()
                .filter(|f| f.direction == FrameDirection::Publish)
                .count(),
        }
    }
}

pub fn rgb_frame(board: u8) -> String {
    format!("eval_{board}_rgb")
}

pub fn rgb_signals(board: u8) -> [String; 3] {
    ["r", "g", "b"].map(|ch| format!("eval_{board}_rgb_{ch}"))
}

pub fn leds_frame(board: u8) -> String {
    format!("eval_{board}_leds")
}

pub fn led_signal(board: u8, index: u8) -> String {
    format!("eval_{board}_leds_{index}")
}

pub fn photores_frame(board: u8) -> String {
    format!("eval_{board}_photores")
}

fn write_bits(buf: &mut [u8], start: u16, width: u16, value: u32) {
    for bit in 0..width {
        let pos = usize::from(start + bit);
        if value >> bit & 1 != 0 {
            buf[pos / 8] |= 1 << (pos % 8);
        }
    }
}

fn read_bits(buf: &[u8], start: u16, width: u16) -> u32 {
    let mut value = 0u32;
    for bit in 0..width {
        let pos = usize::from(start + bit);
        let byte = buf.get(pos / 8).copied().unwrap_or(0);
        if byte >> (pos % 8) & 1 != 0 {
            value |= 1 << bit;
        }
    }
    value
}
