//! Outbound frame state: the per-frame named-signal mapping and its
//! always-current encoding.
//!
//! A partial update only overwrites the keys it supplies; every mutation
//! re-encodes the full signal set and pushes the bytes to the driver, so
//! `encoded_bytes` never lags `signal_values`.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::database::{ConfigError, SignalDatabase, SignalValue, SignalValues};
use crate::transport::{ChecksumKind, FrameData, FrameDirection, LinDriver, TransportError};

/// The single wire schedule partition every frame is broadcast in.
pub const SCHEDULE_SLOT: u8 = 0;

/// Per-frame cadence of the wire schedule, in milliseconds.
pub const SLOT_PERIOD_MS: u32 = 100;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// One registered wire frame and its current signal state.
#[derive(Debug)]
pub struct FrameState {
    name: String,
    id: u8,
    direction: FrameDirection,
    signal_values: SignalValues,
    encoded: FrameData,
}

impl FrameState {
    /// Resolve `name`, create the driver frame entry and its schedule
    /// slot, and for publish frames push the empty-set encoding as the
    /// initial payload.
    pub fn register(
        db: &SignalDatabase,
        driver: &mut dyn LinDriver,
        name: &str,
    ) -> Result<Self, FrameError> {
        let (id, direction) = db.resolve(name)?;
        let encoded = match direction {
            FrameDirection::Publish => db.encode(id, &SignalValues::new())?,
            FrameDirection::Subscribe => FrameData::new(),
        };
        driver.register_frame(id, direction, ChecksumKind::Enhanced, encoded.as_slice())?;
        driver.add_schedule_slot(SCHEDULE_SLOT, SLOT_PERIOD_MS, id)?;
        debug!(frame = name, id, ?direction, "frame registered");
        Ok(Self {
            name: name.to_string(),
            id,
            direction,
            signal_values: SignalValues::new(),
            encoded,
        })
    }

    /// Merge `partial` into the signal state (key overwrite, not
    /// replace), re-encode the full set and push it to the driver. The
    /// new payload goes out on the very next schedule slot that fires
    /// this frame.
    ///
    /// Validation happens before the merge: a bad key or value aborts
    /// the whole update without touching any state.
    pub fn update(
        &mut self,
        db: &SignalDatabase,
        driver: &mut dyn LinDriver,
        partial: &[(String, SignalValue)],
    ) -> Result<(), FrameError> {
        if self.direction != FrameDirection::Publish {
            return Err(ConfigError::NotPublishable(self.name.clone()).into());
        }
        let def = db
            .frame_by_id(self.id)
            .ok_or_else(|| ConfigError::UnknownFrame(self.name.clone()))?;
        for (name, value) in partial {
            let signal = def.signal(name).ok_or_else(|| ConfigError::UnknownSignal {
                frame: self.name.clone(),
                signal: name.clone(),
            })?;
            if !signal.fits(value.raw()) {
                return Err(ConfigError::ValueOutOfRange {
                    signal: name.clone(),
                    value: value.raw(),
                    width: signal.bit_width,
                }
                .into());
            }
        }
        for (name, value) in partial {
            self.signal_values.insert(name.clone(), *value);
        }
        self.encoded = db.encode(self.id, &self.signal_values)?;
        driver.update_frame_payload(self.id, self.encoded.as_slice())?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn direction(&self) -> FrameDirection {
        self.direction
    }

    pub fn signal_values(&self) -> &SignalValues {
        &self.signal_values
    }

    pub fn encoded_bytes(&self) -> &[u8] {
        self.encoded.as_slice()
    }
}

/// All frames this node has registered, keyed by frame name. At most one
/// frame state exists per identifier; registration is idempotent.
#[derive(Debug, Default)]
pub struct FrameTable {
    frames: BTreeMap<String, FrameState>,
}

impl FrameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        db: &SignalDatabase,
        driver: &mut dyn LinDriver,
        name: &str,
    ) -> Result<(), FrameError> {
        if self.frames.contains_key(name) {
            debug!(frame = name, "already registered");
            return Ok(());
        }
        let state = FrameState::register(db, driver, name)?;
        self.frames.insert(name.to_string(), state);
        Ok(())
    }

    pub fn update(
        &mut self,
        db: &SignalDatabase,
        driver: &mut dyn LinDriver,
        name: &str,
        partial: &[(String, SignalValue)],
    ) -> Result<(), FrameError> {
        let state = self
            .frames
            .get_mut(name)
            .ok_or_else(|| ConfigError::UnknownFrame(name.to_string()))?;
        state.update(db, driver, partial)
    }

    pub fn get(&self, name: &str) -> Option<&FrameState> {
        self.frames.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.frames.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FrameState> {
        self.frames.values()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}
