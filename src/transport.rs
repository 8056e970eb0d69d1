//! Transport driver seam: the narrow interface the control core consumes,
//! plus `SimBus`, a deterministic software bus used by the binary and the
//! tests. A hardware backend implements [`LinDriver`] against its device.

use std::collections::VecDeque;
use std::time::Duration;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// LIN payloads carry at most eight data bytes.
pub const MAX_FRAME_DATA: usize = 8;

pub type FrameData = ArrayVec<u8, MAX_FRAME_DATA>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDirection {
    /// This node transmits the frame payload.
    Publish,
    /// This node only polls for and decodes the frame.
    Subscribe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Classic,
    Enhanced,
}

/// Error-condition bitset attached to a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    pub const PARITY: ErrorFlags = ErrorFlags(1);
    pub const CHECKSUM: ErrorFlags = ErrorFlags(1 << 1);
    pub const FRAMING: ErrorFlags = ErrorFlags(1 << 2);
    pub const NO_RESPONSE: ErrorFlags = ErrorFlags(1 << 3);

    pub fn from_bits(bits: u8) -> Self {
        ErrorFlags(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_clear(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ErrorFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl core::ops::BitOr for ErrorFlags {
    type Output = ErrorFlags;

    fn bitor(self, rhs: ErrorFlags) -> ErrorFlags {
        ErrorFlags(self.0 | rhs.0)
    }
}

impl core::fmt::Display for ErrorFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut first = true;
        for (flag, label) in [
            (ErrorFlags::PARITY, "id parity error"),
            (ErrorFlags::CHECKSUM, "checksum error"),
            (ErrorFlags::FRAMING, "framing error"),
            (ErrorFlags::NO_RESPONSE, "no response"),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{label}")?;
                first = false;
            }
        }
        if first {
            write!(f, "ok")?;
        }
        Ok(())
    }
}

/// Ephemeral received-frame record; consumed by the inbound dispatcher
/// and discarded.
#[derive(Debug, Clone)]
pub struct RxFrame {
    pub id: u8,
    pub len: u8,
    pub data: [u8; MAX_FRAME_DATA],
    pub flags: ErrorFlags,
}

impl RxFrame {
    pub fn new(id: u8, payload: &[u8]) -> Self {
        let mut data = [0u8; MAX_FRAME_DATA];
        let len = payload.len().min(MAX_FRAME_DATA);
        data[..len].copy_from_slice(&payload[..len]);
        Self {
            id,
            len: len as u8,
            data,
            flags: ErrorFlags::default(),
        }
    }

    pub fn error(id: u8, flags: ErrorFlags) -> Self {
        Self {
            id,
            len: 0,
            data: [0u8; MAX_FRAME_DATA],
            flags,
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..usize::from(self.len)]
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to open bus device `{path}`: {reason}")]
    Open { path: String, reason: String },
    #[error("bus configuration failed: {0}")]
    Configure(String),
    #[error("frame {0:#04x} is not registered")]
    UnregisteredFrame(u8),
    #[error("frame {0:#04x} already registered")]
    AlreadyRegistered(u8),
    #[error("frame table full")]
    TableFull,
    #[error("schedule slot {0} unknown")]
    UnknownSlot(u8),
}

/// Master-mode bus driver interface.
///
/// `read` must be bounded: it returns `None` once `timeout` elapses with
/// nothing available, so the cooperative loop keeps its cadence.
pub trait LinDriver {
    fn configure(&mut self, baud_rate: u32) -> Result<(), TransportError>;
    fn set_id_filter(&mut self, mask: u64) -> Result<(), TransportError>;
    fn register_frame(
        &mut self,
        id: u8,
        direction: FrameDirection,
        checksum: ChecksumKind,
        initial_payload: &[u8],
    ) -> Result<(), TransportError>;
    fn update_frame_payload(&mut self, id: u8, payload: &[u8]) -> Result<(), TransportError>;
    fn add_schedule_slot(&mut self, slot: u8, period_ms: u32, id: u8)
        -> Result<(), TransportError>;
    fn start_schedule(&mut self, slot: u8) -> Result<(), TransportError>;
    fn read(&mut self, timeout: Duration) -> Result<Option<RxFrame>, TransportError>;
}

const MAX_REGISTERED_FRAMES: usize = 64;
const PHOTORES_STEP_MV: u16 = 37;
const PHOTORES_MAX_MV: u16 = 3300;

#[derive(Debug)]
struct FrameEntry {
    id: u8,
    direction: FrameDirection,
    payload: FrameData,
}

#[derive(Debug)]
struct ScheduleSlot {
    slot: u8,
    period_ms: u32,
    id: u8,
    next_due_ms: u64,
}

/// Simulated bus: registered publish frames echo their current payload on
/// their schedule slots, simulated slave boards answer subscribe polls
/// with a millivolt ramp, and unanswered subscribe slots surface a
/// no-response error frame. Time is virtual and advanced by `read`.
#[derive(Debug, Default)]
pub struct SimBus {
    frames: Vec<FrameEntry>,
    schedule: Vec<ScheduleSlot>,
    running_slot: Option<u8>,
    now_ms: u64,
    pending: VecDeque<RxFrame>,
    slave_ids: Vec<u8>,
    photores_mv: u16,
    baud_rate: u32,
    id_filter: u64,
}

impl SimBus {
    /// A bus with simulated slave boards answering the subscribe frames
    /// of `boards` (identifier convention `5 * board + 2`).
    pub fn new(boards: &[u8]) -> Self {
        Self {
            // Widened multiply: a board number whose subscribe id would
            // leave the usable identifier range (0x3C.. is reserved)
            // simply gets no simulated slave, so its polls go
            // unanswered instead of answering under a wrapped id.
            slave_ids: boards
                .iter()
                .filter_map(|&b| u8::try_from(u16::from(b) * 5 + 2).ok())
                .filter(|&id| id <= 0x3B)
                .collect(),
            ..Self::default()
        }
    }

    fn entry(&self, id: u8) -> Option<&FrameEntry> {
        self.frames.iter().find(|f| f.id == id)
    }

    fn entry_mut(&mut self, id: u8) -> Option<&mut FrameEntry> {
        self.frames.iter_mut().find(|f| f.id == id)
    }

    /// Last payload pushed for a registered frame. Test observation hook.
    pub fn payload(&self, id: u8) -> Option<&[u8]> {
        self.entry(id).map(|f| f.payload.as_slice())
    }

    /// Queue an arbitrary frame as if it had been received off the wire.
    pub fn inject(&mut self, frame: RxFrame) {
        self.pending.push_back(frame);
    }

    /// Queue an error-flagged frame for the given identifier.
    pub fn inject_error(&mut self, id: u8, flags: ErrorFlags) {
        self.pending.push_back(RxFrame::error(id, flags));
    }

    fn slot_traffic(&mut self, slot_index: usize) {
        let (id, due) = {
            let slot = &self.schedule[slot_index];
            (slot.id, slot.next_due_ms)
        };
        let (direction, payload) = match self.entry(id) {
            Some(entry) => (entry.direction, entry.payload.clone()),
            None => return,
        };
        let frame = match direction {
            FrameDirection::Publish => RxFrame::new(id, payload.as_slice()),
            FrameDirection::Subscribe => {
                if self.slave_ids.contains(&id) {
                    self.photores_mv = (self.photores_mv + PHOTORES_STEP_MV) % PHOTORES_MAX_MV;
                    RxFrame::new(id, &self.photores_mv.to_le_bytes())
                } else {
                    RxFrame::error(id, ErrorFlags::NO_RESPONSE)
                }
            }
        };
        debug!(id, at_ms = due, "sim slot fired");
        self.pending.push_back(frame);
    }
}

impl LinDriver for SimBus {
    fn configure(&mut self, baud_rate: u32) -> Result<(), TransportError> {
        if baud_rate == 0 {
            return Err(TransportError::Configure("baud rate must be nonzero".into()));
        }
        self.baud_rate = baud_rate;
        Ok(())
    }

    fn set_id_filter(&mut self, mask: u64) -> Result<(), TransportError> {
        self.id_filter = mask;
        Ok(())
    }

    fn register_frame(
        &mut self,
        id: u8,
        direction: FrameDirection,
        _checksum: ChecksumKind,
        initial_payload: &[u8],
    ) -> Result<(), TransportError> {
        if self.frames.len() >= MAX_REGISTERED_FRAMES {
            return Err(TransportError::TableFull);
        }
        if self.entry(id).is_some() {
            return Err(TransportError::AlreadyRegistered(id));
        }
        let mut payload = FrameData::new();
        payload
            .try_extend_from_slice(&initial_payload[..initial_payload.len().min(MAX_FRAME_DATA)])
            .ok();
        self.frames.push(FrameEntry {
            id,
            direction,
            payload,
        });
        Ok(())
    }

    fn update_frame_payload(&mut self, id: u8, payload: &[u8]) -> Result<(), TransportError> {
        let entry = self
            .entry_mut(id)
            .ok_or(TransportError::UnregisteredFrame(id))?;
        entry.payload.clear();
        entry
            .payload
            .try_extend_from_slice(&payload[..payload.len().min(MAX_FRAME_DATA)])
            .ok();
        Ok(())
    }

    fn add_schedule_slot(
        &mut self,
        slot: u8,
        period_ms: u32,
        id: u8,
    ) -> Result<(), TransportError> {
        if self.entry(id).is_none() {
            return Err(TransportError::UnregisteredFrame(id));
        }
        self.schedule.push(ScheduleSlot {
            slot,
            period_ms: period_ms.max(1),
            id,
            next_due_ms: self.now_ms,
        });
        Ok(())
    }

    fn start_schedule(&mut self, slot: u8) -> Result<(), TransportError> {
        if !self.schedule.iter().any(|s| s.slot == slot) {
            return Err(TransportError::UnknownSlot(slot));
        }
        self.running_slot = Some(slot);
        Ok(())
    }

    fn read(&mut self, timeout: Duration) -> Result<Option<RxFrame>, TransportError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        // Nothing queued: behave like a bounded-blocking device read,
        // then let the same amount of virtual time pass and fire due
        // slots.
        std::thread::sleep(timeout);
        self.now_ms += timeout.as_millis().max(1) as u64;
        if let Some(running) = self.running_slot {
            for i in 0..self.schedule.len() {
                if self.schedule[i].slot != running {
                    continue;
                }
                if self.schedule[i].next_due_ms <= self.now_ms {
                    self.slot_traffic(i);
                    let slot = &mut self.schedule[i];
                    slot.next_due_ms += u64::from(slot.period_ms);
                    // One firing per read keeps a slot from bursting
                    // after a long idle stretch.
                    if slot.next_due_ms <= self.now_ms {
                        slot.next_due_ms = self.now_ms + u64::from(slot.period_ms);
                    }
                }
            }
        }
        Ok(self.pending.pop_front())
    }
}
