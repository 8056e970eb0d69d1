//! Inbound frame dispatcher.
//!
//! Classifies each received frame and routes it to an observer sink:
//! error frames are reported without a decode attempt, known identifiers
//! are decoded through the signal database, and unknown identifiers
//! surface their raw bytes (the bus may carry frames this node does not
//! care about). Every received frame produces exactly one report.

use colored::Colorize;
use serde::Serialize;

use crate::database::{SignalDatabase, SignalValues};
use crate::transport::{ErrorFlags, RxFrame};

#[derive(Debug, Clone, PartialEq)]
pub enum FrameReport {
    /// Link-level error condition; the payload was not decoded.
    BusError { id: u8, flags: ErrorFlags },
    /// Payload bytes, with the decoded mapping when a decoder exists.
    Data {
        id: u8,
        payload: Vec<u8>,
        decoded: Option<SignalValues>,
    },
}

/// Observer contract for received-frame reports. The console is the
/// reference sink; any other sink fits the same seam.
pub trait RxSink {
    fn report(&mut self, report: &FrameReport);
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct DispatchStats {
    pub frames_received: u32,
    pub bus_errors: u32,
    pub decode_misses: u32,
}

#[derive(Debug, Default)]
pub struct InboundDispatcher {
    stats: DispatchStats,
}

impl InboundDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dispatch(&mut self, db: &SignalDatabase, frame: &RxFrame, sink: &mut dyn RxSink) {
        self.stats.frames_received = self.stats.frames_received.saturating_add(1);
        if !frame.flags.is_clear() {
            self.stats.bus_errors = self.stats.bus_errors.saturating_add(1);
            sink.report(&FrameReport::BusError {
                id: frame.id,
                flags: frame.flags,
            });
            return;
        }
        let decoded = db.decode(frame.id, frame.payload());
        if decoded.is_none() {
            self.stats.decode_misses = self.stats.decode_misses.saturating_add(1);
        }
        sink.report(&FrameReport::Data {
            id: frame.id,
            payload: frame.payload().to_vec(),
            decoded,
        });
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }
}

/// Prints one line per received frame.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl RxSink for ConsoleSink {
    fn report(&mut self, report: &FrameReport) {
        match report {
            FrameReport::BusError { id, flags } => {
                println!("{id:02x} {}", flags.to_string().red());
            }
            FrameReport::Data {
                id,
                payload,
                decoded,
            } => {
                let hex = payload
                    .iter()
                    .map(|b| format!("{b:02x}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                match decoded {
                    Some(values) => {
                        let mapping = values
                            .iter()
                            .map(|(name, value)| format!("{name}={value}"))
                            .collect::<Vec<_>>()
                            .join(" ");
                        println!("{id:02x} [{}] {hex} {}", payload.len(), mapping.green());
                    }
                    None => println!("{id:02x} [{}] {hex}", payload.len()),
                }
            }
        }
    }
}
