//! # LIN Master Control Core
//!
//! A single-threaded, cooperatively scheduled LIN bus master: it owns the
//! node's outbound frame states, steps periodic signal generators, and
//! classifies and decodes inbound traffic, all from one loop.
//!
//! ## Features
//!
//! - **Frame state management**: named-signal mappings with partial-update
//!   merge semantics and an always-current wire encoding
//! - **Periodic scheduling**: bounded task table with period-stable
//!   re-arming and at most one firing per task per pass
//! - **Signal generators**: deterministic color-fade and LED-chase
//!   producers for demo traffic
//! - **Inbound dispatch**: error classification, database-driven decode,
//!   raw fallback for unknown identifiers
//! - **Interactive shell**: one-shot `rgb`/`led`/`off` commands plus an
//!   exclusive `monitor` mode
//!
//! ## Quick Start
//!
//! ```rust
//! use linmaster::{BusMaster, SignalDatabase, SimBus, DEFAULT_BAUD_RATE};
//!
//! let db = SignalDatabase::eval_network(&[0]).unwrap();
//! let mut master = BusMaster::new(db, SimBus::new(&[0]), DEFAULT_BAUD_RATE).unwrap();
//! master.register_board(0).unwrap();
//! master.add_demo_generators(0).unwrap();
//! master.start_schedule().unwrap();
//! ```
//!
//! ## Architecture
//!
//! - [`master`] - Main orchestrator and public API
//! - [`database`] - Signal database: frame layouts, encode/decode
//! - [`transport`] - Driver trait, error flags and the simulated bus
//! - [`frame`] - Per-frame signal state and the frame table
//! - [`scheduler`] - Periodic task scheduler
//! - [`generators`] - Demo signal producers
//! - [`dispatch`] - Inbound frame classification and reporting
//! - [`command`] - Shell command grammar

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod command;
pub mod database;
pub mod dispatch;
pub mod frame;
pub mod generators;
pub mod master;
pub mod scheduler;
pub mod transport;

// Re-export main public types for convenience
pub use command::{CommandError, ShellCommand};
pub use database::{SignalDatabase, SignalValue, SignalValues};
pub use dispatch::{ConsoleSink, FrameReport, InboundDispatcher, RxSink};
pub use frame::{FrameState, FrameTable};
pub use master::{BusMaster, MasterError, DEFAULT_BAUD_RATE};
pub use scheduler::TaskScheduler;
pub use transport::{ErrorFlags, LinDriver, RxFrame, SimBus, TransportError};
