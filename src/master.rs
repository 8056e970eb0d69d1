//! Bus master orchestrator.
//!
//! Owns the database, driver, frame table, scheduler and dispatcher, and
//! advances everything from a single cooperative loop: one scheduler pass
//! (outbound state mutations), then one bounded driver read (inbound
//! dispatch). Nothing here spawns a thread; a pass is bounded by the read
//! timeout, so the loop stays responsive to the stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::command::{ShellCommand, HELP_TEXT};
use crate::database::{
    led_signal, leds_frame, photores_frame, rgb_frame, rgb_signals, ConfigError, DatabaseStats,
    SignalDatabase, SignalValue,
};
use crate::dispatch::{DispatchStats, InboundDispatcher, RxSink};
use crate::frame::{FrameError, FrameTable, SCHEDULE_SLOT};
use crate::generators::{ColorFader, LedChase, Producer};
use crate::scheduler::{SchedulerStats, TaskScheduler};
use crate::transport::{FrameDirection, LinDriver, TransportError};

pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Demo cadences: one fader firing per wire schedule round, one chase
/// firing every other round.
pub const FADER_PERIOD_MS: u64 = 100;
pub const CHASE_PERIOD_MS: u64 = 250;

/// Upper bound on one inbound read, and thereby on one loop pass.
pub const READ_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Debug, Error)]
pub enum MasterError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("scheduler: {0}")]
    Scheduler(&'static str),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MasterStats {
    pub uptime_ms: u64,
    pub frames_registered: usize,
    pub scheduler: SchedulerStats,
    pub dispatch: DispatchStats,
    pub database: DatabaseStats,
}

/// The LIN master node. Generic over the driver so tests run against
/// [`crate::transport::SimBus`] while a hardware build plugs in a real
/// device behind the same trait.
pub struct BusMaster<D: LinDriver> {
    db: SignalDatabase,
    driver: D,
    frames: FrameTable,
    scheduler: TaskScheduler<Producer>,
    dispatcher: InboundDispatcher,
    epoch: Instant,
    stop: Arc<AtomicBool>,
}

impl<D: LinDriver> BusMaster<D> {
    /// Configure the driver (baud rate, pass-all identifier filter) and
    /// assemble an empty master around it.
    pub fn new(db: SignalDatabase, mut driver: D, baud_rate: u32) -> Result<Self, MasterError> {
        driver.configure(baud_rate)?;
        driver.set_id_filter(u64::MAX)?;
        info!(baud_rate, "bus driver configured");
        Ok(Self {
            db,
            driver,
            frames: FrameTable::new(),
            scheduler: TaskScheduler::new(),
            dispatcher: InboundDispatcher::new(),
            epoch: Instant::now(),
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Shared stop flag; setting it makes the running loop (demo or
    /// monitor) return after its current pass.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    pub fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub fn db(&self) -> &SignalDatabase {
        &self.db
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    pub fn frames(&self) -> &FrameTable {
        &self.frames
    }

    pub fn stats(&self) -> MasterStats {
        MasterStats {
            uptime_ms: self.now_ms(),
            frames_registered: self.frames.len(),
            scheduler: *self.scheduler.stats(),
            dispatch: *self.dispatcher.stats(),
            database: self.db.stats(),
        }
    }

    /// Register one board's frames: RGB and LED outputs plus the
    /// photoresistor poll.
    pub fn register_board(&mut self, board: u8) -> Result<(), MasterError> {
        if self.db.frame(&rgb_frame(board)).is_none() {
            return Err(ConfigError::UnknownBoard(board).into());
        }
        for name in [rgb_frame(board), leds_frame(board), photores_frame(board)] {
            if self.db.frame(&name).is_some() {
                self.frames.register(&self.db, &mut self.driver, &name)?;
            }
        }
        Ok(())
    }

    /// Register every publishable frame the database knows, for shell
    /// sessions that address boards ad hoc.
    pub fn register_publishable(&mut self) -> Result<(), MasterError> {
        let names: Vec<String> = self
            .db
            .publishable_frames()
            .iter()
            .map(|name| name.to_string())
            .collect();
        for name in &names {
            self.frames.register(&self.db, &mut self.driver, name)?;
        }
        Ok(())
    }

    /// Attach the demo generators for one board: a color fader and a
    /// four-LED chase.
    pub fn add_demo_generators(&mut self, board: u8) -> Result<(), MasterError> {
        let now = self.now_ms();
        self.scheduler
            .add(FADER_PERIOD_MS, now, Producer::Fader(ColorFader::new(board)))
            .map_err(MasterError::Scheduler)?;
        self.scheduler
            .add(CHASE_PERIOD_MS, now, Producer::Chase(LedChase::new(board)))
            .map_err(MasterError::Scheduler)?;
        Ok(())
    }

    pub fn start_schedule(&mut self) -> Result<(), MasterError> {
        self.driver.start_schedule(SCHEDULE_SLOT)?;
        Ok(())
    }

    /// One cooperative pass: fire every due producer, then dispatch at
    /// most one received frame.
    pub fn tick(&mut self, now_ms: u64, sink: &mut dyn RxSink) -> Result<(), MasterError> {
        let Self {
            db,
            driver,
            frames,
            scheduler,
            dispatcher,
            ..
        } = self;
        scheduler.process(now_ms, |producer| producer.fire(db, &mut *driver, frames))?;
        if let Some(frame) = driver.read(READ_TIMEOUT)? {
            dispatcher.dispatch(db, &frame, sink);
        }
        Ok(())
    }

    /// Run the demo loop until the stop flag is raised. Any producer or
    /// transport failure ends the loop with the error.
    pub fn run_demo(&mut self, sink: &mut dyn RxSink) -> Result<(), MasterError> {
        self.start_schedule()?;
        info!(
            frames = self.frames.len(),
            generators = self.scheduler.len(),
            "demo loop running"
        );
        while !self.stop.load(Ordering::Relaxed) {
            let now = self.now_ms();
            self.tick(now, sink)?;
        }
        info!("demo loop stopped");
        Ok(())
    }

    /// Drain and report bus traffic until the stop flag is raised. This
    /// is the one exclusive mode: no shell command is processed while it
    /// runs, and the flag is re-armed on exit so the shell continues.
    pub fn monitor(&mut self, sink: &mut dyn RxSink) -> Result<(), MasterError> {
        info!("monitoring bus traffic (interrupt to stop)");
        while !self.stop.load(Ordering::Relaxed) {
            if let Some(frame) = self.driver.read(READ_TIMEOUT)? {
                self.dispatcher.dispatch(&self.db, &frame, sink);
            }
        }
        self.stop.store(false, Ordering::Relaxed);
        Ok(())
    }

    /// Execute one shell command. Returns `false` when the shell should
    /// exit. Command-level failures are returned, never panicked; the
    /// caller decides whether the session survives them.
    pub fn execute(
        &mut self,
        command: ShellCommand,
        sink: &mut dyn RxSink,
    ) -> Result<bool, MasterError> {
        match command {
            ShellCommand::Rgb { board, r, g, b } => {
                let partial: Vec<(String, SignalValue)> = rgb_signals(board)
                    .into_iter()
                    .zip([r, g, b])
                    .map(|(name, value)| (name, SignalValue::Int(u32::from(value))))
                    .collect();
                self.frames
                    .update(&self.db, &mut self.driver, &rgb_frame(board), &partial)?;
            }
            ShellCommand::Led { board, index, on } => {
                let partial = [(led_signal(board, index), SignalValue::Bool(on))];
                self.frames
                    .update(&self.db, &mut self.driver, &leds_frame(board), &partial)?;
            }
            ShellCommand::Off { board } => self.all_off(board)?,
            ShellCommand::Monitor => self.monitor(sink)?,
            ShellCommand::Status => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&self.stats()).unwrap_or_default()
                );
            }
            ShellCommand::Help => println!("{HELP_TEXT}"),
            ShellCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Zero every output signal of every registered publish frame, for
    /// one board or for all of them.
    pub fn all_off(&mut self, board: Option<u8>) -> Result<(), MasterError> {
        let prefix = board.map(|b| format!("eval_{b}_"));
        let mut updates: Vec<(String, Vec<(String, SignalValue)>)> = Vec::new();
        for state in self.frames.iter() {
            if state.direction() != FrameDirection::Publish {
                continue;
            }
            if let Some(prefix) = &prefix {
                if !state.name().starts_with(prefix.as_str()) {
                    continue;
                }
            }
            let def = self
                .db
                .frame_by_id(state.id())
                .ok_or_else(|| ConfigError::UnknownFrame(state.name().to_string()))?;
            let zeros = def
                .signals
                .iter()
                .map(|signal| (signal.name.clone(), SignalValue::Int(0)))
                .collect();
            updates.push((state.name().to_string(), zeros));
        }
        if updates.is_empty() {
            if let Some(board) = board {
                return Err(ConfigError::UnknownBoard(board).into());
            }
            warn!("no publish frames registered, nothing to turn off");
            return Ok(());
        }
        for (name, zeros) in &updates {
            self.frames
                .update(&self.db, &mut self.driver, name, zeros)?;
        }
        Ok(())
    }
}
