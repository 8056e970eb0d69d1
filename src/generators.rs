//! Periodic signal generators.
//!
//! Deterministic state machines that feed the outbound frame states via
//! the generic partial-update contract. Each `step()` is a pure function
//! of internal state, so a generator is tested by firing it N times and
//! asserting the emitted mapping.

use crate::database::{
    led_signal, leds_frame, rgb_frame, rgb_signals, SignalDatabase, SignalValue,
};
use crate::frame::{FrameError, FrameTable};
use crate::transport::LinDriver;

pub const COLOR_CHANNELS: usize = 3;
pub const FADE_STEP: u16 = 30;
pub const CHASE_LEDS: usize = 4;

/// Fades one RGB channel at a time: each firing emits all three channel
/// values, then advances the active channel by [`FADE_STEP`]; past 255
/// the channel wraps to zero and the next channel takes over.
#[derive(Debug)]
pub struct ColorFader {
    board: u8,
    frame: String,
    channels: [u8; COLOR_CHANNELS],
    active: usize,
}

impl ColorFader {
    pub fn new(board: u8) -> Self {
        Self {
            board,
            frame: rgb_frame(board),
            channels: [0; COLOR_CHANNELS],
            active: 0,
        }
    }

    pub fn frame_name(&self) -> &str {
        &self.frame
    }

    pub fn active_channel(&self) -> usize {
        self.active
    }

    pub fn channels(&self) -> [u8; COLOR_CHANNELS] {
        self.channels
    }

    /// One firing: emit the current channel values, then step.
    pub fn step(&mut self) -> Vec<(String, SignalValue)> {
        let emit = rgb_signals(self.board)
            .into_iter()
            .zip(self.channels)
            .map(|(name, value)| (name, SignalValue::Int(u32::from(value))))
            .collect();

        let next = u16::from(self.channels[self.active]) + FADE_STEP;
        if next > 255 {
            self.channels[self.active] = 0;
            self.active = (self.active + 1) % COLOR_CHANNELS;
        } else {
            self.channels[self.active] = next as u8;
        }
        emit
    }
}

/// Chases a toggle across four LEDs: each firing flips the LED at the
/// current position, emits the full vector, and advances the position.
#[derive(Debug)]
pub struct LedChase {
    board: u8,
    frame: String,
    leds: [bool; CHASE_LEDS],
    position: usize,
}

impl LedChase {
    pub fn new(board: u8) -> Self {
        Self {
            board,
            frame: leds_frame(board),
            leds: [false; CHASE_LEDS],
            position: 0,
        }
    }

    pub fn frame_name(&self) -> &str {
        &self.frame
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn leds(&self) -> [bool; CHASE_LEDS] {
        self.leds
    }

    pub fn step(&mut self) -> Vec<(String, SignalValue)> {
        self.leds[self.position] = !self.leds[self.position];
        let emit = (0..CHASE_LEDS)
            .map(|i| {
                (
                    led_signal(self.board, i as u8),
                    SignalValue::Bool(self.leds[i]),
                )
            })
            .collect();
        self.position = (self.position + 1) % CHASE_LEDS;
        emit
    }
}

/// Closed set of producer kinds the scheduler drives. New generators are
/// added by extending the variant set.
#[derive(Debug)]
pub enum Producer {
    Fader(ColorFader),
    Chase(LedChase),
}

impl Producer {
    pub fn frame_name(&self) -> &str {
        match self {
            Producer::Fader(fader) => fader.frame_name(),
            Producer::Chase(chase) => chase.frame_name(),
        }
    }

    /// One firing: step the generator and apply its partial update to
    /// the frame table.
    pub fn fire(
        &mut self,
        db: &SignalDatabase,
        driver: &mut dyn LinDriver,
        frames: &mut FrameTable,
    ) -> Result<(), FrameError> {
        let (name, partial) = match self {
            Producer::Fader(fader) => (fader.frame.clone(), fader.step()),
            Producer::Chase(chase) => (chase.frame.clone(), chase.step()),
        };
        frames.update(db, driver, &name, &partial)
    }
}
