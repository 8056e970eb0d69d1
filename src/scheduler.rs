//! Periodic task scheduler.
//!
//! Holds a bounded table of `(period, next_due, task)` slots and fires
//! due tasks once per pass, in registration order. Re-arming is
//! period-stable: `next_due` advances by exactly one period per firing,
//! from the original schedule, so scheduling jitter does not compound
//! into drift. A pass fires each slot at most once; a persistently slow
//! caller falls behind wall clock instead of bursting to catch up.

use heapless::Vec;
use serde::Serialize;

pub const MAX_TASKS: usize = 16;

#[derive(Debug)]
struct TaskSlot<T> {
    period_ms: u64,
    next_due_ms: u64,
    task: T,
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct SchedulerStats {
    pub tasks: u8,
    pub passes: u32,
    pub total_fired: u32,
}

#[derive(Debug)]
pub struct TaskScheduler<T> {
    tasks: Vec<TaskSlot<T>, MAX_TASKS>,
    stats: SchedulerStats,
}

impl<T> TaskScheduler<T> {
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            stats: SchedulerStats::default(),
        }
    }

    /// Append a task slot. `next_due` starts at `now_ms`, so the task
    /// fires on the first scheduler pass.
    pub fn add(&mut self, period_ms: u64, now_ms: u64, task: T) -> Result<(), &'static str> {
        if period_ms == 0 {
            return Err("task period must be nonzero");
        }
        self.tasks
            .push(TaskSlot {
                period_ms,
                next_due_ms: now_ms,
                task,
            })
            .map_err(|_| "task table full")?;
        self.stats.tasks = self.tasks.len() as u8;
        Ok(())
    }

    /// Run one pass: fire every due task in registration order, at most
    /// once each. A task failure is fatal to the pass (fail-fast); the
    /// failing slot is not re-armed. Returns the number of firings.
    pub fn process<E>(
        &mut self,
        now_ms: u64,
        mut fire: impl FnMut(&mut T) -> Result<(), E>,
    ) -> Result<u32, E> {
        self.stats.passes = self.stats.passes.wrapping_add(1);
        let mut fired = 0;
        for slot in self.tasks.iter_mut() {
            if now_ms >= slot.next_due_ms {
                fire(&mut slot.task)?;
                slot.next_due_ms += slot.period_ms;
                self.stats.total_fired = self.stats.total_fired.wrapping_add(1);
                fired += 1;
            }
        }
        Ok(fired)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &T> {
        self.tasks.iter().map(|slot| &slot.task)
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl<T> Default for TaskScheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}
