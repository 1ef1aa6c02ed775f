//! Periodic task schedules ("beat").
//!
//! Only the hourly cron shape is needed: fire at a fixed minute of every
//! hour, UTC. Times are unix seconds.

use serde_json::Value;

const SECS_PER_HOUR: i64 = 3_600;

/// Cron-style schedule: minute `m` of every hour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crontab {
    minute: u32,
}

impl Crontab {
    /// Fires at the top of every hour
    pub fn hourly() -> Self {
        Self { minute: 0 }
    }

    /// Fires at `minute` past every hour (clamped to 0-59)
    pub fn hourly_at(minute: u32) -> Self {
        Self {
            minute: minute.min(59),
        }
    }

    /// Next fire time strictly after `now`
    pub fn next_fire_after(&self, now: i64) -> i64 {
        let hour_start = now - now.rem_euclid(SECS_PER_HOUR);
        let candidate = hour_start + i64::from(self.minute) * 60;
        if candidate > now {
            candidate
        } else {
            candidate + SECS_PER_HOUR
        }
    }

    /// Seconds between consecutive fires
    pub fn period_secs(&self) -> u64 {
        SECS_PER_HOUR as u64
    }
}

/// A task name plus the arguments it is enqueued with
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSignature {
    pub task: String,
    pub args: Value,
}

impl TaskSignature {
    /// Signature with no arguments
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeriodicTask {
    pub schedule: Crontab,
    pub signature: TaskSignature,
}

/// Registered periodic tasks
#[derive(Debug, Default)]
pub struct Beat {
    entries: Vec<PeriodicTask>,
}

impl Beat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a recurring task; does not run it
    pub fn add_periodic_task(&mut self, schedule: Crontab, signature: TaskSignature) {
        tracing::info!(task = %signature.task, schedule = ?schedule, "Periodic task registered");
        self.entries.push(PeriodicTask {
            schedule,
            signature,
        });
    }

    pub fn entries(&self) -> &[PeriodicTask] {
        &self.entries
    }

    /// Earliest upcoming fire time and every entry due at that instant
    pub fn next_due(&self, now: i64) -> Option<(i64, Vec<&PeriodicTask>)> {
        let fire_at = self
            .entries
            .iter()
            .map(|entry| entry.schedule.next_fire_after(now))
            .min()?;

        let due = self
            .entries
            .iter()
            .filter(|entry| entry.schedule.next_fire_after(now) == fire_at)
            .collect();

        Some((fire_at, due))
    }
}
