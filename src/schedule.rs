//! Time-driven scheduler for the pre-login and booking tasks.
//!
//! One scheduler instance per run owns its two schedule entries; there is
//! no process-wide job registry. The loop polls wall-clock time at a fixed
//! sub-second cadence and fires each entry exactly once when its time of
//! day is reached, then releases the browser session and stops.

use std::time::Duration;

use anyhow::Result;
use chrono::{Local, NaiveTime};

/// The two actions a run schedules. Retry handling lives inside the task
/// implementations, not here.
pub trait BookingTasks {
    fn pre_login(&mut self) -> Result<bool>;
    fn book_now(&mut self) -> Result<bool>;
    /// Releases driver/session resources. Called exactly once, during drain.
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduledAction {
    PreLogin,
    Book,
}

/// A pending firing. Consumed (removed from the pending set) the moment it
/// fires, so an entry can never fire twice even if a poll is late.
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub label: &'static str,
    pub fire_at: NaiveTime,
    pub action: ScheduledAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Draining,
    Stopped,
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Idle => write!(f, "Idle"),
            SchedulerState::Armed => write!(f, "Armed"),
            SchedulerState::Draining => write!(f, "Draining"),
            SchedulerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// Poll cadence of the scheduling loop.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Time source for the scheduling loop, swappable in tests.
pub trait Clock {
    fn now_time(&self) -> NaiveTime;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock time in the local timezone.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_time(&self) -> NaiveTime {
        Local::now().time()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

pub struct Scheduler<C: Clock> {
    clock: C,
    /// Pending entries, ascending by `fire_at`. Firing order follows time
    /// order, not insertion order.
    pending: Vec<ScheduleEntry>,
    state: SchedulerState,
}

impl<C: Clock> Scheduler<C> {
    pub fn new(clock: C, pre_login_at: NaiveTime, start_at: NaiveTime) -> Self {
        let mut pending = vec![
            ScheduleEntry {
                label: "pre-login",
                fire_at: pre_login_at,
                action: ScheduledAction::PreLogin,
            },
            ScheduleEntry {
                label: "booking",
                fire_at: start_at,
                action: ScheduledAction::Book,
            },
        ];
        // Stable: coincident times keep pre-login first.
        pending.sort_by_key(|entry| entry.fire_at);

        Self {
            clock,
            pending,
            state: SchedulerState::Idle,
        }
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    /// Runs the loop to completion: fires every entry at its time, then
    /// drains (releases `tasks`' resources) and stops.
    ///
    /// Returns whether all fired tasks reported success. A fatal task error
    /// stops the loop immediately; resources are still released.
    pub fn run(&mut self, tasks: &mut dyn BookingTasks) -> Result<bool> {
        self.state = SchedulerState::Armed;
        for entry in &self.pending {
            log::info!("Scheduled {} at {}", entry.label, entry.fire_at.format("%H:%M:%S"));
        }

        let mut all_ok = true;
        let outcome = loop {
            let Some(next) = self.pending.first() else {
                break Ok(all_ok);
            };
            if self.clock.now_time() < next.fire_at {
                self.clock.sleep(POLL_INTERVAL);
                continue;
            }

            let entry = self.pending.remove(0);
            log::info!("Firing {} task", entry.label);
            let result = match entry.action {
                ScheduledAction::PreLogin => tasks.pre_login(),
                ScheduledAction::Book => tasks.book_now(),
            };
            match result {
                Ok(ok) => {
                    log::info!(
                        "{} task finished: {}",
                        entry.label,
                        if ok { "success" } else { "failure" }
                    );
                    all_ok &= ok;
                }
                Err(e) => break Err(e),
            }
        };

        self.state = SchedulerState::Draining;
        log::info!("All entries fired, releasing resources");
        tasks.release();
        self.state = SchedulerState::Stopped;
        outcome
    }
}
