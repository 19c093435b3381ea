//! Time-ordered queue of outbound commands.
//!
//! Command callers insert entries while the retry worker removes the due
//! ones, so the queue is shared between threads. Entries are keyed by their
//! dispatch instant plus a sequence number: two commands queued in the same
//! instant keep their insertion order instead of replacing each other.
//!
//! The worker sleeps on a condition variable until the earliest deadline or
//! the next insert.
//!
//! # Example
//!
//! ```
//! use phc_serial::{ModuleType, PendingCommand, PhcCommand, RetryQueue};
//! use std::time::{Duration, Instant};
//!
//! let queue = RetryQueue::new();
//! let now = Instant::now();
//! queue.push(now, PendingCommand::new(ModuleType::Am, 3, 2, PhcCommand::On));
//! queue.push(now + Duration::from_millis(80), PendingCommand::new(ModuleType::Am, 3, 2, PhcCommand::Off));
//!
//! assert_eq!(queue.pop_due(now).len(), 1);
//! assert_eq!(queue.len(), 1);
//! ```

use std::collections::BTreeMap;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::command::{PhcCommand, DEFAULT_SHUTTER_TIME};
use crate::error::Result;
use crate::module::ModuleType;

/// A command waiting to be sent or re-sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCommand {
    /// Target module type.
    pub module_type: ModuleType,
    /// DIP address of the target module.
    pub dip: u8,
    /// Output channel.
    pub channel: u8,
    /// Desired command.
    pub command: PhcCommand,
    /// Shutter run time in tenths of a second.
    pub shutter_time: u16,
    /// Number of times the command has been written.
    pub attempts: u32,
}

impl PendingCommand {
    /// Creates a command that has not been sent yet.
    pub fn new(module_type: ModuleType, dip: u8, channel: u8, command: PhcCommand) -> Self {
        Self {
            module_type,
            dip,
            channel,
            command,
            shutter_time: DEFAULT_SHUTTER_TIME,
            attempts: 0,
        }
    }

    /// Sets the shutter run time.
    pub fn with_shutter_time(mut self, tenths: u16) -> Self {
        self.shutter_time = tenths;
        self
    }

    /// Sets the number of attempts already spent.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Bus address the command is written to.
    pub fn bus_address(&self) -> Result<u8> {
        self.module_type.bus_address(self.dip)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    entries: BTreeMap<(Instant, u64), PendingCommand>,
    next_seq: u64,
    closed: bool,
}

/// Thread-safe queue of [`PendingCommand`]s ordered by dispatch time.
#[derive(Debug, Default)]
pub struct RetryQueue {
    state: Mutex<QueueState>,
    ready: Condvar,
}

impl RetryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedules `command` for dispatch at `at` and wakes the worker.
    pub fn push(&self, at: Instant, command: PendingCommand) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert((at, seq), command);
        drop(state);
        self.ready.notify_all();
    }

    /// Removes and returns every entry due at or before `now`, earliest first.
    pub fn pop_due(&self, now: Instant) -> Vec<PendingCommand> {
        let mut state = self.lock();
        let later = state.entries.split_off(&(now, u64::MAX));
        let due = std::mem::replace(&mut state.entries, later);
        due.into_values().collect()
    }

    /// Earliest dispatch instant, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.lock().entries.keys().next().map(|(at, _)| *at)
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Drops every queued entry.
    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    /// Stops the worker. Later waits return immediately.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Returns whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Blocks until an entry is due, `idle` has passed, or the queue is
    /// closed. Returns `false` once closed.
    pub fn wait(&self, idle: Duration) -> bool {
        let mut state = self.lock();
        loop {
            if state.closed {
                return false;
            }

            let now = Instant::now();
            let timeout = match state.entries.keys().next() {
                Some((at, _)) if *at <= now => return true,
                Some((at, _)) => (*at - now).min(idle),
                None => idle,
            };

            let (guard, result) = self
                .ready
                .wait_timeout(state, timeout)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if result.timed_out() {
                return !state.closed;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn cmd(channel: u8) -> PendingCommand {
        PendingCommand::new(ModuleType::Am, 1, channel, PhcCommand::On)
    }

    #[test]
    fn test_pop_due_in_order() {
        let queue = RetryQueue::new();
        let t0 = Instant::now();
        queue.push(t0 + Duration::from_millis(20), cmd(2));
        queue.push(t0, cmd(0));
        queue.push(t0 + Duration::from_millis(10), cmd(1));

        let due = queue.pop_due(t0 + Duration::from_millis(10));
        assert_eq!(
            due.iter().map(|c| c.channel).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.next_deadline(), Some(t0 + Duration::from_millis(20)));
    }

    #[test]
    fn test_same_instant_keeps_both() {
        let queue = RetryQueue::new();
        let t0 = Instant::now();
        queue.push(t0, cmd(0));
        queue.push(t0, cmd(1));
        assert_eq!(queue.len(), 2);

        let due = queue.pop_due(t0);
        assert_eq!(
            due.iter().map(|c| c.channel).collect::<Vec<_>>(),
            vec![0, 1]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nothing_due() {
        let queue = RetryQueue::new();
        let t0 = Instant::now();
        queue.push(t0 + Duration::from_secs(1), cmd(0));
        assert!(queue.pop_due(t0).is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_clear() {
        let queue = RetryQueue::new();
        queue.push(Instant::now(), cmd(0));
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.next_deadline(), None);
    }

    #[test]
    fn test_wait_returns_when_due() {
        let queue = RetryQueue::new();
        queue.push(Instant::now(), cmd(0));
        assert!(queue.wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_wait_after_close() {
        let queue = RetryQueue::new();
        queue.close();
        assert!(queue.is_closed());
        assert!(!queue.wait(Duration::from_secs(5)));
    }

    #[test]
    fn test_push_wakes_waiter() {
        let queue = Arc::new(RetryQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.push(Instant::now(), cmd(0));
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_close_wakes_waiter() {
        let queue = Arc::new(RetryQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(20));
        queue.close();
        assert!(!waiter.join().unwrap());
    }

    #[test]
    fn test_pending_command_builders() {
        let pending = PendingCommand::new(ModuleType::Jrm, 2, 1, PhcCommand::Up)
            .with_shutter_time(300)
            .with_attempts(14);
        assert_eq!(pending.shutter_time, 300);
        assert_eq!(pending.attempts, 14);
        assert_eq!(pending.bus_address().unwrap(), 0x42);
    }
}
