//! A fixed 254-slot table of one-shot and periodic ("tick") timers,
//! keyed by small integer ids.
//!
//! Each live timer is backed by one background thread that sleeps in
//! short increments, checking a per-slot cancellation flag between
//! naps so `delete` takes effect promptly instead of only at the next
//! firing. The thread's only job is to push `Event::TimerFired { id }`
//! onto the shared channel; all state mutation driven by that event
//! happens on the single event-loop thread that drains it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::TimerError;
use crate::event::Event;

const SLOT_COUNT: usize = 254;
const POLL_QUANTUM: Duration = Duration::from_millis(5);

struct Slot {
    cancel: Arc<AtomicBool>,
}

pub struct TimerManager {
    tx: Sender<Event>,
    slots: Vec<Option<Slot>>,
}

fn slot_index(id: u8) -> Result<usize, TimerError> {
    if (1..=SLOT_COUNT as u8).contains(&id) {
        Ok((id - 1) as usize)
    } else {
        Err(TimerError::InvalidId(id))
    }
}

impl TimerManager {
    pub fn new(tx: Sender<Event>) -> Self {
        TimerManager {
            tx,
            slots: (0..SLOT_COUNT).map(|_| None).collect(),
        }
    }

    /// Installs a one-shot timer that fires after `ms` milliseconds.
    /// `ms == 0` fires (almost) immediately. Deletes any timer already
    /// occupying the slot first.
    pub fn create_one_shot(&mut self, id: u8, ms: u64) -> Result<(), TimerError> {
        let idx = slot_index(id)?;
        self.delete(id)?;
        let cancel = Arc::new(AtomicBool::new(false));
        self.slots[idx] = Some(Slot {
            cancel: cancel.clone(),
        });
        let tx = self.tx.clone();
        spawn_countdown(ms, cancel, move || {
            let _ = tx.send(Event::TimerFired { id });
        });
        Ok(())
    }

    /// Installs a periodic timer that re-fires every `ms` milliseconds
    /// until deleted.
    pub fn create_tick(&mut self, id: u8, ms: u64) -> Result<(), TimerError> {
        let idx = slot_index(id)?;
        self.delete(id)?;
        let cancel = Arc::new(AtomicBool::new(false));
        self.slots[idx] = Some(Slot {
            cancel: cancel.clone(),
        });
        let tx = self.tx.clone();
        thread::spawn(move || loop {
            if !sleep_cancelable(Duration::from_millis(ms), &cancel) {
                return;
            }
            if tx.send(Event::TimerFired { id }).is_err() {
                return;
            }
        });
        Ok(())
    }

    /// Cancels and frees the slot. A no-op (not an error) if the slot
    /// was already empty.
    pub fn delete(&mut self, id: u8) -> Result<(), TimerError> {
        let idx = slot_index(id)?;
        if let Some(slot) = self.slots[idx].take() {
            slot.cancel.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn is_armed(&self, id: u8) -> bool {
        slot_index(id)
            .ok()
            .map(|idx| self.slots[idx].is_some())
            .unwrap_or(false)
    }
}

fn spawn_countdown(ms: u64, cancel: Arc<AtomicBool>, fire: impl FnOnce() + Send + 'static) {
    thread::spawn(move || {
        if sleep_cancelable(Duration::from_millis(ms), &cancel) {
            fire();
        }
    });
}

/// Sleeps for `total`, polling `cancel` every `POLL_QUANTUM`. Returns
/// `false` if cancelled before the full duration elapsed.
fn sleep_cancelable(total: Duration, cancel: &AtomicBool) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        let nap = remaining.min(POLL_QUANTUM);
        thread::sleep(nap);
        if cancel.load(Ordering::SeqCst) {
            return false;
        }
        remaining = remaining.saturating_sub(nap);
    }
    !cancel.load(Ordering::SeqCst)
}
