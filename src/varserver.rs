//! The contract the core consumes from an external, out-of-process
//! key/value registry, plus an in-memory reference implementation so
//! this crate runs standalone.
//!
//! Opening a connection collapses here to ordinary construction
//! (`InMemoryVariableServer::new()`): this is an in-process stand-in, so
//! there's no separate connection handle to hand back. A
//! transport-backed implementation (e.g. over a socket) would still do
//! real I/O in its own constructor; the trait is the real boundary, not
//! the handle.

use std::collections::HashMap;
use std::sync::mpsc::Sender;

use crate::error::VarServerError;
use crate::event::Event;
use crate::value::Value;

/// Opaque handle to a variable, minted by `find_by_name`. Its numeric
/// value doubles as the `id` carried by `Event::VariableModified`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarHandle(pub u32);

pub trait VariableServer {
    fn find_by_name(&mut self, path: &str) -> Option<VarHandle>;
    fn get(&self, handle: VarHandle) -> Result<Value, VarServerError>;
    fn set(&mut self, handle: VarHandle, value: Value) -> Result<(), VarServerError>;
    /// After this call, modifications to `handle` deliver
    /// `Event::VariableModified { handle }` on `notify`.
    ///
    /// Repeat subscriptions to the same variable are not deduplicated
    /// (see `DESIGN.md`), so a variable referenced by guards in several
    /// transitions accumulates one subscriber per occurrence and a
    /// single `set` notifies all of them. That's benign: the runtime
    /// fires at most one transition per event regardless of how many
    /// times it was woken for it.
    fn subscribe_modifications(
        &mut self,
        handle: VarHandle,
        notify: Sender<Event>,
    ) -> Result<(), VarServerError>;
    fn close(&mut self);
}

struct Slot {
    value: Value,
    subscribers: Vec<Sender<Event>>,
}

/// In-memory reference implementation of [`VariableServer`].
#[derive(Default)]
pub struct InMemoryVariableServer {
    by_name: HashMap<String, VarHandle>,
    slots: Vec<Slot>,
}

impl InMemoryVariableServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a named variable with an initial value, returning its
    /// handle. Test setup and CLI scaffolding use this; the parser only
    /// ever calls `find_by_name`.
    pub fn declare(&mut self, path: impl Into<String>, initial: Value) -> VarHandle {
        let path = path.into();
        if let Some(&handle) = self.by_name.get(&path) {
            self.slots[handle.0 as usize].value = initial;
            return handle;
        }
        let handle = VarHandle(self.slots.len() as u32);
        self.slots.push(Slot {
            value: initial,
            subscribers: Vec::new(),
        });
        self.by_name.insert(path, handle);
        handle
    }
}

impl VariableServer for InMemoryVariableServer {
    fn find_by_name(&mut self, path: &str) -> Option<VarHandle> {
        self.by_name.get(path).copied()
    }

    fn get(&self, handle: VarHandle) -> Result<Value, VarServerError> {
        self.slots
            .get(handle.0 as usize)
            .map(|slot| slot.value.clone())
            .ok_or(VarServerError::InvalidHandle)
    }

    fn set(&mut self, handle: VarHandle, value: Value) -> Result<(), VarServerError> {
        let slot = self
            .slots
            .get_mut(handle.0 as usize)
            .ok_or(VarServerError::InvalidHandle)?;
        slot.value = value;
        slot.subscribers
            .retain(|tx| tx.send(Event::VariableModified { handle: handle.0 }).is_ok());
        Ok(())
    }

    fn subscribe_modifications(
        &mut self,
        handle: VarHandle,
        notify: Sender<Event>,
    ) -> Result<(), VarServerError> {
        let slot = self
            .slots
            .get_mut(handle.0 as usize)
            .ok_or(VarServerError::InvalidHandle)?;
        slot.subscribers.push(notify);
        Ok(())
    }

    fn close(&mut self) {
        for slot in &mut self.slots {
            slot.subscribers.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn find_by_name_resolves_declared_variable() {
        let mut vs = InMemoryVariableServer::new();
        let h = vs.declare("/sys/alarm/armed", Value::Int(0));
        assert_eq!(vs.find_by_name("/sys/alarm/armed"), Some(h));
        assert_eq!(vs.find_by_name("/sys/no/such/var"), None);
    }

    #[test]
    fn set_notifies_subscribers_with_handle_as_payload() {
        let mut vs = InMemoryVariableServer::new();
        let h = vs.declare("/sys/test/a", Value::Int(0));
        let (tx, rx) = mpsc::channel();
        vs.subscribe_modifications(h, tx).unwrap();
        vs.set(h, Value::Int(1)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Event::VariableModified { handle: h.0 });
    }

    #[test]
    fn get_reflects_last_set() {
        let mut vs = InMemoryVariableServer::new();
        let h = vs.declare("/sys/test/a", Value::Int(0));
        vs.set(h, Value::Int(42)).unwrap();
        assert_eq!(vs.get(h).unwrap(), Value::Int(42));
    }

    #[test]
    fn repeated_subscription_delivers_once_per_set_per_subscriber() {
        let mut vs = InMemoryVariableServer::new();
        let h = vs.declare("/sys/test/a", Value::Int(0));
        let (tx, rx) = mpsc::channel();
        vs.subscribe_modifications(h, tx.clone()).unwrap();
        vs.subscribe_modifications(h, tx).unwrap();
        vs.set(h, Value::Int(1)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), Event::VariableModified { handle: h.0 });
        assert_eq!(rx.try_recv().unwrap(), Event::VariableModified { handle: h.0 });
        assert!(rx.try_recv().is_err());
    }
}
