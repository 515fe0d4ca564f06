//! State graph data model and the event-loop runtime that drives it.
//!
//! States and transitions are modeled as ordered `Vec`s; the graph
//! itself is a DAG of states addressed by name (`by_id`), looked up
//! lazily when a transition actually fires.

use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};

use log::{debug, info, warn};

use crate::action::{eval, EvalContext, LocalTable};
use crate::ast::{Arena, NodeId};
use crate::error::RuntimeError;
use crate::event::Event;
use crate::guard;
use crate::timer::TimerManager;
use crate::varserver::VariableServer;

/// A block of local declarations plus the statements that use them.
/// `None` means the state omitted that block entirely; `Some` with an
/// empty `Block([])` means the block was present but had nothing in it.
pub struct ActionBlock {
    pub locals: LocalTable,
    pub body: NodeId,
}

pub struct State {
    pub id: String,
    pub entry: Option<ActionBlock>,
    pub exit: Option<ActionBlock>,
    pub transitions: Vec<Transition>,
}

pub struct Transition {
    pub target_state_name: String,
    pub guard: NodeId,
}

pub struct StateMachine {
    pub name: String,
    pub description: String,
    pub states: Vec<State>,
    pub by_id: HashMap<String, usize>,
    pub current: Option<usize>,
    pub verbose: bool,
}

impl StateMachine {
    pub fn new(name: String, description: String, verbose: bool) -> Self {
        StateMachine {
            name,
            description,
            states: Vec::new(),
            by_id: HashMap::new(),
            current: None,
            verbose,
        }
    }

    pub fn push_state(&mut self, state: State) {
        let idx = self.states.len();
        self.by_id.insert(state.id.clone(), idx);
        self.states.push(state);
    }

    pub fn current_state(&self) -> &State {
        &self.states[self.current.expect("current is set after start()")]
    }
}

/// Outcome of one `handle()` call, used only for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Fired,
    EventNotInGuard,
    GuardFalse,
    TargetMissing,
    /// A matching guard failed to evaluate (bad expression, unknown
    /// local, etc.); no transition fired because of it.
    Invalid,
}

/// Why `run()` stopped looping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// `Event::Terminate` was received — a `SIGINT`/`SIGTERM` bridge or
    /// another producer asked for shutdown. Treated as abnormal
    /// termination by callers (nonzero exit).
    Terminated,
    /// The event channel's last sender was dropped with no termination
    /// request. Not expected in ordinary operation, since the timer
    /// manager and signal bridge hold senders for the runtime's whole
    /// lifetime.
    ChannelClosed,
}

pub struct Runtime {
    pub machine: StateMachine,
    arena: Arena,
    vars: Box<dyn VariableServer>,
    timers: TimerManager,
    rx: Receiver<Event>,
    active_timer: u8,
}

impl Runtime {
    pub fn new(
        machine: StateMachine,
        arena: Arena,
        vars: Box<dyn VariableServer>,
        tx: Sender<Event>,
        rx: Receiver<Event>,
    ) -> Self {
        Runtime {
            machine,
            arena,
            vars,
            timers: TimerManager::new(tx),
            rx,
            active_timer: 0,
        }
    }

    pub fn vars(&self) -> &dyn VariableServer {
        self.vars.as_ref()
    }

    pub fn vars_mut(&mut self) -> &mut dyn VariableServer {
        self.vars.as_mut()
    }

    /// Blocks for up to `timeout` for the next event; panics if none
    /// arrives in time. Useful for driving the event loop one step at a
    /// time instead of via `run()`.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Event {
        self.rx
            .recv_timeout(timeout)
            .expect("expected an event within the timeout")
    }

    /// Like `recv_timeout`, but returns `None` on timeout instead of
    /// panicking. Useful for asserting that nothing arrives.
    pub fn try_recv_timeout(&self, timeout: std::time::Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Enters `init`. A state graph with no `init` state is a fatal
    /// configuration error.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        let idx = *self
            .machine
            .by_id
            .get("init")
            .ok_or(RuntimeError::NoInitState)?;
        self.machine.current = Some(idx);
        self.run_entry(idx)?;
        Ok(())
    }

    /// Runs the blocking event loop until `Event::Terminate` or the
    /// channel is closed, using `mpsc::Receiver::recv` as the single
    /// suspension point.
    pub fn run(&mut self) -> Result<Shutdown, RuntimeError> {
        self.start()?;
        let shutdown = loop {
            match self.rx.recv() {
                Ok(event) => {
                    if matches!(event, Event::Terminate) {
                        info!("termination requested, shutting down");
                        break Shutdown::Terminated;
                    }
                    let outcome = self.handle(event);
                    debug!("{:?} -> {:?}", event, outcome);
                }
                Err(_) => break Shutdown::ChannelClosed,
            }
        };
        self.vars.close();
        Ok(shutdown)
    }

    /// One dispatch step: scan `current`'s transitions in definition
    /// order, fire at most one.
    pub fn handle(&mut self, event: Event) -> DispatchOutcome {
        let Some((kind, id)) = event.as_kind_id() else {
            return DispatchOutcome::EventNotInGuard;
        };
        self.active_timer = match event {
            Event::TimerFired { id } => id,
            _ => 0,
        };
        let current_idx = self.machine.current.expect("started");
        let transition_count = self.machine.states[current_idx].transitions.len();

        let mut any_matched = false;
        let mut any_invalid = false;
        for t in 0..transition_count {
            let guard = self.machine.states[current_idx].transitions[t].guard;
            if !guard::matches(&self.arena, guard, kind, id) {
                continue;
            }
            any_matched = true;

            let truthy = self.eval_guard(guard);
            match truthy {
                Ok(true) => {
                    let target = self.machine.states[current_idx].transitions[t]
                        .target_state_name
                        .clone();
                    return self.fire(current_idx, &target);
                }
                Ok(false) => continue,
                Err(e) => {
                    warn!("guard evaluation failed: {e}");
                    any_invalid = true;
                    continue;
                }
            }
        }
        if any_invalid {
            DispatchOutcome::Invalid
        } else if any_matched {
            DispatchOutcome::GuardFalse
        } else {
            DispatchOutcome::EventNotInGuard
        }
    }

    fn eval_guard(&mut self, guard: NodeId) -> Result<bool, crate::error::EvalError> {
        let mut locals = LocalTable::default();
        let mut ctx = EvalContext {
            locals: &mut locals,
            vars: self.vars.as_mut(),
            timers: &mut self.timers,
            active_timer: self.active_timer,
        };
        eval(&self.arena, guard, &mut ctx)?.is_truthy()
    }

    /// Runs exit (of the *current* state, as it stands before
    /// resolution), resolves the target, and if found, switches state
    /// and runs its entry. Exit runs even if the target turns out to be
    /// missing — the state doesn't change, but its exit action already
    /// fired.
    fn fire(&mut self, from_idx: usize, target: &str) -> DispatchOutcome {
        if let Err(e) = self.run_exit(from_idx) {
            warn!("exit action failed: {e}");
        }
        let Some(&to_idx) = self.machine.by_id.get(target) else {
            warn!("transition target {target:?} not found; staying in {:?}", self.machine.states[from_idx].id);
            return DispatchOutcome::TargetMissing;
        };
        self.machine.current = Some(to_idx);
        if let Err(e) = self.run_entry(to_idx) {
            warn!("entry action failed: {e}");
        }
        DispatchOutcome::Fired
    }

    fn run_entry(&mut self, idx: usize) -> Result<(), crate::error::EvalError> {
        self.run_block(idx, true)
    }

    fn run_exit(&mut self, idx: usize) -> Result<(), crate::error::EvalError> {
        self.run_block(idx, false)
    }

    fn run_block(&mut self, idx: usize, entry: bool) -> Result<(), crate::error::EvalError> {
        let block = if entry {
            &self.machine.states[idx].entry
        } else {
            &self.machine.states[idx].exit
        };
        let Some(block) = block else {
            debug!(
                "state {:?} has no {} block",
                self.machine.states[idx].id,
                if entry { "entry" } else { "exit" }
            );
            return Ok(());
        };
        let mut locals = block.locals.clone();
        let body = block.body;
        let mut ctx = EvalContext {
            locals: &mut locals,
            vars: self.vars.as_mut(),
            timers: &mut self.timers,
            active_timer: self.active_timer,
        };
        eval(&self.arena, body, &mut ctx)?;
        Ok(())
    }
}
