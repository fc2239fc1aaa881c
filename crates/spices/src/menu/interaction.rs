use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Whether the user may interact with the menu.
///
/// Disabled while at least one [`GateGuard`] is alive. Clones share the state.
#[derive(Clone, Debug, Default)]
pub struct InteractionGate {
    holds: Rc<Cell<usize>>,
}

impl InteractionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.holds.get() == 0
    }

    /// Disables interaction until the returned guard is dropped.
    pub fn acquire(&self) -> GateGuard {
        self.holds.set(self.holds.get() + 1);
        GateGuard {
            holds: self.holds.clone(),
        }
    }
}

#[must_use = "interaction is re-enabled as soon as the guard is dropped"]
#[derive(Debug)]
pub struct GateGuard {
    holds: Rc<Cell<usize>>,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        self.holds.set(self.holds.get().saturating_sub(1));
    }
}

/// Run state of one async button.
#[derive(Debug, Default)]
pub(crate) struct AsyncRunState {
    running: Cell<usize>,
    last_error: RefCell<Option<String>>,
}

impl AsyncRunState {
    pub(crate) fn is_running(&self) -> bool {
        self.running.get() > 0
    }

    pub(crate) fn last_error(&self) -> Option<String> {
        self.last_error.borrow().clone()
    }

    pub(crate) fn set_last_error(&self, error: Option<String>) {
        *self.last_error.borrow_mut() = error;
    }

    pub(crate) fn start(self: &Rc<Self>) -> RunningGuard {
        self.running.set(self.running.get() + 1);
        RunningGuard {
            state: self.clone(),
        }
    }
}

pub(crate) struct RunningGuard {
    state: Rc<AsyncRunState>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        let running = &self.state.running;
        running.set(running.get().saturating_sub(1));
    }
}
