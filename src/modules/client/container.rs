use std::mem;

use super::state::{reduce, Action, SessionState};

/// Receives the new state after every dispatched action
pub trait Observer {
    fn notify(&mut self, state: &SessionState, action: &Action);
}

impl<F> Observer for F
where
    F: FnMut(&SessionState, &Action),
{
    fn notify(&mut self, state: &SessionState, action: &Action) {
        self(state, action)
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

/// Owns the client session state. Components hold a reference to it,
/// dispatch actions into it and register observers for changes.
pub struct StateContainer {
    state: SessionState,
    observers: Vec<(ObserverId, Box<dyn Observer>)>,
    next_id: u64,
}

impl Default for StateContainer {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}

impl StateContainer {
    pub fn new(initial: SessionState) -> Self {
        Self {
            state: initial,
            observers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Replace the state with `reduce(state, action)` and notify observers in
    /// registration order
    pub fn dispatch(&mut self, action: Action) {
        log::debug!("dispatch {}", action.name());

        let previous = mem::take(&mut self.state);
        self.state = reduce(previous, action.clone());

        for (_, observer) in self.observers.iter_mut() {
            observer.notify(&self.state, &action);
        }
    }

    pub fn subscribe(&mut self, observer: impl Observer + 'static) -> ObserverId {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns false if the id was not registered
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(registered, _)| *registered != id);
        self.observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}
