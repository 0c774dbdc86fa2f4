use tracing::debug;

use crate::action::{Action, Outcome};
use crate::persist::Persister;
use crate::reducer::reduce;
use crate::state::GlobalState;

/// Owns the [`GlobalState`] and mirrors applied changes to storage.
#[derive(Debug, Default)]
pub struct Store {
    state: GlobalState,
    persister: Option<Persister>,
}

impl Store {
    /// A store with empty state and no persistence.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_persister(persister: Persister) -> Self {
        Self {
            state: GlobalState::default(),
            persister: Some(persister),
        }
    }

    pub fn state(&self) -> &GlobalState {
        &self.state
    }

    pub fn persister(&self) -> Option<&Persister> {
        self.persister.as_ref()
    }

    /// Apply `action` and queue writes for whatever it changed.
    pub fn dispatch(&mut self, action: Action) -> Outcome {
        let kind = action.kind();
        let outcome = reduce(&mut self.state, action);

        match &outcome {
            Outcome::Applied(changes) => {
                debug!(
                    action = kind,
                    rooms = changes.rooms.len(),
                    events = changes.events.len(),
                    removed = changes.removed.len(),
                    "Action applied"
                );
                if let Some(persister) = &self.persister {
                    persister.persist(&self.state, changes);
                }
            }
            Outcome::Skipped(skip) => {
                debug!(action = kind, ?skip, "Action skipped");
            }
        }

        outcome
    }
}
