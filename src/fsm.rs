//! Table-driven finite state machine.
//!
//! The transition table is built once and shared by `Arc` between every
//! aggregate of a kind; each machine only owns its current state. A machine
//! has a single writer (its aggregate's mailbox), so there is no locking.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use thiserror::Error;

use crate::core::{Error, Result};

/// Key of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateTransition<S, T> {
    pub state: S,
    pub trigger: T,
}

impl<S, T> StateTransition<S, T> {
    pub fn new(state: S, trigger: T) -> Self {
        Self { state, trigger }
    }
}

pub type TransitionTable<S, T> = HashMap<StateTransition<S, T>, S>;

/// `trigger` is not a legal move out of `state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {trigger:?} from {state:?}")]
pub struct InvalidTransition<S: fmt::Debug, T: fmt::Debug> {
    pub state: S,
    pub trigger: T,
}

#[derive(Debug, Clone)]
pub struct FiniteStateMachine<S, T> {
    table: Arc<TransitionTable<S, T>>,
    state: S,
}

impl<S, T> FiniteStateMachine<S, T>
where
    S: Copy + Eq + Hash + fmt::Debug,
    T: Copy + Eq + Hash + fmt::Debug,
{
    pub fn new(table: Arc<TransitionTable<S, T>>, starting_state: S) -> Result<Self> {
        if table.is_empty() {
            return Err(Error::validation("transition table must not be empty"));
        }
        Ok(Self {
            table,
            state: starting_state,
        })
    }

    pub fn current_state(&self) -> S {
        self.state
    }

    pub fn can_process(&self, trigger: T) -> bool {
        self.table
            .contains_key(&StateTransition::new(self.state, trigger))
    }

    /// Move to the mapped state, or leave the state untouched and report why.
    pub fn process(&mut self, trigger: T) -> std::result::Result<S, InvalidTransition<S, T>> {
        match self.table.get(&StateTransition::new(self.state, trigger)) {
            Some(&next) => {
                self.state = next;
                Ok(next)
            }
            None => Err(InvalidTransition {
                state: self.state,
                trigger,
            }),
        }
    }
}
