//! State selection
//!
//! ```text
//!  Dfs:  [s0 s1 s2] ◄── select/add at the back   (newest fork runs next)
//!  Bfs:  [s0 s1 s2]     select at the front, rotate after every step
//! ```

use crate::domain::config::SearcherKind;
use crate::domain::state::ExecutionState;
use crate::domain::types::StateId;
use std::collections::VecDeque;

/// Live states of one run
#[derive(Debug)]
pub struct Searcher {
    kind: SearcherKind,
    states: VecDeque<ExecutionState>,
}

impl Searcher {
    /// Create an empty searcher
    pub fn new(kind: SearcherKind) -> Self {
        Self {
            kind,
            states: VecDeque::new(),
        }
    }

    /// Strategy
    pub fn kind(&self) -> SearcherKind {
        self.kind
    }

    /// Add a live state
    pub fn add(&mut self, state: ExecutionState) {
        self.states.push_back(state);
    }

    /// State to step next
    pub fn select(&mut self) -> Option<&mut ExecutionState> {
        match self.kind {
            SearcherKind::Dfs => self.states.back_mut(),
            SearcherKind::Bfs => self.states.front_mut(),
        }
    }

    /// Remove the state `select` returns
    pub fn take_selected(&mut self) -> Option<ExecutionState> {
        match self.kind {
            SearcherKind::Dfs => self.states.pop_back(),
            SearcherKind::Bfs => self.states.pop_front(),
        }
    }

    /// Called after every step of the selected state
    pub fn update(&mut self) {
        if self.kind == SearcherKind::Bfs {
            self.states.rotate_left(usize::from(!self.states.is_empty()));
        }
    }

    /// Remove a state by id
    pub fn remove(&mut self, id: StateId) -> Option<ExecutionState> {
        let index = self.states.iter().position(|s| s.id() == id)?;
        self.states.remove(index)
    }

    /// Fold another live state into the selected one when they are
    /// mergeable; returns the id of the state absorbed
    pub fn merge_selected(&mut self) -> Option<StateId> {
        let selected = match self.kind {
            SearcherKind::Dfs => self.states.len().checked_sub(1)?,
            SearcherKind::Bfs => 0,
        };
        let mut target = self.states.remove(selected)?;
        let found = self.states.iter().position(|other| target.merge(other));
        let absorbed = found.and_then(|i| self.states.remove(i)).map(|s| s.id());
        match self.kind {
            SearcherKind::Dfs => self.states.push_back(target),
            SearcherKind::Bfs => self.states.push_front(target),
        }
        absorbed
    }

    /// Live states
    pub fn states(&self) -> impl Iterator<Item = &ExecutionState> {
        self.states.iter()
    }

    /// Number of live states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no state is live
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Summed footprint of the live states
    pub fn approx_bytes(&self) -> usize {
        self.states.iter().map(ExecutionState::approx_bytes).sum()
    }

    /// Retire the largest states until the footprint falls below `target`
    ///
    /// Ties go to the state with the lowest weight. At least one state is
    /// always kept.
    pub fn shed(&mut self, target: usize) -> Vec<ExecutionState> {
        let mut total = self.approx_bytes();
        let mut shed = Vec::new();
        while total > target && self.states.len() > 1 {
            let Some(victim) = self
                .states
                .iter()
                .enumerate()
                .max_by(|(_, a), (_, b)| {
                    a.approx_bytes()
                        .cmp(&b.approx_bytes())
                        .then_with(|| b.weight().total_cmp(&a.weight()))
                })
                .map(|(i, _)| i)
            else {
                break;
            };
            let Some(state) = self.states.remove(victim) else {
                break;
            };
            total = total.saturating_sub(state.approx_bytes());
            shed.push(state);
        }
        shed
    }
}
