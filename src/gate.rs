//! Approval gate: a generated query runs only after the user says yes.
//!
//! ```text
//! Idle --propose--> AwaitingDecision --decide(yes)--> Resolved(approved)
//!                                    --decide(no)---> Resolved(rejected)
//! Resolved --take_resolved--> Idle
//! ```
//!
//! Proposing while a query is live replaces it. Nothing is queued.

use std::mem;

use crate::error::GateError;

/// A generated statement waiting on the user. Never mutated, only replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    sql_text: String,
    source_question: String,
}

impl PendingQuery {
    pub fn new(sql_text: impl Into<String>, source_question: impl Into<String>) -> Self {
        Self {
            sql_text: sql_text.into(),
            source_question: source_question.into(),
        }
    }

    pub fn sql_text(&self) -> &str {
        &self.sql_text
    }

    pub fn source_question(&self) -> &str {
        &self.source_question
    }

    /// Nothing was extracted from the model output.
    pub fn is_empty(&self) -> bool {
        self.sql_text.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    None,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
enum GateState {
    #[default]
    Idle,
    AwaitingDecision(PendingQuery),
    Resolved {
        query: PendingQuery,
        approved: bool,
    },
}

/// The user's verdict, handed out exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Approved(PendingQuery),
    Rejected(PendingQuery),
}

#[derive(Debug, Default)]
pub struct ApprovalGate {
    state: GateState,
}

impl ApprovalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `query` the subject of the gate, resetting any decision.
    /// Returns the query it displaced, if one was still live.
    pub fn propose(&mut self, query: PendingQuery) -> Option<PendingQuery> {
        match mem::replace(&mut self.state, GateState::AwaitingDecision(query)) {
            GateState::Idle => None,
            GateState::AwaitingDecision(previous) => Some(previous),
            GateState::Resolved { query, .. } => Some(query),
        }
    }

    /// Record the user's decision on the pending query.
    pub fn decide(&mut self, approved: bool) -> Result<(), GateError> {
        match mem::take(&mut self.state) {
            GateState::AwaitingDecision(query) => {
                self.state = GateState::Resolved { query, approved };
                Ok(())
            }
            GateState::Idle => Err(GateError::NothingPending),
            resolved @ GateState::Resolved { .. } => {
                self.state = resolved;
                Err(GateError::AlreadyDecided)
            }
        }
    }

    /// Hand out the decided query and go back to idle. Returns `None`, and
    /// leaves the gate untouched, while no decision has been made.
    pub fn take_resolved(&mut self) -> Option<Resolution> {
        match mem::take(&mut self.state) {
            GateState::Resolved { query, approved } => Some(if approved {
                Resolution::Approved(query)
            } else {
                Resolution::Rejected(query)
            }),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Drop whatever is live and go back to idle.
    pub fn clear(&mut self) -> Option<PendingQuery> {
        match mem::take(&mut self.state) {
            GateState::Idle => None,
            GateState::AwaitingDecision(query) | GateState::Resolved { query, .. } => Some(query),
        }
    }

    pub fn pending(&self) -> Option<&PendingQuery> {
        match &self.state {
            GateState::Idle => None,
            GateState::AwaitingDecision(query) | GateState::Resolved { query, .. } => Some(query),
        }
    }

    pub fn approval_state(&self) -> ApprovalState {
        match self.state {
            GateState::Resolved { approved: true, .. } => ApprovalState::Approved,
            GateState::Resolved { approved: false, .. } => ApprovalState::Rejected,
            _ => ApprovalState::None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state == GateState::Idle
    }

    pub fn is_awaiting_decision(&self) -> bool {
        matches!(self.state, GateState::AwaitingDecision(_))
    }
}
