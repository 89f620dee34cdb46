//! Per-session protocol state.
//!
//! A session moves through an ordered set of phases. Transitions are
//! validated here: the machine only moves forward, with `Closed` reachable
//! from any phase. The holder is owned by the session's worker task and
//! mutated only by the processor; handlers get a shared reference and can
//! only read it to gate availability.

use thiserror::Error;

/// The phases of a session, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Stream opened, nothing negotiated yet.
    Initiated,
    /// TLS handshake completed on the transport.
    EncryptionStarted,
    /// SASL exchange succeeded; the session is bound to an account.
    Authenticated,
    /// Stream torn down. Terminal.
    Closed,
}

/// Rejected state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("session cannot move back from {from:?} to {to:?}")]
    Regression {
        from: SessionState,
        to: SessionState,
    },

    #[error("session is closed")]
    AlreadyClosed,
}

/// Holder for a session's current [`SessionState`].
#[derive(Debug)]
pub struct SessionStateHolder {
    state: SessionState,
}

impl SessionStateHolder {
    /// A fresh session starts in `Initiated`.
    pub fn new() -> Self {
        Self {
            state: SessionState::Initiated,
        }
    }

    /// The current phase.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session has reached at least the given phase.
    pub fn is_at_least(&self, state: SessionState) -> bool {
        self.state != SessionState::Closed && self.state >= state
    }

    /// Move the session forward. Re-entering the current phase is a no-op;
    /// moving backwards is an error, as is any transition out of `Closed`.
    pub fn advance(&mut self, to: SessionState) -> Result<(), StateError> {
        if self.state == SessionState::Closed {
            return Err(StateError::AlreadyClosed);
        }
        if to == SessionState::Closed || to >= self.state {
            self.state = to;
            Ok(())
        } else {
            Err(StateError::Regression {
                from: self.state,
                to,
            })
        }
    }

    /// Terminal transition, always permitted.
    pub fn close(&mut self) {
        self.state = SessionState::Closed;
    }
}

impl Default for SessionStateHolder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_initiated() {
        let holder = SessionStateHolder::new();
        assert_eq!(holder.state(), SessionState::Initiated);
        assert!(holder.is_at_least(SessionState::Initiated));
        assert!(!holder.is_at_least(SessionState::Authenticated));
    }

    #[test]
    fn advances_forward_through_encryption() {
        let mut holder = SessionStateHolder::new();
        holder.advance(SessionState::EncryptionStarted).unwrap();
        holder.advance(SessionState::Authenticated).unwrap();
        assert_eq!(holder.state(), SessionState::Authenticated);
    }

    #[test]
    fn encryption_step_may_be_skipped() {
        let mut holder = SessionStateHolder::new();
        holder.advance(SessionState::Authenticated).unwrap();
        assert_eq!(holder.state(), SessionState::Authenticated);
    }

    #[test]
    fn rejects_regression() {
        let mut holder = SessionStateHolder::new();
        holder.advance(SessionState::Authenticated).unwrap();
        assert_eq!(
            holder.advance(SessionState::EncryptionStarted),
            Err(StateError::Regression {
                from: SessionState::Authenticated,
                to: SessionState::EncryptionStarted,
            })
        );
    }

    #[test]
    fn reentering_current_state_is_a_noop() {
        let mut holder = SessionStateHolder::new();
        holder.advance(SessionState::Authenticated).unwrap();
        holder.advance(SessionState::Authenticated).unwrap();
        assert_eq!(holder.state(), SessionState::Authenticated);
    }

    #[test]
    fn close_is_terminal() {
        let mut holder = SessionStateHolder::new();
        holder.close();
        assert_eq!(holder.state(), SessionState::Closed);
        assert_eq!(
            holder.advance(SessionState::Authenticated),
            Err(StateError::AlreadyClosed)
        );
        assert!(!holder.is_at_least(SessionState::Initiated));
    }

    #[test]
    fn close_reachable_from_any_state() {
        let mut holder = SessionStateHolder::new();
        holder.advance(SessionState::Closed).unwrap();
        assert_eq!(holder.state(), SessionState::Closed);
    }
}
