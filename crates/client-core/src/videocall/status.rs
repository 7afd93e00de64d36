//! Direct-call status and its transition table

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// Where the direct-call scenario currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallStatus {
    /// Nothing started yet
    Initial,
    /// Session up and handle attached, not registered
    Started,
    /// Registered and idle, or ringing an outgoing call
    Waiting,
    /// An incoming call awaits an answer
    Incoming,
    /// In a call
    Taking,
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CallStatus::Initial => "INITIAL",
            CallStatus::Started => "STARTED",
            CallStatus::Waiting => "WAITING",
            CallStatus::Incoming => "INCOMING",
            CallStatus::Taking => "TAKING",
        };
        f.write_str(name)
    }
}

/// Inputs of the call status table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTransition {
    /// Session created and handle attached
    Start,
    /// `registered` received
    Registered,
    /// `incomingcall` received
    Incoming,
    /// Call established, either side
    Accepted,
    /// Local refusal of an incoming call
    Decline,
    /// Either side hung up
    Hangup,
    /// Backend error or negotiation failure during a call
    Failure,
}

impl CallStatus {
    /// Status after `transition`, or `None` if it is not allowed here
    pub fn next(self, transition: CallTransition) -> Option<CallStatus> {
        use CallStatus as S;
        use CallTransition as T;

        match (self, transition) {
            (S::Initial, T::Start) => Some(S::Started),
            (S::Started, T::Registered) => Some(S::Waiting),
            (S::Waiting, T::Incoming) => Some(S::Incoming),
            // Callee accepting, or our outgoing call being accepted
            (S::Incoming, T::Accepted) | (S::Waiting, T::Accepted) => Some(S::Taking),
            (S::Incoming, T::Decline) => Some(S::Waiting),
            (S::Incoming, T::Hangup) | (S::Taking, T::Hangup) => Some(S::Waiting),
            (S::Incoming, T::Failure) | (S::Taking, T::Failure) => Some(S::Waiting),
            _ => None,
        }
    }

    /// Apply `transition`, rejecting it if the table has no entry
    pub fn apply(self, transition: CallTransition) -> ClientResult<CallStatus> {
        self.next(transition)
            .ok_or_else(|| ClientError::invalid_transition(self, transition))
    }

    /// A call is ringing, being answered or established
    pub fn in_call(self) -> bool {
        matches!(self, CallStatus::Incoming | CallStatus::Taking)
    }

    /// Registered with the plugin
    pub fn is_registered(self) -> bool {
        matches!(self, CallStatus::Waiting | CallStatus::Incoming | CallStatus::Taking)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::CallStatus as S;
    use super::CallTransition as T;

    #[test]
    fn test_happy_path() {
        let mut status = S::Initial;
        for (transition, expected) in [
            (T::Start, S::Started),
            (T::Registered, S::Waiting),
            (T::Incoming, S::Incoming),
            (T::Accepted, S::Taking),
            (T::Hangup, S::Waiting),
        ] {
            status = status.apply(transition).unwrap();
            assert_eq!(status, expected);
        }
    }

    #[test]
    fn test_incoming_only_from_waiting() {
        assert!(S::Started.next(T::Incoming).is_none());
        assert!(S::Incoming.next(T::Incoming).is_none());
        assert!(S::Taking.next(T::Incoming).is_none());
    }

    #[test]
    fn test_taking_only_from_accept() {
        assert_eq!(S::Waiting.next(T::Accepted), Some(S::Taking));
        assert_eq!(S::Incoming.next(T::Accepted), Some(S::Taking));
        assert!(S::Started.next(T::Accepted).is_none());
        assert!(S::Initial.next(T::Accepted).is_none());
    }

    #[test]
    fn test_rejection_is_reported() {
        let err = S::Waiting.apply(T::Start).unwrap_err();
        assert!(matches!(err, ClientError::InvalidTransition { .. }));
        assert_eq!(S::Waiting.next(T::Hangup), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(S::Taking.to_string(), "TAKING");
        assert_eq!(serde_json::to_value(S::Incoming).unwrap(), "INCOMING");
    }
}
