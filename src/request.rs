//! Relationship request lifecycle.
//!
//! A request starts `pending` and moves once to one of the terminal states.
//! The counterparty (`to`) answers with accept/reject, the initiator (`from`)
//! may cancel. Re-applying a transition to a terminal request is not an
//! error: it reports the state the request already has and changes nothing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::MemberKey;

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct RequestId(pub String);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    Friend,
    /// Asking to join a group workout. The subject is the workout id.
    WorkoutJoin,
    /// A vote on a proposed program change. The subject is the proposal id.
    ProposalVote,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Friend => "friend",
            RequestKind::WorkoutJoin => "workout-join",
            RequestKind::ProposalVote => "proposal-vote",
        }
    }
}

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RequestState::Pending)
    }
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Accepted => "accepted",
            RequestState::Rejected => "rejected",
            RequestState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The counterparty's answer to a pending request.
#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOutcome {
    Accepted,
    Rejected,
}

impl From<RequestOutcome> for RequestState {
    fn from(outcome: RequestOutcome) -> Self {
        match outcome {
            RequestOutcome::Accepted => RequestState::Accepted,
            RequestOutcome::Rejected => RequestState::Rejected,
        }
    }
}

/// What a transition call did.
#[derive(Eq, PartialEq, Clone, Copy, Debug)]
pub enum Transition {
    /// The request left `pending` and now has this state.
    Applied(RequestState),
    /// The request was already terminal; this is its unchanged state.
    Unchanged(RequestState),
}

impl Transition {
    pub fn state(&self) -> RequestState {
        match self {
            Transition::Applied(state) | Transition::Unchanged(state) => *state,
        }
    }
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("{actor} cannot {action} request {id}: only {allowed} may")]
    Forbidden {
        id: RequestId,
        actor: MemberKey,
        action: &'static str,
        allowed: MemberKey,
    },
    #[error("a member cannot send a request to themselves ({0})")]
    SelfRequest(MemberKey),
    #[error("member key must not be blank")]
    BlankMember,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct RelationshipRequest {
    pub id: RequestId,
    pub from: MemberKey,
    pub to: MemberKey,
    pub kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default)]
    pub state: RequestState,
}

impl RelationshipRequest {
    /// Build a fresh pending request after validating the two parties.
    pub fn pending(
        id: RequestId,
        from: MemberKey,
        to: MemberKey,
        kind: RequestKind,
        subject: Option<String>,
    ) -> Result<Self, RequestError> {
        if from.is_blank() || to.is_blank() {
            return Err(RequestError::BlankMember);
        }
        if from == to {
            return Err(RequestError::SelfRequest(from));
        }
        Ok(Self {
            id,
            from,
            to,
            kind,
            subject,
            state: RequestState::Pending,
        })
    }

    pub fn is_pending(&self) -> bool {
        self.state == RequestState::Pending
    }

    /// Whether `member` is one of the two parties.
    pub fn involves(&self, member: &MemberKey) -> bool {
        &self.from == member || &self.to == member
    }

    /// Answer the request as `actor`, who must be the recipient.
    pub fn respond(
        &mut self,
        actor: &MemberKey,
        outcome: RequestOutcome,
    ) -> Result<Transition, RequestError> {
        if actor != &self.to {
            return Err(RequestError::Forbidden {
                id: self.id.clone(),
                actor: actor.clone(),
                action: "respond to",
                allowed: self.to.clone(),
            });
        }
        Ok(self.transition_to(outcome.into()))
    }

    /// Withdraw the request as `actor`, who must be the initiator.
    pub fn cancel(&mut self, actor: &MemberKey) -> Result<Transition, RequestError> {
        if actor != &self.from {
            return Err(RequestError::Forbidden {
                id: self.id.clone(),
                actor: actor.clone(),
                action: "cancel",
                allowed: self.from.clone(),
            });
        }
        Ok(self.transition_to(RequestState::Cancelled))
    }

    /// Check-then-set: a terminal request is never touched again.
    fn transition_to(&mut self, next: RequestState) -> Transition {
        if self.state.is_terminal() {
            return Transition::Unchanged(self.state);
        }
        self.state = next;
        Transition::Applied(next)
    }

    /// Party that must hear about a transition into `state`.
    pub fn counterparty_for(&self, state: RequestState) -> Option<&MemberKey> {
        match state {
            RequestState::Pending => None,
            RequestState::Accepted | RequestState::Rejected => Some(&self.from),
            RequestState::Cancelled => Some(&self.to),
        }
    }

    /// Party whose action caused a transition into `state`.
    pub fn actor_for(&self, state: RequestState) -> Option<&MemberKey> {
        match state {
            RequestState::Pending => None,
            RequestState::Accepted | RequestState::Rejected => Some(&self.to),
            RequestState::Cancelled => Some(&self.from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RelationshipRequest {
        RelationshipRequest::pending(
            RequestId::from("r1"),
            "alice".into(),
            "bob".into(),
            RequestKind::Friend,
            None,
        )
        .unwrap()
    }

    #[test]
    fn recipient_accepts_pending_request() {
        let mut req = request();
        let t = req.respond(&"bob".into(), RequestOutcome::Accepted).unwrap();
        assert_eq!(t, Transition::Applied(RequestState::Accepted));
        assert_eq!(req.state, RequestState::Accepted);
    }

    #[test]
    fn responding_to_rejected_request_keeps_rejected() {
        let mut req = request();
        req.respond(&"bob".into(), RequestOutcome::Rejected).unwrap();
        let again = req.respond(&"bob".into(), RequestOutcome::Accepted).unwrap();
        assert_eq!(again, Transition::Unchanged(RequestState::Rejected));
        assert_eq!(req.state, RequestState::Rejected);
    }

    #[test]
    fn cancel_twice_is_idempotent() {
        let mut req = request();
        assert!(req.cancel(&"alice".into()).unwrap().is_applied());
        let again = req.cancel(&"alice".into()).unwrap();
        assert_eq!(again, Transition::Unchanged(RequestState::Cancelled));
    }

    #[test]
    fn only_initiator_may_cancel() {
        let mut req = request();
        let err = req.cancel(&"bob".into()).unwrap_err();
        assert!(matches!(err, RequestError::Forbidden { action: "cancel", .. }));
        assert!(req.is_pending());
    }

    #[test]
    fn initiator_cannot_answer_own_request() {
        let mut req = request();
        assert!(req.respond(&"alice".into(), RequestOutcome::Accepted).is_err());
    }

    #[test]
    fn self_requests_are_rejected() {
        let err = RelationshipRequest::pending(
            RequestId::from("r2"),
            "alice".into(),
            "alice".into(),
            RequestKind::Friend,
            None,
        )
        .unwrap_err();
        assert_eq!(err, RequestError::SelfRequest("alice".into()));
    }

    #[test]
    fn counterparty_depends_on_who_acted() {
        let req = request();
        assert_eq!(req.counterparty_for(RequestState::Accepted), Some(&MemberKey::from("alice")));
        assert_eq!(req.counterparty_for(RequestState::Cancelled), Some(&MemberKey::from("bob")));
        assert_eq!(req.counterparty_for(RequestState::Pending), None);
    }
}
