//! Client side of the relationship request lifecycle.
//!
//! The machine acts on behalf of one member. Before every transition it
//! reads the request's current state; a request that is already terminal is
//! returned as-is without calling the backend or notifying anyone. A
//! notification goes out only when the backend reports the transition as
//! applied, which caps it at one per transition under retries and double
//! clicks.

use stride_common::{
    MemberKey, NotificationEvent, RelationshipRequest, RequestId, RequestKind, RequestOutcome,
    RequestState, Transition,
};
use tracing::{debug, info, warn};

use crate::backend::{Notifier, RequestBackend};
use crate::error::{StrideError, StrideResult};

pub struct RequestStateMachine<B, N> {
    backend: B,
    notifier: N,
    me: MemberKey,
}

impl<B: RequestBackend, N: Notifier> RequestStateMachine<B, N> {
    pub fn new(backend: B, notifier: N, me: impl Into<MemberKey>) -> Self {
        Self {
            backend,
            notifier,
            me: me.into(),
        }
    }

    pub fn member(&self) -> &MemberKey {
        &self.me
    }

    /// Send a request from the acting member to `to`.
    ///
    /// Fails with [`StrideError::DuplicateRequest`] when a request in the same
    /// direction is still pending. A pending request in the opposite
    /// direction does not block this one.
    pub async fn initiate(
        &self,
        to: &MemberKey,
        kind: RequestKind,
        subject: Option<&str>,
    ) -> StrideResult<RelationshipRequest> {
        if to == &self.me {
            return Err(StrideError::InvalidInput(format!(
                "{} cannot send a request to themselves",
                self.me
            )));
        }
        let request = self.backend.create_request(&self.me, to, kind, subject).await?;
        info!(request_id = %request.id, from = %request.from, to = %request.to, kind = request.kind.as_str(), "request sent");
        Ok(request)
    }

    /// Accept or reject a request addressed to the acting member.
    pub async fn respond(&self, id: &RequestId, outcome: RequestOutcome) -> StrideResult<RequestState> {
        let current = self.backend.get_request(id).await?;
        self.ensure_party(&current)?;
        if current.to != self.me {
            return Err(StrideError::Forbidden(format!(
                "{} cannot respond to request {id}: only {} may",
                self.me, current.to
            )));
        }
        if current.state.is_terminal() {
            debug!(request_id = %id, state = %current.state, "request already resolved");
            return Ok(current.state);
        }
        let response = self.backend.respond_request(id, &self.me, outcome).await?;
        self.after_transition(&response.request, response.transition()).await;
        Ok(response.request.state)
    }

    /// Withdraw a request the acting member sent.
    pub async fn cancel(&self, id: &RequestId) -> StrideResult<RequestState> {
        let current = self.backend.get_request(id).await?;
        self.ensure_party(&current)?;
        if current.from != self.me {
            return Err(StrideError::Forbidden(format!(
                "{} cannot cancel request {id}: only {} may",
                self.me, current.from
            )));
        }
        if current.state.is_terminal() {
            debug!(request_id = %id, state = %current.state, "request already resolved");
            return Ok(current.state);
        }
        let response = self.backend.cancel_request(id, &self.me).await?;
        self.after_transition(&response.request, response.transition()).await;
        Ok(response.request.state)
    }

    fn ensure_party(&self, request: &RelationshipRequest) -> StrideResult<()> {
        if request.involves(&self.me) {
            Ok(())
        } else {
            Err(StrideError::Forbidden(format!(
                "{} is not a party to request {}",
                self.me, request.id
            )))
        }
    }

    async fn after_transition(&self, request: &RelationshipRequest, transition: Transition) {
        if !transition.is_applied() {
            debug!(request_id = %request.id, state = %transition.state(), "transition raced with another; not notifying");
            return;
        }
        info!(request_id = %request.id, state = %transition.state(), "request resolved");
        let Some(event) = NotificationEvent::for_transition(request) else {
            return;
        };
        if let Err(error) = self.notifier.notify(&event).await {
            warn!(
                request_id = %request.id,
                recipient = %event.recipient,
                error = %error,
                "failed to send notification"
            );
        }
    }
}
