//! Seams between the relationship logic and whatever serves the data.
//!
//! [`crate::client::StrideClient`] implements all three over HTTP; tests
//! plug in in-memory fakes.

use async_trait::async_trait;
use stride_common::{
    MemberKey, MembershipSet, NotificationEvent, RelationshipRequest, RelationshipScope,
    RequestId, RequestKind, RequestOutcome, TransitionResponse,
};

use crate::error::StrideResult;

#[async_trait]
pub trait MembershipBackend: Send + Sync {
    /// Current members of `scope`, read from the backend.
    async fn fetch_members(&self, scope: &RelationshipScope) -> StrideResult<MembershipSet>;

    /// Add one member. Adding a present member succeeds.
    async fn add_member(&self, scope: &RelationshipScope, member: &MemberKey) -> StrideResult<()>;

    /// Remove one member. Removing an absent member succeeds.
    async fn remove_member(&self, scope: &RelationshipScope, member: &MemberKey)
        -> StrideResult<()>;
}

#[async_trait]
pub trait RequestBackend: Send + Sync {
    async fn create_request(
        &self,
        from: &MemberKey,
        to: &MemberKey,
        kind: RequestKind,
        subject: Option<&str>,
    ) -> StrideResult<RelationshipRequest>;

    async fn get_request(&self, id: &RequestId) -> StrideResult<RelationshipRequest>;

    async fn respond_request(
        &self,
        id: &RequestId,
        actor: &MemberKey,
        outcome: RequestOutcome,
    ) -> StrideResult<TransitionResponse>;

    async fn cancel_request(&self, id: &RequestId, actor: &MemberKey)
        -> StrideResult<TransitionResponse>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &NotificationEvent) -> StrideResult<()>;
}

#[async_trait]
impl<T: MembershipBackend + ?Sized> MembershipBackend for std::sync::Arc<T> {
    async fn fetch_members(&self, scope: &RelationshipScope) -> StrideResult<MembershipSet> {
        (**self).fetch_members(scope).await
    }
    async fn add_member(&self, scope: &RelationshipScope, member: &MemberKey) -> StrideResult<()> {
        (**self).add_member(scope, member).await
    }
    async fn remove_member(
        &self,
        scope: &RelationshipScope,
        member: &MemberKey,
    ) -> StrideResult<()> {
        (**self).remove_member(scope, member).await
    }
}

#[async_trait]
impl<T: RequestBackend + ?Sized> RequestBackend for std::sync::Arc<T> {
    async fn create_request(
        &self,
        from: &MemberKey,
        to: &MemberKey,
        kind: RequestKind,
        subject: Option<&str>,
    ) -> StrideResult<RelationshipRequest> {
        (**self).create_request(from, to, kind, subject).await
    }
    async fn get_request(&self, id: &RequestId) -> StrideResult<RelationshipRequest> {
        (**self).get_request(id).await
    }
    async fn respond_request(
        &self,
        id: &RequestId,
        actor: &MemberKey,
        outcome: RequestOutcome,
    ) -> StrideResult<TransitionResponse> {
        (**self).respond_request(id, actor, outcome).await
    }
    async fn cancel_request(
        &self,
        id: &RequestId,
        actor: &MemberKey,
    ) -> StrideResult<TransitionResponse> {
        (**self).cancel_request(id, actor).await
    }
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    async fn notify(&self, event: &NotificationEvent) -> StrideResult<()> {
        (**self).notify(event).await
    }
}
