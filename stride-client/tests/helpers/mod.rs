//! In-memory backend and notifier used by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use stride_client::{MembershipBackend, Notifier, RequestBackend, StrideError, StrideResult};
use stride_common::{
    MemberKey, MembershipSet, NotificationEvent, RelationshipRequest, RelationshipScope,
    RequestError, RequestId, RequestKind, RequestOutcome, TransitionResponse,
};

/// Backend double that keeps every scope and request in memory and can be
/// told to fail specific calls.
#[derive(Default)]
pub struct MemoryBackend {
    sets: Mutex<HashMap<RelationshipScope, MembershipSet>>,
    requests: Mutex<HashMap<RequestId, RelationshipRequest>>,
    failing_members: Mutex<HashSet<MemberKey>>,
    flaky_members: Mutex<HashMap<MemberKey, u32>>,
    rejected_members: Mutex<HashSet<MemberKey>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    fetch_failures: AtomicU32,
    fetches: AtomicU32,
    writes: Mutex<Vec<String>>,
    next_id: AtomicU32,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, scope: &RelationshipScope, members: &[&str]) {
        self.sets
            .lock()
            .unwrap()
            .insert(scope.clone(), members.iter().copied().collect());
    }

    pub fn members(&self, scope: &RelationshipScope) -> MembershipSet {
        self.sets.lock().unwrap().get(scope).cloned().unwrap_or_default()
    }

    /// Every add/remove touching `member` fails with a backend error.
    pub fn fail_member(&self, member: &str) {
        self.failing_members.lock().unwrap().insert(member.into());
    }

    pub fn heal_member(&self, member: &str) {
        self.failing_members.lock().unwrap().remove(&MemberKey::from(member));
    }

    /// The next `n` writes touching `member` fail with a 503, later ones succeed.
    pub fn fail_member_times(&self, member: &str, n: u32) {
        self.flaky_members.lock().unwrap().insert(member.into(), n);
    }

    /// Every write touching `member` is refused with a 403.
    pub fn reject_member(&self, member: &str) {
        self.rejected_members.lock().unwrap().insert(member.into());
    }

    /// Highest number of membership writes seen in progress at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// The next `n` fetches fail with a network error.
    pub fn fail_next_fetches(&self, n: u32) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Log of issued writes, e.g. `add alice`.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    pub fn request(&self, id: &RequestId) -> Option<RelationshipRequest> {
        self.requests.lock().unwrap().get(id).cloned()
    }

    /// Holds a write open across one scheduler yield so concurrent writes overlap.
    async fn enter_write(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn check_failure(&self, member: &MemberKey) -> StrideResult<()> {
        if self.rejected_members.lock().unwrap().contains(member) {
            return Err(StrideError::Forbidden(format!("{member} may not join")));
        }
        if let Some(remaining) = self.flaky_members.lock().unwrap().get_mut(member) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StrideError::Api {
                    status: 503,
                    detail: format!("temporary failure for {member}"),
                });
            }
        }
        if self.failing_members.lock().unwrap().contains(member) {
            return Err(StrideError::Api {
                status: 500,
                detail: format!("injected failure for {member}"),
            });
        }
        Ok(())
    }

    fn transition(
        &self,
        id: &RequestId,
        apply: impl FnOnce(&mut RelationshipRequest) -> Result<stride_common::Transition, RequestError>,
    ) -> StrideResult<TransitionResponse> {
        let mut requests = self.requests.lock().unwrap();
        let request = requests
            .get_mut(id)
            .ok_or_else(|| StrideError::NotFound(format!("request {id}")))?;
        let transition = apply(request).map_err(|e| StrideError::Forbidden(e.to_string()))?;
        Ok(TransitionResponse {
            request: request.clone(),
            applied: transition.is_applied(),
        })
    }
}

#[async_trait]
impl MembershipBackend for MemoryBackend {
    async fn fetch_members(&self, scope: &RelationshipScope) -> StrideResult<MembershipSet> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fetch_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fetch_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(StrideError::Network("connection reset".into()));
        }
        Ok(self.members(scope))
    }

    async fn add_member(&self, scope: &RelationshipScope, member: &MemberKey) -> StrideResult<()> {
        self.writes.lock().unwrap().push(format!("add {member}"));
        self.enter_write().await;
        self.check_failure(member)?;
        self.sets
            .lock()
            .unwrap()
            .entry(scope.clone())
            .or_default()
            .insert(member.clone());
        Ok(())
    }

    async fn remove_member(&self, scope: &RelationshipScope, member: &MemberKey) -> StrideResult<()> {
        self.writes.lock().unwrap().push(format!("remove {member}"));
        self.enter_write().await;
        self.check_failure(member)?;
        if let Some(set) = self.sets.lock().unwrap().get_mut(scope) {
            set.remove(member);
        }
        Ok(())
    }
}

#[async_trait]
impl RequestBackend for MemoryBackend {
    async fn create_request(
        &self,
        from: &MemberKey,
        to: &MemberKey,
        kind: RequestKind,
        subject: Option<&str>,
    ) -> StrideResult<RelationshipRequest> {
        let mut requests = self.requests.lock().unwrap();
        if requests
            .values()
            .any(|r| r.is_pending() && &r.from == from && &r.to == to)
        {
            return Err(StrideError::DuplicateRequest {
                from: from.clone(),
                to: to.clone(),
            });
        }
        let id = RequestId(format!("req-{}", self.next_id.fetch_add(1, Ordering::SeqCst)));
        let request = RelationshipRequest::pending(
            id.clone(),
            from.clone(),
            to.clone(),
            kind,
            subject.map(str::to_string),
        )
        .map_err(|e| StrideError::InvalidInput(e.to_string()))?;
        requests.insert(id, request.clone());
        Ok(request)
    }

    async fn get_request(&self, id: &RequestId) -> StrideResult<RelationshipRequest> {
        self.request(id)
            .ok_or_else(|| StrideError::NotFound(format!("request {id}")))
    }

    async fn respond_request(
        &self,
        id: &RequestId,
        actor: &MemberKey,
        outcome: RequestOutcome,
    ) -> StrideResult<TransitionResponse> {
        self.transition(id, |r| r.respond(actor, outcome))
    }

    async fn cancel_request(&self, id: &RequestId, actor: &MemberKey) -> StrideResult<TransitionResponse> {
        self.transition(id, |r| r.cancel(actor))
    }
}

/// Notifier that records what it was asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<NotificationEvent>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::default(),
            fail: true,
        }
    }

    pub fn sent(&self) -> Vec<NotificationEvent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: &NotificationEvent) -> StrideResult<()> {
        self.sent.lock().unwrap().push(event.clone());
        if self.fail {
            return Err(StrideError::Network("push gateway unreachable".into()));
        }
        Ok(())
    }
}
