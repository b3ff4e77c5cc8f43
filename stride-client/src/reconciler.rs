//! Relationship-set reconciliation.
//!
//! Moves the backend's membership set for one scope to a desired set by
//! issuing the minimal add/remove operations. A member present on both sides
//! is never touched, so server-side metadata such as join timestamps
//! survives a pass.

use std::collections::HashSet;

use futures::stream::{self, StreamExt};
use stride_common::{MemberKey, MembershipSet, Operation, RelationshipScope};
use tracing::{debug, info, warn};

use crate::backend::MembershipBackend;
use crate::config::{ClientConfig, DEFAULT_MAX_IN_FLIGHT};
use crate::error::{FailedOperation, StrideError, StrideResult};
use crate::retry::RetryPolicy;

/// Operations needed to turn `actual` into `desired`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    /// `desired − actual`, in key order.
    pub to_add: Vec<MemberKey>,
    /// `actual − desired`, in key order.
    pub to_remove: Vec<MemberKey>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.to_add
            .iter()
            .cloned()
            .map(Operation::Add)
            .chain(self.to_remove.iter().cloned().map(Operation::Remove))
            .collect()
    }
}

/// Compute the add/remove lists. An empty `desired` clears every member.
pub fn reconcile(desired: &MembershipSet, actual: &MembershipSet) -> Diff {
    Diff {
        to_add: desired.difference(actual).cloned().collect(),
        to_remove: actual.difference(desired).cloned().collect(),
    }
}

/// Outcome of an apply phase. Successful operations stand even when others fail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyResult {
    pub succeeded: Vec<Operation>,
    pub failed: Vec<FailedOperation>,
}

impl ApplyResult {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failures a fresh pass may clear.
    pub fn retryable_failures(&self) -> usize {
        self.failed.iter().filter(|f| f.retryable).count()
    }

    pub fn succeeded_members(&self) -> Vec<&MemberKey> {
        self.succeeded.iter().map(Operation::member).collect()
    }

    /// `Err(PartialApply)` when anything failed.
    pub fn into_result(self) -> StrideResult<Vec<Operation>> {
        if self.failed.is_empty() {
            Ok(self.succeeded)
        } else {
            Err(StrideError::PartialApply {
                failed: self.failed,
            })
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub diff: Diff,
    pub result: ApplyResult,
}

pub struct Reconciler<B> {
    backend: B,
    max_in_flight: usize,
    retry: RetryPolicy,
}

impl<B: MembershipBackend> Reconciler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            retry: RetryPolicy::default(),
        }
    }

    /// In-flight limit and retry policy taken from `config`.
    pub fn from_config(backend: B, config: &ClientConfig) -> Self {
        Self::new(backend)
            .with_max_in_flight(config.max_in_flight)
            .with_retry_policy(config.retry.clone())
    }

    #[must_use]
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight.max(1);
        self
    }

    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Issue every operation independently, concurrently across members.
    ///
    /// Never fails as a whole: each failure is recorded in the result. A
    /// second operation for a member already named earlier in `ops` is not
    /// issued and is recorded as failed.
    pub async fn apply(&self, scope: &RelationshipScope, ops: Vec<Operation>) -> ApplyResult {
        let mut result = ApplyResult::default();
        let mut seen = HashSet::new();
        let mut issued = Vec::with_capacity(ops.len());
        for op in ops {
            if seen.insert(op.member().clone()) {
                issued.push(op);
            } else {
                warn!(scope = %scope, member = %op.member(), "conflicting operation for member in one pass");
                result.failed.push(FailedOperation {
                    reason: format!("another operation for {} is already part of this pass", op.member()),
                    operation: op,
                    retryable: false,
                });
            }
        }

        let outcomes: Vec<(Operation, StrideResult<()>)> = stream::iter(issued)
            .map(|op| async move {
                let outcome = match &op {
                    Operation::Add(member) => self.backend.add_member(scope, member).await,
                    Operation::Remove(member) => self.backend.remove_member(scope, member).await,
                };
                (op, outcome)
            })
            .buffer_unordered(self.max_in_flight)
            .collect()
            .await;

        for (op, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    debug!(scope = %scope, op = %op, "membership operation applied");
                    result.succeeded.push(op);
                }
                Err(error) => {
                    warn!(scope = %scope, op = %op, error = %error, "membership operation failed");
                    result.failed.push(FailedOperation::from_error(op, &error));
                }
            }
        }
        result
    }

    /// One pass: fetch the current set, diff against `desired`, apply.
    pub async fn sync(&self, scope: &RelationshipScope, desired: &MembershipSet) -> StrideResult<SyncReport> {
        let actual = self.backend.fetch_members(scope).await?;
        let diff = reconcile(desired, &actual);
        if diff.is_empty() {
            debug!(scope = %scope, members = actual.len(), "membership already up to date");
            return Ok(SyncReport {
                diff,
                result: ApplyResult::default(),
            });
        }
        info!(
            scope = %scope,
            to_add = diff.to_add.len(),
            to_remove = diff.to_remove.len(),
            "reconciling membership"
        );
        let result = self.apply(scope, diff.operations()).await;
        if !result.is_complete() {
            warn!(scope = %scope, failed = result.failed.len(), "reconciliation applied partially");
        }
        Ok(SyncReport { diff, result })
    }

    /// [`Reconciler::sync`] under the reconciler's retry policy.
    ///
    /// The whole pass (fetch, diff, apply) is started again when the fetch
    /// fails transiently or when any operation failed transiently. Each new
    /// pass re-fetches, so operations that already went through are not
    /// reissued. Once the budget is spent the last report is returned with
    /// its remaining failures.
    pub async fn sync_with_retry(
        &self,
        scope: &RelationshipScope,
        desired: &MembershipSet,
    ) -> StrideResult<SyncReport> {
        let operation = format!("sync {scope}");
        let mut attempt: u32 = 0;
        loop {
            match self.sync(scope, desired).await {
                Ok(report) => {
                    let transient = report.result.retryable_failures();
                    if transient == 0 || attempt >= self.retry.max_retries {
                        return Ok(report);
                    }
                    let delay = self.retry.backoff(attempt);
                    info!(
                        scope = %scope,
                        attempt = attempt + 1,
                        transient,
                        delay_ms = delay.as_millis() as u64,
                        "retrying pass after transient operation failures"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) if self.retry.should_retry(attempt, &error) => {
                    let delay = self.retry.delay_for(attempt, &error);
                    debug!(
                        scope = %scope,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying pass after transient fetch error"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(error) => return Err(self.retry.exhausted(&operation, attempt + 1, error)),
            }
            attempt += 1;
        }
    }

    /// Re-read the set from the backend after a pass, retrying transient
    /// read failures.
    pub async fn confirm(&self, scope: &RelationshipScope) -> StrideResult<MembershipSet> {
        let operation = format!("confirm {scope}");
        self.retry
            .execute(&operation, || self.backend.fetch_members(scope))
            .await
    }
}
