use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context};
use serde::{de::DeserializeOwned, Serialize};
use sled::{Db, Tree};
use stride_common::{
    InitiateRequestBody, MemberKey, MembershipSet, NotificationEvent, RelationshipRequest,
    RelationshipScope, RequestError, RequestId, Transition, TransitionResponse,
};

use crate::config::Config;
use crate::error::{AppError, Result};

/// Handle to the sled database. Cheap to clone; every clone shares the same
/// trees and write lock.
#[derive(Clone)]
pub struct State {
    db: Db,
    members: Tree,
    requests: Tree,
    pending: Tree,
    notifications: Tree,
    // Serializes read-modify-write cycles so duplicate checks and
    // transitions see a consistent store.
    write_lock: Arc<Mutex<()>>,
}

impl State {
    pub fn open(config: &Config) -> anyhow::Result<Self> {
        let sled_config = if config.temporary {
            sled::Config::new().temporary(true)
        } else {
            sled::Config::new().path(&config.db_path)
        };
        let db = sled_config
            .open()
            .with_context(|| format!("opening database at {}", config.db_path.display()))?;
        Ok(Self {
            members: db.open_tree("members")?,
            requests: db.open_tree("requests")?,
            pending: db.open_tree("pending")?,
            notifications: db.open_tree("notifications")?,
            db,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| AppError::Internal(anyhow!("write lock poisoned")))
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // ── Membership ────────────────────────────────────────────────────

    pub fn members(&self, scope: &RelationshipScope) -> Result<MembershipSet> {
        Ok(read(&self.members, scope.storage_key())?.unwrap_or_default())
    }

    /// Run `func` on the stored set and persist it. Returns what `func` returned.
    pub fn members_mut(
        &self,
        scope: &RelationshipScope,
        func: impl FnOnce(&mut MembershipSet) -> bool,
    ) -> Result<bool> {
        let _guard = self.lock()?;
        let key = scope.storage_key();
        let mut set: MembershipSet = read(&self.members, &key)?.unwrap_or_default();
        let changed = func(&mut set);
        if changed {
            write(&self.members, &key, &set)?;
        }
        Ok(changed)
    }

    // ── Requests ──────────────────────────────────────────────────────

    pub fn request(&self, id: &RequestId) -> Result<RelationshipRequest> {
        read(&self.requests, &id.0)?.ok_or_else(|| AppError::NotFound(format!("request {id}")))
    }

    pub fn create_request(&self, body: InitiateRequestBody) -> Result<RelationshipRequest> {
        let _guard = self.lock()?;
        let pair = pending_key(&body.from, &body.to)?;
        if let Some(existing) = self.pending.get(&pair)? {
            let existing = RequestId(String::from_utf8_lossy(&existing).into_owned());
            if read::<RelationshipRequest>(&self.requests, &existing.0)?.map_or(false, |r| r.is_pending()) {
                return Err(AppError::DuplicateRequest {
                    from: body.from,
                    to: body.to,
                });
            }
        }
        let id = RequestId(uuid::Uuid::new_v4().to_string());
        let request = RelationshipRequest::pending(id, body.from, body.to, body.kind, body.subject)?;
        write(&self.requests, &request.id.0, &request)?;
        self.pending.insert(pair, request.id.0.as_bytes())?;
        Ok(request)
    }

    /// Apply a transition under the write lock. Terminal requests come back
    /// untouched with `applied: false`.
    pub fn transition_request(
        &self,
        id: &RequestId,
        func: impl FnOnce(&mut RelationshipRequest) -> std::result::Result<Transition, RequestError>,
    ) -> Result<TransitionResponse> {
        let _guard = self.lock()?;
        let mut request = self.request(id)?;
        let transition = func(&mut request)?;
        if transition.is_applied() {
            write(&self.requests, &id.0, &request)?;
            self.pending.remove(pending_key(&request.from, &request.to)?)?;
        }
        Ok(TransitionResponse {
            request,
            applied: transition.is_applied(),
        })
    }

    // ── Notifications ─────────────────────────────────────────────────

    pub fn push_notification(&self, event: NotificationEvent) -> Result<()> {
        let _guard = self.lock()?;
        let mut inbox: Vec<NotificationEvent> =
            read(&self.notifications, event.recipient.as_str())?.unwrap_or_default();
        let key = event.recipient.clone();
        inbox.push(event);
        write(&self.notifications, key.as_str(), &inbox)
    }

    pub fn notifications(&self, member: &MemberKey) -> Result<Vec<NotificationEvent>> {
        Ok(read(&self.notifications, member.as_str())?.unwrap_or_default())
    }
}

// JSON `["from","to"]`: keys may hold any character, so no separator byte is safe.
fn pending_key(from: &MemberKey, to: &MemberKey) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&(from, to))?)
}

fn read<T: DeserializeOwned>(tree: &Tree, key: impl AsRef<[u8]>) -> Result<Option<T>> {
    match tree.get(key)? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn write<T: Serialize>(tree: &Tree, key: impl AsRef<[u8]>, value: &T) -> Result<()> {
    tree.insert(key.as_ref(), serde_json::to_vec(value)?)?;
    Ok(())
}
