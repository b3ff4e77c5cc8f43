pub mod membership;
pub mod notification;
pub mod request;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use membership::{MembershipSet, Operation};
pub use notification::{Catalog, NotificationEvent, NotificationKind};
pub use request::{
    RelationshipRequest, RequestError, RequestId, RequestKind, RequestOutcome, RequestState,
    Transition,
};

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
pub struct Url(pub String);

/// Identity of a member inside a membership set: a username or a user id.
///
/// Keys compare exactly and case-sensitively. Nothing in this workspace
/// normalizes them; callers that want `Alice` and `alice` to be the same
/// member must normalize before building sets.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct MemberKey(pub String);

impl MemberKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}
impl AsRef<MemberKey> for MemberKey {
    fn as_ref(&self) -> &MemberKey {
        self
    }
}
impl AsRef<str> for MemberKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
impl From<&str> for MemberKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
impl From<String> for MemberKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}
impl fmt::Display for MemberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member with its display attributes. Only `key` matters for reconciliation.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
pub struct Member {
    pub key: MemberKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Url>,
}

impl From<MemberKey> for Member {
    fn from(key: MemberKey) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }
}

/// Lets a list of profiles be collected straight into a `MembershipSet`.
impl From<Member> for MemberKey {
    fn from(member: Member) -> Self {
        member.key
    }
}

/// Kind of relationship a membership set belongs to.
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipContext {
    /// Users a training program is shared with.
    ProgramShares,
    /// Participants of a group workout.
    WorkoutParticipants,
    /// A user's friend list.
    Friends,
}

impl RelationshipContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipContext::ProgramShares => "program-shares",
            RelationshipContext::WorkoutParticipants => "workout-participants",
            RelationshipContext::Friends => "friends",
        }
    }
}

impl fmt::Display for RelationshipContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipContext {
    type Err = UnknownContext;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "program-shares" => Ok(RelationshipContext::ProgramShares),
            "workout-participants" => Ok(RelationshipContext::WorkoutParticipants),
            "friends" => Ok(RelationshipContext::Friends),
            other => Err(UnknownContext(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown relationship context: {0}")]
pub struct UnknownContext(pub String);

/// One membership set on the backend: a context plus the id of the thing
/// that owns it (program id, workout id, or the user whose friends these are).
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct RelationshipScope {
    pub context: RelationshipContext,
    pub id: String,
}

impl RelationshipScope {
    pub fn new(context: RelationshipContext, id: impl Into<String>) -> Self {
        Self {
            context,
            id: id.into(),
        }
    }
    pub fn program_shares(program_id: impl Into<String>) -> Self {
        Self::new(RelationshipContext::ProgramShares, program_id)
    }
    pub fn workout_participants(workout_id: impl Into<String>) -> Self {
        Self::new(RelationshipContext::WorkoutParticipants, workout_id)
    }
    pub fn friends(owner: impl AsRef<MemberKey>) -> Self {
        Self::new(RelationshipContext::Friends, owner.as_ref().0.clone())
    }
    /// Storage key used by the backend for this scope.
    pub fn storage_key(&self) -> String {
        format!("{}/{}", self.context, self.id)
    }
}

impl fmt::Display for RelationshipScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.context, self.id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct AddMemberBody {
    pub member_key: MemberKey,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct InitiateRequestBody {
    pub from: MemberKey,
    pub to: MemberKey,
    pub kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct RespondBody {
    pub actor: MemberKey,
    pub outcome: RequestOutcome,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct CancelBody {
    pub actor: MemberKey,
}

/// Reply to `respond` and `cancel`. `applied` is false when the request was
/// already terminal and nothing changed.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct TransitionResponse {
    pub request: RelationshipRequest,
    pub applied: bool,
}

impl TransitionResponse {
    pub fn transition(&self) -> Transition {
        if self.applied {
            Transition::Applied(self.request.state)
        } else {
            Transition::Unchanged(self.request.state)
        }
    }
}

/// Error payload returned by the backend on every non-2xx response.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    DuplicateRequest,
    NotFound,
    Forbidden,
    InvalidInput,
    Internal,
}
