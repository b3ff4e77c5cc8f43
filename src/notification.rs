//! Notification taxonomy, translation lookup and in-app routing.
//!
//! Every transition of a relationship request into a terminal state produces
//! one [`NotificationEvent`] for the counterparty. The event's
//! [`NotificationKind`] is derived from the request kind and the new state.
//!
//! Translation misses are detected structurally: [`Catalog::lookup`] returns
//! `None` when a template is absent. A template that happens to equal its own
//! key is a valid translation.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{MemberKey, RelationshipRequest, RequestId, RequestKind, RequestState};

#[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
pub struct NotificationKind {
    pub request_kind: RequestKind,
    pub state: RequestState,
}

impl NotificationKind {
    /// `None` for `pending`: nobody is notified until a request resolves.
    pub fn new(request_kind: RequestKind, state: RequestState) -> Option<Self> {
        state.is_terminal().then_some(Self {
            request_kind,
            state,
        })
    }

    pub fn translation_key(&self) -> String {
        let family = match self.request_kind {
            RequestKind::Friend => "friend-request",
            RequestKind::WorkoutJoin => "workout-join",
            RequestKind::ProposalVote => "proposal-vote",
        };
        format!("{family}.{}", self.state)
    }

    fn builtin_text(&self) -> &'static str {
        match (self.request_kind, self.state) {
            (RequestKind::Friend, RequestState::Accepted) => "{actor} accepted your friend request",
            (RequestKind::Friend, RequestState::Rejected) => "{actor} declined your friend request",
            (RequestKind::Friend, RequestState::Cancelled) => "{actor} withdrew their friend request",
            (RequestKind::WorkoutJoin, RequestState::Accepted) => "{actor} let you join workout {subject}",
            (RequestKind::WorkoutJoin, RequestState::Rejected) => "{actor} declined your request to join workout {subject}",
            (RequestKind::WorkoutJoin, RequestState::Cancelled) => "{actor} no longer wants to join workout {subject}",
            (RequestKind::ProposalVote, RequestState::Accepted) => "{actor} approved proposal {subject}",
            (RequestKind::ProposalVote, RequestState::Rejected) => "{actor} voted against proposal {subject}",
            (RequestKind::ProposalVote, RequestState::Cancelled) => "{actor} withdrew proposal {subject}",
            (_, RequestState::Pending) => "{actor} sent you a request",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.translation_key())
    }
}

/// Notification delivered to one member about one request transition.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct NotificationEvent {
    pub recipient: MemberKey,
    pub actor: MemberKey,
    pub request_id: RequestId,
    pub request_kind: RequestKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub state: RequestState,
}

impl NotificationEvent {
    /// Event for `request` having just moved into its current state.
    /// Returns `None` while the request is still pending.
    pub fn for_transition(request: &RelationshipRequest) -> Option<Self> {
        let recipient = request.counterparty_for(request.state)?;
        let actor = request.actor_for(request.state)?;
        Some(Self {
            recipient: recipient.clone(),
            actor: actor.clone(),
            request_id: request.id.clone(),
            request_kind: request.kind,
            subject: request.subject.clone(),
            state: request.state,
        })
    }

    pub fn kind(&self) -> Option<NotificationKind> {
        NotificationKind::new(self.request_kind, self.state)
    }

    /// In-app location the notification opens.
    pub fn route(&self) -> String {
        match (self.request_kind, self.subject.as_deref()) {
            (RequestKind::Friend, _) => "/friends/requests".to_string(),
            (RequestKind::WorkoutJoin, Some(workout)) => format!("/workouts/{workout}"),
            (RequestKind::ProposalVote, Some(program)) => format!("/programs/{program}/proposals"),
            (_, None) => "/notifications".to_string(),
        }
    }

    /// Human readable text in `locale`, falling back to the catalog default
    /// locale and then to the built-in English text.
    pub fn render(&self, catalog: &Catalog, locale: &str) -> String {
        let kind = match self.kind() {
            Some(kind) => kind,
            None => NotificationKind {
                request_kind: self.request_kind,
                state: self.state,
            },
        };
        let key = kind.translation_key();
        let template = catalog
            .lookup(locale, &key)
            .or_else(|| catalog.lookup(catalog.default_locale(), &key))
            .unwrap_or_else(|| kind.builtin_text());
        fill(template, self.actor.as_str(), self.subject.as_deref().unwrap_or(""))
    }
}

/// Substitutes `{actor}` and `{subject}` in one scan; inserted values are
/// never rescanned.
fn fill(template: &str, actor: &str, subject: &str) -> String {
    let mut out = String::with_capacity(template.len() + actor.len() + subject.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{actor}") {
            out.push_str(actor);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{subject}") {
            out.push_str(subject);
            rest = after;
        } else {
            out.push('{');
            rest = &tail[1..];
        }
    }
    out.push_str(rest);
    out
}

/// Locale → key → template.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Catalog {
    default_locale: String,
    entries: HashMap<String, HashMap<String, String>>,
}

impl Catalog {
    pub fn new(default_locale: impl Into<String>) -> Self {
        Self {
            default_locale: default_locale.into(),
            entries: HashMap::new(),
        }
    }

    pub fn default_locale(&self) -> &str {
        &self.default_locale
    }

    pub fn insert(
        &mut self,
        locale: impl Into<String>,
        key: impl Into<String>,
        template: impl Into<String>,
    ) -> &mut Self {
        self.entries
            .entry(locale.into())
            .or_default()
            .insert(key.into(), template.into());
        self
    }

    pub fn lookup(&self, locale: &str, key: &str) -> Option<&str> {
        self.entries
            .get(locale)
            .and_then(|templates| templates.get(key))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestOutcome;

    fn accepted_join() -> RelationshipRequest {
        let mut req = RelationshipRequest::pending(
            RequestId::from("r9"),
            "alice".into(),
            "coach".into(),
            RequestKind::WorkoutJoin,
            Some("w-7".into()),
        )
        .unwrap();
        req.respond(&"coach".into(), RequestOutcome::Accepted).unwrap();
        req
    }

    #[test]
    fn pending_requests_produce_no_event() {
        let req = RelationshipRequest::pending(
            RequestId::from("r1"),
            "a".into(),
            "b".into(),
            RequestKind::Friend,
            None,
        )
        .unwrap();
        assert!(NotificationEvent::for_transition(&req).is_none());
        assert!(NotificationKind::new(RequestKind::Friend, RequestState::Pending).is_none());
    }

    #[test]
    fn accepted_request_notifies_initiator() {
        let event = NotificationEvent::for_transition(&accepted_join()).unwrap();
        assert_eq!(event.recipient, MemberKey::from("alice"));
        assert_eq!(event.actor, MemberKey::from("coach"));
        assert_eq!(event.kind().unwrap().translation_key(), "workout-join.accepted");
        assert_eq!(event.route(), "/workouts/w-7");
    }

    #[test]
    fn render_falls_back_through_locales() {
        let event = NotificationEvent::for_transition(&accepted_join()).unwrap();
        let mut catalog = Catalog::new("en");
        catalog.insert("en", "workout-join.accepted", "{actor} says yes to {subject}");

        assert_eq!(event.render(&catalog, "de"), "coach says yes to w-7");

        catalog.insert("de", "workout-join.accepted", "{actor} sagt ja zu {subject}");
        assert_eq!(event.render(&catalog, "de"), "coach sagt ja zu w-7");

        let empty = Catalog::new("en");
        assert_eq!(event.render(&empty, "fr"), "coach let you join workout w-7");
    }

    #[test]
    fn template_equal_to_its_key_is_not_a_miss() {
        let event = NotificationEvent::for_transition(&accepted_join()).unwrap();
        let mut catalog = Catalog::new("en");
        catalog.insert("en", "workout-join.accepted", "workout-join.accepted");
        assert_eq!(event.render(&catalog, "en"), "workout-join.accepted");
    }

    #[test]
    fn placeholder_text_in_values_is_left_alone() {
        let event = NotificationEvent {
            recipient: "owner".into(),
            actor: "{subject}".into(),
            request_id: RequestId::from("r3"),
            request_kind: RequestKind::ProposalVote,
            subject: Some("p1".into()),
            state: RequestState::Cancelled,
        };
        let mut catalog = Catalog::new("en");
        catalog.insert("en", "proposal-vote.cancelled", "{actor} withdrew proposal {subject} {unknown}");
        assert_eq!(event.render(&catalog, "en"), "{subject} withdrew proposal p1 {unknown}");
    }

    #[test]
    fn route_without_subject_falls_back_to_inbox() {
        let mut event = NotificationEvent::for_transition(&accepted_join()).unwrap();
        event.subject = None;
        assert_eq!(event.route(), "/notifications");
        event.request_kind = RequestKind::Friend;
        assert_eq!(event.route(), "/friends/requests");
    }
}
