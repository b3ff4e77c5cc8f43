use axum::routing::{delete, get, post};
use axum::{Extension, Router};

use crate::state::State;

pub fn router(state: State) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/relationship/:context/:id/members",
            get(members::get_members).post(members::post_member),
        )
        .route(
            "/relationship/:context/:id/members/:member",
            delete(members::delete_member),
        )
        .route("/requests", post(requests::post_request))
        .route("/requests/:id", get(requests::get_request))
        .route("/requests/:id/respond", post(requests::post_respond))
        .route("/requests/:id/cancel", post(requests::post_cancel))
        .route("/notifications", post(notifications::post_notification))
        .route("/notifications/:member", get(notifications::get_notifications))
        .layer(Extension(state))
}

async fn health() -> &'static str {
    "ok"
}

mod members {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::{Extension, Json};
    use stride_common::{AddMemberBody, MemberKey, MembershipSet, RelationshipContext, RelationshipScope};
    use tracing::info;

    use crate::error::{AppError, Result};
    use crate::state::State;

    fn scope(context: &str, id: String) -> Result<RelationshipScope> {
        let context: RelationshipContext = context
            .parse()
            .map_err(|e: stride_common::UnknownContext| AppError::InvalidInput(e.to_string()))?;
        Ok(RelationshipScope::new(context, id))
    }

    pub async fn get_members(
        Extension(state): Extension<State>,
        Path((context, id)): Path<(String, String)>,
    ) -> Result<Json<MembershipSet>> {
        let scope = scope(&context, id)?;
        Ok(Json(state.members(&scope)?))
    }

    /// Adding a present member is a successful no-op.
    pub async fn post_member(
        Extension(state): Extension<State>,
        Path((context, id)): Path<(String, String)>,
        Json(body): Json<AddMemberBody>,
    ) -> Result<StatusCode> {
        let scope = scope(&context, id)?;
        if body.member_key.is_blank() {
            return Err(AppError::InvalidInput("member key must not be blank".into()));
        }
        let member = body.member_key;
        if state.members_mut(&scope, |set| set.insert(member.clone()))? {
            info!(scope = %scope, member = %member, "member added");
        }
        Ok(StatusCode::NO_CONTENT)
    }

    /// Removing an absent member is a successful no-op.
    pub async fn delete_member(
        Extension(state): Extension<State>,
        Path((context, id, member)): Path<(String, String, String)>,
    ) -> Result<StatusCode> {
        let scope = scope(&context, id)?;
        let member = MemberKey(member);
        if state.members_mut(&scope, |set| set.remove(&member))? {
            info!(scope = %scope, member = %member, "member removed");
        }
        Ok(StatusCode::NO_CONTENT)
    }
}

mod requests {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::{Extension, Json};
    use stride_common::{
        CancelBody, InitiateRequestBody, RelationshipRequest, RequestId, RespondBody,
        TransitionResponse,
    };
    use tracing::{debug, info};

    use crate::error::Result;
    use crate::state::State;

    pub async fn post_request(
        Extension(state): Extension<State>,
        Json(body): Json<InitiateRequestBody>,
    ) -> Result<(StatusCode, Json<RelationshipRequest>)> {
        let request = state.create_request(body)?;
        info!(request_id = %request.id, from = %request.from, to = %request.to, kind = request.kind.as_str(), "request created");
        Ok((StatusCode::CREATED, Json(request)))
    }

    pub async fn get_request(
        Extension(state): Extension<State>,
        Path(id): Path<String>,
    ) -> Result<Json<RelationshipRequest>> {
        Ok(Json(state.request(&RequestId(id))?))
    }

    pub async fn post_respond(
        Extension(state): Extension<State>,
        Path(id): Path<String>,
        Json(body): Json<RespondBody>,
    ) -> Result<Json<TransitionResponse>> {
        let id = RequestId(id);
        let response = state.transition_request(&id, |r| r.respond(&body.actor, body.outcome))?;
        log_transition(&response);
        Ok(Json(response))
    }

    pub async fn post_cancel(
        Extension(state): Extension<State>,
        Path(id): Path<String>,
        Json(body): Json<CancelBody>,
    ) -> Result<Json<TransitionResponse>> {
        let id = RequestId(id);
        let response = state.transition_request(&id, |r| r.cancel(&body.actor))?;
        log_transition(&response);
        Ok(Json(response))
    }

    fn log_transition(response: &TransitionResponse) {
        if response.applied {
            info!(request_id = %response.request.id, state = %response.request.state, "request resolved");
        } else {
            debug!(request_id = %response.request.id, state = %response.request.state, "request already resolved");
        }
    }
}

mod notifications {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::{Extension, Json};
    use stride_common::{MemberKey, NotificationEvent};
    use tracing::debug;

    use crate::error::Result;
    use crate::state::State;

    pub async fn post_notification(
        Extension(state): Extension<State>,
        Json(event): Json<NotificationEvent>,
    ) -> Result<StatusCode> {
        debug!(recipient = %event.recipient, request_id = %event.request_id, "notification queued");
        state.push_notification(event)?;
        Ok(StatusCode::ACCEPTED)
    }

    pub async fn get_notifications(
        Extension(state): Extension<State>,
        Path(member): Path<String>,
    ) -> Result<Json<Vec<NotificationEvent>>> {
        Ok(Json(state.notifications(&MemberKey(member))?))
    }
}
