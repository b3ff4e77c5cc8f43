//! HTTP client for the Stride backend (reqwest-based).

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use stride_common::{
    AddMemberBody, CancelBody, ErrorBody, ErrorCode, InitiateRequestBody, MemberKey,
    MembershipSet, NotificationEvent, RelationshipRequest, RelationshipScope, RequestId,
    RequestKind, RequestOutcome, RespondBody, TransitionResponse,
};
use tracing::{debug, warn};

use crate::backend::{MembershipBackend, Notifier, RequestBackend};
use crate::config::ClientConfig;
use crate::error::{StrideError, StrideResult};

#[derive(Debug, Clone)]
pub struct StrideClient {
    base_url: Url,
    http_client: Client,
}

impl StrideClient {
    pub fn new(config: &ClientConfig) -> StrideResult<Self> {
        let http_client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("stride-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| StrideError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.clone(),
            http_client,
        })
    }

    /// Client around a pre-built `reqwest::Client`.
    pub fn with_http_client(base_url: Url, http_client: Client) -> Self {
        Self {
            base_url,
            http_client,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── Membership ────────────────────────────────────────────────────

    pub async fn get_members(&self, scope: &RelationshipScope) -> StrideResult<MembershipSet> {
        let url = self.members_url(scope, None)?;
        self.get(url).await
    }

    pub async fn post_member(&self, scope: &RelationshipScope, member: &MemberKey) -> StrideResult<()> {
        let url = self.members_url(scope, None)?;
        debug!("POST {}", url);
        let response = self
            .http_client
            .post(url)
            .json(&AddMemberBody {
                member_key: member.clone(),
            })
            .send()
            .await?;
        self.expect_success(response).await
    }

    pub async fn delete_member(&self, scope: &RelationshipScope, member: &MemberKey) -> StrideResult<()> {
        let url = self.members_url(scope, Some(member))?;
        debug!("DELETE {}", url);
        let response = self.http_client.delete(url).send().await?;
        self.expect_success(response).await
    }

    pub async fn get_friends(&self, owner: &MemberKey) -> StrideResult<MembershipSet> {
        self.get_members(&RelationshipScope::friends(owner)).await
    }

    // ── Requests ──────────────────────────────────────────────────────

    pub async fn send_request(&self, body: &InitiateRequestBody) -> StrideResult<RelationshipRequest> {
        let url = self.endpoint(&["requests"])?;
        debug!("POST {}", url);
        let response = self.http_client.post(url).json(body).send().await?;
        if response.status() == StatusCode::CONFLICT {
            let status = response.status();
            let body_err = Self::error_body(response).await;
            return match body_err {
                Some(ErrorBody { code: ErrorCode::DuplicateRequest, .. }) => Err(StrideError::DuplicateRequest {
                    from: body.from.clone(),
                    to: body.to.clone(),
                }),
                other => Err(Self::error_from(status, other, None)),
            };
        }
        self.handle_response(response).await
    }

    pub async fn fetch_request(&self, id: &RequestId) -> StrideResult<RelationshipRequest> {
        let url = self.endpoint(&["requests", &id.0])?;
        self.get(url).await
    }

    pub async fn respond(
        &self,
        id: &RequestId,
        actor: &MemberKey,
        outcome: RequestOutcome,
    ) -> StrideResult<TransitionResponse> {
        let url = self.endpoint(&["requests", &id.0, "respond"])?;
        self.post(
            url,
            &RespondBody {
                actor: actor.clone(),
                outcome,
            },
        )
        .await
    }

    pub async fn cancel(&self, id: &RequestId, actor: &MemberKey) -> StrideResult<TransitionResponse> {
        let url = self.endpoint(&["requests", &id.0, "cancel"])?;
        self.post(url, &CancelBody { actor: actor.clone() }).await
    }

    // ── Notifications ─────────────────────────────────────────────────

    pub async fn send_notification(&self, event: &NotificationEvent) -> StrideResult<()> {
        let url = self.endpoint(&["notifications"])?;
        debug!("POST {}", url);
        let response = self.http_client.post(url).json(event).send().await?;
        self.expect_success(response).await
    }

    pub async fn get_notifications(&self, member: &MemberKey) -> StrideResult<Vec<NotificationEvent>> {
        let url = self.endpoint(&["notifications", member.as_str()])?;
        self.get(url).await
    }

    // ── Internal HTTP methods ─────────────────────────────────────────

    /// Appends percent-encoded path segments to the base url.
    fn endpoint(&self, segments: &[&str]) -> StrideResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StrideError::InvalidConfig(format!("base url {} cannot carry a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn members_url(&self, scope: &RelationshipScope, member: Option<&MemberKey>) -> StrideResult<Url> {
        let mut segments = vec!["relationship", scope.context.as_str(), scope.id.as_str(), "members"];
        if let Some(member) = member {
            segments.push(member.as_str());
        }
        self.endpoint(&segments)
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> StrideResult<T> {
        debug!("GET {}", url);
        let response = self.http_client.get(url).send().await?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, url: Url, body: &B) -> StrideResult<T> {
        debug!("POST {}", url);
        let response = self.http_client.post(url).json(body).send().await?;
        self.handle_response(response).await
    }

    // ── Response handling ─────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(&self, response: Response) -> StrideResult<T> {
        if response.status().is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(|e| StrideError::Parse(format!("failed to parse response: {e}")))
        } else {
            Err(self.error_response(response).await)
        }
    }

    async fn expect_success(&self, response: Response) -> StrideResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(self.error_response(response).await)
        }
    }

    async fn error_response(&self, response: Response) -> StrideError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = Self::error_body(response).await;
        Self::error_from(status, body, retry_after)
    }

    async fn error_body(response: Response) -> Option<ErrorBody> {
        let text = response.text().await.ok()?;
        serde_json::from_str(&text).ok()
    }

    fn error_from(status: StatusCode, body: Option<ErrorBody>, retry_after: Option<u64>) -> StrideError {
        let detail = body
            .as_ref()
            .map(|b| b.message.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));
        match status {
            StatusCode::NOT_FOUND => StrideError::NotFound(detail),
            StatusCode::FORBIDDEN => StrideError::Forbidden(detail),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => StrideError::InvalidInput(detail),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("backend rate limited, retry after {:?}s", retry_after);
                StrideError::RateLimited {
                    retry_after_secs: retry_after,
                }
            }
            _ => StrideError::Api {
                status: status.as_u16(),
                detail,
            },
        }
    }
}

#[async_trait]
impl MembershipBackend for StrideClient {
    async fn fetch_members(&self, scope: &RelationshipScope) -> StrideResult<MembershipSet> {
        self.get_members(scope).await
    }
    async fn add_member(&self, scope: &RelationshipScope, member: &MemberKey) -> StrideResult<()> {
        self.post_member(scope, member).await
    }
    async fn remove_member(&self, scope: &RelationshipScope, member: &MemberKey) -> StrideResult<()> {
        self.delete_member(scope, member).await
    }
}

#[async_trait]
impl RequestBackend for StrideClient {
    async fn create_request(
        &self,
        from: &MemberKey,
        to: &MemberKey,
        kind: RequestKind,
        subject: Option<&str>,
    ) -> StrideResult<RelationshipRequest> {
        self.send_request(&InitiateRequestBody {
            from: from.clone(),
            to: to.clone(),
            kind,
            subject: subject.map(str::to_string),
        })
        .await
    }
    async fn get_request(&self, id: &RequestId) -> StrideResult<RelationshipRequest> {
        self.fetch_request(id).await
    }
    async fn respond_request(
        &self,
        id: &RequestId,
        actor: &MemberKey,
        outcome: RequestOutcome,
    ) -> StrideResult<TransitionResponse> {
        self.respond(id, actor, outcome).await
    }
    async fn cancel_request(&self, id: &RequestId, actor: &MemberKey) -> StrideResult<TransitionResponse> {
        self.cancel(id, actor).await
    }
}

#[async_trait]
impl Notifier for StrideClient {
    async fn notify(&self, event: &NotificationEvent) -> StrideResult<()> {
        self.send_notification(event).await
    }
}
