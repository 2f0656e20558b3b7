//! HTTP gateway implementation.
//!
//! Talks to the subscription REST API:
//!
//! | call | request |
//! |------|---------|
//! | probe | `HEAD /health` (no auth, `Cache-Control: no-store`) |
//! | fetch all | `GET /subscriptions` |
//! | fetch one | `GET /subscriptions/:id` |
//! | CREATE | `POST /subscriptions` |
//! | UPDATE | `PATCH /subscriptions/:id` |
//! | DELETE | `DELETE /subscriptions/:id` |
//!
//! The remote store uses snake_case field names and calls the account
//! e-mail `account`; translation happens here.

use crate::error::{SyncError, SyncResult};
use crate::gateway::RemoteGateway;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::header::CACHE_CONTROL;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use subtrack_sync_protocol::{
    format_timestamp, parse_timestamp_millis, OperationKind, ProtocolError, Subscription,
    SyncOperation, DEFAULT_CURRENCY, STATUS_ACTIVE,
};
use tracing::debug;

/// Configuration for [`HttpGateway`].
#[derive(Debug, Clone, PartialEq)]
pub struct HttpGatewayConfig {
    /// Base URL of the API, e.g. `https://api.example.com/api`.
    pub base_url: String,
    /// Bearer token sent with every CRUD call.
    pub token: Option<String>,
    /// Per-request timeout. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl HttpGatewayConfig {
    /// Creates a configuration without token or timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: None,
            timeout: None,
        }
    }

    /// Sets the bearer token.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP-based remote gateway.
pub struct HttpGateway {
    base_url: Url,
    token: Option<String>,
    client: Client,
    last_error: RwLock<Option<String>>,
}

impl HttpGateway {
    /// Creates a gateway from its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client cannot
    /// be built.
    pub fn new(config: HttpGatewayConfig) -> SyncResult<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            SyncError::transport_fatal(format!("invalid base URL {:?}: {e}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::transport_fatal(format!(
                "{} cannot be used as a base URL",
                config.base_url
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| SyncError::transport_fatal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            token: config.token,
            client,
            last_error: RwLock::new(None),
        })
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, error: &SyncError) {
        *self.last_error.write() = Some(error.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| SyncError::transport_fatal("base URL cannot have path segments"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends an authenticated request and maps non-2xx statuses to errors.
    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        let result = self.send_inner(self.authorized(request)).await;
        match &result {
            Ok(_) => self.clear_error(),
            Err(e) => self.set_error(e),
        }
        result
    }

    async fn send_inner(&self, request: RequestBuilder) -> SyncResult<Response> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            body
        };

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SyncError::AuthenticationFailed(message));
        }
        Err(SyncError::Http {
            status: status.as_u16(),
            message,
        })
    }

    /// Decodes an entity from a response body; an empty body yields `None`.
    async fn decode_entity(response: Response) -> SyncResult<Option<Subscription>> {
        let body = response.text().await.map_err(transport_error)?;
        if body.trim().is_empty() {
            return Ok(None);
        }
        let remote: RemoteSubscription =
            serde_json::from_str(&body).map_err(|e| SyncError::Decode(e.to_string()))?;
        Ok(Some(remote.into()))
    }
}

impl std::fmt::Debug for HttpGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGateway")
            .field("base_url", &self.base_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn check_reachable(&self) -> bool {
        let Ok(url) = self.endpoint(&["health"]) else {
            return false;
        };
        match self
            .client
            .head(url)
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
        {
            Ok(response) => {
                debug!(status = response.status().as_u16(), "health probe answered");
                response.status().is_success()
            }
            Err(e) => {
                debug!(error = %e, "health probe failed");
                false
            }
        }
    }

    async fn fetch_all(&self) -> SyncResult<Vec<Subscription>> {
        let url = self.endpoint(&["subscriptions"])?;
        let response = self.send(self.client.get(url)).await?;
        let remote: Vec<RemoteSubscription> = response
            .json()
            .await
            .map_err(|e| SyncError::Decode(e.to_string()))?;
        debug!(count = remote.len(), "fetched remote subscriptions");
        Ok(remote.into_iter().map(Subscription::from).collect())
    }

    async fn fetch_one(&self, id: &str) -> SyncResult<Option<Subscription>> {
        let url = self.endpoint(&["subscriptions", id])?;
        match self.send(self.client.get(url)).await {
            Ok(response) => Self::decode_entity(response).await,
            Err(SyncError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn apply(&self, operation: &SyncOperation) -> SyncResult<Option<Subscription>> {
        debug!(
            op_id = %operation.id,
            entity_id = %operation.entity_id,
            kind = %operation.kind,
            "sending operation"
        );
        match operation.kind {
            OperationKind::Create => {
                let data = operation.data.as_ref().ok_or_else(|| {
                    ProtocolError::invalid_payload("CREATE operation without data")
                })?;
                let local = Subscription::from_payload(&operation.entity_id, data)?;
                let body = RemoteSubscription::for_create(&local);
                let url = self.endpoint(&["subscriptions"])?;
                let response = self.send(self.client.post(url).json(&body)).await?;
                Self::decode_entity(response).await
            }
            OperationKind::Update => {
                let data = operation.data.as_ref().ok_or_else(|| {
                    ProtocolError::invalid_payload("UPDATE operation without data")
                })?;
                let body = remote_patch(data)?;
                let url = self.endpoint(&["subscriptions", &operation.entity_id])?;
                let response = self.send(self.client.patch(url).json(&body)).await?;
                Self::decode_entity(response).await
            }
            OperationKind::Delete => {
                let url = self.endpoint(&["subscriptions", &operation.entity_id])?;
                self.send(self.client.delete(url)).await?;
                Ok(None)
            }
        }
    }
}

fn transport_error(e: reqwest::Error) -> SyncError {
    if e.is_timeout() {
        SyncError::Timeout
    } else if e.is_connect() || e.is_request() || e.is_body() {
        SyncError::transport_retryable(e.to_string())
    } else {
        SyncError::transport_fatal(e.to_string())
    }
}

/// A subscription in the remote store's shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RemoteSubscription {
    id: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    plan: Option<String>,
    price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    currency: Option<String>,
    billing_cycle: String,
    start_date: String,
    renewal_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payment_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cancellation_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    synced_at: Option<String>,
}

impl RemoteSubscription {
    /// Builds a POST body. Timestamps are assigned by the server.
    fn for_create(local: &Subscription) -> Self {
        Self {
            id: local.id.clone(),
            name: local.name.clone(),
            plan: local.plan.clone(),
            price: local.price,
            currency: Some(local.currency.clone()),
            billing_cycle: local.billing_cycle.clone(),
            start_date: local.start_date.clone(),
            renewal_date: local.renewal_date.clone(),
            payment_method: local.payment_method.clone(),
            account: local.account_email.clone(),
            category: local.category.clone(),
            status: Some(local.status.clone()),
            cancellation_info: local.cancellation_info.clone(),
            notes: local.notes.clone(),
            created_at: None,
            updated_at: None,
            synced_at: None,
        }
    }
}

impl From<RemoteSubscription> for Subscription {
    fn from(remote: RemoteSubscription) -> Self {
        let last_modified = remote
            .updated_at
            .as_deref()
            .map_or(0, parse_timestamp_millis);
        Subscription {
            id: remote.id,
            name: remote.name,
            plan: remote.plan,
            price: remote.price,
            currency: remote
                .currency
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            billing_cycle: remote.billing_cycle,
            start_date: remote.start_date,
            renewal_date: remote.renewal_date,
            payment_method: remote.payment_method,
            account_email: remote.account,
            category: remote.category,
            status: remote.status.unwrap_or_else(|| STATUS_ACTIVE.to_string()),
            cancellation_info: remote.cancellation_info,
            notes: remote.notes,
            last_modified,
            updated_at: remote.updated_at,
        }
    }
}

/// Maps a local (camelCase) field name to the remote column name.
///
/// Bookkeeping fields (`id`, `lastModified`, `updatedAt`) have no remote
/// counterpart in a PATCH body.
fn remote_field(local: &str) -> Option<&'static str> {
    Some(match local {
        "name" => "name",
        "plan" => "plan",
        "price" => "price",
        "currency" => "currency",
        "billingCycle" => "billing_cycle",
        "startDate" => "start_date",
        "renewalDate" => "renewal_date",
        "paymentMethod" => "payment_method",
        "accountEmail" => "account",
        "category" => "category",
        "status" => "status",
        "cancellationInfo" => "cancellation_info",
        "notes" => "notes",
        _ => return None,
    })
}

/// Translates an UPDATE payload into a PATCH body with a fresh `updated_at`.
fn remote_patch(data: &Value) -> SyncResult<Map<String, Value>> {
    let object = data
        .as_object()
        .ok_or_else(|| ProtocolError::invalid_payload("UPDATE payload must be an object"))?;

    let mut body: Map<String, Value> = object
        .iter()
        .filter_map(|(key, value)| remote_field(key).map(|name| (name.to_string(), value.clone())))
        .collect();
    body.insert(
        "updated_at".to_string(),
        Value::String(format_timestamp(Utc::now())),
    );
    Ok(body)
}
