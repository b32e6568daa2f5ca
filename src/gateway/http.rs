//! HTTP transport for the gateway. Maps HTTP requests to gateway operations.
//!
//! Requires the `http` feature. Uses axum for routing.
//!
//! ## Routes
//!
//! | Method | Path | Parameters |
//! |---|---|---|
//! | POST | `/createTopic` | `topicName` |
//! | POST | `/createSubscription` | `topicName`, `subscriptionName` |
//! | GET | `/postMessage` | `topicName`, `message`, `count` |
//! | GET | `/pull` | `subscription1` |
//! | GET | `/multipull` | `subscription1`, `subscription2` |
//! | GET | `/subscribe` | `subscription` |
//! | POST | `/deleteTopic` | `topic` |
//! | POST | `/deleteSubscription` | `subscription` |
//! | GET | `/health` | none |
//!
//! Parameters come from the query string and, on POST, from a urlencoded
//! form body. The two sources are merged; when both carry a parameter the
//! query string wins. Every response except `/health` is plain text.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use pubsub_gateway::broker::InMemoryBroker;
//! use pubsub_gateway::gateway::{self, Gateway};
//!
//! let gateway = Arc::new(Gateway::from_broker(InMemoryBroker::new()));
//!
//! // Get the router to compose with other axum routes
//! let app = gateway::router(gateway.clone());
//!
//! // Or serve directly
//! gateway::serve(gateway, "0.0.0.0:8080".parse()?, std::future::pending()).await?;
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::error::GatewayError;
use super::service::Gateway;

/// Build an axum `Router` that dispatches requests to the given gateway.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/createTopic", post(create_topic))
        .route("/createSubscription", post(create_subscription))
        .route("/postMessage", get(post_message))
        .route("/pull", get(pull))
        .route("/multipull", get(multipull))
        .route("/subscribe", get(subscribe))
        .route("/deleteTopic", post(delete_topic))
        .route("/deleteSubscription", post(delete_subscription))
        .with_state(gateway)
}

/// Serve the gateway over HTTP until `shutdown` resolves.
pub async fn serve<F>(gateway: Arc<Gateway>, addr: SocketAddr, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(gateway);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Request parameters read from the query string merged with a form body on POST.
pub struct Params<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for Params<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let query = req.uri().query().unwrap_or_default().to_string();
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with(FORM_CONTENT_TYPE));

        let body = if req.method() == Method::POST && is_form {
            let bytes = Bytes::from_request(req, state)
                .await
                .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
            String::from_utf8(bytes.to_vec())
                .map_err(|_| GatewayError::BadRequest("form body is not valid UTF-8".into()))?
        } else {
            String::new()
        };

        let uri: Uri = format!("/?{}", merge_params(&query, &body))
            .parse()
            .map_err(|_| GatewayError::BadRequest("malformed form body".into()))?;
        let Query(value) = Query::<T>::try_from_uri(&uri)
            .map_err(|e| GatewayError::BadRequest(e.body_text()))?;
        Ok(Params(value))
    }
}

/// Join two urlencoded parameter lists, keeping the first value of each key.
fn merge_params(query: &str, body: &str) -> String {
    let mut seen = HashSet::new();
    query
        .split('&')
        .chain(body.split('&'))
        .filter(|pair| !pair.is_empty())
        .filter(|pair| seen.insert(pair.split('=').next().unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("&")
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTopicParams {
    topic_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubscriptionParams {
    topic_name: String,
    subscription_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishParams {
    topic_name: String,
    message: String,
    count: i32,
}

#[derive(Deserialize)]
struct PullParams {
    subscription1: String,
}

#[derive(Deserialize)]
struct MultiPullParams {
    subscription1: String,
    subscription2: String,
}

#[derive(Deserialize)]
struct SubscriptionParams {
    subscription: String,
}

#[derive(Deserialize)]
struct TopicParams {
    topic: String,
}

/// `GET /health` returns `{ "ok": true, "active_subscribers": n }`.
async fn health_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(json!({ "ok": true, "active_subscribers": gateway.active_subscribers() }))
}

async fn create_topic(
    State(gateway): State<Arc<Gateway>>,
    Params(params): Params<CreateTopicParams>,
) -> Result<&'static str, GatewayError> {
    gateway.create_topic(&params.topic_name).await
}

async fn create_subscription(
    State(gateway): State<Arc<Gateway>>,
    Params(params): Params<CreateSubscriptionParams>,
) -> Result<&'static str, GatewayError> {
    gateway
        .create_subscription(&params.topic_name, &params.subscription_name)
        .await
}

async fn post_message(
    State(gateway): State<Arc<Gateway>>,
    Params(params): Params<PublishParams>,
) -> &'static str {
    gateway.publish(&params.topic_name, &params.message, params.count)
}

async fn pull(
    State(gateway): State<Arc<Gateway>>,
    Params(params): Params<PullParams>,
) -> Result<String, GatewayError> {
    Ok(gateway.pull(&params.subscription1).await?.to_string())
}

async fn multipull(
    State(gateway): State<Arc<Gateway>>,
    Params(params): Params<MultiPullParams>,
) -> Result<String, GatewayError> {
    Ok(gateway
        .multipull(&params.subscription1, &params.subscription2)
        .await?
        .to_string())
}

async fn subscribe(
    State(gateway): State<Arc<Gateway>>,
    Params(params): Params<SubscriptionParams>,
) -> Result<&'static str, GatewayError> {
    gateway.subscribe(&params.subscription)
}

async fn delete_topic(
    State(gateway): State<Arc<Gateway>>,
    Params(params): Params<TopicParams>,
) -> Result<&'static str, GatewayError> {
    gateway.delete_topic(&params.topic).await
}

async fn delete_subscription(
    State(gateway): State<Arc<Gateway>>,
    Params(params): Params<SubscriptionParams>,
) -> Result<&'static str, GatewayError> {
    gateway.delete_subscription(&params.subscription).await
}
