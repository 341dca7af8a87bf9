//! Axum handlers for the hub API: node CRUD, pub/sub, event history,
//! queues and maintenance.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{header::AUTHORIZATION, HeaderMap, Method, StatusCode};
use axum::middleware::{from_fn, from_fn_with_state, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use pipehub_core::{
    DeliveryEngine, EventLog, EventPublisher, Filter, HubError, ListQueues, Node, NodeDraft,
    NodePatch, NodeService, Principal, SqliteStore, SubscriptionId, SubscriptionRegistry,
    SubscriptionStats, TransientBus, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, NODE_CHANNEL,
};

use crate::api_errors::ApiError;
use crate::api_models::{
    CloudEvent, EventsParams, NodesResponse, PublishRequest, PublishResponse, PurgeParams,
    PurgeResponse, PushResponse, SubscribeParams, SubscribeResponse, UnsubscribeResponse,
    UpdateParams,
};
use crate::config::{ApiTokenEntry, HubSettings};

/// Group label granting administrative calls.
const ADMIN_GROUP: &str = "admin";

/// Default age cutoff for the node purge endpoint, in days.
const DEFAULT_PURGE_AGE_DAYS: i64 = 180;

/// Static bearer/API-key token registry standing in for the external auth
/// collaborator. Tokens are compared by sha256 hash.
#[derive(Clone, Default)]
pub struct AuthConfig {
    tokens: HashMap<String, Principal>,
}

impl AuthConfig {
    pub fn from_entries(entries: &[ApiTokenEntry]) -> Self {
        let mut auth = Self::default();
        for entry in entries {
            let admin = entry.groups.iter().any(|g| g == ADMIN_GROUP);
            auth = auth.with_token(
                &entry.token,
                Principal::new(&entry.username)
                    .with_groups(entry.groups.clone())
                    .with_admin(admin),
            );
        }
        auth
    }

    pub fn with_token(mut self, token: &str, principal: Principal) -> Self {
        self.tokens.insert(Self::secret_hash(token), principal);
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.tokens.is_empty()
    }

    fn secret_hash(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn resolve(&self, headers: &HeaderMap) -> Option<Principal> {
        let token = headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .or_else(|| headers.get("x-api-key").and_then(|v| v.to_str().ok()))?;
        self.tokens.get(&Self::secret_hash(token.trim())).cloned()
    }
}

/// The lifecycle-managed handle holding every shared hub component,
/// constructed once at startup and cloned into handlers.
#[derive(Clone)]
pub struct HubState {
    pub settings: Arc<HubSettings>,
    pub auth: Arc<AuthConfig>,
    pub store: SqliteStore,
    pub nodes: NodeService,
    pub registry: Arc<SubscriptionRegistry>,
    pub delivery: Arc<DeliveryEngine>,
    pub publisher: EventPublisher,
    pub bus: Arc<TransientBus>,
    pub queues: Arc<ListQueues>,
}

impl HubState {
    pub fn new(settings: HubSettings) -> Result<Self, HubError> {
        let store = SqliteStore::open(&settings.store_url, settings.event_ttl_seconds)?;
        let log: Arc<dyn EventLog> = Arc::new(store.clone());
        let bus = Arc::new(TransientBus::new());
        let registry = Arc::new(SubscriptionRegistry::new(
            Arc::new(store.clone()),
            Arc::clone(&log),
        ));
        let publisher = EventPublisher::new(Arc::clone(&log), Arc::clone(&bus));
        let delivery = Arc::new(DeliveryEngine::new(
            Arc::clone(&log),
            Arc::clone(&bus),
            Arc::clone(&registry),
        ));
        let nodes = NodeService::new(store.clone(), publisher.clone());
        let auth = Arc::new(AuthConfig::from_entries(&settings.api_tokens));
        Ok(Self {
            settings: Arc::new(settings),
            auth,
            store,
            nodes,
            registry,
            delivery,
            publisher,
            bus,
            queues: Arc::new(ListQueues::new()),
        })
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = Arc::new(auth);
        self
    }

    fn wait_budget(&self) -> Duration {
        Duration::from_secs(self.settings.listen_wait_budget_seconds)
    }
}

pub fn build_router(state: HubState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/node", post(create_node))
        .route("/node/:id", get(get_node).put(update_node))
        .route("/nodes", get(query_nodes))
        .route("/count", get(count_nodes))
        .route("/subscribe/:channel", post(subscribe))
        .route("/unsubscribe/:id", post(unsubscribe))
        .route("/listen/:id", get(listen))
        .route("/publish/:channel", post(publish))
        .route("/events", get(events))
        .route("/stats/subscriptions", get(subscription_stats))
        .route("/push/:list", post(push))
        .route("/pop/:list", get(pop))
        .route("/purge/nodes", post(purge_nodes))
        .layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn(request_log_middleware))
        .with_state(state)
}

fn request_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Reads are open; everything that mutates or holds per-user state needs a
/// principal.
fn requires_auth(method: &Method, path: &str) -> bool {
    if *method != Method::GET {
        return true;
    }
    !(path == "/"
        || path == "/nodes"
        || path == "/count"
        || path == "/events"
        || path.starts_with("/node/"))
}

async fn auth_middleware(
    State(state): State<HubState>,
    headers: HeaderMap,
    mut request: axum::extract::Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let principal = if state.auth.is_enabled() {
        match state.auth.resolve(&headers) {
            Some(principal) => principal,
            None => {
                if requires_auth(&method, &path) {
                    let rid = request_id(&headers);
                    return ApiError::unauthorized("missing or invalid credentials")
                        .with_request_id(rid)
                        .into_response();
                }
                Principal::new("anonymous")
            }
        }
    } else {
        // No tokens configured: open instance, callers act as one
        // all-powerful principal.
        Principal::new("anonymous").with_admin(true)
    };

    request.extensions_mut().insert(principal);
    next.run(request).await
}

async fn request_log_middleware(
    headers: HeaderMap,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let rid = request_id(&headers);
    log::info!(
        "hub_api_request request_id={} method={} path={}",
        rid,
        request.method(),
        request.uri().path()
    );
    next.run(request).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "pipehub API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ----------------------------------------------------------------------
// nodes

async fn create_node(
    State(state): State<HubState>,
    Extension(principal): Extension<Principal>,
    Json(draft): Json<NodeDraft>,
) -> Result<Json<Node>, ApiError> {
    let node = state.nodes.create(draft, &principal)?;
    Ok(Json(node))
}

async fn get_node(
    State(state): State<HubState>,
    Path(id): Path<String>,
) -> Result<Json<Node>, ApiError> {
    Ok(Json(state.nodes.get(&id)?))
}

async fn update_node(
    State(state): State<HubState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    Query(params): Query<UpdateParams>,
    Json(patch): Json<NodePatch>,
) -> Result<Json<Node>, ApiError> {
    let node = state.nodes.update(&id, patch, params.updated, &principal)?;
    Ok(Json(node))
}

/// Splits `limit`/`offset` off the raw query pairs, leaving filter terms.
fn split_paging(
    pairs: &[(String, String)],
) -> Result<(Vec<(&str, &str)>, Option<usize>, usize), ApiError> {
    let mut limit = None;
    let mut offset = 0;
    let mut terms = Vec::new();
    for (key, value) in pairs {
        match key.as_str() {
            "limit" => {
                limit = Some(value.parse().map_err(|_| {
                    ApiError::bad_request(format!("invalid limit '{value}'"))
                })?)
            }
            "offset" => {
                offset = value.parse().map_err(|_| {
                    ApiError::bad_request(format!("invalid offset '{value}'"))
                })?
            }
            _ => terms.push((key.as_str(), value.as_str())),
        }
    }
    Ok((terms, limit, offset))
}

async fn query_nodes(
    State(state): State<HubState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<NodesResponse>, ApiError> {
    let (terms, limit, offset) = split_paging(&pairs)?;
    let filter = Filter::parse(terms)?;
    let effective_limit = limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    let (items, total) = state.nodes.query(&filter, limit, offset)?;
    Ok(Json(NodesResponse {
        items,
        total,
        limit: effective_limit,
        offset,
    }))
}

async fn count_nodes(
    State(state): State<HubState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<u64>, ApiError> {
    let (terms, _, _) = split_paging(&pairs)?;
    let filter = Filter::parse(terms)?;
    Ok(Json(state.nodes.count(&filter)?))
}

// ----------------------------------------------------------------------
// pub/sub

async fn subscribe(
    State(state): State<HubState>,
    Extension(principal): Extension<Principal>,
    Path(channel): Path<String>,
    Query(params): Query<SubscribeParams>,
) -> Result<Json<SubscribeResponse>, ApiError> {
    let sub = state.registry.subscribe(
        &channel,
        &principal.username,
        params.promisc.unwrap_or(false),
        params.subscriber_id.as_deref(),
    )?;
    Ok(Json(SubscribeResponse {
        subscription_id: sub.id,
        channel: sub.channel,
        user: sub.user,
        promiscuous: sub.promiscuous,
        subscriber_id: sub.subscriber_id,
    }))
}

async fn unsubscribe(
    State(state): State<HubState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<SubscriptionId>,
) -> Result<Json<UnsubscribeResponse>, ApiError> {
    state.registry.unsubscribe(id, &principal.username)?;
    Ok(Json(UnsubscribeResponse {
        subscription_id: id,
    }))
}

async fn listen(
    State(state): State<HubState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<SubscriptionId>,
) -> Result<Response, ApiError> {
    let record = state
        .delivery
        .listen(id, &principal.username, &principal.groups, state.wait_budget())
        .await?;
    Ok(match record {
        Some(record) => Json(CloudEvent::from_record(
            &record,
            &state.settings.cloud_events_source,
        ))
        .into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

async fn publish(
    State(state): State<HubState>,
    Extension(principal): Extension<Principal>,
    Path(channel): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PublishResponse>, ApiError> {
    let record = state
        .publisher
        .publish(&channel, Some(&principal.username), &request.data)?;
    Ok(Json(PublishResponse {
        channel,
        sequence_id: record.sequence_id,
    }))
}

async fn subscription_stats(
    State(state): State<HubState>,
) -> Result<Json<Vec<SubscriptionStats>>, ApiError> {
    Ok(Json(state.registry.stats()?))
}

// ----------------------------------------------------------------------
// event history

async fn events(
    State(state): State<HubState>,
    Query(params): Query<EventsParams>,
) -> Result<Json<Vec<CloudEvent>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    if limit > MAX_QUERY_LIMIT {
        return Err(ApiError::too_large(format!(
            "limit {limit} exceeds {MAX_QUERY_LIMIT}"
        )));
    }
    let channel = params.channel.as_deref().unwrap_or(NODE_CHANNEL);

    let id_set = id_filter(&state, &params)?;
    let records = state
        .store
        .read_forward(channel, params.from.unwrap_or(0), limit)?;
    let source = state.settings.cloud_events_source.as_str();
    let events = records
        .iter()
        .filter(|record| {
            field_matches(&record.data, "kind", params.kind.as_deref())
                && field_matches(&record.data, "state", params.state.as_deref())
                && field_matches(&record.data, "result", params.result.as_deref())
                && match &id_set {
                    Some(ids) => record
                        .data
                        .get("id")
                        .and_then(Value::as_str)
                        .map(|id| ids.contains(id))
                        .unwrap_or(false),
                    None => true,
                }
        })
        .map(|record| CloudEvent::from_record(record, source))
        .collect();
    Ok(Json(events))
}

fn field_matches(data: &Value, field: &str, expected: Option<&str>) -> bool {
    match expected {
        None => true,
        Some(expected) => data
            .get(field)
            .and_then(Value::as_str)
            .map(|actual| actual == expected)
            .unwrap_or(false),
    }
}

/// Resolves the `id`/`ids`/`recursive` parameters into the set of node ids
/// whose events are wanted. `recursive` widens each id to its subtree.
fn id_filter(state: &HubState, params: &EventsParams) -> Result<Option<HashSet<String>>, ApiError> {
    let mut roots = Vec::new();
    if let Some(id) = &params.id {
        roots.push(id.clone());
    }
    if let Some(ids) = &params.ids {
        roots.extend(
            ids.split(',')
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        );
    }
    if roots.is_empty() {
        return Ok(None);
    }
    let mut set: HashSet<String> = HashSet::new();
    if params.recursive.unwrap_or(false) {
        let mut stack = roots;
        while let Some(id) = stack.pop() {
            if !set.insert(id.clone()) {
                continue;
            }
            for child in state.store.children_of(&id)? {
                stack.push(child.id);
            }
        }
    } else {
        set.extend(roots);
    }
    Ok(Some(set))
}

// ----------------------------------------------------------------------
// list queues

async fn push(
    State(state): State<HubState>,
    Extension(principal): Extension<Principal>,
    Path(list): Path<String>,
    Json(request): Json<PublishRequest>,
) -> Result<Json<PushResponse>, ApiError> {
    let envelope = CloudEvent::for_queue(
        request.data,
        request.event_type.as_deref(),
        &state.settings.cloud_events_source,
        &principal.username,
    );
    let message = serde_json::to_value(envelope)
        .map_err(|e| ApiError::internal(format!("encode queue message: {e}")))?;
    state.queues.push(&list, message).await;
    Ok(Json(PushResponse { list }))
}

async fn pop(
    State(state): State<HubState>,
    Path(list): Path<String>,
) -> Result<Response, ApiError> {
    Ok(match state.queues.pop(&list, state.wait_budget()).await {
        Some(message) => Json(message).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

// ----------------------------------------------------------------------
// maintenance

async fn purge_nodes(
    State(state): State<HubState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<PurgeParams>,
) -> Result<Json<PurgeResponse>, ApiError> {
    if !principal.admin {
        return Err(ApiError::forbidden("node purge needs an admin principal"));
    }
    let age_days = params.age_days.unwrap_or(DEFAULT_PURGE_AGE_DAYS);
    if age_days <= 0 {
        return Err(ApiError::bad_request("age_days must be positive"));
    }
    let purged = state.nodes.purge_older_than(age_days)?;
    log::info!("nodes_purged count={} age_days={}", purged, age_days);
    Ok(Json(PurgeResponse { purged }))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;

    const ALICE: &str = "tok-alice";
    const WORKER: &str = "tok-worker";

    fn test_state() -> HubState {
        let path = std::env::temp_dir().join(format!(
            "pipehub-api-{}.sqlite",
            uuid::Uuid::new_v4()
        ));
        let settings = HubSettings {
            store_url: path.to_string_lossy().to_string(),
            listen_wait_budget_seconds: 1,
            api_tokens: vec![
                ApiTokenEntry {
                    username: "alice".to_string(),
                    token: ALICE.to_string(),
                    groups: vec!["admin".to_string()],
                },
                ApiTokenEntry {
                    username: "worker".to_string(),
                    token: WORKER.to_string(),
                    groups: Vec::new(),
                },
            ],
            ..HubSettings::default()
        };
        HubState::new(settings).expect("hub state")
    }

    async fn call(
        router: &Router,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn root_is_public() {
        let router = build_router(test_state());
        let (status, body) = call(&router, Method::GET, "/", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "pipehub API");
    }

    #[tokio::test]
    async fn node_creation_requires_auth() {
        let router = build_router(test_state());
        let (status, body) = call(
            &router,
            Method::POST,
            "/node",
            None,
            Some(json!({"kind": "checkout", "name": "mainline"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "unauthorized");
    }

    #[tokio::test]
    async fn node_crud_flow() {
        let router = build_router(test_state());
        let (status, created) = call(
            &router,
            Method::POST,
            "/node",
            Some(WORKER),
            Some(json!({
                "kind": "checkout",
                "name": "mainline",
                "data": {"kernel_revision": {"tree": "mainline"}}
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["state"], "running");
        assert_eq!(created["owner"], "worker");
        let id = created["id"].as_str().unwrap().to_string();

        let (status, fetched) = call(&router, Method::GET, &format!("/node/{id}"), None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["path"], json!(["mainline"]));

        let (status, _) = call(&router, Method::GET, "/node/missing", None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, updated) = call(
            &router,
            Method::PUT,
            &format!("/node/{id}"),
            Some(WORKER),
            Some(json!({"state": "available"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["state"], "available");

        // Illegal transition.
        let (status, body) = call(
            &router,
            Method::PUT,
            &format!("/node/{id}"),
            Some(WORKER),
            Some(json!({"state": "running"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "conflict");
    }

    #[tokio::test]
    async fn foreign_principal_cannot_update() {
        let state = test_state();
        let router = build_router(state.clone().with_auth(
            AuthConfig::default()
                .with_token(WORKER, Principal::new("worker"))
                .with_token("tok-mallory", Principal::new("mallory")),
        ));
        let (_, created) = call(
            &router,
            Method::POST,
            "/node",
            Some(WORKER),
            Some(json!({"kind": "checkout", "name": "mainline"})),
        )
        .await;
        let id = created["id"].as_str().unwrap();

        let (status, _) = call(
            &router,
            Method::PUT,
            &format!("/node/{id}"),
            Some("tok-mallory"),
            Some(json!({"state": "done"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn stale_update_token_conflicts() {
        let router = build_router(test_state());
        let (_, created) = call(
            &router,
            Method::POST,
            "/node",
            Some(WORKER),
            Some(json!({"kind": "kbuild", "name": "defconfig"})),
        )
        .await;
        let id = created["id"].as_str().unwrap().to_string();
        let seen = created["updated"].as_str().unwrap().to_string();

        let (status, _) = call(
            &router,
            Method::PUT,
            &format!("/node/{id}?updated={seen}"),
            Some(WORKER),
            Some(json!({"state": "available"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &router,
            Method::PUT,
            &format!("/node/{id}?updated={seen}"),
            Some(WORKER),
            Some(json!({"state": "done"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn nodes_query_operators_and_count() {
        let router = build_router(test_state());
        let mut first_created = String::new();
        for i in 0..3 {
            let (_, node) = call(
                &router,
                Method::POST,
                "/node",
                Some(WORKER),
                Some(json!({"kind": "kbuild", "name": format!("defconfig-{i}")})),
            )
            .await;
            if i == 0 {
                first_created = node["created"].as_str().unwrap().to_string();
            }
            // Keep created timestamps strictly increasing at ms resolution.
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let (status, body) = call(&router, Method::GET, "/nodes?kind=kbuild", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 3);

        let uri = format!("/nodes?kind=kbuild&created__gt={first_created}");
        let (_, body) = call(&router, Method::GET, &uri, None, None).await;
        assert_eq!(body["total"], 2);
        assert_eq!(body["items"].as_array().unwrap().len(), 2);

        let uri = format!("/count?kind=kbuild&created__gt={first_created}");
        let (_, count) = call(&router, Method::GET, &uri, None, None).await;
        assert_eq!(count, json!(2));

        let (status, _) = call(&router, Method::GET, "/nodes?created__within=1h", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&router, Method::GET, "/nodes?limit=5000", None, None).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn subscribe_publish_listen_round_trip() {
        let router = build_router(test_state());
        let (status, sub) = call(
            &router,
            Method::POST,
            "/subscribe/node?promisc=true",
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let sub_id = sub["subscription_id"].as_u64().unwrap();

        let (status, published) = call(
            &router,
            Method::POST,
            "/publish/node",
            Some(WORKER),
            Some(json!({"data": {"op": "created", "id": "n1"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(published["sequence_id"], 1);

        let (status, event) = call(
            &router,
            Method::GET,
            &format!("/listen/{sub_id}"),
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(event["specversion"], "1.0");
        assert_eq!(event["channel"], "node");
        assert_eq!(event["sequence_id"], 1);
        assert_eq!(event["owner"], "worker");
        assert_eq!(event["data"]["op"], "created");
        assert_eq!(event["data"]["id"], "n1");
    }

    #[tokio::test]
    async fn durable_replay_after_reconnect() {
        let router = build_router(test_state());
        let (_, first) = call(
            &router,
            Method::POST,
            "/subscribe/node?subscriber_id=sched1&promisc=true",
            Some(WORKER),
            None,
        )
        .await;
        let first_id = first["subscription_id"].as_u64().unwrap();

        for i in 1..=3 {
            call(
                &router,
                Method::POST,
                "/publish/node",
                Some(WORKER),
                Some(json!({"data": {"op": "created", "i": i}})),
            )
            .await;
        }

        let (_, e1) = call(
            &router,
            Method::GET,
            &format!("/listen/{first_id}"),
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(e1["sequence_id"], 1);

        // The client drops without asking for the next event, then comes
        // back with the same durable identity.
        let (_, second) = call(
            &router,
            Method::POST,
            "/subscribe/node?subscriber_id=sched1&promisc=true",
            Some(WORKER),
            None,
        )
        .await;
        let second_id = second["subscription_id"].as_u64().unwrap();
        assert_ne!(second_id, first_id);

        let (_, replayed) = call(
            &router,
            Method::GET,
            &format!("/listen/{second_id}"),
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(replayed["sequence_id"], 1);

        for expected in [2, 3] {
            let (_, event) = call(
                &router,
                Method::GET,
                &format!("/listen/{second_id}"),
                Some(WORKER),
                None,
            )
            .await;
            assert_eq!(event["sequence_id"], expected);
        }

        let (status, _) = call(
            &router,
            Method::GET,
            &format!("/listen/{second_id}"),
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn listen_is_owner_scoped() {
        let router = build_router(test_state());
        let (_, sub) = call(
            &router,
            Method::POST,
            "/subscribe/node",
            Some(WORKER),
            None,
        )
        .await;
        let sub_id = sub["subscription_id"].as_u64().unwrap();

        let (status, _) = call(
            &router,
            Method::GET,
            &format!("/listen/{sub_id}"),
            Some(ALICE),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(
            &router,
            Method::POST,
            &format!("/unsubscribe/{sub_id}"),
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &router,
            Method::GET,
            &format!("/listen/{sub_id}"),
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn node_mutations_announce_events() {
        let router = build_router(test_state());
        let (_, sub) = call(
            &router,
            Method::POST,
            "/subscribe/node?promisc=true",
            Some(ALICE),
            None,
        )
        .await;
        let sub_id = sub["subscription_id"].as_u64().unwrap();

        let (_, node) = call(
            &router,
            Method::POST,
            "/node",
            Some(WORKER),
            Some(json!({"kind": "checkout", "name": "mainline"})),
        )
        .await;

        let (_, event) = call(
            &router,
            Method::GET,
            &format!("/listen/{sub_id}"),
            Some(ALICE),
            None,
        )
        .await;
        assert_eq!(event["data"]["op"], "created");
        assert_eq!(event["data"]["id"], node["id"]);
        assert_eq!(event["data"]["kind"], "checkout");
    }

    #[tokio::test]
    async fn events_history_filters() {
        let router = build_router(test_state());
        let (_, checkout) = call(
            &router,
            Method::POST,
            "/node",
            Some(WORKER),
            Some(json!({"kind": "checkout", "name": "mainline"})),
        )
        .await;
        let checkout_id = checkout["id"].as_str().unwrap().to_string();
        call(
            &router,
            Method::POST,
            "/node",
            Some(WORKER),
            Some(json!({
                "kind": "kbuild",
                "name": "defconfig",
                "parent": checkout_id,
            })),
        )
        .await;

        let (status, all) = call(&router, Method::GET, "/events", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 2);

        let (_, checkouts) =
            call(&router, Method::GET, "/events?kind=checkout", None, None).await;
        assert_eq!(checkouts.as_array().unwrap().len(), 1);
        assert_eq!(checkouts[0]["data"]["kind"], "checkout");

        let (_, tail) = call(&router, Method::GET, "/events?from=1", None, None).await;
        assert_eq!(tail.as_array().unwrap().len(), 1);
        assert_eq!(tail[0]["sequence_id"], 2);

        let uri = format!("/events?id={checkout_id}&recursive=true");
        let (_, subtree) = call(&router, Method::GET, &uri, None, None).await;
        assert_eq!(subtree.as_array().unwrap().len(), 2);

        let uri = format!("/events?id={checkout_id}");
        let (_, only_root) = call(&router, Method::GET, &uri, None, None).await;
        assert_eq!(only_root.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn push_pop_round_trip() {
        let router = build_router(test_state());
        let (status, pushed) = call(
            &router,
            Method::POST,
            "/push/tarball",
            Some(WORKER),
            Some(json!({"data": {"url": "https://storage/tarball.gz"}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(pushed["list"], "tarball");

        let (status, message) = call(
            &router,
            Method::GET,
            "/pop/tarball",
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(message["data"]["url"], "https://storage/tarball.gz");
        assert_eq!(message["owner"], "worker");
    }

    #[tokio::test]
    async fn subscription_stats_lists_live_subscriptions() {
        let router = build_router(test_state());
        call(&router, Method::POST, "/subscribe/node", Some(WORKER), None).await;
        let (status, stats) = call(
            &router,
            Method::GET,
            "/stats/subscriptions",
            Some(ALICE),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let stats = stats.as_array().unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0]["channel"], "node");
        assert_eq!(stats[0]["user"], "worker");
    }

    #[tokio::test]
    async fn purge_is_admin_only() {
        let router = build_router(test_state());
        let (status, _) = call(
            &router,
            Method::POST,
            "/purge/nodes?age_days=30",
            Some(WORKER),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, purged) = call(
            &router,
            Method::POST,
            "/purge/nodes?age_days=30",
            Some(ALICE),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(purged["purged"], 0);
    }
}
