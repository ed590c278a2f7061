//! Local mock provider host.
//!
//! An axum server bound to a loopback address that answers every request by
//! matching it against the interactions registered for the current scenario.
//! Requests that match nothing get a `500` with the mismatches in the body and
//! are kept for verification.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ContractError;
use crate::interaction::{GeneratedResponse, Interaction, InteractionSummary, RecordedRequest};
use crate::matchers::{Mismatch, MismatchKind};

/// Why a registered interaction did not accept a request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateMismatch {
    #[serde(flatten)]
    pub interaction: InteractionSummary,
    pub mismatches: Vec<Mismatch>,
}

/// A request no registered interaction accepted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedRequest {
    pub request: RecordedRequest,
    /// Closest candidates: those on the same path when any exist, otherwise all of them.
    pub candidates: Vec<CandidateMismatch>,
}

impl fmt::Display for UnmatchedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unmatched request {}", self.request)?;
        if self.candidates.is_empty() {
            return write!(f, " (no interactions registered)");
        }
        for candidate in &self.candidates {
            write!(f, "\n    vs {}:", candidate.interaction)?;
            for mismatch in &candidate.mismatches {
                write!(f, "\n      - {mismatch}")?;
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
pub(crate) struct ActiveInteraction {
    pub(crate) interaction: Interaction,
    pub(crate) hits: usize,
}

/// Everything observed since the scenario started.
#[derive(Debug, Default)]
pub(crate) struct ScenarioRecord {
    pub(crate) interactions: Vec<ActiveInteraction>,
    pub(crate) unmatched: Vec<UnmatchedRequest>,
}

impl ScenarioRecord {
    pub(crate) fn is_empty(&self) -> bool {
        self.interactions.is_empty() && self.unmatched.is_empty()
    }

    /// Pick the interaction for `request`; the first matching one not yet
    /// exercised wins, then the first matching one.
    fn replay(&mut self, request: RecordedRequest) -> Result<GeneratedResponse, UnmatchedRequest> {
        let mut matched = Vec::new();
        let mut candidates = Vec::new();
        for (index, active) in self.interactions.iter().enumerate() {
            let mismatches = active.interaction.request.compare(&request);
            if mismatches.is_empty() {
                matched.push(index);
            } else {
                candidates.push(CandidateMismatch {
                    interaction: active.interaction.summary(),
                    mismatches,
                });
            }
        }

        let chosen = matched
            .iter()
            .copied()
            .find(|&index| self.interactions[index].hits == 0)
            .or_else(|| matched.first().copied());
        if let Some(index) = chosen {
            let active = &mut self.interactions[index];
            active.hits += 1;
            debug!(interaction = %active.interaction, hits = active.hits, "request matched interaction");
            return Ok(active.interaction.response.generate());
        }

        let same_path: Vec<CandidateMismatch> = candidates
            .iter()
            .filter(|candidate| candidate.mismatches.iter().all(|mismatch| mismatch.kind != MismatchKind::Path))
            .cloned()
            .collect();
        let unmatched = UnmatchedRequest {
            request,
            candidates: if same_path.is_empty() { candidates } else { same_path },
        };
        self.unmatched.push(unmatched.clone());
        Err(unmatched)
    }
}

type SharedRecord = Arc<Mutex<ScenarioRecord>>;

fn lock(record: &Mutex<ScenarioRecord>) -> MutexGuard<'_, ScenarioRecord> {
    record.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runtime handle for a running mock provider.
///
/// Dropping the handle cancels the server; [`MockProvider::stop`] also waits
/// for it to finish.
#[derive(Debug)]
pub struct MockProvider {
    bind_address: SocketAddr,
    record: SharedRecord,
    cancellation_token: CancellationToken,
    server_handle: Option<JoinHandle<()>>,
}

impl MockProvider {
    /// Bind `bind_address` and start serving. The server is listening when this returns.
    pub async fn start(bind_address: SocketAddr) -> Result<Self, ContractError> {
        let record = SharedRecord::default();
        let router = Router::new().fallback(replay).with_state(Arc::clone(&record));

        let listener = tokio::net::TcpListener::bind(bind_address)
            .await
            .map_err(|error| ContractError::server(format!("failed to bind {bind_address}: {error}")))?;
        let bound_address = listener
            .local_addr()
            .map_err(|error| ContractError::server(format!("failed to read bound address: {error}")))?;

        let cancellation_token = CancellationToken::new();
        let server_handle = tokio::spawn({
            let shutdown = cancellation_token.child_token();
            async move {
                let served = axum::serve(listener, router)
                    .with_graceful_shutdown(async move {
                        shutdown.cancelled().await;
                    })
                    .await;
                if let Err(error) = served {
                    warn!(%error, "mock provider stopped with an error");
                }
            }
        });
        info!(address = %bound_address, "mock provider listening");

        Ok(Self {
            bind_address: bound_address,
            record,
            cancellation_token,
            server_handle: Some(server_handle),
        })
    }

    pub fn bound_address(&self) -> SocketAddr {
        self.bind_address
    }

    /// Base URL clients should point at, e.g. `http://127.0.0.1:53211`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.bind_address)
    }

    /// Make `interaction` available to incoming requests.
    ///
    /// An interaction with the same description and provider state may only be
    /// registered once per scenario.
    pub fn register(&self, interaction: Interaction) -> Result<(), ContractError> {
        let mut record = lock(&self.record);
        if record.interactions.iter().any(|active| active.interaction.same_identity(&interaction)) {
            return Err(ContractError::duplicate_interaction(
                interaction.description,
                interaction.provider_state.unwrap_or_default(),
            ));
        }
        debug!(interaction = %interaction, "registered interaction");
        record.interactions.push(ActiveInteraction { interaction, hits: 0 });
        Ok(())
    }

    /// Remove and return everything recorded so far, leaving the provider empty.
    pub(crate) fn take_record(&self) -> ScenarioRecord {
        std::mem::take(&mut *lock(&self.record))
    }

    /// Stop the server and wait for it to finish.
    pub async fn stop(mut self) -> Result<(), ContractError> {
        self.cancellation_token.cancel();
        if let Some(server_handle) = self.server_handle.take() {
            server_handle
                .await
                .map_err(|error| ContractError::server(format!("mock provider task failed: {error}")))?;
        }
        info!(address = %self.bind_address, "mock provider stopped");
        Ok(())
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

async fn replay(State(record): State<SharedRecord>, method: Method, uri: Uri, headers: HeaderMap, body: Bytes) -> Response {
    let request = record_request(&method, &uri, &headers, &body);
    debug!(request = %request, "mock provider received request");

    let outcome = lock(&record).replay(request);
    match outcome {
        Ok(response) => into_http_response(response),
        Err(unmatched) => {
            warn!(request = %unmatched.request, candidates = unmatched.candidates.len(), "no interaction matched request");
            let body = json!({
                "message": format!("No interaction found for {}", unmatched.request),
                "mismatches": unmatched.candidates,
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response()
        }
    }
}

fn record_request(method: &Method, uri: &Uri, headers: &HeaderMap, body: &Bytes) -> RecordedRequest {
    let path = percent_decode_str(uri.path()).decode_utf8_lossy();
    let mut request = RecordedRequest::new(method.as_str(), path);
    if let Some(query) = uri.query() {
        request = request.with_query_string(query);
    }
    for (name, value) in headers {
        request = request.with_header(name.as_str(), String::from_utf8_lossy(value.as_bytes()));
    }
    if !body.is_empty() {
        request = request.with_body(String::from_utf8_lossy(body));
    }
    request
}

fn into_http_response(response: GeneratedResponse) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    let body = match response.body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };
    builder
        .body(body)
        .unwrap_or_else(|error| (StatusCode::INTERNAL_SERVER_ERROR, error.to_string()).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{RequestSpec, ResponseSpec};
    use crate::matchers::like;
    use serde_json::Value;

    fn loopback() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 0))
    }

    fn product_interaction(state: &str, id: &str, status: u16) -> Interaction {
        let response = if status == 200 {
            ResponseSpec::new(200).with_body(like(json!({"id": id, "type": "CREDIT_CARD", "name": "28 Degrees"})))
        } else {
            ResponseSpec::new(status)
        };
        Interaction::new("a request to get a product")
            .given(state)
            .with_request(RequestSpec::get(format!("/product/{id}")))
            .will_respond_with(response)
    }

    #[tokio::test]
    async fn replays_registered_interaction() {
        let provider = MockProvider::start(loopback()).await.unwrap();
        provider.register(product_interaction("a product with ID 10 exists", "10", 200)).unwrap();

        let response = reqwest::get(format!("{}/product/10", provider.base_url())).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.headers()["content-type"], "application/json");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["name"], "28 Degrees");

        let record = provider.take_record();
        assert_eq!(record.interactions[0].hits, 1);
        assert!(record.unmatched.is_empty());
        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn encoded_path_matches_decoded_interaction_path() {
        let provider = MockProvider::start(loopback()).await.unwrap();
        provider.register(product_interaction("a spaced product exists", "a b", 200)).unwrap();

        let response = reqwest::get(format!("{}/product/a%20b", provider.base_url())).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let record = provider.take_record();
        assert_eq!(record.interactions[0].hits, 1);
        assert!(record.unmatched.is_empty());
        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unmatched_request_gets_500_and_is_recorded() {
        let provider = MockProvider::start(loopback()).await.unwrap();
        provider.register(product_interaction("a product with ID 10 exists", "10", 200)).unwrap();

        let response = reqwest::get(format!("{}/product/12", provider.base_url())).await.unwrap();
        assert_eq!(response.status().as_u16(), 500);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["message"], "No interaction found for GET /product/12");
        assert_eq!(body["mismatches"][0]["mismatches"][0]["kind"], "path");

        let record = provider.take_record();
        assert_eq!(record.unmatched.len(), 1);
        assert_eq!(record.interactions[0].hits, 0);
        assert!(provider.take_record().is_empty());
        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn same_path_interactions_are_used_in_turn() {
        let provider = MockProvider::start(loopback()).await.unwrap();
        provider.register(product_interaction("a product with ID 10 exists", "10", 200)).unwrap();
        provider.register(product_interaction("a product with ID 10 was removed", "10", 404)).unwrap();

        let url = format!("{}/product/10", provider.base_url());
        assert_eq!(reqwest::get(&url).await.unwrap().status().as_u16(), 200);
        assert_eq!(reqwest::get(&url).await.unwrap().status().as_u16(), 404);

        let record = provider.take_record();
        assert!(record.interactions.iter().all(|active| active.hits == 1));
        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let provider = MockProvider::start(loopback()).await.unwrap();
        provider.register(product_interaction("a product with ID 10 exists", "10", 200)).unwrap();
        let error = provider
            .register(product_interaction("a product with ID 10 exists", "10", 200))
            .unwrap_err();
        assert!(matches!(error, ContractError::DuplicateInteraction { .. }));
        provider.stop().await.unwrap();
    }

    #[tokio::test]
    async fn dropping_the_handle_releases_the_port() {
        let provider = MockProvider::start(loopback()).await.unwrap();
        let address = provider.bound_address();
        drop(provider);

        let mut rebound = None;
        for _ in 0..50 {
            match tokio::net::TcpListener::bind(address).await {
                Ok(listener) => {
                    rebound = Some(listener);
                    break;
                }
                Err(_) => tokio::time::sleep(std::time::Duration::from_millis(20)).await,
            }
        }
        assert!(rebound.is_some(), "port {address} was not released");
    }
}
