//! HTTP request handlers for the ingest service.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use logpipe_events::{LogEvent, ResourceType};
use logpipe_storage::Page;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{IngestError, IngestResult};
use crate::state::IngestState;

/// Header carrying the ingestion API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// SSE event name for stored events.
pub const STREAM_EVENT_NAME: &str = "log";

/// Body of `POST /ingest`.
///
/// Elements are kept as raw JSON so one malformed event cannot reject the
/// whole batch.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    /// Events to store.
    pub events: Vec<serde_json::Value>,
}

/// Response of `POST /ingest`.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestResponse {
    /// Events stored.
    pub accepted: usize,
    /// Elements that were not valid events.
    pub rejected: usize,
}

/// Query parameters for `GET /query`.
#[derive(Debug, Deserialize)]
pub struct LogQuery {
    /// Restrict to events about this kind of resource.
    pub resource_type: Option<String>,
    /// Resource to read.
    pub resource_id: Option<String>,
    /// Page size.
    pub limit: Option<usize>,
    /// Events to skip.
    pub offset: Option<usize>,
}

/// Query parameters for `GET /stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Restrict to events about this kind of resource.
    pub resource_type: Option<String>,
    /// Restrict to events about this resource.
    pub resource_id: Option<String>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status message.
    pub status: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
}

/// Handle POST /ingest - store a batch of events.
pub async fn ingest(
    State(state): State<Arc<IngestState>>,
    headers: HeaderMap,
    body: Result<Json<IngestRequest>, JsonRejection>,
) -> IngestResult<Json<IngestResponse>> {
    let presented = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    state.authorize(presented)?;

    let Json(request) = body.map_err(|e| IngestError::InvalidRequest(e.body_text()))?;

    let received = request.events.len();
    let (events, rejected) = parse_events(request.events);
    let accepted = state.store_batch(events).await?;

    if rejected > 0 {
        warn!(received, accepted, rejected, "batch contained invalid events");
    } else {
        debug!(received, accepted, "batch ingested");
    }

    Ok(Json(IngestResponse { accepted, rejected }))
}

/// Splits raw elements into valid events and a count of rejects.
fn parse_events(raw: Vec<serde_json::Value>) -> (Vec<LogEvent>, usize) {
    let mut events = Vec::with_capacity(raw.len());
    let mut rejected = 0;
    for value in raw {
        let parsed = serde_json::from_value::<LogEvent>(value)
            .map_err(|e| e.to_string())
            .and_then(|event| event.validate().map(|()| event).map_err(|e| e.to_string()));
        match parsed {
            Ok(event) => events.push(event),
            Err(reason) => {
                debug!(%reason, "rejecting event");
                rejected += 1;
            }
        }
    }
    (events, rejected)
}

/// Handle GET /query - one page of a resource's events, newest first.
pub async fn query(
    State(state): State<Arc<IngestState>>,
    Query(query): Query<LogQuery>,
) -> IngestResult<Json<Page>> {
    let resource_id = query
        .resource_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| IngestError::InvalidRequest("resource_id is required".to_string()))?;
    let resource_type = parse_resource_type(query.resource_type.as_deref())?;
    if query.limit == Some(0) {
        return Err(IngestError::InvalidRequest(
            "limit must be greater than 0".to_string(),
        ));
    }
    let limit = state.config().query.resolve_limit(query.limit);
    let offset = query.offset.unwrap_or(0);

    let archive = state.archive();
    let page = tokio::task::spawn_blocking(move || {
        archive.query_page(&resource_id, resource_type, limit, offset)
    })
    .await??;

    Ok(Json(page))
}

/// Handle GET /stream - SSE of newly stored events.
///
/// Subscribers that fall behind skip the events they missed.
pub async fn stream(
    State(state): State<Arc<IngestState>>,
    Query(query): Query<StreamQuery>,
) -> IngestResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let resource_type = parse_resource_type(query.resource_type.as_deref())?;
    let resource_id = query
        .resource_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .map(|id| {
            Uuid::parse_str(id)
                .map_err(|_| IngestError::InvalidRequest(format!("invalid resource_id: {id}")))
        })
        .transpose()?;

    info!(?resource_type, ?resource_id, "stream subscriber connected");
    let rx = state.subscribe();

    let events = BroadcastStream::new(rx).filter_map(move |received| match received {
        Ok(event) => {
            let wanted = resource_type.is_none_or(|t| event.resource_type == t)
                && resource_id.is_none_or(|id| event.resource_id == id);
            if !wanted {
                return None;
            }
            match event.to_json_line() {
                Ok(data) => Some(Ok(Event::default().event(STREAM_EVENT_NAME).data(data))),
                Err(e) => {
                    warn!(id = %event.id, error = %e, "failed to encode streamed event");
                    None
                }
            }
        }
        Err(lagged) => {
            warn!(error = %lagged, "stream subscriber lagged");
            None
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Handle GET /health - health check endpoint.
pub async fn health_check(State(state): State<Arc<IngestState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_secs: state.uptime_secs(),
    })
}

fn parse_resource_type(raw: Option<&str>) -> IngestResult<Option<ResourceType>> {
    raw.filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<ResourceType>()
                .map_err(|_| IngestError::InvalidRequest(format!("invalid resource_type: {s}")))
        })
        .transpose()
}
