//! RAG query handlers
//!
//! Author: hephaex@gmail.com

use crate::error::{limit_message, AppError};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::future;
use futures::stream::{self, Stream, StreamExt};
use hrag_core::{Namespace, QuotaKind};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

/// Query request body
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    /// Owner of the reports to search
    #[schema(example = "user-42")]
    pub user_id: String,

    /// User's question
    #[schema(example = "Is my LDL cholesterol within the normal range?")]
    pub query: String,
}

/// Query response body
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    /// The question as asked
    pub query: String,

    /// Generated answer
    #[schema(example = "Your LDL cholesterol is 162 mg/dL, above the reference range.")]
    pub message: String,

    #[schema(example = 200)]
    pub status_code: u16,

    /// Reports the answer was drawn from
    pub sources: Vec<String>,

    /// Processing time in milliseconds
    #[schema(example = 1250)]
    pub processing_time_ms: u64,
}

/// Validate the request and draw one query from the daily allowance
async fn admit(state: &AppState, req: &QueryRequest) -> Result<Namespace, AppError> {
    if req.query.trim().is_empty() {
        return Err(AppError::BadRequest("Query cannot be empty".to_string()));
    }
    let namespace = Namespace::parse(&req.user_id)?;

    let decision = state.quota.check(&namespace, QuotaKind::Query).await?;
    decision
        .into_result()
        .map_err(|denied| AppError::TooManyRequests(limit_message(&denied)))?;

    Ok(namespace)
}

/// Answer a question from the user's own reports
#[utoipa::path(
    post,
    path = "/query",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Query successful", body = QueryResponse),
        (status = 400, description = "Empty query or invalid user id", body = crate::error::ApiError),
        (status = 404, description = "User has no indexed reports", body = crate::error::ApiError),
        (status = 429, description = "Daily query limit reached", body = crate::error::ApiError),
        (status = 502, description = "Backend failure", body = crate::error::ApiError)
    )
)]
pub async fn query_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<(StatusCode, Json<QueryResponse>), AppError> {
    let namespace = admit(&state, &req).await?;

    tracing::info!(user = %namespace, "Received query");
    let answer = state.agent.answer(&namespace, &req.query).await?;
    if let Err(e) = state
        .history
        .record(&namespace, &answer.sources, &req.query, &answer.answer)
        .await
    {
        tracing::warn!(user = %namespace, "Failed to record query history: {e}");
    }

    Ok((
        StatusCode::OK,
        Json(QueryResponse {
            query: req.query,
            message: answer.answer,
            status_code: 200,
            sources: answer.sources,
            processing_time_ms: answer.processing_time_ms,
        }),
    ))
}

/// Stream the answer as server-sent events.
///
/// Events: one `sources` event (JSON array), `message` events with answer
/// fragments, then `done`; a failure mid-stream ends with an `error` event.
/// Only a completed answer is added to the history.
#[utoipa::path(
    post,
    path = "/query/stream",
    tag = "query",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "Streaming response started", content_type = "text/event-stream"),
        (status = 400, description = "Invalid request", body = crate::error::ApiError),
        (status = 404, description = "User has no indexed reports", body = crate::error::ApiError),
        (status = 429, description = "Daily query limit reached", body = crate::error::ApiError)
    )
)]
pub async fn query_stream_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<QueryRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let namespace = admit(&state, &req).await?;
    let answer = state.agent.answer_stream(&namespace, &req.query).await?;

    let sources = Event::default()
        .event("sources")
        .data(serde_json::to_string(&answer.sources).unwrap_or_else(|_| "[]".to_string()));

    let user = namespace.clone();
    let history = state.history.clone();
    let cited = answer.sources.clone();
    let question = req.query;
    let body = answer
        .stream
        .map(Some)
        .chain(stream::once(async { None }))
        .enumerate()
        .scan((false, String::new()), move |(finished, full), (i, item)| {
            if *finished {
                return future::ready(None);
            }
            let event = match item {
                Some(Ok(text)) => {
                    full.push_str(&text);
                    Event::default().event("message").id(i.to_string()).data(text)
                }
                Some(Err(e)) => {
                    tracing::error!(user = %user, "Answer stream failed: {e}");
                    *finished = true;
                    Event::default().event("error").data(e.to_string())
                }
                None => {
                    *finished = true;
                    let (history, user, cited, question) =
                        (history.clone(), user.clone(), cited.clone(), question.clone());
                    let answer = std::mem::take(full);
                    tokio::spawn(async move {
                        if let Err(e) = history.record(&user, &cited, &question, &answer).await {
                            tracing::warn!(user = %user, "Failed to record query history: {e}");
                        }
                    });
                    Event::default().event("done").data("[DONE]")
                }
            };
            future::ready(Some(event))
        });

    let events = stream::once(future::ready(sources))
        .chain(body)
        .map(Ok::<_, Infallible>);

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    ))
}
