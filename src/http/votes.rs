//! Vote tallies and the `/api` handlers.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;

/// The only file served from the content directory.
pub const INDEX_FILE: &str = "index.html";

const VOTES_RESOURCE: &str = "votes";

/// A single tally as returned by `GET /api/votes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoteEntry {
    pub key: String,
    pub value: u64,
}

/// In-memory vote tallies.
#[derive(Debug, Default)]
pub struct VoteStore {
    votes: DashMap<String, u64>,
}

impl VoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one vote for `key`, returning the new tally.
    pub fn add(&self, key: &str) -> u64 {
        let mut tally = self.votes.entry(key.to_string()).or_insert(0);
        *tally += 1;
        *tally
    }

    /// Remove `key` entirely. Returns false when it had no votes.
    pub fn remove(&self, key: &str) -> bool {
        self.votes.remove(key).is_some()
    }

    pub fn get(&self, key: &str) -> Option<u64> {
        self.votes.get(key).map(|tally| *tally)
    }

    /// All tallies, ordered by key.
    pub fn list(&self) -> Vec<VoteEntry> {
        let mut entries: Vec<VoteEntry> = self
            .votes
            .iter()
            .map(|item| VoteEntry {
                key: item.key().clone(),
                value: *item.value(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }
}

/// `GET /api/{key}`: the vote list for `votes`, otherwise a static file.
pub async fn get_resource(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    if key == VOTES_RESOURCE {
        list_votes(&state)
    } else {
        serve_file(&state, &key).await
    }
}

fn list_votes(state: &AppState) -> Response {
    (
        [(header::CACHE_CONTROL, "no-cache, must-revalidate")],
        Json(state.votes.list()),
    )
        .into_response()
}

async fn serve_file(state: &AppState, file: &str) -> Response {
    if file != INDEX_FILE {
        return (StatusCode::NOT_FOUND, "File not found").into_response();
    }

    let path = state.config.load().http.content_dir.join(INDEX_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(body) => ([(header::CONTENT_TYPE, "text/html")], body).into_response(),
        Err(e) => {
            tracing::warn!(path = ?path, error = %e, "Static file unavailable");
            (StatusCode::NOT_FOUND, "File not found").into_response()
        }
    }
}

/// `POST /api/{key}`
pub async fn add_vote(State(state): State<AppState>, Path(key): Path<String>) -> StatusCode {
    let tally = state.votes.add(&key);
    tracing::debug!(key = %key, tally, "Vote added");
    StatusCode::NO_CONTENT
}

/// `DELETE /api/{key}`
pub async fn remove_vote(State(state): State<AppState>, Path(key): Path<String>) -> StatusCode {
    if state.votes.remove(&key) {
        tracing::debug!(key = %key, "Vote removed");
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}
