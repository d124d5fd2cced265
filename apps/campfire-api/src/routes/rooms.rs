//! Read-only room observability.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::rooms::service::RoomSummary;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/rooms", get(list_rooms))
}

/// List current rooms. Members show up only as counts; the system knows
/// nothing about participants beyond their opaque connection IDs anyway.
async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(state.rooms.summaries())
}
