mod dto;
pub mod handlers;
pub mod images;
pub mod repo;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::gallery_routes()
}
