use crate::state::AppState;
use axum::Router;

pub mod cookie;
mod dto;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod recovery;
pub mod repo;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
