use std::sync::Arc;

use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use super::auth_error_response;
use super::models::Me;
use crate::state::AppState;
use crate::voting::UnvalidatedCredentials;

pub async fn register(state: Arc<AppState>, credentials: UnvalidatedCredentials) -> Response {
    match state.auth.register(credentials).await {
        Err(err) => auth_error_response(&err),
        Ok(user) => reply::with_status(reply::json(&user), StatusCode::CREATED).into_response(),
    }
}

pub async fn login(state: Arc<AppState>, credentials: UnvalidatedCredentials) -> Response {
    match state.auth.login(credentials).await {
        Err(err) => auth_error_response(&err),
        Ok(user) => reply::json(&user).into_response(),
    }
}

pub async fn logout(state: Arc<AppState>) -> Response {
    state.auth.logout();
    StatusCode::NO_CONTENT.into_response()
}

pub async fn me(state: Arc<AppState>) -> Response {
    reply::json(&Me {
        user: state.auth.current_user(),
        anonymous_id: state.visitor.anonymous_id(),
    }).into_response()
}
