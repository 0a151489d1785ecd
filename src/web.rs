mod auth_api;
mod models;
mod poll_api;
mod result_api;
mod vote_api;

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info, warn};
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject::{InvalidQuery, MethodNotAllowed};
use warp::reply::{self, Reply, Response};
use warp::{Filter, Rejection};

use crate::backend::BackendError;
use crate::client::AuthError;
use crate::error::PollError;
use crate::state::{AppState, StartupError};
use crate::voting::PollId;
use models::ErrorBody;

/// Binds the configured address and serves until Ctrl+C.
pub async fn serve(state: Arc<AppState>) -> Result<(), StartupError> {
    let addr = SocketAddr::new(state.config.bind_addr, state.config.port);
    let (bound, server) = warp::serve(routes(state))
        .try_bind_with_graceful_shutdown(addr, shutdown_signal())
        .map_err(|err| StartupError::Bind { addr: addr.to_string(), message: err.to_string() })?;

    info!("Listening on http://{bound}");
    server.await;
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(err) => {
            warn!("Failed to install Ctrl+C handler: {err}");
            futures::future::pending::<()>().await;
        }
    }
}

pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let static_dir = state.config.static_dir.clone();

    let list_polls = warp::get()
        .and(warp::path!("api" / "polls"))
        .and(with_state(state.clone()))
        .and(warp::query::<models::ListQuery>())
        .then(poll_api::list);
    let anonymous_polls = warp::get()
        .and(warp::path!("api" / "polls" / "anonymous"))
        .and(with_state(state.clone()))
        .then(poll_api::list_anonymous);
    let create_poll = warp::post()
        .and(warp::path!("api" / "polls"))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .then(poll_api::create);
    let get_poll = warp::get()
        .and(warp::path!("api" / "polls" / PollId))
        .and(with_state(state.clone()))
        .then(poll_api::get);
    let update_poll = warp::put()
        .and(warp::path!("api" / "polls" / PollId))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .then(poll_api::update);
    let delete_poll = warp::delete()
        .and(warp::path!("api" / "polls" / PollId))
        .and(with_state(state.clone()))
        .then(poll_api::delete);

    let cast_vote = warp::post()
        .and(warp::path!("api" / "polls" / PollId / "votes"))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .then(vote_api::cast);

    let get_results = warp::get()
        .and(warp::path!("api" / "polls" / PollId / "results"))
        .and(with_state(state.clone()))
        .then(result_api::get);
    let live_results = warp::get()
        .and(warp::path!("api" / "polls" / PollId / "results" / "live"))
        .and(with_state(state.clone()))
        .then(result_api::live);

    let register = warp::post()
        .and(warp::path!("api" / "auth" / "register"))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .then(auth_api::register);
    let login = warp::post()
        .and(warp::path!("api" / "auth" / "login"))
        .and(with_state(state.clone()))
        .and(warp::body::json())
        .then(auth_api::login);
    let logout = warp::post()
        .and(warp::path!("api" / "auth" / "logout"))
        .and(with_state(state.clone()))
        .then(auth_api::logout);
    let me = warp::get()
        .and(warp::path!("api" / "auth" / "me"))
        .and(with_state(state))
        .then(auth_api::me);

    // the front end routes client-side, so its pages all load the same shell
    let index = static_dir.join("index.html");
    let shell = warp::get()
        .and(warp::path::end()
            .or(warp::path!("poll" / String).map(|_| ()).untuple_one())
            .unify())
        .and(warp::fs::file(index));
    let static_files = warp::path("static")
        .and(warp::fs::dir(static_dir));

    list_polls
        .or(anonymous_polls)
        .or(create_poll)
        .or(get_poll)
        .or(update_poll)
        .or(delete_poll)
        .or(cast_vote)
        .or(get_results)
        .or(live_results)
        .or(register)
        .or(login)
        .or(logout)
        .or(me)
        .or(shell)
        .or(static_files)
        .recover(handle_rejection)
        .with(warp::trace::request())
}

fn with_state(state: Arc<AppState>) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn error_body(status: StatusCode, message: String) -> Response {
    reply::with_status(reply::json(&ErrorBody { error: message }), status).into_response()
}

pub(crate) fn error_response(err: &PollError) -> Response {
    let status = match err {
        PollError::Validation(_) | PollError::NoSelection | PollError::TooManySelections { .. } => {
            StatusCode::BAD_REQUEST
        }
        PollError::AlreadyVoted(_) | PollError::PollExpired { .. } => StatusCode::CONFLICT,
        PollError::NotOwner(_) | PollError::ResultsHidden(_) => StatusCode::FORBIDDEN,
        PollError::NotFound(_) => StatusCode::NOT_FOUND,
        PollError::Backend(err) => return backend_error_response(err),
    };
    debug!(kind = ?err.kind(), "Request failed with {status}: {err}");
    error_body(status, err.to_string())
}

pub(crate) fn auth_error_response(err: &AuthError) -> Response {
    match err {
        AuthError::Validation(err) => error_body(StatusCode::BAD_REQUEST, err.to_string()),
        AuthError::Backend(err) => backend_error_response(err),
    }
}

fn backend_error_response(err: &BackendError) -> Response {
    match err {
        BackendError::Auth(_) => error_body(StatusCode::UNAUTHORIZED, err.to_string()),
        _ => {
            warn!("Backend failure: {err}");
            error_body(StatusCode::BAD_GATEWAY, err.to_string())
        }
    }
}

async fn handle_rejection(rejection: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, String::from("not found"))
    } else if let Some(err) = rejection.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if let Some(err) = rejection.find::<InvalidQuery>() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else if rejection.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, String::from("method not allowed"))
    } else {
        warn!("Unhandled rejection: {rejection:?}");
        (StatusCode::INTERNAL_SERVER_ERROR, String::from("internal error"))
    };
    Ok(error_body(status, message))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use serde_json::{json, Value};

    use super::*;
    use crate::backend::{Backend, MemoryBackend};
    use crate::config::Config;
    use crate::visitor::VisitorState;

    struct Fixture {
        backend: Arc<MemoryBackend>,
        state: Arc<AppState>,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(MemoryBackend::new());
        let config = Config {
            bind_addr: [127, 0, 0, 1].into(),
            port: 0,
            database_url: None,
            visitor_state: PathBuf::from("unused.json"),
            static_dir: PathBuf::from("static"),
            notify_interval: Duration::from_millis(10),
        };
        let state = AppState::with_parts(config, backend.clone(), VisitorState::in_memory());
        Fixture { backend, state }
    }

    fn body(response: &warp::http::Response<warp::hyper::body::Bytes>) -> Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    async fn create(state: &Arc<AppState>, poll: Value) -> Value {
        let response = warp::test::request()
            .method("POST")
            .path("/api/polls")
            .json(&poll)
            .reply(&routes(state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body(&response)
    }

    async fn vote(state: &Arc<AppState>, id: &str, options: &[&str]) -> warp::http::Response<warp::hyper::body::Bytes> {
        warp::test::request()
            .method("POST")
            .path(&format!("/api/polls/{id}/votes"))
            .json(&json!({ "selected_options": options }))
            .reply(&routes(state.clone()))
            .await
    }

    #[tokio::test]
    async fn create_vote_and_tally() {
        let f = fixture();
        let poll = create(&f.state, json!({ "question": "Colour?", "options": ["Red", "Blue", ""] })).await;
        let id = poll["id"].as_str().unwrap();
        assert_eq!(poll["options"], json!(["Red", "Blue"]));
        assert_eq!(poll["settings"], json!({ "allowMultiple": false, "showResults": true }));

        assert_eq!(vote(&f.state, id, &["Red"]).await.status(), StatusCode::CREATED);
        assert_eq!(vote(&f.state, id, &["Blue"]).await.status(), StatusCode::CONFLICT);

        let response = warp::test::request()
            .path(&format!("/api/polls/{id}/results"))
            .reply(&routes(f.state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let result = body(&response);
        assert_eq!(result["total_votes"], 1);
        assert_eq!(result["tally"], json!([
            { "option": "Red", "count": 1, "percentage": 100 },
            { "option": "Blue", "count": 0, "percentage": 0 },
        ]));

        let response = warp::test::request()
            .path(&format!("/api/polls/{id}"))
            .reply(&routes(f.state.clone()))
            .await;
        let view = body(&response);
        assert_eq!(view["has_voted"], true);
        assert_eq!(view["can_manage"], false);
        assert_eq!(view["share_path"], format!("/poll/{id}"));
    }

    #[tokio::test]
    async fn validation_errors_are_bad_requests() {
        let f = fixture();
        let response = warp::test::request()
            .method("POST")
            .path("/api/polls")
            .json(&json!({ "question": "Colour?", "options": ["Red"] }))
            .reply(&routes(f.state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body(&response)["error"].as_str().unwrap().contains("between 2 and 10 options"));

        let poll = create(&f.state, json!({ "question": "Colour?", "options": ["Red", "Blue"] })).await;
        let id = poll["id"].as_str().unwrap();
        assert_eq!(vote(&f.state, id, &[]).await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(vote(&f.state, id, &["Red", "Blue"]).await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn expired_poll_rejects_votes() {
        let f = fixture();
        let poll = create(&f.state, json!({
            "question": "Yesterday?",
            "options": ["Yes", "No"],
            "ends_at": "2020-01-01T00:00:00Z",
        })).await;
        let response = vote(&f.state, poll["id"].as_str().unwrap(), &["Yes"]).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn unknown_poll_is_not_found() {
        let f = fixture();
        let response = warp::test::request()
            .path(&format!("/api/polls/{}", PollId::new()))
            .reply(&routes(f.state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body(&response)["error"].is_string());
    }

    #[tokio::test]
    async fn hidden_results_are_forbidden() {
        let f = fixture();
        let poll = create(&f.state, json!({
            "question": "Secret?",
            "options": ["Yes", "No"],
            "settings": { "showResults": false },
        })).await;
        let response = warp::test::request()
            .path(&format!("/api/polls/{}/results", poll["id"].as_str().unwrap()))
            .reply(&routes(f.state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn owner_flow() {
        let f = fixture();
        let routes = routes(f.state.clone());
        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/register")
            .json(&json!({ "email": "ada@example.com", "password": "hunter22" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let poll = create(&f.state, json!({ "question": "Colour?", "options": ["Red", "Blue"] })).await;
        let id = poll["id"].as_str().unwrap();

        let response = warp::test::request().path("/api/polls?mine=true").reply(&routes).await;
        let listing = body(&response);
        assert_eq!(listing["total_polls"], 1);
        assert_eq!(listing["polls"][0]["id"], poll["id"]);

        let response = warp::test::request()
            .method("PUT")
            .path(&format!("/api/polls/{id}"))
            .json(&json!({ "question": "Color?" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(&response)["question"], "Color?");

        let response = warp::test::request().method("POST").path("/api/auth/logout").reply(&routes).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/api/polls/{id}"))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .json(&json!({ "email": "ada@example.com", "password": "wrong-one" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = warp::test::request()
            .method("POST")
            .path("/api/auth/login")
            .json(&json!({ "email": "ada@example.com", "password": "hunter22" }))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/api/polls/{id}"))
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn anonymous_polls_and_search() {
        let f = fixture();
        let pizza = create(&f.state, json!({ "question": "Best pizza?", "options": ["Margherita", "Diavola"] })).await;
        create(&f.state, json!({ "question": "Best pasta?", "options": ["Carbonara", "Amatriciana"] })).await;

        let response = warp::test::request().path("/api/polls/anonymous").reply(&routes(f.state.clone())).await;
        assert_eq!(body(&response)["total_polls"], 2);

        let response = warp::test::request().path("/api/polls?q=PIZZA").reply(&routes(f.state.clone())).await;
        let listing = body(&response);
        assert_eq!(listing["total_polls"], 1);
        assert_eq!(listing["polls"][0]["id"], pizza["id"]);
        assert_eq!(listing["polls"][0]["active"], true);
    }

    #[tokio::test]
    async fn backend_outage_is_bad_gateway() {
        let f = fixture();
        f.backend.disconnect();
        let response = warp::test::request().path("/api/polls").reply(&routes(f.state.clone())).await;
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert!(f.backend.list_polls(&Default::default()).await.is_err());
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let f = fixture();
        let response = warp::test::request()
            .method("POST")
            .path("/api/polls")
            .header("content-type", "application/json")
            .body("{ not json")
            .reply(&routes(f.state.clone()))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
