//! HTTP API handlers

use actix_web::http::header;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use cipherpost_core::UserId;
use cipherpost_crypto::keys::PublicKeyPem;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::AppState;

/// Configure API routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/auth/register", web::post().to(register))
        .route("/auth/login", web::post().to(login))
        .route("/users", web::get().to(list_users))
        .route("/users/me/key", web::put().to(rotate_key))
        .route("/users/{username}/key", web::get().to(get_public_key))
        .route("/messages/{other_user_id}", web::get().to(get_history))
        .route("/health", web::get().to(health_check));
}

/// Resolve the bearer token on `req` to the calling identity
fn caller(state: &AppState, req: &HttpRequest) -> Result<UserId, ServiceError> {
    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok());
    Ok(state.server.directory().authenticate(header)?)
}

/// Register request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub public_key: PublicKeyPem,
}

/// Register a new identity
async fn register(
    state: web::Data<AppState>,
    req: web::Json<RegisterRequest>,
) -> ActixResult<HttpResponse, ServiceError> {
    let RegisterRequest {
        username,
        password,
        public_key,
    } = req.into_inner();
    let server = state.server.clone();

    // Argon2 hashing is CPU-bound
    let session =
        web::block(move || server.directory().register(&username, &password, public_key))
            .await??;

    info!(user_id = %session.user_id, "Registration accepted");
    Ok(HttpResponse::Ok().json(session))
}

/// Login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Log in
async fn login(
    state: web::Data<AppState>,
    req: web::Json<LoginRequest>,
) -> ActixResult<HttpResponse, ServiceError> {
    let LoginRequest { username, password } = req.into_inner();
    let server = state.server.clone();

    let session = web::block(move || server.directory().login(&username, &password)).await??;

    debug!(user_id = %session.user_id, "Login accepted");
    Ok(HttpResponse::Ok().json(session))
}

/// Every identity except the caller
async fn list_users(
    state: web::Data<AppState>,
    req: HttpRequest,
) -> ActixResult<HttpResponse, ServiceError> {
    let me = caller(&state, &req)?;
    let users = state.server.directory().list_others(me)?;
    Ok(HttpResponse::Ok().json(users))
}

/// Public key response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicKeyResponse {
    pub public_key: PublicKeyPem,
}

/// Current public key for a username
async fn get_public_key(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ActixResult<HttpResponse, ServiceError> {
    caller(&state, &req)?;
    let username = path.into_inner();
    let public_key = state.server.directory().public_key_for(&username)?;
    Ok(HttpResponse::Ok().json(PublicKeyResponse { public_key }))
}

/// Rotate key request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RotateKeyRequest {
    pub public_key: PublicKeyPem,
}

/// Replace the caller's public key
async fn rotate_key(
    state: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<RotateKeyRequest>,
) -> ActixResult<HttpResponse, ServiceError> {
    let me = caller(&state, &req)?;
    state
        .server
        .directory()
        .rotate_key(me, body.into_inner().public_key)?;
    Ok(HttpResponse::NoContent().finish())
}

/// Conversation history between the caller and another identity
async fn get_history(
    state: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<String>,
) -> ActixResult<HttpResponse, ServiceError> {
    let me = caller(&state, &req)?;
    let other: UserId = path
        .into_inner()
        .parse()
        .map_err(|_| ServiceError::BadRequest("user id must be numeric".to_string()))?;

    let envelopes = state.server.relay().history(me, other)?;
    debug!(count = envelopes.len(), "History served");
    Ok(HttpResponse::Ok().json(envelopes))
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub identities: usize,
    pub envelopes: usize,
    pub connections: usize,
}

/// Health check endpoint
async fn health_check(state: web::Data<AppState>) -> ActixResult<HttpResponse, ServiceError> {
    let stats = state.server.stats()?;
    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        identities: stats.identity_count,
        envelopes: stats.envelope_count,
        connections: state.server.hub().connection_count(),
    }))
}
