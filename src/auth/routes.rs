// Authentication Routes
// Login initiation, the authorization callback state machine, logout and
// the user-info endpoint consumed by the rest of the console

use axum::extract::{Extension, Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use super::AuthContext;
use super::error::AuthError;
use super::resolver::require_session;
use super::session::AuthenticatedProfile;

/// Query parameters the provider sends back to the callback endpoint
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,

    /// Provider session identifier; accepted and ignored
    #[allow(dead_code)]
    session_state: Option<String>,

    /// Provider-reported error; short-circuits everything else
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Serialize)]
struct LogoutResponse {
    logout_url: String,
}

/// Start a login attempt: mint a state nonce, park it in the short-lived
/// state cookie and send the browser to the provider.
async fn start_login(State(ctx): State<Arc<AuthContext>>) -> Response {
    let nonce: [u8; 32] = rand::random();
    let state = URL_SAFE_NO_PAD.encode(nonce);

    let auth_url = ctx.provider.authorization_url(&state);
    debug!("redirecting browser to identity provider");

    let mut response = Redirect::temporary(&auth_url).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, ctx.store.issue_state(&state));
    response
}

/// Authorization callback. Terminal states are exactly one of: redirect to
/// the error page with an opaque `?error=<code>`, or redirect home with the
/// session cookie set. The state cookie is consumed on every path.
async fn callback(
    State(ctx): State<Arc<AuthContext>>,
    Query(params): Query<CallbackParams>,
    headers: HeaderMap,
) -> Response {
    match run_callback(&ctx, params, &headers).await {
        Ok(set_session) => {
            let mut response = Redirect::to(&ctx.home_url).into_response();
            response
                .headers_mut()
                .append(header::SET_COOKIE, set_session);
            response
                .headers_mut()
                .append(header::SET_COOKIE, ctx.store.clear_state());
            response
        }
        Err(err) => {
            warn!(error = %err, "login callback failed");
            let target = format!("{}?error={}", ctx.error_url, err.redirect_code());
            let mut response = Redirect::to(&target).into_response();
            response
                .headers_mut()
                .append(header::SET_COOKIE, ctx.store.clear_state());
            response
        }
    }
}

/// The callback state machine proper. Ordering is load-bearing: the
/// provider-reported error wins over everything, and CSRF validation happens
/// before any network call so a forged callback never costs an exchange.
async fn run_callback(
    ctx: &AuthContext,
    params: CallbackParams,
    headers: &HeaderMap,
) -> Result<header::HeaderValue, AuthError> {
    if let Some(error) = params.error {
        debug!(
            description = params.error_description.as_deref().unwrap_or(""),
            "provider reported a login error"
        );
        return Err(AuthError::ProviderReportedError(error));
    }

    let code = params.code.ok_or(AuthError::MissingParameters("code"))?;
    let returned_state = params.state.ok_or(AuthError::MissingParameters("state"))?;

    let stored_state = ctx
        .store
        .read_state(headers)
        .ok_or(AuthError::CsrfMismatch)?;

    if !bool::from(
        stored_state
            .as_bytes()
            .ct_eq(returned_state.as_bytes()),
    ) {
        return Err(AuthError::CsrfMismatch);
    }

    let tokens = ctx.provider.exchange_authorization_code(&code).await?;
    let profile = ctx.provider.fetch_profile(&tokens.access_token).await?;

    let record = tokens.into_session_record(profile.sub.clone());
    let sealed = ctx.codec.seal(&record)?;
    let max_age = record.remaining_lifetime(Utc::now());

    info!(subject = %record.subject, "login completed");
    Ok(ctx.store.issue_session(&sealed, max_age))
}

/// Logout: recover the end-session hint if the cookie still unseals, clear
/// the session either way and hand back the provider logout URL. A corrupted
/// cookie never blocks logout, and the endpoint is idempotent without a
/// session.
async fn logout(State(ctx): State<Arc<AuthContext>>, headers: HeaderMap) -> Response {
    let id_token_hint = ctx
        .store
        .read_session(&headers)
        .and_then(|sealed| ctx.codec.unseal(&sealed).ok())
        .and_then(|record| record.id_token);

    if id_token_hint.is_none() {
        debug!("logout without a recoverable session, omitting id_token_hint");
    }

    let logout_url = ctx.provider.build_logout_url(id_token_hint.as_deref());

    let mut response = Json(LogoutResponse { logout_url }).into_response();
    response
        .headers_mut()
        .append(header::SET_COOKIE, ctx.store.clear_session());
    response
}

/// User-info endpoint: the sole authentication check for the rest of the
/// console. Runs behind `require_session`, which injects the profile.
async fn me(Extension(profile): Extension<AuthenticatedProfile>) -> Json<AuthenticatedProfile> {
    Json(profile)
}

/// Assemble the authentication router.
pub fn auth_router(ctx: Arc<AuthContext>) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&ctx),
            require_session,
        ));

    Router::new()
        .route("/login", get(start_login))
        .route("/callback", get(callback))
        .route("/logout", get(logout).post(logout))
        .merge(protected)
        .with_state(ctx)
}
