// Session Resolver
// Per-request session unsealing, access token refresh and profile fetch

use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderValue, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;

use super::AuthContext;
use super::error::AuthError;
use super::session::AuthenticatedProfile;

/// Outcome of resolving an authenticated request: the caller's current
/// profile plus, when the provider rotated the refresh token, a freshly
/// sealed cookie to send back.
pub struct ResolvedSession {
    pub profile: AuthenticatedProfile,
    pub reissued_cookie: Option<HeaderValue>,
}

/// Resolves the caller behind an inbound request. Every protected request
/// goes through here: unseal the cookie, trade the refresh token for a
/// fresh access token, fetch the current profile. No access token or
/// profile survives the request.
pub struct SessionResolver {
    ctx: Arc<AuthContext>,
}

impl SessionResolver {
    pub fn new(ctx: Arc<AuthContext>) -> Self {
        Self { ctx }
    }

    /// Resolve the session carried by `headers`.
    ///
    /// An absent cookie yields `Unauthenticated`. An unseal failure yields
    /// `InvalidSession` and a refresh rejection yields `RefreshFailed`; both
    /// must surface to the browser exactly like an absent session (the
    /// middleware below collapses them to one 401), the distinct variants
    /// exist so the caller knows to clear the stale cookie.
    pub async fn resolve(&self, headers: &HeaderMap) -> Result<ResolvedSession, AuthError> {
        let sealed = self
            .ctx
            .store
            .read_session(headers)
            .ok_or(AuthError::Unauthenticated)?;

        let record = self.ctx.codec.unseal(&sealed).inspect_err(|_| {
            debug!("request carried an unusable session cookie");
        })?;

        let tokens = self
            .ctx
            .provider
            .refresh_access_token(&record.refresh_token)
            .await
            .inspect_err(|e| debug!(error = %e, "access token refresh rejected"))?;

        let profile = self
            .ctx
            .provider
            .fetch_profile(&tokens.access_token)
            .await?;

        // Reseal only when the provider rotated the refresh token; otherwise
        // the existing cookie stays valid as-is.
        let reissued_cookie = if tokens.refresh_token != record.refresh_token {
            let rotated = tokens
                .clone()
                .into_session_record(record.subject.clone())
                .with_id_token_fallback(record.id_token.clone());
            let sealed = self.ctx.codec.seal(&rotated)?;
            let max_age = rotated.remaining_lifetime(Utc::now());
            Some(self.ctx.store.issue_session(&sealed, max_age))
        } else {
            None
        };

        Ok(ResolvedSession {
            profile: AuthenticatedProfile::from_provider(profile, tokens.access_token),
            reissued_cookie,
        })
    }
}

/// Middleware guarding protected routes. Injects the resolved
/// `AuthenticatedProfile` into request extensions; failures collapse to a
/// single 401 shape so a tampered cookie is indistinguishable from an
/// absent one, and any stale cookie is cleared on the way out.
pub async fn require_session(
    State(ctx): State<Arc<AuthContext>>,
    mut req: Request,
    next: Next,
) -> Response {
    let resolver = SessionResolver::new(Arc::clone(&ctx));

    match resolver.resolve(req.headers()).await {
        Ok(resolved) => {
            req.extensions_mut().insert(resolved.profile);
            let mut response = next.run(req).await;
            if let Some(cookie) = resolved.reissued_cookie {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            response
        }
        Err(err) => {
            // Only a dead session warrants destroying the cookie; a transient
            // profile-fetch outage leaves it in place for the next request.
            let clear_cookie = matches!(
                err,
                AuthError::InvalidSession | AuthError::RefreshFailed(_)
            );
            let mut response = AuthError::Unauthenticated.into_response();
            if clear_cookie {
                response
                    .headers_mut()
                    .append(header::SET_COOKIE, ctx.store.clear_session());
            }
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::codec::SessionCodec;
    use crate::auth::provider::MockIdentityProvider;
    use crate::auth::session::{ProviderProfile, SessionRecord, Tokens};
    use crate::auth::store::SessionStore;
    use chrono::Duration;
    use mockall::predicate::eq;

    fn test_profile() -> ProviderProfile {
        ProviderProfile {
            sub: "42".to_string(),
            email: Some("a@b.com".to_string()),
            given_name: None,
            family_name: None,
            phone_number: None,
            company: None,
            country: None,
            authorities: vec![],
        }
    }

    fn tokens(refresh_token: &str) -> Tokens {
        let now = Utc::now();
        Tokens {
            access_token: "fresh-access".to_string(),
            access_token_expiry: now + Duration::minutes(5),
            refresh_token: refresh_token.to_string(),
            refresh_token_expiry: now + Duration::minutes(30),
            id_token: None,
        }
    }

    fn context(provider: MockIdentityProvider) -> Arc<AuthContext> {
        Arc::new(AuthContext {
            codec: SessionCodec::from_secret("resolver-test-secret"),
            store: SessionStore::new(false),
            provider: Arc::new(provider),
            home_url: "/".to_string(),
            error_url: "/login/error".to_string(),
        })
    }

    fn headers_with_session(ctx: &AuthContext, record: &SessionRecord) -> HeaderMap {
        let sealed = ctx.codec.seal(record).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("session={}", sealed)).unwrap(),
        );
        headers
    }

    fn record() -> SessionRecord {
        SessionRecord {
            subject: "42".to_string(),
            refresh_token: "stored-refresh".to_string(),
            refresh_token_expiry: Utc::now() + Duration::minutes(30),
            id_token: None,
        }
    }

    #[tokio::test]
    async fn test_absent_cookie_is_unauthenticated() {
        let ctx = context(MockIdentityProvider::new());
        let resolver = SessionResolver::new(ctx);

        let result = resolver.resolve(&HeaderMap::new()).await;
        assert!(matches!(result, Err(AuthError::Unauthenticated)));
    }

    #[tokio::test]
    async fn test_tampered_cookie_is_invalid_session() {
        let ctx = context(MockIdentityProvider::new());
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("session=bm90LWEtcmVhbC1zZXNzaW9u"),
        );

        let resolver = SessionResolver::new(ctx);
        let result = resolver.resolve(&headers).await;
        assert!(matches!(result, Err(AuthError::InvalidSession)));
    }

    #[tokio::test]
    async fn test_refresh_rejection_skips_profile_fetch() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_refresh_access_token()
            .with(eq("stored-refresh"))
            .times(1)
            .returning(|_| Err(AuthError::RefreshFailed("revoked".to_string())));
        // No fetch_profile expectation: a call would panic the mock

        let ctx = context(provider);
        let headers = headers_with_session(&ctx, &record());

        let resolver = SessionResolver::new(ctx);
        let result = resolver.resolve(&headers).await;
        assert!(matches!(result, Err(AuthError::RefreshFailed(_))));
    }

    #[tokio::test]
    async fn test_resolves_profile_with_fresh_access_token() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_refresh_access_token()
            .with(eq("stored-refresh"))
            .times(1)
            .returning(|_| Ok(tokens("stored-refresh")));
        provider
            .expect_fetch_profile()
            .with(eq("fresh-access"))
            .times(1)
            .returning(|_| Ok(test_profile()));

        let ctx = context(provider);
        let headers = headers_with_session(&ctx, &record());

        let resolver = SessionResolver::new(ctx);
        let resolved = resolver.resolve(&headers).await.unwrap();

        assert_eq!(resolved.profile.id, "42");
        assert_eq!(resolved.profile.access_token, "fresh-access");
        assert!(resolved.profile.authenticated);
        // Unrotated refresh token keeps the existing cookie
        assert!(resolved.reissued_cookie.is_none());
    }

    #[tokio::test]
    async fn test_rotated_refresh_token_reissues_cookie() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_refresh_access_token()
            .times(1)
            .returning(|_| Ok(tokens("rotated-refresh")));
        provider
            .expect_fetch_profile()
            .times(1)
            .returning(|_| Ok(test_profile()));

        let ctx = context(provider);
        let headers = headers_with_session(&ctx, &record());

        let resolver = SessionResolver::new(Arc::clone(&ctx));
        let resolved = resolver.resolve(&headers).await.unwrap();

        let cookie = resolved.reissued_cookie.expect("cookie must rotate");
        let sealed = cookie
            .to_str()
            .unwrap()
            .strip_prefix("session=")
            .unwrap()
            .split(';')
            .next()
            .unwrap()
            .to_string();

        let rotated = ctx.codec.unseal(&sealed).unwrap();
        assert_eq!(rotated.subject, "42");
        assert_eq!(rotated.refresh_token, "rotated-refresh");
    }
}
