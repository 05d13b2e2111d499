// Identity Provider Client
// The three provider-facing exchanges plus end-session URL construction

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::AuthError;
use super::session::{ProviderProfile, Tokens, expiry_from_seconds};

/// Fallback refresh-token lifetime when the provider omits
/// `refresh_expires_in` (30 days, matching the provider's default realm
/// setting).
const DEFAULT_REFRESH_LIFETIME_SECS: u64 = 30 * 24 * 3600;

/// Per-call timeout for provider round-trips. A hanging provider call is a
/// failed call, never retried here.
const PROVIDER_TIMEOUT_SECS: u64 = 8;

/// Configuration for the OIDC identity provider. Immutable once constructed;
/// injected into the client rather than read from ambient state so tests can
/// point it at a fake provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    /// Issuer base URL, e.g. `https://id.example.com/realms/merchants`
    pub issuer_url: String,

    pub client_id: String,
    pub client_secret: String,

    /// Callback URL registered with the provider
    pub redirect_url: String,

    /// Where the provider sends the browser after end-session
    pub post_logout_redirect_url: String,

    /// Scopes requested at login
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    // Endpoint overrides; when absent, standard paths under the issuer are
    // used
    pub auth_url: Option<String>,
    pub token_url: Option<String>,
    pub userinfo_url: Option<String>,
    pub end_session_url: Option<String>,
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string(), "profile".to_string(), "email".to_string()]
}

impl IdentityProviderConfig {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.is_empty() {
            return Err(AuthError::Config("client_id cannot be empty".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(AuthError::Config(
                "client_secret cannot be empty".to_string(),
            ));
        }
        url::Url::parse(&self.issuer_url)
            .map_err(|e| AuthError::Config(format!("invalid issuer_url: {}", e)))?;
        url::Url::parse(&self.redirect_url)
            .map_err(|e| AuthError::Config(format!("invalid redirect_url: {}", e)))?;

        // Endpoint overrides feed the infallible URL builders, so they must
        // parse at startup too
        for (key, value) in [
            ("auth_url", &self.auth_url),
            ("token_url", &self.token_url),
            ("userinfo_url", &self.userinfo_url),
            ("end_session_url", &self.end_session_url),
        ] {
            if let Some(value) = value {
                url::Url::parse(value)
                    .map_err(|e| AuthError::Config(format!("invalid {}: {}", key, e)))?;
            }
        }
        Ok(())
    }

    fn endpoint<'a>(&'a self, explicit: &'a Option<String>, path: &str) -> String {
        explicit.clone().unwrap_or_else(|| {
            format!(
                "{}/protocol/openid-connect/{}",
                self.issuer_url.trim_end_matches('/'),
                path
            )
        })
    }

    pub fn auth_endpoint(&self) -> String {
        self.endpoint(&self.auth_url, "auth")
    }

    pub fn token_endpoint(&self) -> String {
        self.endpoint(&self.token_url, "token")
    }

    pub fn userinfo_endpoint(&self) -> String {
        self.endpoint(&self.userinfo_url, "userinfo")
    }

    pub fn end_session_endpoint(&self) -> String {
        self.endpoint(&self.end_session_url, "logout")
    }
}

/// Raw token endpoint response
#[derive(Debug, Deserialize)]
struct TokenResponseRaw {
    access_token: String,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    refresh_expires_in: Option<u64>,
    id_token: Option<String>,
}

/// Provider-facing operations. One implementation talks to the real OIDC
/// provider; tests substitute their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authorization endpoint URL carrying the CSRF state (no network call)
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange a single-use authorization code for tokens
    async fn exchange_authorization_code(&self, code: &str) -> Result<Tokens, AuthError>;

    /// Mint a fresh access token. Failure means the session is dead, not
    /// that the call should be retried: a revoked refresh token never
    /// succeeds.
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<Tokens, AuthError>;

    /// Fetch the subject's current profile; results must not outlive the
    /// request
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError>;

    /// End-session URL with `post_logout_redirect_uri` and, when available,
    /// `id_token_hint`. Pure, no network call.
    fn build_logout_url<'a>(&self, id_token_hint: Option<&'a str>) -> String;
}

/// HTTPS client for the configured OIDC issuer.
pub struct OidcClient {
    config: IdentityProviderConfig,
    http_client: reqwest::Client,
}

impl OidcClient {
    pub fn new(config: IdentityProviderConfig) -> Result<Self, AuthError> {
        config.validate()?;

        let http_client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()
            .map_err(|e| AuthError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    async fn token_request(
        &self,
        form: &[(&str, &str)],
        on_failure: fn(String) -> AuthError,
    ) -> Result<Tokens, AuthError> {
        let response = self
            .http_client
            .post(self.config.token_endpoint())
            .form(form)
            .send()
            .await
            .map_err(|e| on_failure(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(on_failure(format!("status {}: {}", status, error_body)));
        }

        let raw: TokenResponseRaw = response
            .json()
            .await
            .map_err(|e| on_failure(format!("malformed token response: {}", e)))?;

        let now = Utc::now();
        let refresh_token = raw
            .refresh_token
            .ok_or_else(|| on_failure("token response carried no refresh token".to_string()))?;

        Ok(Tokens {
            access_token: raw.access_token,
            access_token_expiry: expiry_from_seconds(now, raw.expires_in.unwrap_or(300)),
            refresh_token,
            refresh_token_expiry: expiry_from_seconds(
                now,
                raw.refresh_expires_in.unwrap_or(DEFAULT_REFRESH_LIFETIME_SECS),
            ),
            id_token: raw.id_token,
        })
    }
}

#[async_trait]
impl IdentityProvider for OidcClient {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = url::Url::parse(&self.config.auth_endpoint())
            .expect("auth endpoint validated at construction");
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);
        url.to_string()
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<Tokens, AuthError> {
        self.token_request(
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
                ("redirect_uri", &self.config.redirect_url),
            ],
            AuthError::TokenExchangeFailed,
        )
        .await
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<Tokens, AuthError> {
        self.token_request(
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.config.client_id),
                ("client_secret", &self.config.client_secret),
            ],
            AuthError::RefreshFailed,
        )
        .await
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, AuthError> {
        let response = self
            .http_client
            .get(self.config.userinfo_endpoint())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AuthError::ProfileFetchFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            warn!(%status, "userinfo request rejected");
            return Err(AuthError::ProfileFetchFailed(format!(
                "status {}: {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::ProfileFetchFailed(format!("malformed profile: {}", e)))
    }

    fn build_logout_url(&self, id_token_hint: Option<&str>) -> String {
        let mut url = url::Url::parse(&self.config.end_session_endpoint())
            .expect("end-session endpoint validated at construction");
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(
                "post_logout_redirect_uri",
                &self.config.post_logout_redirect_url,
            );
            query.append_pair("client_id", &self.config.client_id);
            if let Some(hint) = id_token_hint {
                query.append_pair("id_token_hint", hint);
            }
        }
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_config() -> IdentityProviderConfig {
        IdentityProviderConfig {
            issuer_url: "https://id.example.com/realms/merchants".to_string(),
            client_id: "console".to_string(),
            client_secret: "console-secret".to_string(),
            redirect_url: "https://console.example.com/auth/callback".to_string(),
            post_logout_redirect_url: "https://console.example.com/".to_string(),
            scopes: default_scopes(),
            auth_url: None,
            token_url: None,
            userinfo_url: None,
            end_session_url: None,
        }
    }

    #[test]
    fn test_endpoints_derived_from_issuer() {
        let config = test_config();
        assert_eq!(
            config.token_endpoint(),
            "https://id.example.com/realms/merchants/protocol/openid-connect/token"
        );
        assert_eq!(
            config.end_session_endpoint(),
            "https://id.example.com/realms/merchants/protocol/openid-connect/logout"
        );
    }

    #[test]
    fn test_endpoint_override_wins() {
        let mut config = test_config();
        config.token_url = Some("https://other.example.com/token".to_string());
        assert_eq!(config.token_endpoint(), "https://other.example.com/token");
    }

    #[test]
    fn test_validation_rejects_empty_client() {
        let mut config = test_config();
        config.client_id.clear();
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn test_validation_rejects_malformed_endpoint_override() {
        let mut config = test_config();
        config.auth_url = Some("not a url".to_string());
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
        assert!(OidcClient::new(config).is_err());

        let mut config = test_config();
        config.end_session_url = Some("also not a url".to_string());
        assert!(matches!(config.validate(), Err(AuthError::Config(_))));
    }

    #[test]
    fn test_mocked_logout_url_hint() {
        let mut provider = MockIdentityProvider::new();
        provider
            .expect_build_logout_url()
            .returning(|hint| format!("https://idp.test/logout?hint={}", hint.unwrap_or("none")));

        assert_eq!(
            provider.build_logout_url(Some("idt")),
            "https://idp.test/logout?hint=idt"
        );
        assert_eq!(
            provider.build_logout_url(None),
            "https://idp.test/logout?hint=none"
        );
    }

    #[test]
    fn test_authorization_url_carries_state() {
        let client = OidcClient::new(test_config()).unwrap();
        let url = client.authorization_url("state-xyz");

        assert!(url.starts_with(
            "https://id.example.com/realms/merchants/protocol/openid-connect/auth?"
        ));
        assert!(url.contains("state=state-xyz"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=console"));
        assert!(url.contains("scope=openid+profile+email"));
    }

    #[test]
    fn test_logout_url_with_and_without_hint() {
        let client = OidcClient::new(test_config()).unwrap();

        let without = client.build_logout_url(None);
        assert!(without.contains("post_logout_redirect_uri="));
        assert!(!without.contains("id_token_hint"));

        let with = client.build_logout_url(Some("the-id-token"));
        assert!(with.contains("id_token_hint=the-id-token"));
    }
}
