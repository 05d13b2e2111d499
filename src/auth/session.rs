// Session Data Model
// The sealed session record and the transient per-request profile

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Durable session state, sealed into the session cookie. Kept deliberately
/// small: no access token and no profile payload, both are re-fetched per
/// request. The record is never mutated in place; a rotated refresh token
/// produces a freshly sealed record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Subject identifier from the identity provider
    pub subject: String,

    /// The only long-lived secret this subsystem persists
    pub refresh_token: String,

    /// Unseal rejects records past this point
    pub refresh_token_expiry: DateTime<Utc>,

    /// Retained for the provider's end-session hint at logout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.refresh_token_expiry
    }

    /// Remaining lifetime in whole seconds, used as the cookie Max-Age.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> i64 {
        (self.refresh_token_expiry - now).num_seconds().max(0)
    }

    /// Keep the previously stored ID token when a refreshed token set omits
    /// one, so the logout hint survives rotation.
    pub fn with_id_token_fallback(mut self, previous: Option<String>) -> Self {
        if self.id_token.is_none() {
            self.id_token = previous;
        }
        self
    }
}

/// Token set returned by the identity provider. Expiries are absolute,
/// computed from the provider's relative `expires_in` values at receipt.
#[derive(Debug, Clone)]
pub struct Tokens {
    pub access_token: String,
    pub access_token_expiry: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_token_expiry: DateTime<Utc>,
    pub id_token: Option<String>,
}

impl Tokens {
    /// Build the session record persisted for this token set.
    pub fn into_session_record(self, subject: String) -> SessionRecord {
        SessionRecord {
            subject,
            refresh_token: self.refresh_token,
            refresh_token_expiry: self.refresh_token_expiry,
            id_token: self.id_token,
        }
    }
}

/// Raw userinfo response from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Subject identifier
    pub sub: String,

    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub phone_number: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,

    /// Granted authorities, passed through untouched (authorization itself
    /// is evaluated elsewhere)
    #[serde(default)]
    pub authorities: Vec<String>,
}

/// Per-request view of the caller: current profile plus a fresh access
/// token. Reconstructed on every request, never cached server-side.
#[derive(Debug, Clone, Serialize)]
pub struct AuthenticatedProfile {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub country: Option<String>,
    pub authenticated: bool,
    pub authorities: Vec<String>,

    /// Short-lived credential for backend API calls; lives only in the
    /// in-flight request context
    #[serde(skip_serializing)]
    pub access_token: String,
}

impl AuthenticatedProfile {
    pub fn from_provider(profile: ProviderProfile, access_token: String) -> Self {
        Self {
            id: profile.sub,
            email: profile.email,
            first_name: profile.given_name,
            last_name: profile.family_name,
            phone: profile.phone_number,
            company: profile.company,
            country: profile.country,
            authenticated: true,
            authorities: profile.authorities,
            access_token,
        }
    }
}

/// Convert a provider-relative lifetime into an absolute expiry.
pub fn expiry_from_seconds(now: DateTime<Utc>, seconds: u64) -> DateTime<Utc> {
    now + Duration::seconds(seconds as i64)
}
