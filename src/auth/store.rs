// Cookie-Backed Session Store
// Reads and writes the sealed session value with a fixed security posture

use axum::http::{HeaderMap, HeaderValue, header};

/// Lifetime of the login-attempt state cookie. Long enough for a login
/// round-trip through the provider, short enough to bound replay.
const STATE_COOKIE_MAX_AGE_SECS: i64 = 600;

/// Stateless session storage: all durable session state lives in the
/// client-held cookie, this type only owns the cookie names, flags and
/// lifetimes. Callers see opaque values, never session internals.
#[derive(Debug, Clone)]
pub struct SessionStore {
    session_cookie_name: String,
    state_cookie_name: String,
    /// Secure flag, off only for local development over plain HTTP
    secure: bool,
}

impl SessionStore {
    pub fn new(secure: bool) -> Self {
        Self {
            session_cookie_name: "session".to_string(),
            state_cookie_name: "oauth_state".to_string(),
            secure,
        }
    }

    /// Extract the sealed session value from the request, if present.
    pub fn read_session(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.session_cookie_name)
    }

    /// Extract the pending login state nonce, if present.
    pub fn read_state(&self, headers: &HeaderMap) -> Option<String> {
        read_cookie(headers, &self.state_cookie_name)
    }

    /// Set-Cookie header issuing the sealed session. Max-Age is bound to the
    /// refresh-token lifetime, which is why only the refresh token is
    /// persisted.
    pub fn issue_session(&self, sealed: &str, max_age_secs: i64) -> HeaderValue {
        self.build_cookie(&self.session_cookie_name, sealed, max_age_secs)
    }

    /// Set-Cookie header deleting the session.
    pub fn clear_session(&self) -> HeaderValue {
        self.build_cookie(&self.session_cookie_name, "", 0)
    }

    /// Set-Cookie header storing a pending login's state nonce.
    pub fn issue_state(&self, state: &str) -> HeaderValue {
        self.build_cookie(&self.state_cookie_name, state, STATE_COOKIE_MAX_AGE_SECS)
    }

    /// Set-Cookie header consuming the state nonce; sent on every callback
    /// outcome so the nonce is single-use.
    pub fn clear_state(&self) -> HeaderValue {
        self.build_cookie(&self.state_cookie_name, "", 0)
    }

    fn build_cookie(&self, name: &str, value: &str, max_age_secs: i64) -> HeaderValue {
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
            name,
            value,
            max_age_secs,
            if self.secure { "; Secure" } else { "" }
        );
        HeaderValue::from_str(&cookie)
            .expect("cookie values are sealed base64url or generated nonces")
    }
}

fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_header.split(';').find_map(|cookie| {
        let (cookie_name, value) = cookie.trim().split_once('=')?;
        if cookie_name == name && !value.is_empty() {
            Some(value.to_string())
        } else {
            None
        }
    })
}
