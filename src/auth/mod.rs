// Session & Authentication Subsystem
// OIDC authorization-code login, sealed stateless session cookie, on-demand
// access token refresh and provider logout

pub mod codec;
pub mod error;
pub mod provider;
pub mod resolver;
pub mod routes;
pub mod session;
pub mod store;

pub use codec::SessionCodec;
pub use error::AuthError;
pub use provider::{IdentityProvider, IdentityProviderConfig, OidcClient};
pub use resolver::{ResolvedSession, SessionResolver, require_session};
pub use routes::auth_router;
pub use session::{AuthenticatedProfile, ProviderProfile, SessionRecord, Tokens};
pub use store::SessionStore;

use std::sync::Arc;

/// Everything a request needs to establish identity. Built once at startup
/// from validated configuration; immutable and shared across requests, the
/// only process-wide state this subsystem holds.
pub struct AuthContext {
    pub codec: SessionCodec,
    pub store: SessionStore,
    pub provider: Arc<dyn IdentityProvider>,

    /// Where a successful login lands
    pub home_url: String,

    /// Where a failed login lands, with an opaque `?error=` code appended
    pub error_url: String,
}
