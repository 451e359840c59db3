//! Short-lived authentication session caching. The customs authorities
//! reject a new login while a prior session is still valid, so credentials
//! are cached per identity triple and replaced only when stale.

pub mod cache;

pub use cache::{Authenticator, IssuedCredential, SessionCache, SessionError, StaticAuthenticator};
