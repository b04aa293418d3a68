//! `catalog-auth`: bearer token verification boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage. Tokens are
//! issued elsewhere (an OpenID provider); this crate only verifies them.

pub mod claims;
pub mod principal;
pub mod validator;

pub use claims::{Audience, JwtClaims, TokenValidationError};
pub use principal::Principal;
pub use validator::{Hs256JwtValidator, JwtValidator};
