//! `spadesk-auth`: authentication and authorization boundary.
//!
//! Token and password primitives plus the role → permission policy. Nothing
//! here knows about HTTP or storage; the API layer wires it to requests and
//! the session store.

pub mod authorize;
pub mod claims;
pub mod jwt;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, authorize};
pub use claims::{JwtClaims, TokenKind, TokenValidationError, validate_claims};
pub use jwt::{IssuedToken, JwtIssuer, JwtValidator, TokenError};
pub use password::{PasswordError, hash_password, verify_password};
pub use permissions::Permission;
pub use policy::{membership_for, permissions_for};
pub use principal::{Principal, TenantMembership};
pub use roles::Role;
pub use user::{User, UserCommand, UserEvent};
