//! `tenantgate-auth`: authorization and multi-tenant scope resolution engine.
//!
//! This crate is intentionally decoupled from HTTP and storage: stores are
//! reached through the traits in [`session`] and [`user`].

pub mod authorize;
pub mod claims;
pub mod codec;
pub mod error;
pub mod permissions;
pub mod principal;
pub mod requirement;
pub mod resolver;
pub mod roles;
pub mod scope;
pub mod session;
pub mod token;
pub mod user;

pub use authorize::{AuthorizationExplanation, Authorizer, check_permission, explain_authorization};
pub use claims::{AccessTokenPayload, RefreshTokenPayload, TokenKind, TokenValidationError, validate_window};
pub use codec::{TokenCodec, TokenCodecError};
pub use error::{AuthError, AuthErrorKind, StoreError};
pub use permissions::{Permission, PermissionSet, UnknownPermission};
pub use principal::{AuthUser, PermissionSource};
pub use requirement::{PermissionRequirement, RouteRequirement};
pub use resolver::PermissionResolver;
pub use roles::{RegistryError, Role, RoleRegistry};
pub use scope::{ScopeGrant, ScopeGuard, ScopeRequirement, ScopeTarget};
pub use session::{RotationOutcome, Session, SessionState, SessionStore};
pub use token::{IssuedToken, TokenConfig, TokenConfigError, TokenPair, TokenService};
pub use user::{CredentialVerifier, PermissionOverrides, User, UserStatus, UserStore};
