//! Service wiring: stores, token service, authorizer.

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use tenantgate_auth::{
    Authorizer, CredentialVerifier, PermissionResolver, RegistryError, RoleRegistry, SessionStore,
    StoreError, TokenCodec, TokenConfigError, TokenService, User,
};
use tenantgate_core::{Clock, DomainError, SystemClock};
use tenantgate_infra::{InMemoryCredentialStore, InMemorySessionStore, InMemoryUserStore};

use crate::app::cookies::CookieSettings;
use crate::config::ApiConfig;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Tokens(#[from] TokenConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid user record: {0}")]
    User(#[from] DomainError),

    #[error("reading user file: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing user file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("persistent stores requested but no database url configured")]
    MissingDatabaseUrl,
}

/// Shared handles every handler can reach.
#[derive(Clone)]
pub struct AppState {
    pub authorizer: Authorizer,
    pub credentials: Arc<dyn CredentialVerifier>,
    pub sessions: Arc<dyn SessionStore>,
    pub clock: Arc<dyn Clock>,
    pub cookies: CookieSettings,
}

impl AppState {
    pub fn tokens(&self) -> &TokenService {
        self.authorizer.tokens()
    }
}

/// Users and their login secrets.
///
/// Account administration lives elsewhere; the API only needs something to
/// authenticate against, so development and tests seed this directly.
#[derive(Debug, Clone, Default)]
pub struct UserDirectory {
    pub users: Arc<InMemoryUserStore>,
    pub credentials: Arc<InMemoryCredentialStore>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    user: User,
    password: String,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user: User, password: &str) -> Result<(), ServiceError> {
        let id = user.id;
        self.users.upsert(user)?;
        self.credentials.set_secret(id, password)?;
        Ok(())
    }

    /// Load a JSON array of `{"user": {...}, "password": "..."}` entries.
    pub fn load_file(&self, path: &Path) -> Result<usize, ServiceError> {
        let raw = std::fs::read_to_string(path)?;
        let entries: Vec<DirectoryEntry> = serde_json::from_str(&raw)?;
        let count = entries.len();
        for entry in entries {
            self.register(entry.user, &entry.password)?;
        }
        tracing::info!(path = %path.display(), users = count, "loaded user directory");
        Ok(count)
    }
}

pub async fn build_state(config: &ApiConfig, directory: &UserDirectory) -> Result<AppState, ServiceError> {
    build_state_with_clock(config, directory, Arc::new(SystemClock)).await
}

pub async fn build_state_with_clock(
    config: &ApiConfig,
    directory: &UserDirectory,
    clock: Arc<dyn Clock>,
) -> Result<AppState, ServiceError> {
    if config.use_persistent_stores && config.database_url.is_none() {
        return Err(ServiceError::MissingDatabaseUrl);
    }

    let registry = Arc::new(RoleRegistry::standard()?);
    let sessions = session_store(config).await?;

    let tokens = TokenService::new(
        TokenCodec::hs256(config.jwt_secret.as_bytes()),
        config.tokens.clone(),
        PermissionResolver::new(registry),
        sessions.clone(),
        directory.users.clone(),
        clock.clone(),
    )?;

    Ok(AppState {
        authorizer: Authorizer::new(Arc::new(tokens))
            .with_strict_session_check(config.strict_session_check),
        credentials: directory.credentials.clone(),
        sessions,
        clock,
        cookies: CookieSettings {
            refresh_path: config.refresh_cookie_path.clone(),
        },
    })
}

#[cfg(feature = "postgres")]
async fn session_store(config: &ApiConfig) -> Result<Arc<dyn SessionStore>, ServiceError> {
    if let (true, Some(url)) = (config.use_persistent_stores, config.database_url.as_deref()) {
        let store = tenantgate_infra::PostgresSessionStore::connect(url).await?;
        tracing::info!("using postgres session store");
        return Ok(Arc::new(store));
    }
    Ok(Arc::new(InMemorySessionStore::new()))
}

#[cfg(not(feature = "postgres"))]
async fn session_store(config: &ApiConfig) -> Result<Arc<dyn SessionStore>, ServiceError> {
    if config.use_persistent_stores {
        tracing::warn!("USE_PERSISTENT_STORES=true but built without the `postgres` feature; using in-memory sessions");
    }
    Ok(Arc::new(InMemorySessionStore::new()))
}
