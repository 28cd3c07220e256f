use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use reqwest::blocking::RequestBuilder;
use tracing::info;

use crate::error::TempoError;

pub const TOKEN_ENV: &str = "EARTHDATA_TOKEN";
pub const USERNAME_ENV: &str = "EARTHDATA_USERNAME";
pub const PASSWORD_ENV: &str = "EARTHDATA_PASSWORD";

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Token(String),
    Basic { username: String, password: String },
}

impl Credentials {
    pub fn from_env() -> Result<Self, TempoError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, TempoError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        if let Some(token) = non_empty(TOKEN_ENV) {
            return Ok(Credentials::Token(token.trim().to_string()));
        }
        match (non_empty(USERNAME_ENV), non_empty(PASSWORD_ENV)) {
            (Some(username), Some(password)) => Ok(Credentials::Basic { username, password }),
            _ => Err(TempoError::MissingCredentials),
        }
    }

    pub fn apply(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            Credentials::Token(token) => request.bearer_auth(token),
            Credentials::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Token(_) => write!(f, "Token(<redacted>)"),
            Credentials::Basic { username, .. } => {
                write!(f, "Basic {{ username: {username:?}, password: <redacted> }}")
            }
        }
    }
}

type CredentialSource = Box<dyn Fn() -> Result<Credentials, TempoError> + Send + Sync>;

enum SessionState {
    Pending(CredentialSource),
    Active(Credentials),
    Revoked,
}

pub struct EarthdataSession {
    state: RwLock<SessionState>,
}

impl EarthdataSession {
    pub fn acquire(credentials: Credentials) -> Arc<Self> {
        info!(?credentials, "earthdata session acquired");
        Arc::new(Self {
            state: RwLock::new(SessionState::Active(credentials)),
        })
    }

    pub fn deferred<F>(source: F) -> Arc<Self>
    where
        F: Fn() -> Result<Credentials, TempoError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            state: RwLock::new(SessionState::Pending(Box::new(source))),
        })
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.read_state(), SessionState::Active(_))
    }

    pub fn revoke(&self) {
        let mut state = self.write_state();
        if !matches!(*state, SessionState::Revoked) {
            *state = SessionState::Revoked;
            info!("earthdata session revoked");
        }
    }

    pub fn credentials(&self) -> Result<Credentials, TempoError> {
        match &*self.read_state() {
            SessionState::Active(credentials) => return Ok(credentials.clone()),
            SessionState::Revoked => return Err(TempoError::SessionRevoked),
            SessionState::Pending(_) => {}
        }

        let mut state = self.write_state();
        let credentials = match &*state {
            SessionState::Active(credentials) => return Ok(credentials.clone()),
            SessionState::Revoked => return Err(TempoError::SessionRevoked),
            SessionState::Pending(source) => source()?,
        };
        info!(?credentials, "earthdata session acquired");
        *state = SessionState::Active(credentials.clone());
        Ok(credentials)
    }

    pub fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, TempoError> {
        Ok(self.credentials()?.apply(request))
    }

    fn read_state(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for EarthdataSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.read_state() {
            SessionState::Pending(_) => "pending",
            SessionState::Active(_) => "active",
            SessionState::Revoked => "revoked",
        };
        f.debug_struct("EarthdataSession").field("state", &state).finish()
    }
}
