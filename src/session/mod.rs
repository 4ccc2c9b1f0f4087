use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{info, warn};

use crate::api::{ApiError, LoginRequest, PortalApi};

/// Bearer token handed explicitly to every authenticated call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credential")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Login,
    Admin,
    Initiatives,
}

impl Route {
    pub fn path(self) -> &'static str {
        match self {
            Self::Login => "/login",
            Self::Admin => "/admin",
            Self::Initiatives => "/pobude",
        }
    }
}

pub trait TokenStore: Send + Sync {
    fn load(&self) -> std::io::Result<Option<String>>;
    fn save(&self, token: &str) -> std::io::Result<()>;
    fn clear(&self) -> std::io::Result<()>;
}

#[derive(Clone, Debug)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> std::io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save(&self, token: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, token)
    }

    fn clear(&self) -> std::io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> std::io::Result<Option<String>> {
        Ok(self.token.lock().map(|t| t.clone()).unwrap_or(None))
    }

    fn save(&self, token: &str) -> std::io::Result<()> {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.to_string());
        }
        Ok(())
    }

    fn clear(&self) -> std::io::Result<()> {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    credential: Option<Credential>,
    redirect: Option<Route>,
}

/// Login state shared by every view. Auth failures from any call are funnelled
/// through [`Session::intercept`], which logs out and asks for the login route.
pub struct Session {
    store: Box<dyn TokenStore>,
    state: Mutex<SessionState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

impl Session {
    pub fn new(store: impl TokenStore + 'static) -> Self {
        let credential = match store.load() {
            Ok(token) => token.map(Credential::bearer),
            Err(e) => {
                warn!(error = %e, "failed to load stored token, starting logged out");
                None
            }
        };
        Self {
            store: Box::new(store),
            state: Mutex::new(SessionState {
                credential,
                redirect: None,
            }),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStore::default())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut guard = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    pub fn is_authenticated(&self) -> bool {
        self.with_state(|s| s.credential.is_some())
    }

    pub fn credential(&self) -> Result<Credential, ApiError> {
        self.with_state(|s| s.credential.clone())
            .ok_or(ApiError::NotAuthenticated)
    }

    pub async fn login<A: PortalApi + ?Sized>(
        &self,
        api: &A,
        username: &str,
        password: &str,
    ) -> Result<(), ApiError> {
        let response = api
            .login(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .await?;
        self.store
            .save(&response.token)
            .map_err(|e| ApiError::TokenStore { source: e })?;
        self.with_state(|s| {
            s.credential = Some(Credential::bearer(response.token));
            s.redirect = Some(Route::Admin);
        });
        info!(username, "logged in");
        Ok(())
    }

    pub fn logout(&self) {
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "failed to clear stored token");
        }
        self.with_state(|s| s.credential = None);
    }

    /// Clears credentials and requests the login route on auth failures.
    pub fn intercept<T>(&self, result: Result<T, ApiError>) -> Result<T, ApiError> {
        if let Err(e) = result.as_ref() {
            if e.is_auth_failure() {
                warn!(error = %e, "authentication rejected, clearing session");
                self.logout();
                self.with_state(|s| s.redirect = Some(Route::Login));
            }
        }
        result
    }

    /// Runs an authenticated call with the current credential.
    pub async fn authorized<T, F, Fut>(&self, call: F) -> Result<T, ApiError>
    where
        F: FnOnce(Credential) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let credential = self.intercept(self.credential())?;
        self.intercept(call(credential).await)
    }

    pub fn take_redirect(&self) -> Option<Route> {
        self.with_state(|s| s.redirect.take())
    }
}
