use crate::domain::models::{AuthSession, LoginCredentials};
use crate::infrastructure::auth_client::AuthClient;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::ApiError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

const TOKEN_LEEWAY_SECONDS: i64 = 60;

type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
type SessionEndedHook = Arc<dyn Fn() + Send + Sync>;

/// Process-wide refresh state. The coordinator is the only code path that
/// transitions it, and every transition happens under the one mutex so no
/// two callers can both observe `Idle`.
enum RefreshState {
    Idle,
    InFlight(broadcast::Sender<Result<String, ApiError>>),
}

enum RefreshRole {
    Leader(broadcast::Sender<Result<String, ApiError>>),
    Follower(broadcast::Receiver<Result<String, ApiError>>),
}

/// Owns the one token session: login and logout, the single-flight refresh
/// exchange, and the session-ended notification hook.
pub struct SessionManager<S, A>
where
    S: CredentialStore,
    A: AuthClient,
{
    credential_store: Arc<S>,
    auth_client: Arc<A>,
    refresh_state: Mutex<RefreshState>,
    session_expiry: StdMutex<Option<DateTime<Utc>>>,
    session_ended: StdMutex<Option<SessionEndedHook>>,
    now_provider: NowProvider,
}

impl<S, A> SessionManager<S, A>
where
    S: CredentialStore,
    A: AuthClient,
{
    pub fn new(credential_store: Arc<S>, auth_client: Arc<A>) -> Self {
        Self {
            credential_store,
            auth_client,
            refresh_state: Mutex::new(RefreshState::Idle),
            session_expiry: StdMutex::new(None),
            session_ended: StdMutex::new(None),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Registers the zero-argument notification the surrounding app uses to
    /// drop back to its login flow. Registered once; fired at most once per
    /// session-ending episode.
    pub fn set_session_ended_hook(&self, hook: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut guard) = self.session_ended.lock() {
            *guard = Some(Arc::new(hook));
        }
    }

    pub async fn login(&self, credentials: &LoginCredentials) -> Result<AuthSession, ApiError> {
        let response = self.auth_client.login(credentials).await?;
        let expires_at = (self.now_provider)() + Duration::seconds(response.expires_in.max(0));

        self.credential_store
            .set_access_token(&response.access_token)?;
        if let Some(refresh_token) = response
            .refresh_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
        {
            self.credential_store.set_refresh_token(refresh_token)?;
        }
        self.set_expiry(Some(expires_at))?;

        Ok(AuthSession {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
        })
    }

    /// Clears the session without firing the session-ended hook; logout is
    /// caller-initiated, not a failure episode.
    pub fn logout(&self) -> Result<(), ApiError> {
        self.set_expiry(None)?;
        self.credential_store.clear()
    }

    pub fn access_token(&self) -> Result<Option<String>, ApiError> {
        self.credential_store.access_token()
    }

    pub fn cache_profile(&self, profile: &serde_json::Value) -> Result<(), ApiError> {
        self.credential_store.set_cached_profile(profile)
    }

    pub fn cached_profile(&self) -> Result<Option<serde_json::Value>, ApiError> {
        self.credential_store.cached_profile()
    }

    /// Whether a stored token is present and, as far as this process knows,
    /// not expired. A token restored from the platform store has no known
    /// expiry and counts as active; the 401 path corrects optimism.
    pub fn has_active_session(&self) -> Result<bool, ApiError> {
        let Some(access_token) = self.credential_store.access_token()? else {
            return Ok(false);
        };
        let expires_at = self.expiry()?;
        Ok(match expires_at {
            Some(expires_at) => AuthSession {
                access_token,
                refresh_token: None,
                expires_at,
            }
            .is_active_at((self.now_provider)(), TOKEN_LEEWAY_SECONDS),
            None => !access_token.trim().is_empty(),
        })
    }

    /// Single-flight refresh: at most one refresh exchange is in flight
    /// process-wide, and its result fans out to every caller that arrived
    /// while it ran. A failed exchange is terminal for the session and is
    /// never retried here.
    pub async fn acquire_refreshed_token(&self) -> Result<String, ApiError> {
        let role = {
            let mut state = self.refresh_state.lock().await;
            match &*state {
                RefreshState::InFlight(sender) => RefreshRole::Follower(sender.subscribe()),
                RefreshState::Idle => {
                    let (sender, _) = broadcast::channel(1);
                    *state = RefreshState::InFlight(sender.clone());
                    RefreshRole::Leader(sender)
                }
            }
        };

        match role {
            RefreshRole::Follower(mut receiver) => {
                debug!("joining in-flight token refresh");
                receiver
                    .recv()
                    .await
                    .map_err(|error| ApiError::Network(format!("refresh fan-out closed: {error}")))?
            }
            RefreshRole::Leader(sender) => {
                debug!("starting token refresh exchange");
                let result = self.run_refresh_exchange().await;
                let mut state = self.refresh_state.lock().await;
                *state = RefreshState::Idle;
                // Waiters may have dropped out; a send with no receivers is
                // not an error.
                let _ = sender.send(result.clone());
                result
            }
        }
    }

    /// Ends the session: clears every stored credential and fires the
    /// registered hook. Used on terminal refresh failure and by the request
    /// pipeline on unauthorized responses.
    pub fn end_session(&self) {
        warn!("session ended; clearing stored credentials");
        if let Err(error) = self.set_expiry(None) {
            warn!("failed clearing session expiry: {error}");
        }
        if let Err(error) = self.credential_store.clear() {
            warn!("failed clearing credential store: {error}");
        }
        let hook = self
            .session_ended
            .lock()
            .ok()
            .and_then(|guard| guard.clone());
        if let Some(hook) = hook {
            hook();
        }
    }

    async fn run_refresh_exchange(&self) -> Result<String, ApiError> {
        let refresh_token = match self.credential_store.refresh_token() {
            Ok(Some(token)) if !token.trim().is_empty() => token,
            Ok(_) => {
                warn!("no refresh token stored; ending session");
                self.end_session();
                return Err(ApiError::SessionExpired);
            }
            Err(error) => return Err(error),
        };

        match self.auth_client.refresh(&refresh_token).await {
            Ok(response) => {
                let expires_at =
                    (self.now_provider)() + Duration::seconds(response.expires_in.max(0));
                self.credential_store
                    .set_access_token(&response.access_token)?;
                if let Some(new_refresh) = response
                    .refresh_token
                    .as_deref()
                    .filter(|token| !token.trim().is_empty())
                {
                    self.credential_store.set_refresh_token(new_refresh)?;
                }
                self.set_expiry(Some(expires_at))?;
                debug!("token refresh succeeded");
                Ok(response.access_token)
            }
            Err(error) => {
                warn!("token refresh failed: {error}; ending session");
                self.end_session();
                Err(ApiError::SessionExpired)
            }
        }
    }

    fn expiry(&self) -> Result<Option<DateTime<Utc>>, ApiError> {
        self.session_expiry
            .lock()
            .map(|guard| *guard)
            .map_err(|error| ApiError::Credential(format!("expiry lock poisoned: {error}")))
    }

    fn set_expiry(&self, value: Option<DateTime<Utc>>) -> Result<(), ApiError> {
        self.session_expiry
            .lock()
            .map(|mut guard| *guard = value)
            .map_err(|error| ApiError::Credential(format!("expiry lock poisoned: {error}")))
    }
}
