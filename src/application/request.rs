use crate::application::session::SessionManager;
use crate::infrastructure::auth_client::AuthClient;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::ApiError;
use crate::infrastructure::transport::{HttpRequest, HttpResponse, HttpTransport};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// 401 body codes that mean the access token itself is stale and a refresh
/// plus one replay is worth attempting. Anything else on 401 is a permission
/// problem and ends the session without a retry.
const RETRYABLE_AUTH_CODES: [&str; 3] = ["TOKEN_EXPIRED", "TOKEN_INVALID", "TOKEN_MISSING"];

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
}

/// One backend call as the screens describe it: relative path, optional JSON
/// body and query, and a flag to skip token attachment entirely.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub skip_auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            skip_auth: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

#[derive(Debug, serde::Deserialize)]
struct ErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Session-aware request pipeline: builds the call, attaches the bearer
/// token, and on a stale-token 401 refreshes through the coordinator and
/// replays the call exactly once.
pub struct ApiClient<S, A, T>
where
    S: CredentialStore,
    A: AuthClient,
    T: HttpTransport,
{
    base_url: url::Url,
    sessions: Arc<SessionManager<S, A>>,
    transport: Arc<T>,
}

impl<S, A, T> ApiClient<S, A, T>
where
    S: CredentialStore,
    A: AuthClient,
    T: HttpTransport,
{
    pub fn new(
        config: ApiConfig,
        sessions: Arc<SessionManager<S, A>>,
        transport: Arc<T>,
    ) -> Result<Self, ApiError> {
        let base_url = url::Url::parse(&config.base_url)
            .map_err(|error| ApiError::Network(format!("invalid api base url: {error}")))?;
        Ok(Self {
            base_url,
            sessions,
            transport,
        })
    }

    pub fn sessions(&self) -> &Arc<SessionManager<S, A>> {
        &self.sessions
    }

    /// Sends the request and parses the JSON payload. An unparseable 2xx
    /// body is tolerated as `None` rather than an error; everything else
    /// surfaces through the [`ApiError`] taxonomy.
    pub async fn send<R: DeserializeOwned>(
        &self,
        request: ApiRequest,
    ) -> Result<Option<R>, ApiError> {
        let bearer_token = if request.skip_auth {
            None
        } else {
            self.sessions.access_token()?
        };

        let response = self
            .transport
            .execute(self.build(&request, bearer_token)?)
            .await?;

        if response.status == 401 && !request.skip_auth {
            if let Some(code) = retryable_auth_code(&response) {
                debug!("401 with retryable reason {code}; refreshing and replaying once");
                let fresh_token = self.sessions.acquire_refreshed_token().await?;
                let replayed = self
                    .transport
                    .execute(self.build(&request, Some(fresh_token))?)
                    .await?;
                // One replay only; a second 401 falls through as final.
                return self.complete(replayed);
            }
        }

        self.complete(response)
    }

    fn build(
        &self,
        request: &ApiRequest,
        bearer_token: Option<String>,
    ) -> Result<HttpRequest, ApiError> {
        let mut url = self
            .base_url
            .join(request.path.trim_start_matches('/'))
            .map_err(|error| {
                ApiError::Network(format!("invalid request path '{}': {error}", request.path))
            })?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }

        Ok(HttpRequest {
            method: request.method.clone(),
            url: url.to_string(),
            bearer_token,
            body: request.body.clone(),
        })
    }

    fn complete<R: DeserializeOwned>(&self, response: HttpResponse) -> Result<Option<R>, ApiError> {
        if response.is_success() {
            if response.body.trim().is_empty() {
                return Ok(None);
            }
            return Ok(serde_json::from_str(&response.body).ok());
        }

        if response.status == 401 || response.status == 403 {
            warn!("unauthorized response (http {}); ending session", response.status);
            self.sessions.end_session();
            return Err(ApiError::Unauthorized {
                status: response.status,
                message: server_message(&response),
            });
        }

        warn!("server error (http {})", response.status);
        Err(ApiError::Server {
            status: response.status,
            message: server_message(&response),
        })
    }
}

fn parse_error_body(response: &HttpResponse) -> Option<ErrorBody> {
    serde_json::from_str(&response.body).ok()
}

fn retryable_auth_code(response: &HttpResponse) -> Option<String> {
    let code = parse_error_body(response)?.code?;
    let normalized = code.trim().to_ascii_uppercase();
    RETRYABLE_AUTH_CODES
        .contains(&normalized.as_str())
        .then_some(normalized)
}

fn server_message(response: &HttpResponse) -> String {
    parse_error_body(response)
        .and_then(|body| body.message)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| response.status_text.clone())
}
