use crate::domain::models::LoginCredentials;
use crate::infrastructure::error::ApiError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const LOGIN_PATH: &str = "auth/owner/login";
const REFRESH_PATH: &str = "auth/owner/refresh";

/// Result of the login or refresh exchange.
#[derive(Debug, Clone)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
}

/// Network seam for the two credential exchanges. The session layer only
/// ever talks to this trait so tests can drive it with fakes.
#[async_trait]
pub trait AuthClient: Send + Sync {
    async fn login(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<TokenExchangeResponse, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<TokenExchangeResponse, ApiError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestAuthClient {
    client: Client,
    base_url: Url,
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenExchangePayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequestBody<'a> {
    refresh_token: &'a str,
}

impl ReqwestAuthClient {
    pub fn new(base_url: &str) -> Result<Self, ApiError> {
        let base_url = Url::parse(base_url)
            .map_err(|error| ApiError::Auth(format!("invalid auth base url: {error}")))?;
        Ok(Self {
            client: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path)
            .map_err(|error| ApiError::Auth(format!("invalid auth endpoint '{path}': {error}")))
    }

    async fn post_json<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<TokenExchangeResponse, ApiError> {
        let endpoint = self.endpoint(path)?;
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|error| ApiError::Network(error.to_string()))?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .map_err(|error| ApiError::Network(format!("failed reading exchange response: {error}")))?;

        let parsed = serde_json::from_str::<TokenExchangePayload>(&raw).map_err(|error| {
            ApiError::Auth(format!("invalid token exchange payload: {error}; body={raw}"))
        })?;

        if !status.is_success() || parsed.code.is_some() {
            let code = parsed
                .code
                .unwrap_or_else(|| format!("http_{}", status.as_u16()));
            let detail = parsed.message.unwrap_or(raw);
            return Err(ApiError::Auth(format!("token exchange failed: {code}; {detail}")));
        }

        let access_token = parsed
            .access_token
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| {
                ApiError::Auth("token exchange response did not include accessToken".to_string())
            })?;

        Ok(TokenExchangeResponse {
            access_token,
            refresh_token: parsed.refresh_token,
            expires_in: parsed.expires_in.unwrap_or(0).max(0),
        })
    }
}

#[async_trait]
impl AuthClient for ReqwestAuthClient {
    async fn login(
        &self,
        credentials: &LoginCredentials,
    ) -> Result<TokenExchangeResponse, ApiError> {
        self.post_json(LOGIN_PATH, credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenExchangeResponse, ApiError> {
        self.post_json(REFRESH_PATH, &RefreshRequestBody { refresh_token })
            .await
    }
}
