//! OAuth2 refresh-token flow for the email API
//!
//! Access tokens are cached until shortly before they expire. Refreshes are
//! serialized so concurrent sends share one token request.

use chrono::{DateTime, Duration, Utc};
use notification_common::provider_base::ProviderError;
use oauth2::basic::{BasicClient, BasicErrorResponse};
use oauth2::{
    AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet, HttpRequest, HttpResponse,
    RefreshToken, RequestTokenError, TokenResponse, TokenUrl,
};
use reqwest::{Client, Method};
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Refresh this long before the provider-reported expiry
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Lifetime assumed when the token response omits `expires_in`
const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

type TokenClient =
    BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + Duration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

pub struct OAuthTokenSource {
    http: Client,
    oauth: TokenClient,
    refresh_token: RefreshToken,
    cached: Mutex<Option<CachedToken>>,
}

impl OAuthTokenSource {
    pub fn new(
        http: Client,
        token_url: String,
        client_id: String,
        client_secret: String,
        refresh_token: String,
    ) -> Result<Self, ProviderError> {
        let token_url = TokenUrl::new(token_url).map_err(|e| {
            ProviderError::InvalidConfiguration(format!("Invalid token URL: {}", e))
        })?;

        // Client credentials travel in the form body alongside the refresh token
        let oauth = BasicClient::new(ClientId::new(client_id))
            .set_client_secret(ClientSecret::new(client_secret))
            .set_auth_type(AuthType::RequestBody)
            .set_token_uri(token_url);

        Ok(Self {
            http,
            oauth,
            refresh_token: RefreshToken::new(refresh_token),
            cached: Mutex::new(None),
        })
    }

    /// Current access token, refreshing when missing or about to expire
    pub async fn access_token(&self) -> Result<String, ProviderError> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_fresh(Utc::now()) {
                return Ok(token.access_token.clone());
            }
            debug!("Cached access token expired, refreshing");
        }

        let token = self.refresh().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }

    /// Drop the cached token so the next call refreshes
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn refresh(&self) -> Result<CachedToken, ProviderError> {
        let http = self.http.clone();
        let transport = move |request: HttpRequest| execute(http.clone(), request);

        let token = self
            .oauth
            .exchange_refresh_token(&self.refresh_token)
            .request_async(&transport)
            .await
            .map_err(token_error)?;

        let expires_in = token
            .expires_in()
            .and_then(|lifetime| i64::try_from(lifetime.as_secs()).ok())
            .unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        info!("🔑 Refreshed email API access token (expires in {}s)", expires_in);
        Ok(CachedToken {
            access_token: token.access_token().secret().clone(),
            expires_at: Utc::now() + Duration::seconds(expires_in),
        })
    }
}

/// Send an OAuth2 token request over the channel's HTTP client
async fn execute(http: Client, request: HttpRequest) -> Result<HttpResponse, ProviderError> {
    let (parts, body) = request.into_parts();
    let method = Method::from_bytes(parts.method.as_str().as_bytes())
        .map_err(|e| ProviderError::ExternalServiceError(format!("Bad token request: {}", e)))?;

    let mut builder = http.request(method, parts.uri.to_string()).body(body);
    for (name, value) in &parts.headers {
        builder = builder.header(name.as_str(), value.as_bytes());
    }

    let response = builder.send().await.map_err(|e| {
        error!("Failed to reach token endpoint: {}", e);
        if e.is_timeout() {
            ProviderError::NetworkTimeout
        } else {
            ProviderError::NetworkError(e.to_string())
        }
    })?;

    let status = response.status();
    if status.is_server_error() {
        error!("Token endpoint error: {}", status);
        return Err(ProviderError::ServiceUnavailable);
    }

    let mut converted = oauth2::http::Response::builder().status(status.as_u16());
    for (name, value) in response.headers() {
        converted = converted.header(name.as_str(), value.as_bytes());
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

    converted
        .body(body.to_vec())
        .map_err(|e| ProviderError::ExternalServiceError(format!("Invalid token response: {}", e)))
}

fn token_error(err: RequestTokenError<ProviderError, BasicErrorResponse>) -> ProviderError {
    match err {
        RequestTokenError::ServerResponse(response) => {
            let reason = match response.error_description() {
                Some(description) => format!("{}: {}", response.error(), description),
                None => response.error().to_string(),
            };
            error!("Token refresh rejected: {}", reason);
            ProviderError::TokenAcquisition(reason)
        }
        RequestTokenError::Request(e) => e,
        other => {
            error!("Unusable token endpoint response: {}", other);
            ProviderError::ExternalServiceError(format!("Invalid token response: {}", other))
        }
    }
}
