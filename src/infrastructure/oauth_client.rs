use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;

pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// What is traded at the token endpoint for a fresh access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode { code: String, redirect_uri: String },
    RefreshToken(String),
}

impl TokenGrant {
    fn form_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::AuthorizationCode { code, redirect_uri } => vec![
                ("grant_type", "authorization_code".to_string()),
                ("code", code.clone()),
                ("redirect_uri", redirect_uri.clone()),
            ],
            Self::RefreshToken(refresh_token) => vec![
                ("grant_type", "refresh_token".to_string()),
                ("refresh_token", refresh_token.clone()),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrantResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: i64,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn request_token(&self, grant: TokenGrant) -> Result<TokenGrantResponse, InfraError>;
}

#[derive(Debug, Clone)]
pub struct GoogleTokenEndpoint {
    client: Client,
    endpoint: String,
    client_id: String,
    client_secret: String,
}

#[derive(Debug, serde::Deserialize)]
struct TokenPayload {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    token_type: Option<String>,
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl GoogleTokenEndpoint {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }
}

#[async_trait]
impl TokenEndpoint for GoogleTokenEndpoint {
    async fn request_token(&self, grant: TokenGrant) -> Result<TokenGrantResponse, InfraError> {
        let mut form = grant.form_fields();
        form.push(("client_id", self.client_id.clone()));
        form.push(("client_secret", self.client_secret.clone()));

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .map_err(|error| InfraError::OAuth(format!("token request failed: {error}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::OAuth(format!("failed reading token response: {error}")))?;

        parse_token_payload(status.as_u16(), &body)
    }
}

fn parse_token_payload(status: u16, body: &str) -> Result<TokenGrantResponse, InfraError> {
    let payload = serde_json::from_str::<TokenPayload>(body)
        .map_err(|error| InfraError::OAuth(format!("invalid token response: {error}")))?;

    if !(200..300).contains(&status) || payload.error.is_some() {
        let code = payload.error.unwrap_or_else(|| format!("http_{status}"));
        let detail = payload.error_description.unwrap_or_default();
        return Err(InfraError::OAuth(format!("token endpoint rejected grant: {code} {detail}")));
    }

    let access_token = payload
        .access_token
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| InfraError::OAuth("token response carried no access_token".to_string()))?;
    Ok(TokenGrantResponse {
        access_token,
        refresh_token: payload.refresh_token,
        expires_in: payload.expires_in.unwrap_or(0).max(0),
        token_type: payload.token_type,
        scope: payload.scope,
    })
}
