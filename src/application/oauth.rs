use crate::domain::models::OAuthToken;
use crate::infrastructure::credential_store::CredentialStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::oauth_client::{TokenEndpoint, TokenGrant, TokenGrantResponse};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use url::Url;

const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_EXPIRY_LEEWAY_SECONDS: i64 = 60;

pub const DEFAULT_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/calendar.events",
];

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
}

impl OAuthConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scopes,
            authorization_endpoint: DEFAULT_AUTHORIZATION_ENDPOINT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnsureTokenResult {
    Existing(OAuthToken),
    Refreshed(OAuthToken),
    ReauthenticationRequired,
}

impl EnsureTokenResult {
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Existing(token) | Self::Refreshed(token) => Some(token.access_token.as_str()),
            Self::ReauthenticationRequired => None,
        }
    }
}

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Keeps each user's Google access token usable, refreshing through the
/// stored refresh token when it has expired.
pub struct OAuthManager<S, E>
where
    S: CredentialStore,
    E: TokenEndpoint,
{
    config: OAuthConfig,
    credential_store: Arc<S>,
    token_endpoint: Arc<E>,
    now_provider: NowProvider,
}

impl<S, E> OAuthManager<S, E>
where
    S: CredentialStore,
    E: TokenEndpoint,
{
    pub fn new(config: OAuthConfig, credential_store: Arc<S>, token_endpoint: Arc<E>) -> Self {
        Self {
            config,
            credential_store,
            token_endpoint,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn build_authorization_url(&self, state: &str) -> Result<String, InfraError> {
        if state.trim().is_empty() {
            return Err(InfraError::OAuth("state must not be empty".to_string()));
        }
        if self.config.scopes.is_empty() {
            return Err(InfraError::OAuth("at least one scope is required".to_string()));
        }

        let mut url = Url::parse(&self.config.authorization_endpoint)
            .map_err(|error| InfraError::OAuth(format!("invalid authorization endpoint: {error}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", state);
        Ok(url.to_string())
    }

    pub async fn authenticate_with_code(
        &self,
        user_id: &str,
        authorization_code: &str,
    ) -> Result<OAuthToken, InfraError> {
        if user_id.trim().is_empty() {
            return Err(InfraError::OAuth("user id must not be empty".to_string()));
        }
        if authorization_code.trim().is_empty() {
            return Err(InfraError::OAuth("authorization code must not be empty".to_string()));
        }

        let response = self
            .token_endpoint
            .request_token(TokenGrant::AuthorizationCode {
                code: authorization_code.trim().to_string(),
                redirect_uri: self.config.redirect_uri.clone(),
            })
            .await?;
        let token = self.token_from_response(response, None);
        if token.refresh_token.is_none() {
            tracing::warn!(user_id, "authorization granted without a refresh token; daily runs will need a new consent");
        }
        self.credential_store.save_token(user_id, &token)?;
        Ok(token)
    }

    pub async fn ensure_access_token(&self, user_id: &str) -> Result<EnsureTokenResult, InfraError> {
        let Some(stored) = self.credential_store.load_token(user_id)? else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };
        if stored.is_valid_at((self.now_provider)(), TOKEN_EXPIRY_LEEWAY_SECONDS) {
            return Ok(EnsureTokenResult::Existing(stored));
        }
        let Some(refresh_token) = stored.refresh_token.clone() else {
            return Ok(EnsureTokenResult::ReauthenticationRequired);
        };

        match self
            .token_endpoint
            .request_token(TokenGrant::RefreshToken(refresh_token))
            .await
        {
            Ok(response) => {
                let token = self.token_from_response(response, stored.refresh_token);
                self.credential_store.save_token(user_id, &token)?;
                Ok(EnsureTokenResult::Refreshed(token))
            }
            Err(InfraError::OAuth(message)) => {
                tracing::warn!(user_id, %message, "refresh token rejected");
                Ok(EnsureTokenResult::ReauthenticationRequired)
            }
            Err(error) => Err(error),
        }
    }

    pub fn disconnect(&self, user_id: &str) -> Result<(), InfraError> {
        self.credential_store.delete_token(user_id)
    }

    fn token_from_response(
        &self,
        response: TokenGrantResponse,
        fallback_refresh_token: Option<String>,
    ) -> OAuthToken {
        OAuthToken {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(fallback_refresh_token),
            expires_at: (self.now_provider)() + Duration::seconds(response.expires_in),
            token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
            scope: response.scope,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::credential_store::InMemoryCredentialStore;
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeTokenEndpoint {
        grants: Mutex<Vec<TokenGrant>>,
        reject_with: Option<String>,
    }

    impl FakeTokenEndpoint {
        fn rejecting(message: &str) -> Self {
            Self {
                reject_with: Some(message.to_string()),
                ..Self::default()
            }
        }

        fn grants(&self) -> Vec<TokenGrant> {
            self.grants.lock().expect("grants mutex").clone()
        }
    }

    #[async_trait]
    impl TokenEndpoint for FakeTokenEndpoint {
        async fn request_token(&self, grant: TokenGrant) -> Result<TokenGrantResponse, InfraError> {
            let refresh_token = match &grant {
                TokenGrant::AuthorizationCode { .. } => Some("issued-refresh".to_string()),
                TokenGrant::RefreshToken(_) => None,
            };
            self.grants.lock().expect("grants mutex").push(grant);
            if let Some(message) = &self.reject_with {
                return Err(InfraError::OAuth(message.clone()));
            }
            Ok(TokenGrantResponse {
                access_token: "fresh-access".to_string(),
                refresh_token,
                expires_in: 3600,
                token_type: Some("Bearer".to_string()),
                scope: None,
            })
        }
    }

    fn config() -> OAuthConfig {
        OAuthConfig::new(
            "client-id",
            "http://localhost:3001/auth/google/callback",
            DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
        )
    }

    fn token(expires_in_seconds: i64, refresh_token: Option<&str>) -> OAuthToken {
        OAuthToken {
            access_token: "stored-access".to_string(),
            refresh_token: refresh_token.map(ToOwned::to_owned),
            expires_at: Utc::now() + Duration::seconds(expires_in_seconds),
            token_type: "Bearer".to_string(),
            scope: None,
        }
    }

    fn manager(
        store: &Arc<InMemoryCredentialStore>,
        endpoint: &Arc<FakeTokenEndpoint>,
    ) -> OAuthManager<InMemoryCredentialStore, FakeTokenEndpoint> {
        OAuthManager::new(config(), Arc::clone(store), Arc::clone(endpoint))
    }

    #[test]
    fn authorization_url_requests_offline_consent() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let url = manager(&store, &endpoint)
            .build_authorization_url("user-1")
            .expect("url");
        let parsed = Url::parse(&url).expect("parse url");
        let pairs = parsed.query_pairs().into_owned().collect::<Vec<_>>();
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(pairs.contains(&("prompt".to_string(), "consent".to_string())));
        assert!(pairs.contains(&("state".to_string(), "user-1".to_string())));
    }

    #[tokio::test]
    async fn tokens_are_kept_per_user() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let manager = manager(&store, &endpoint);
        manager
            .authenticate_with_code("user-1", "code-1")
            .await
            .expect("authenticate");

        assert!(matches!(
            manager.ensure_access_token("user-1").await.expect("ensure"),
            EnsureTokenResult::Existing(_)
        ));
        assert_eq!(
            manager.ensure_access_token("user-2").await.expect("ensure"),
            EnsureTokenResult::ReauthenticationRequired
        );
    }

    #[tokio::test]
    async fn expired_token_is_refreshed_and_keeps_refresh_token() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token("user-1", &token(-120, Some("refresh-1")))
            .expect("save");
        let endpoint = Arc::new(FakeTokenEndpoint::default());

        let result = manager(&store, &endpoint)
            .ensure_access_token("user-1")
            .await
            .expect("ensure");

        let EnsureTokenResult::Refreshed(refreshed) = result else {
            panic!("expected refreshed token");
        };
        assert_eq!(refreshed.access_token, "fresh-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(
            endpoint.grants(),
            vec![TokenGrant::RefreshToken("refresh-1".to_string())]
        );
        let stored = store.load_token("user-1").expect("load").expect("token");
        assert_eq!(stored.access_token, "fresh-access");
    }

    #[tokio::test]
    async fn rejected_refresh_requires_reauthentication() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store
            .save_token("user-1", &token(-10, Some("revoked")))
            .expect("save");
        let endpoint = Arc::new(FakeTokenEndpoint::rejecting("invalid_grant"));

        let result = manager(&store, &endpoint)
            .ensure_access_token("user-1")
            .await
            .expect("ensure");
        assert_eq!(result, EnsureTokenResult::ReauthenticationRequired);
        assert_eq!(result.access_token(), None);
    }

    #[tokio::test]
    async fn disconnect_forgets_token() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store.save_token("user-1", &token(3600, None)).expect("save");
        let endpoint = Arc::new(FakeTokenEndpoint::default());
        let manager = manager(&store, &endpoint);

        manager.disconnect("user-1").expect("disconnect");
        assert_eq!(
            manager.ensure_access_token("user-1").await.expect("ensure"),
            EnsureTokenResult::ReauthenticationRequired
        );
    }

    proptest! {
        #[test]
        fn unexpired_tokens_never_hit_the_endpoint(
            expires_in in (TOKEN_EXPIRY_LEEWAY_SECONDS + 5)..604_800i64,
            has_refresh in any::<bool>()
        ) {
            let runtime = tokio::runtime::Runtime::new().expect("runtime");
            let (result, grants) = runtime.block_on(async move {
                let store = Arc::new(InMemoryCredentialStore::default());
                store
                    .save_token("user-1", &token(expires_in, has_refresh.then_some("refresh")))
                    .expect("save");
                let endpoint = Arc::new(FakeTokenEndpoint::default());
                let result = manager(&store, &endpoint)
                    .ensure_access_token("user-1")
                    .await
                    .expect("ensure");
                (result, endpoint.grants())
            });
            prop_assert!(matches!(result, EnsureTokenResult::Existing(_)));
            prop_assert!(grants.is_empty());
        }
    }
}
