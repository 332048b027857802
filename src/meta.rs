//! Per-user Meta connection: OAuth, ad account selection and the Graph calls
//! made on the user's behalf.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::facebook::{
    normalize_ad_account_id, oauth_dialog_url, CreatedObject, FacebookApiError, GraphApi,
    MetaAdAccount, MetaCampaignData, MetaProfile,
};
use crate::models::{User, UserProfile};
use crate::store::MetaIntegrationUpdate;
use crate::users::UsersService;

const NOT_CONNECTED: &str = "Meta account not connected. Please connect your Facebook account first.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<MetaProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionStatus {
    fn disconnected(error: Option<String>) -> Self {
        Self {
            connected: false,
            user: None,
            ad_account_id: None,
            error,
        }
    }
}

#[derive(Clone)]
pub struct MetaService {
    graph: Arc<dyn GraphApi>,
    users: UsersService,
    app_id: String,
    oauth_url: String,
}

impl MetaService {
    pub fn new(
        graph: Arc<dyn GraphApi>,
        users: UsersService,
        app_id: String,
        oauth_url: String,
    ) -> Self {
        Self {
            graph,
            users,
            app_id,
            oauth_url,
        }
    }

    pub fn auth_url(&self, redirect_uri: &str) -> AppResult<String> {
        Url::parse(redirect_uri)
            .map_err(|e| AppError::Validation(format!("Invalid redirect_uri: {e}")))?;
        let url = oauth_dialog_url(&self.oauth_url, &self.app_id, redirect_uri)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        Ok(url.to_string())
    }

    /// Completes the OAuth flow and stores the resulting credentials.
    pub async fn connect(
        &self,
        user_id: Uuid,
        code: &str,
        redirect_uri: &str,
    ) -> AppResult<ConnectionStatus> {
        if code.trim().is_empty() {
            return Err(AppError::Validation("Authorization code is required".to_string()));
        }
        if redirect_uri.trim().is_empty() {
            return Err(AppError::Validation("redirectUri is required".to_string()));
        }
        // Fail before spending the one-time code on a user that does not exist.
        let user = self.users.get(user_id).await?;

        let short_lived = self
            .graph
            .exchange_code(code, redirect_uri)
            .await
            .map_err(|e| upstream("Failed to connect to Meta", e))?;

        let token = match self.graph.extend_token(&short_lived.access_token).await {
            Ok(long_lived) => long_lived.access_token,
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "keeping short-lived Meta token");
                short_lived.access_token
            }
        };

        let profile = self
            .graph
            .get_me(&token)
            .await
            .map_err(|e| upstream("Failed to connect to Meta", e))?;

        let user = self
            .users
            .update_meta_integration(
                user.id,
                MetaIntegrationUpdate {
                    access_token: Some(token),
                    meta_user_id: Some(profile.id.clone()),
                    ad_account_id: None,
                },
            )
            .await?;
        info!(user_id = %user.id, meta_user_id = %profile.id, "Meta account connected");

        Ok(ConnectionStatus {
            connected: true,
            user: Some(profile),
            ad_account_id: user.meta_ad_account_id,
            error: None,
        })
    }

    pub async fn connection_status(&self, user_id: Uuid) -> AppResult<ConnectionStatus> {
        let user = self.users.get(user_id).await?;
        let Some(token) = user.meta_access_token.as_deref().filter(|t| !t.is_empty()) else {
            return Ok(ConnectionStatus::disconnected(None));
        };

        match self.graph.get_me(token).await {
            Ok(profile) => Ok(ConnectionStatus {
                connected: true,
                user: Some(profile),
                ad_account_id: user.meta_ad_account_id,
                error: None,
            }),
            Err(e) => {
                warn!(user_id = %user.id, error = %e, "stored Meta token rejected");
                Ok(ConnectionStatus::disconnected(Some(e.to_string())))
            }
        }
    }

    pub async fn get_ad_accounts(&self, user_id: Uuid) -> AppResult<Vec<MetaAdAccount>> {
        let user = self.users.get(user_id).await?;
        let token = access_token(&user)?;
        self.graph
            .get_ad_accounts(token)
            .await
            .map_err(|e| upstream("Failed to fetch ad accounts", e))
    }

    pub async fn select_ad_account(
        &self,
        user_id: Uuid,
        ad_account_id: &str,
    ) -> AppResult<UserProfile> {
        if ad_account_id.trim().is_empty() {
            return Err(AppError::Validation("adAccountId is required".to_string()));
        }
        let user = self.users.get(user_id).await?;
        access_token(&user)?;

        let ad_account_id = normalize_ad_account_id(ad_account_id);
        let user = self
            .users
            .update_meta_integration(
                user.id,
                MetaIntegrationUpdate {
                    ad_account_id: Some(ad_account_id.clone()),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %user.id, ad_account_id = %ad_account_id, "ad account selected");
        Ok(UserProfile::from(&user))
    }

    pub async fn disconnect(&self, user_id: Uuid) -> AppResult<()> {
        self.users.clear_meta_integration(user_id).await?;
        info!(user_id = %user_id, "Meta account disconnected");
        Ok(())
    }

    /// Creates a campaign in the given ad account with the user's token.
    pub async fn create_campaign(
        &self,
        user_id: Uuid,
        ad_account_id: &str,
        campaign: &MetaCampaignData,
    ) -> AppResult<CreatedObject> {
        let user = self.users.get(user_id).await?;
        let token = access_token(&user)?;
        self.graph
            .create_campaign(token, ad_account_id, campaign)
            .await
            .map_err(|e| {
                // The caller adds its own context to the raw Graph message.
                warn!(ad_account_id, error = %e, "Meta campaign create failed");
                AppError::Upstream(e.to_string())
            })
    }
}

fn access_token(user: &User) -> AppResult<&str> {
    user.meta_access_token
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Configuration(NOT_CONNECTED.to_string()))
}

fn upstream(context: &str, err: FacebookApiError) -> AppError {
    warn!(error = %err, "{context}");
    AppError::Upstream(format!("{context}: {err}"))
}


#[cfg(test)]
mod tests {
    use super::testing::FakeGraph;
    use super::*;
    use crate::memory::MemoryStore;
    use crate::store::NewUser;

    async fn setup() -> (MetaService, UsersService, Arc<FakeGraph>, Uuid) {
        let users = UsersService::new(Arc::new(MemoryStore::new()));
        let user = users
            .create(NewUser {
                email: "a@example.com".to_string(),
                password_hash: "hash".to_string(),
                name: None,
            })
            .await
            .unwrap();
        let graph = Arc::new(FakeGraph::default());
        let meta = MetaService::new(
            graph.clone(),
            users.clone(),
            "app-123".to_string(),
            "https://www.facebook.com".to_string(),
        );
        (meta, users, graph, user.id)
    }

    #[tokio::test]
    async fn connect_stores_long_lived_token_and_meta_user() {
        let (meta, users, _graph, user_id) = setup().await;
        let status = meta
            .connect(user_id, "abc", "http://localhost:3000/cb")
            .await
            .unwrap();
        assert!(status.connected);
        assert_eq!(status.user.unwrap().name, "Ada Marketer");

        let user = users.get(user_id).await.unwrap();
        assert_eq!(user.meta_access_token.as_deref(), Some("long-abc"));
        assert_eq!(user.meta_user_id.as_deref(), Some("10158000000000001"));
    }

    #[tokio::test]
    async fn failed_code_exchange_stores_nothing() {
        let (meta, users, _graph, user_id) = setup().await;
        let err = meta
            .connect(user_id, "bad-code", "http://localhost:3000/cb")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream(ref m) if m.contains("expired")));
        assert!(users.get(user_id).await.unwrap().meta_access_token.is_none());
    }

    #[tokio::test]
    async fn status_reports_rejected_token() {
        let (meta, _users, graph, user_id) = setup().await;
        meta.connect(user_id, "abc", "http://localhost/cb").await.unwrap();
        *graph.reject_token.lock().unwrap() = true;

        let status = meta.connection_status(user_id).await.unwrap();
        assert!(!status.connected);
        assert_eq!(status.error.as_deref(), Some("Error validating access token"));
    }

    #[tokio::test]
    async fn ad_accounts_require_connection() {
        let (meta, _users, _graph, user_id) = setup().await;
        let err = meta.get_ad_accounts(user_id).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));

        meta.connect(user_id, "abc", "http://localhost/cb").await.unwrap();
        let accounts = meta.get_ad_accounts(user_id).await.unwrap();
        assert_eq!(accounts[0].id, "act_42");
    }

    #[tokio::test]
    async fn selected_account_is_normalized_and_disconnect_clears_it() {
        let (meta, users, _graph, user_id) = setup().await;
        meta.connect(user_id, "abc", "http://localhost/cb").await.unwrap();

        let profile = meta.select_ad_account(user_id, "42").await.unwrap();
        assert_eq!(profile.meta_ad_account_id.as_deref(), Some("act_42"));

        meta.disconnect(user_id).await.unwrap();
        let user = users.get(user_id).await.unwrap();
        assert!(user.meta_access_token.is_none());
        assert!(user.meta_ad_account_id.is_none());
        assert!(!meta.connection_status(user_id).await.unwrap().connected);
    }

    #[test]
    fn auth_url_rejects_relative_redirect() {
        let users = UsersService::new(Arc::new(MemoryStore::new()));
        let meta = MetaService::new(
            Arc::new(FakeGraph::default()),
            users,
            "app-123".to_string(),
            "https://www.facebook.com".to_string(),
        );
        assert!(meta.auth_url("/dashboard/settings").is_err());
        let url = meta.auth_url("http://localhost:3000/cb").unwrap();
        assert!(url.starts_with("https://www.facebook.com/v20.0/dialog/oauth?client_id=app-123"));
    }
}
