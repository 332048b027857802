use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{User, UserProfile};
use crate::store::{MetaIntegrationUpdate, NewUser, Store};

/// Users and the Meta credentials stored on them.
#[derive(Clone)]
pub struct UsersService {
    store: Arc<dyn Store>,
}

impl UsersService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn find_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        Ok(self.store.find_user_by_id(id).await?)
    }

    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.store.find_user_by_email(email).await?)
    }

    /// Like [`find_by_id`](Self::find_by_id) but a missing user is an error.
    pub async fn get(&self, id: Uuid) -> AppResult<User> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn create(&self, user: NewUser) -> AppResult<User> {
        let user = self.store.insert_user(user).await?;
        info!(user_id = %user.id, "user created");
        Ok(user)
    }

    pub async fn profile(&self, id: Uuid) -> AppResult<UserProfile> {
        Ok(UserProfile::from(&self.get(id).await?))
    }

    pub async fn update_meta_integration(
        &self,
        user_id: Uuid,
        update: MetaIntegrationUpdate,
    ) -> AppResult<User> {
        self.store
            .update_meta_integration(user_id, &update)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn clear_meta_integration(&self, user_id: Uuid) -> AppResult<User> {
        self.store
            .clear_meta_integration(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[tokio::test]
    async fn meta_update_only_touches_given_fields() {
        let users = UsersService::new(Arc::new(MemoryStore::new()));
        let user = users
            .create(NewUser {
                email: "a@example.com".to_string(),
                password_hash: "hash".to_string(),
                name: Some("Ada".to_string()),
            })
            .await
            .unwrap();

        users
            .update_meta_integration(
                user.id,
                MetaIntegrationUpdate {
                    access_token: Some("token".to_string()),
                    meta_user_id: Some("10001".to_string()),
                    ad_account_id: None,
                },
            )
            .await
            .unwrap();
        let updated = users
            .update_meta_integration(
                user.id,
                MetaIntegrationUpdate {
                    ad_account_id: Some("act_42".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.meta_access_token.as_deref(), Some("token"));
        assert_eq!(updated.meta_user_id.as_deref(), Some("10001"));
        assert_eq!(updated.meta_ad_account_id.as_deref(), Some("act_42"));
        assert_eq!(updated.name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn profile_hides_token() {
        let users = UsersService::new(Arc::new(MemoryStore::new()));
        let user = users
            .create(NewUser {
                email: "a@example.com".to_string(),
                password_hash: "hash".to_string(),
                name: None,
            })
            .await
            .unwrap();
        users
            .update_meta_integration(
                user.id,
                MetaIntegrationUpdate {
                    access_token: Some("secret-token".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let profile = users.profile(user.id).await.unwrap();
        assert!(profile.meta_connected);
        let json = serde_json::to_string(&profile).unwrap();
        assert!(!json.contains("secret-token"));
        assert!(!json.contains("hash"));
    }

    #[tokio::test]
    async fn missing_user_is_not_found() {
        let users = UsersService::new(Arc::new(MemoryStore::new()));
        let err = users.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
