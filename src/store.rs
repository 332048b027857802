//! Persistence seam shared by the Postgres [`Database`](crate::db::Database)
//! and the in-process [`MemoryStore`](crate::memory::MemoryStore).
//!
//! Every campaign-scoped lookup takes the owning user id, so ownership is
//! enforced by the query itself rather than by a check after the fact.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Ad, AdCopy, AdCreative, AdSet, Campaign, CampaignObjective, CreativeType, UnknownVariant, User,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),
    #[error("Corrupt row: {0}")]
    CorruptRow(#[from] UnknownVariant),
    #[error("Row not found: {0}")]
    Missing(String),
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
}

/// Field-level Meta credential update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct MetaIntegrationUpdate {
    pub access_token: Option<String>,
    pub meta_user_id: Option<String>,
    pub ad_account_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewCampaign {
    pub user_id: Uuid,
    pub name: String,
    pub objective: CampaignObjective,
    pub budget: Option<f64>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAdSet {
    pub campaign_id: Uuid,
    pub name: String,
    pub targeting_options: Option<serde_json::Value>,
    pub budget: Option<f64>,
    pub bid_strategy: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAd {
    pub ad_set_id: Uuid,
    pub name: String,
    pub ad_copy_id: Option<Uuid>,
    pub ad_creative_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewAdCopy {
    pub user_id: Uuid,
    pub campaign_id: Option<Uuid>,
    pub headline: String,
    pub primary_text: String,
    pub description: Option<String>,
    pub call_to_action: Option<String>,
    pub prompt: Option<String>,
    pub ai_model: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct NewAdCreative {
    pub user_id: Uuid,
    pub creative_type: CreativeType,
    pub image_url: Option<String>,
    pub video_url: Option<String>,
    pub prompt: Option<String>,
    pub ai_model: Option<String>,
    pub style: Option<String>,
}

/// Result of trying to move a campaign from `UNPUBLISHED` to `PUBLISHING`.
#[derive(Debug, Clone, PartialEq)]
pub enum PublishClaim {
    /// The caller now holds the campaign; the returned row is already in
    /// `PUBLISHING`.
    Claimed(Campaign),
    NotFound,
    AlreadyPublished,
    InProgress,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn update_meta_integration(
        &self,
        user_id: Uuid,
        update: &MetaIntegrationUpdate,
    ) -> Result<Option<User>, StoreError>;
    async fn clear_meta_integration(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    async fn insert_campaign(&self, campaign: NewCampaign) -> Result<Campaign, StoreError>;
    async fn find_campaign(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<Campaign>, StoreError>;
    /// Campaigns owned by `user_id`, newest first.
    async fn list_campaigns(&self, user_id: Uuid) -> Result<Vec<Campaign>, StoreError>;
    /// Deletes the campaign with its ad sets and their ads. Returns `false`
    /// when no such campaign is owned by `user_id`.
    async fn delete_campaign(&self, user_id: Uuid, campaign_id: Uuid) -> Result<bool, StoreError>;

    /// Atomically claims an unpublished campaign for publication. A
    /// `PUBLISHING` claim older than `stale_after` is taken over, so a holder
    /// that died between claim and completion cannot lock the campaign.
    async fn claim_campaign_for_publish(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
        stale_after: Duration,
    ) -> Result<PublishClaim, StoreError>;
    /// Records the Meta id of a claimed campaign and marks it published.
    async fn complete_campaign_publish(
        &self,
        campaign_id: Uuid,
        meta_campaign_id: &str,
    ) -> Result<Campaign, StoreError>;
    /// Hands a claimed campaign back to `UNPUBLISHED` after a failed attempt.
    async fn release_campaign_publish(&self, campaign_id: Uuid) -> Result<(), StoreError>;

    async fn insert_ad_set(&self, ad_set: NewAdSet) -> Result<AdSet, StoreError>;
    /// Looks up an ad set together with the id of the user owning its
    /// campaign.
    async fn find_ad_set(&self, ad_set_id: Uuid) -> Result<Option<(AdSet, Uuid)>, StoreError>;
    /// Ad sets of the given campaigns, oldest first.
    async fn list_ad_sets(&self, campaign_ids: &[Uuid]) -> Result<Vec<AdSet>, StoreError>;

    async fn insert_ad(&self, ad: NewAd) -> Result<Ad, StoreError>;
    /// Ads of the given ad sets, oldest first.
    async fn list_ads(&self, ad_set_ids: &[Uuid]) -> Result<Vec<Ad>, StoreError>;

    async fn insert_ad_copy(&self, copy: NewAdCopy) -> Result<AdCopy, StoreError>;
    async fn find_ad_copies(&self, ids: &[Uuid]) -> Result<Vec<AdCopy>, StoreError>;
    /// Copies owned by `user_id`, newest first.
    async fn list_ad_copies(&self, user_id: Uuid) -> Result<Vec<AdCopy>, StoreError>;

    async fn insert_ad_creative(&self, creative: NewAdCreative) -> Result<AdCreative, StoreError>;
    async fn find_ad_creatives(&self, ids: &[Uuid]) -> Result<Vec<AdCreative>, StoreError>;
    /// Creatives owned by `user_id`, newest first.
    async fn list_ad_creatives(&self, user_id: Uuid) -> Result<Vec<AdCreative>, StoreError>;
}
