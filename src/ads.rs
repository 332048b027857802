//! Campaign hierarchy management and one-time publication to Meta.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::constants::{FB_INITIAL_CAMPAIGN_STATUS, MAX_BUDGET};
use crate::error::{AppError, AppResult};
use crate::facebook::{MetaAdAccount, MetaCampaignData};
use crate::meta::MetaService;
use crate::models::{
    Ad, AdDetails, AdSet, AdSetDetails, Campaign, CampaignDetails, CampaignObjective,
};
use crate::store::{NewAd, NewAdSet, NewCampaign, PublishClaim, Store};
use crate::users::UsersService;

const CAMPAIGN_NOT_FOUND: &str = "Campaign not found";
const ALREADY_PUBLISHED: &str = "Campaign is already published to Meta";
const META_NOT_CONFIGURED: &str =
    "Meta integration not configured. Please connect your Meta account and select an ad account.";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCampaignRequest {
    pub name: String,
    pub objective: CampaignObjective,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdSetRequest {
    pub campaign_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub targeting_options: Option<serde_json::Value>,
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub bid_strategy: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdRequest {
    pub ad_set_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub ad_copy_id: Option<Uuid>,
    #[serde(default)]
    pub ad_creative_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublishResult {
    #[serde(flatten)]
    pub campaign: CampaignDetails,
    pub message: String,
}

#[derive(Clone)]
pub struct AdsService {
    store: Arc<dyn Store>,
    users: UsersService,
    meta: MetaService,
    claim_ttl: Duration,
}

impl AdsService {
    /// `claim_ttl` is how long a publish claim is honoured before another
    /// request may take it over. Keep it above the upstream timeout.
    pub fn new(
        store: Arc<dyn Store>,
        users: UsersService,
        meta: MetaService,
        claim_ttl: Duration,
    ) -> Self {
        Self {
            store,
            users,
            meta,
            claim_ttl,
        }
    }

    pub async fn create_campaign(
        &self,
        user_id: Uuid,
        request: CreateCampaignRequest,
    ) -> AppResult<Campaign> {
        let name = required_name(&request.name, "Campaign name")?;
        let budget = non_negative_budget(request.budget)?;
        let start_date = parse_date("startDate", request.start_date.as_deref())?;
        let end_date = parse_date("endDate", request.end_date.as_deref())?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if end < start {
                return Err(AppError::Validation(
                    "endDate must not be before startDate".to_string(),
                ));
            }
        }

        let campaign = self
            .store
            .insert_campaign(NewCampaign {
                user_id,
                name,
                objective: request.objective,
                budget,
                start_date,
                end_date,
            })
            .await?;
        info!(user_id = %user_id, campaign_id = %campaign.id, "campaign created");
        Ok(campaign)
    }

    pub async fn create_ad_set(&self, user_id: Uuid, request: CreateAdSetRequest) -> AppResult<AdSet> {
        let name = required_name(&request.name, "Ad set name")?;
        let budget = non_negative_budget(request.budget)?;
        self.owned_campaign(user_id, request.campaign_id).await?;

        let ad_set = self
            .store
            .insert_ad_set(NewAdSet {
                campaign_id: request.campaign_id,
                name,
                targeting_options: request.targeting_options,
                budget,
                bid_strategy: request.bid_strategy.filter(|s| !s.trim().is_empty()),
            })
            .await?;
        info!(campaign_id = %ad_set.campaign_id, ad_set_id = %ad_set.id, "ad set created");
        Ok(ad_set)
    }

    pub async fn create_ad(&self, user_id: Uuid, request: CreateAdRequest) -> AppResult<Ad> {
        let name = required_name(&request.name, "Ad name")?;
        match self.store.find_ad_set(request.ad_set_id).await? {
            Some((_, owner)) if owner == user_id => {}
            _ => return Err(AppError::NotFound("Ad set not found".to_string())),
        }

        if let Some(copy_id) = request.ad_copy_id {
            let copies = self.store.find_ad_copies(&[copy_id]).await?;
            if !copies.iter().any(|c| c.user_id == user_id) {
                return Err(AppError::NotFound("Ad copy not found".to_string()));
            }
        }
        if let Some(creative_id) = request.ad_creative_id {
            let creatives = self.store.find_ad_creatives(&[creative_id]).await?;
            if !creatives.iter().any(|c| c.user_id == user_id) {
                return Err(AppError::NotFound("Ad creative not found".to_string()));
            }
        }

        let ad = self
            .store
            .insert_ad(NewAd {
                ad_set_id: request.ad_set_id,
                name,
                ad_copy_id: request.ad_copy_id,
                ad_creative_id: request.ad_creative_id,
            })
            .await?;
        info!(ad_set_id = %ad.ad_set_id, ad_id = %ad.id, "ad created");
        Ok(ad)
    }

    pub async fn get_campaigns(&self, user_id: Uuid) -> AppResult<Vec<CampaignDetails>> {
        let campaigns = self.store.list_campaigns(user_id).await?;
        self.load_details(campaigns).await
    }

    pub async fn get_campaign_by_id(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
    ) -> AppResult<CampaignDetails> {
        let campaign = self.owned_campaign(user_id, campaign_id).await?;
        self.single_details(campaign).await
    }

    pub async fn delete_campaign(&self, user_id: Uuid, campaign_id: Uuid) -> AppResult<()> {
        if !self.store.delete_campaign(user_id, campaign_id).await? {
            return Err(AppError::NotFound(CAMPAIGN_NOT_FOUND.to_string()));
        }
        info!(user_id = %user_id, campaign_id = %campaign_id, "campaign deleted");
        Ok(())
    }

    /// Creates the campaign on Meta in a paused state and records its id.
    ///
    /// The campaign is claimed before the remote call, so a concurrent second
    /// publish fails with a conflict instead of creating a duplicate. A failed
    /// remote call hands the claim back and leaves the row as it was. If the
    /// hand-back itself fails the error is internal, and the claim lapses
    /// after `claim_ttl`.
    pub async fn publish_campaign_to_meta(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
    ) -> AppResult<PublishResult> {
        let campaign = self.owned_campaign(user_id, campaign_id).await?;
        if campaign.meta_campaign_id.is_some() {
            return Err(AppError::Conflict(ALREADY_PUBLISHED.to_string()));
        }

        let user = self.users.get(user_id).await?;
        let ad_account_id = match (&user.meta_ad_account_id, user.has_meta_token()) {
            (Some(account), true) if !account.is_empty() => account.clone(),
            _ => return Err(AppError::Configuration(META_NOT_CONFIGURED.to_string())),
        };

        let campaign = match self
            .store
            .claim_campaign_for_publish(user_id, campaign_id, self.claim_ttl)
            .await?
        {
            PublishClaim::Claimed(campaign) => campaign,
            PublishClaim::NotFound => {
                return Err(AppError::NotFound(CAMPAIGN_NOT_FOUND.to_string()))
            }
            PublishClaim::AlreadyPublished => {
                return Err(AppError::Conflict(ALREADY_PUBLISHED.to_string()))
            }
            PublishClaim::InProgress => {
                return Err(AppError::Conflict(
                    "Campaign is already being published to Meta".to_string(),
                ))
            }
        };

        let remote = MetaCampaignData {
            name: campaign.name.clone(),
            objective: campaign.objective.as_str().to_string(),
            status: FB_INITIAL_CAMPAIGN_STATUS.to_string(),
        };
        let created = match self.meta.create_campaign(user_id, &ad_account_id, &remote).await {
            Ok(created) => created,
            Err(err) => {
                warn!(campaign_id = %campaign_id, error = %err, "publish to Meta failed");
                if let Err(release) = self.store.release_campaign_publish(campaign_id).await {
                    error!(campaign_id = %campaign_id, error = %release, "failed to release publish claim");
                    return Err(AppError::Internal(format!(
                        "releasing publish claim on campaign {campaign_id}: {release}"
                    )));
                }
                return Err(match err {
                    AppError::Upstream(message) => AppError::Upstream(format!(
                        "Failed to publish campaign to Meta: {message}"
                    )),
                    other => other,
                });
            }
        };

        let campaign = self
            .store
            .complete_campaign_publish(campaign_id, &created.id)
            .await?;
        info!(
            campaign_id = %campaign.id,
            meta_campaign_id = %created.id,
            ad_account_id = %ad_account_id,
            "campaign published to Meta"
        );

        Ok(PublishResult {
            campaign: self.single_details(campaign).await?,
            message: "Campaign published to Meta successfully".to_string(),
        })
    }

    pub async fn get_meta_ad_accounts(&self, user_id: Uuid) -> AppResult<Vec<MetaAdAccount>> {
        self.meta.get_ad_accounts(user_id).await
    }

    async fn owned_campaign(&self, user_id: Uuid, campaign_id: Uuid) -> AppResult<Campaign> {
        self.store
            .find_campaign(user_id, campaign_id)
            .await?
            .ok_or_else(|| AppError::NotFound(CAMPAIGN_NOT_FOUND.to_string()))
    }

    async fn single_details(&self, campaign: Campaign) -> AppResult<CampaignDetails> {
        self.load_details(vec![campaign])
            .await?
            .pop()
            .ok_or_else(|| AppError::Internal("campaign details went missing".to_string()))
    }

    /// Attaches ad sets, ads and their copy/creative, keeping campaign order.
    async fn load_details(&self, campaigns: Vec<Campaign>) -> AppResult<Vec<CampaignDetails>> {
        if campaigns.is_empty() {
            return Ok(Vec::new());
        }

        let campaign_ids: Vec<Uuid> = campaigns.iter().map(|c| c.id).collect();
        let ad_sets = self.store.list_ad_sets(&campaign_ids).await?;
        let ad_set_ids: Vec<Uuid> = ad_sets.iter().map(|s| s.id).collect();
        let ads = if ad_set_ids.is_empty() {
            Vec::new()
        } else {
            self.store.list_ads(&ad_set_ids).await?
        };

        let copy_ids: Vec<Uuid> = ads.iter().filter_map(|a| a.ad_copy_id).collect();
        let creative_ids: Vec<Uuid> = ads.iter().filter_map(|a| a.ad_creative_id).collect();
        let mut copies: HashMap<Uuid, _> = HashMap::new();
        if !copy_ids.is_empty() {
            for copy in self.store.find_ad_copies(&copy_ids).await? {
                copies.insert(copy.id, copy);
            }
        }
        let mut creatives: HashMap<Uuid, _> = HashMap::new();
        if !creative_ids.is_empty() {
            for creative in self.store.find_ad_creatives(&creative_ids).await? {
                creatives.insert(creative.id, creative);
            }
        }

        let mut ads_by_set: HashMap<Uuid, Vec<AdDetails>> = HashMap::new();
        for ad in ads {
            let details = AdDetails {
                ad_copy: ad.ad_copy_id.and_then(|id| copies.get(&id).cloned()),
                ad_creative: ad.ad_creative_id.and_then(|id| creatives.get(&id).cloned()),
                ad,
            };
            ads_by_set.entry(details.ad.ad_set_id).or_default().push(details);
        }

        let mut sets_by_campaign: HashMap<Uuid, Vec<AdSetDetails>> = HashMap::new();
        for ad_set in ad_sets {
            let ads = ads_by_set.remove(&ad_set.id).unwrap_or_default();
            sets_by_campaign
                .entry(ad_set.campaign_id)
                .or_default()
                .push(AdSetDetails { ad_set, ads });
        }

        Ok(campaigns
            .into_iter()
            .map(|campaign| CampaignDetails {
                ad_sets: sets_by_campaign.remove(&campaign.id).unwrap_or_default(),
                campaign,
            })
            .collect())
    }
}

fn required_name(name: &str, label: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{label} is required")));
    }
    Ok(name.to_string())
}

/// Budgets are stored as `NUMERIC(10, 2)`.
fn non_negative_budget(budget: Option<f64>) -> AppResult<Option<f64>> {
    match budget {
        Some(b) if !b.is_finite() || b < 0.0 => Err(AppError::Validation(
            "Budget must be a non-negative number".to_string(),
        )),
        Some(b) if b >= MAX_BUDGET => Err(AppError::Validation(format!(
            "Budget must be less than {MAX_BUDGET:.0}"
        ))),
        other => Ok(other),
    }
}

/// Accepts an RFC 3339 timestamp or a plain `YYYY-MM-DD` date (midnight UTC).
fn parse_date(field: &str, value: Option<&str>) -> AppResult<Option<DateTime<Utc>>> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Some(Utc.from_utc_datetime(&dt)))
        .ok_or_else(|| AppError::Validation(format!("{field} must be a date (YYYY-MM-DD or RFC 3339)")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::meta::testing::FakeGraph;
    use crate::models::{AdCopy, AdCreative, CampaignStatus, CreativeType, PublishState, User};
    use crate::store::{MetaIntegrationUpdate, NewAdCopy, NewAdCreative, NewUser, StoreError};
    use async_trait::async_trait;

    const CLAIM_TTL: Duration = Duration::from_secs(60);

    struct Harness {
        ads: AdsService,
        users: UsersService,
        store: Arc<MemoryStore>,
        graph: Arc<FakeGraph>,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        harness_over(store.clone(), store, CLAIM_TTL)
    }

    /// `backing` serves the services; `store` is the memory store underneath it.
    fn harness_over(backing: Arc<dyn Store>, store: Arc<MemoryStore>, claim_ttl: Duration) -> Harness {
        let users = UsersService::new(backing.clone());
        let graph = Arc::new(FakeGraph::default());
        let meta = MetaService::new(
            graph.clone(),
            users.clone(),
            "app-123".to_string(),
            "https://www.facebook.com".to_string(),
        );
        Harness {
            ads: AdsService::new(backing, users.clone(), meta, claim_ttl),
            users,
            store,
            graph,
        }
    }

    /// Memory store whose claim release always fails, leaving the claim held.
    struct StuckRelease(Arc<MemoryStore>);

    #[async_trait]
    impl Store for StuckRelease {
        async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
            self.0.insert_user(user).await
        }
        async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
            self.0.find_user_by_id(id).await
        }
        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
            self.0.find_user_by_email(email).await
        }
        async fn update_meta_integration(
            &self,
            user_id: Uuid,
            update: &MetaIntegrationUpdate,
        ) -> Result<Option<User>, StoreError> {
            self.0.update_meta_integration(user_id, update).await
        }
        async fn clear_meta_integration(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
            self.0.clear_meta_integration(user_id).await
        }
        async fn insert_campaign(&self, campaign: NewCampaign) -> Result<Campaign, StoreError> {
            self.0.insert_campaign(campaign).await
        }
        async fn find_campaign(
            &self,
            user_id: Uuid,
            campaign_id: Uuid,
        ) -> Result<Option<Campaign>, StoreError> {
            self.0.find_campaign(user_id, campaign_id).await
        }
        async fn list_campaigns(&self, user_id: Uuid) -> Result<Vec<Campaign>, StoreError> {
            self.0.list_campaigns(user_id).await
        }
        async fn delete_campaign(&self, user_id: Uuid, campaign_id: Uuid) -> Result<bool, StoreError> {
            self.0.delete_campaign(user_id, campaign_id).await
        }
        async fn claim_campaign_for_publish(
            &self,
            user_id: Uuid,
            campaign_id: Uuid,
            stale_after: Duration,
        ) -> Result<PublishClaim, StoreError> {
            self.0
                .claim_campaign_for_publish(user_id, campaign_id, stale_after)
                .await
        }
        async fn complete_campaign_publish(
            &self,
            campaign_id: Uuid,
            meta_campaign_id: &str,
        ) -> Result<Campaign, StoreError> {
            self.0
                .complete_campaign_publish(campaign_id, meta_campaign_id)
                .await
        }
        async fn release_campaign_publish(&self, campaign_id: Uuid) -> Result<(), StoreError> {
            Err(StoreError::Missing(format!("connection lost releasing {campaign_id}")))
        }
        async fn insert_ad_set(&self, ad_set: NewAdSet) -> Result<AdSet, StoreError> {
            self.0.insert_ad_set(ad_set).await
        }
        async fn find_ad_set(&self, ad_set_id: Uuid) -> Result<Option<(AdSet, Uuid)>, StoreError> {
            self.0.find_ad_set(ad_set_id).await
        }
        async fn list_ad_sets(&self, campaign_ids: &[Uuid]) -> Result<Vec<AdSet>, StoreError> {
            self.0.list_ad_sets(campaign_ids).await
        }
        async fn insert_ad(&self, ad: NewAd) -> Result<Ad, StoreError> {
            self.0.insert_ad(ad).await
        }
        async fn list_ads(&self, ad_set_ids: &[Uuid]) -> Result<Vec<Ad>, StoreError> {
            self.0.list_ads(ad_set_ids).await
        }
        async fn insert_ad_copy(&self, copy: NewAdCopy) -> Result<AdCopy, StoreError> {
            self.0.insert_ad_copy(copy).await
        }
        async fn find_ad_copies(&self, ids: &[Uuid]) -> Result<Vec<AdCopy>, StoreError> {
            self.0.find_ad_copies(ids).await
        }
        async fn list_ad_copies(&self, user_id: Uuid) -> Result<Vec<AdCopy>, StoreError> {
            self.0.list_ad_copies(user_id).await
        }
        async fn insert_ad_creative(&self, creative: NewAdCreative) -> Result<AdCreative, StoreError> {
            self.0.insert_ad_creative(creative).await
        }
        async fn find_ad_creatives(&self, ids: &[Uuid]) -> Result<Vec<AdCreative>, StoreError> {
            self.0.find_ad_creatives(ids).await
        }
        async fn list_ad_creatives(&self, user_id: Uuid) -> Result<Vec<AdCreative>, StoreError> {
            self.0.list_ad_creatives(user_id).await
        }
    }

    async fn user(h: &Harness, email: &str) -> Uuid {
        h.users
            .create(NewUser {
                email: email.to_string(),
                password_hash: "hash".to_string(),
                name: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn connect(h: &Harness, user_id: Uuid) {
        h.users
            .update_meta_integration(
                user_id,
                MetaIntegrationUpdate {
                    access_token: Some("long-token".to_string()),
                    meta_user_id: Some("10001".to_string()),
                    ad_account_id: Some("act_42".to_string()),
                },
            )
            .await
            .unwrap();
    }

    fn holiday_sale() -> CreateCampaignRequest {
        serde_json::from_value(serde_json::json!({
            "name": "Holiday Sale",
            "objective": "CONVERSIONS",
            "budget": 50
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn new_campaign_is_draft_and_unpublished() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();

        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert_eq!(campaign.publish_state, PublishState::Unpublished);
        assert_eq!(campaign.objective, CampaignObjective::Sales);
        assert_eq!(campaign.budget, Some(50.0));
        let json = serde_json::to_value(&campaign).unwrap();
        assert!(json.get("metaCampaignId").is_none());
    }

    #[tokio::test]
    async fn dates_accept_plain_days_and_reject_garbage() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let mut request = holiday_sale();
        request.start_date = Some("2024-12-01".to_string());
        request.end_date = Some("2024-12-31T23:59:59Z".to_string());
        let campaign = h.ads.create_campaign(owner, request.clone()).await.unwrap();
        assert_eq!(
            campaign.start_date.unwrap().to_rfc3339(),
            "2024-12-01T00:00:00+00:00"
        );

        request.end_date = Some("next week".to_string());
        let err = h.ads.create_campaign(owner, request).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn budgets_beyond_the_column_are_rejected() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let mut request = holiday_sale();
        request.budget = Some(1e9);
        let err = h.ads.create_campaign(owner, request.clone()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(ref m) if m.contains("less than 100000000")));
        assert!(h.ads.get_campaigns(owner).await.unwrap().is_empty());

        request.budget = Some(99_999_999.99);
        let campaign = h.ads.create_campaign(owner, request).await.unwrap();

        let err = h
            .ads
            .create_ad_set(
                owner,
                CreateAdSetRequest {
                    campaign_id: campaign.id,
                    name: "Whales".to_string(),
                    targeting_options: None,
                    budget: Some(MAX_BUDGET),
                    bid_strategy: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(h.store.list_ad_sets(&[campaign.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_campaign() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let intruder = user(&h, "b@example.com").await;
        connect(&h, intruder).await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();

        let fetch = h.ads.get_campaign_by_id(intruder, campaign.id).await.unwrap_err();
        assert!(matches!(fetch, AppError::NotFound(_)));

        let ad_set = h
            .ads
            .create_ad_set(
                intruder,
                CreateAdSetRequest {
                    campaign_id: campaign.id,
                    name: "Sneaky".to_string(),
                    targeting_options: None,
                    budget: None,
                    bid_strategy: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(ad_set, AppError::NotFound(_)));

        let publish = h
            .ads
            .publish_campaign_to_meta(intruder, campaign.id)
            .await
            .unwrap_err();
        assert!(matches!(publish, AppError::NotFound(_)));
        assert_eq!(h.graph.create_calls(), 0);

        let delete = h.ads.delete_campaign(intruder, campaign.id).await.unwrap_err();
        assert!(matches!(delete, AppError::NotFound(_)));
        assert_eq!(h.ads.get_campaigns(owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn intruder_cannot_add_ads_to_foreign_ad_set() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let intruder = user(&h, "b@example.com").await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();
        let ad_set = h
            .ads
            .create_ad_set(
                owner,
                CreateAdSetRequest {
                    campaign_id: campaign.id,
                    name: "Owner's set".to_string(),
                    targeting_options: None,
                    budget: None,
                    bid_strategy: None,
                },
            )
            .await
            .unwrap();

        let err = h
            .ads
            .create_ad(
                intruder,
                CreateAdRequest {
                    ad_set_id: ad_set.id,
                    name: "Injected".to_string(),
                    ad_copy_id: None,
                    ad_creative_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref m) if m == "Ad set not found"));
        assert!(h.store.list_ads(&[ad_set.id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ads_nest_under_campaign_with_copy_and_creative() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();
        let ad_set = h
            .ads
            .create_ad_set(
                owner,
                CreateAdSetRequest {
                    campaign_id: campaign.id,
                    name: "US adults".to_string(),
                    targeting_options: Some(serde_json::json!({"geo_locations": {"countries": ["US"]}})),
                    budget: Some(20.0),
                    bid_strategy: None,
                },
            )
            .await
            .unwrap();
        let copy = h
            .store
            .insert_ad_copy(NewAdCopy {
                user_id: owner,
                campaign_id: Some(campaign.id),
                headline: "50% off".to_string(),
                primary_text: "This weekend only".to_string(),
                description: None,
                call_to_action: None,
                prompt: None,
                ai_model: None,
                temperature: None,
            })
            .await
            .unwrap();
        let creative = h
            .store
            .insert_ad_creative(NewAdCreative {
                user_id: owner,
                creative_type: CreativeType::Image,
                image_url: Some("https://images.example.com/1.png".to_string()),
                video_url: None,
                prompt: None,
                ai_model: None,
                style: None,
            })
            .await
            .unwrap();
        h.ads
            .create_ad(
                owner,
                CreateAdRequest {
                    ad_set_id: ad_set.id,
                    name: "Banner".to_string(),
                    ad_copy_id: Some(copy.id),
                    ad_creative_id: Some(creative.id),
                },
            )
            .await
            .unwrap();

        let details = h.ads.get_campaign_by_id(owner, campaign.id).await.unwrap();
        assert_eq!(details.ad_sets.len(), 1);
        let ad = &details.ad_sets[0].ads[0];
        assert_eq!(ad.ad_copy.as_ref().unwrap().headline, "50% off");
        assert_eq!(ad.ad_creative.as_ref().unwrap().id, creative.id);

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["name"], "Holiday Sale");
        assert_eq!(json["adSets"][0]["ads"][0]["adCopy"]["primaryText"], "This weekend only");
    }

    #[tokio::test]
    async fn ad_cannot_reference_someone_elses_copy() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let other = user(&h, "b@example.com").await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();
        let ad_set = h
            .ads
            .create_ad_set(
                owner,
                CreateAdSetRequest {
                    campaign_id: campaign.id,
                    name: "Set".to_string(),
                    targeting_options: None,
                    budget: None,
                    bid_strategy: None,
                },
            )
            .await
            .unwrap();
        let foreign = h
            .store
            .insert_ad_copy(NewAdCopy {
                user_id: other,
                campaign_id: None,
                headline: "h".to_string(),
                primary_text: "p".to_string(),
                description: None,
                call_to_action: None,
                prompt: None,
                ai_model: None,
                temperature: None,
            })
            .await
            .unwrap();

        let err = h
            .ads
            .create_ad(
                owner,
                CreateAdRequest {
                    ad_set_id: ad_set.id,
                    name: "Ad".to_string(),
                    ad_copy_id: Some(foreign.id),
                    ad_creative_id: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn campaigns_are_listed_newest_first() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        for name in ["First", "Second", "Third"] {
            let mut request = holiday_sale();
            request.name = name.to_string();
            h.ads.create_campaign(owner, request).await.unwrap();
        }
        let names: Vec<String> = h
            .ads
            .get_campaigns(owner)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.campaign.name)
            .collect();
        assert_eq!(names, ["Third", "Second", "First"]);
    }

    #[tokio::test]
    async fn publish_without_meta_token_is_a_configuration_error() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();

        let err = h
            .ads
            .publish_campaign_to_meta(owner, campaign.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert_eq!(h.graph.create_calls(), 0);

        let after = h.ads.get_campaign_by_id(owner, campaign.id).await.unwrap();
        assert_eq!(after.campaign, campaign);
    }

    #[tokio::test]
    async fn publish_creates_paused_remote_campaign_once() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        connect(&h, owner).await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();

        let result = h
            .ads
            .publish_campaign_to_meta(owner, campaign.id)
            .await
            .unwrap();
        assert_eq!(result.message, "Campaign published to Meta successfully");
        let published = &result.campaign.campaign;
        assert!(published.meta_campaign_id.is_some());
        assert_eq!(published.publish_state, PublishState::Published);
        assert_eq!(published.status, CampaignStatus::Paused);

        let (account, sent) = h.graph.last_campaign.lock().unwrap().clone().unwrap();
        assert_eq!(account, "act_42");
        assert_eq!(sent.status, "PAUSED");
        assert_eq!(sent.objective, "OUTCOME_SALES");

        let again = h
            .ads
            .publish_campaign_to_meta(owner, campaign.id)
            .await
            .unwrap_err();
        assert!(matches!(again, AppError::Conflict(_)));
        assert_eq!(h.graph.create_calls(), 1);
    }

    #[tokio::test]
    async fn failed_publish_leaves_campaign_unchanged() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        connect(&h, owner).await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();
        *h.graph.fail_create.lock().unwrap() = Some("Invalid parameter".to_string());

        let err = h
            .ads
            .publish_campaign_to_meta(owner, campaign.id)
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::Upstream(ref m) if m == "Failed to publish campaign to Meta: Invalid parameter"),
            "{err:?}"
        );

        let after = h.ads.get_campaign_by_id(owner, campaign.id).await.unwrap();
        assert_eq!(after.campaign, campaign);

        // The released claim allows a retry.
        *h.graph.fail_create.lock().unwrap() = None;
        h.ads
            .publish_campaign_to_meta(owner, campaign.id)
            .await
            .unwrap();
        assert_eq!(h.graph.create_calls(), 2);
    }

    #[tokio::test]
    async fn concurrent_claim_blocks_second_publish() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        connect(&h, owner).await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();

        // Another request holds the claim.
        let claim = h
            .store
            .claim_campaign_for_publish(owner, campaign.id, CLAIM_TTL)
            .await
            .unwrap();
        assert!(matches!(claim, PublishClaim::Claimed(_)));

        let err = h
            .ads
            .publish_campaign_to_meta(owner, campaign.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(h.graph.create_calls(), 0);
    }

    #[tokio::test]
    async fn failed_release_is_internal_and_claim_expires() {
        let memory = Arc::new(MemoryStore::new());
        let h = harness_over(Arc::new(StuckRelease(memory.clone())), memory, Duration::ZERO);
        let owner = user(&h, "a@example.com").await;
        connect(&h, owner).await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();
        *h.graph.fail_create.lock().unwrap() = Some("Invalid parameter".to_string());

        let err = h
            .ads
            .publish_campaign_to_meta(owner, campaign.id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Internal(_)), "{err:?}");
        let stuck = h.store.find_campaign(owner, campaign.id).await.unwrap().unwrap();
        assert_eq!(stuck.publish_state, PublishState::Publishing);

        // A claim past its TTL is taken over by the next attempt.
        *h.graph.fail_create.lock().unwrap() = None;
        let result = h
            .ads
            .publish_campaign_to_meta(owner, campaign.id)
            .await
            .unwrap();
        assert_eq!(result.campaign.campaign.publish_state, PublishState::Published);
        assert_eq!(h.graph.create_calls(), 2);
    }

    #[tokio::test]
    async fn delete_removes_tree_but_keeps_copy() {
        let h = harness();
        let owner = user(&h, "a@example.com").await;
        let campaign = h.ads.create_campaign(owner, holiday_sale()).await.unwrap();
        h.ads
            .create_ad_set(
                owner,
                CreateAdSetRequest {
                    campaign_id: campaign.id,
                    name: "Set".to_string(),
                    targeting_options: None,
                    budget: None,
                    bid_strategy: None,
                },
            )
            .await
            .unwrap();
        let copy = h
            .store
            .insert_ad_copy(NewAdCopy {
                user_id: owner,
                campaign_id: Some(campaign.id),
                headline: "h".to_string(),
                primary_text: "p".to_string(),
                description: None,
                call_to_action: None,
                prompt: None,
                ai_model: None,
                temperature: None,
            })
            .await
            .unwrap();

        h.ads.delete_campaign(owner, campaign.id).await.unwrap();
        assert!(h.ads.get_campaigns(owner).await.unwrap().is_empty());
        let copies = h.store.find_ad_copies(&[copy.id]).await.unwrap();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].campaign_id, None);
    }
}
