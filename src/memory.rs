//! In-process [`Store`] used by the test suites and for running the API
//! without a database. Cascades are done by hand to match the foreign keys
//! in `schema.sql`.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    Ad, AdCopy, AdCreative, AdSet, AdSetStatus, AdStatus, Campaign, CampaignStatus, PublishState,
    User,
};
use crate::store::{
    MetaIntegrationUpdate, NewAd, NewAdCopy, NewAdCreative, NewAdSet, NewCampaign, NewUser,
    PublishClaim, Store, StoreError,
};

/// A stored row plus its insertion sequence, used to break `created_at` ties.
struct Entry<T> {
    seq: u64,
    row: T,
}

#[derive(Default)]
struct Tables {
    next_seq: u64,
    users: HashMap<Uuid, Entry<User>>,
    campaigns: HashMap<Uuid, Entry<Campaign>>,
    ad_sets: HashMap<Uuid, Entry<AdSet>>,
    ads: HashMap<Uuid, Entry<Ad>>,
    ad_copies: HashMap<Uuid, Entry<AdCopy>>,
    ad_creatives: HashMap<Uuid, Entry<AdCreative>>,
}

impl Tables {
    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}

fn newest_first<T: Clone>(mut entries: Vec<&Entry<T>>) -> Vec<T> {
    entries.sort_by(|a, b| b.seq.cmp(&a.seq));
    entries.into_iter().map(|e| e.row.clone()).collect()
}

fn oldest_first<T: Clone>(mut entries: Vec<&Entry<T>>) -> Vec<T> {
    entries.sort_by_key(|e| e.seq);
    entries.into_iter().map(|e| e.row.clone()).collect()
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut t = self.tables.write().await;
        if t.users.values().any(|e| e.row.email == user.email) {
            return Err(StoreError::DuplicateEmail(user.email));
        }
        let now = Utc::now();
        let row = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            meta_access_token: None,
            meta_user_id: None,
            meta_ad_account_id: None,
            created_at: now,
            updated_at: now,
        };
        let seq = t.seq();
        t.users.insert(row.id, Entry { seq, row: row.clone() });
        Ok(row)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.users.get(&id).map(|e| e.row.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let t = self.tables.read().await;
        Ok(t
            .users
            .values()
            .find(|e| e.row.email == email)
            .map(|e| e.row.clone()))
    }

    async fn update_meta_integration(
        &self,
        user_id: Uuid,
        update: &MetaIntegrationUpdate,
    ) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(entry) = t.users.get_mut(&user_id) else {
            return Ok(None);
        };
        let user = &mut entry.row;
        if let Some(token) = &update.access_token {
            user.meta_access_token = Some(token.clone());
        }
        if let Some(meta_user_id) = &update.meta_user_id {
            user.meta_user_id = Some(meta_user_id.clone());
        }
        if let Some(account) = &update.ad_account_id {
            user.meta_ad_account_id = Some(account.clone());
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn clear_meta_integration(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let mut t = self.tables.write().await;
        let Some(entry) = t.users.get_mut(&user_id) else {
            return Ok(None);
        };
        let user = &mut entry.row;
        user.meta_access_token = None;
        user.meta_user_id = None;
        user.meta_ad_account_id = None;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn insert_campaign(&self, campaign: NewCampaign) -> Result<Campaign, StoreError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let row = Campaign {
            id: Uuid::new_v4(),
            name: campaign.name,
            objective: campaign.objective,
            status: CampaignStatus::Draft,
            publish_state: PublishState::Unpublished,
            publish_claimed_at: None,
            budget: campaign.budget,
            start_date: campaign.start_date,
            end_date: campaign.end_date,
            meta_campaign_id: None,
            user_id: campaign.user_id,
            created_at: now,
            updated_at: now,
        };
        let seq = t.seq();
        t.campaigns.insert(row.id, Entry { seq, row: row.clone() });
        Ok(row)
    }

    async fn find_campaign(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<Campaign>, StoreError> {
        let t = self.tables.read().await;
        Ok(t
            .campaigns
            .get(&campaign_id)
            .filter(|e| e.row.user_id == user_id)
            .map(|e| e.row.clone()))
    }

    async fn list_campaigns(&self, user_id: Uuid) -> Result<Vec<Campaign>, StoreError> {
        let t = self.tables.read().await;
        Ok(newest_first(
            t.campaigns.values().filter(|e| e.row.user_id == user_id).collect(),
        ))
    }

    async fn delete_campaign(&self, user_id: Uuid, campaign_id: Uuid) -> Result<bool, StoreError> {
        let mut t = self.tables.write().await;
        let owned = t
            .campaigns
            .get(&campaign_id)
            .is_some_and(|e| e.row.user_id == user_id);
        if !owned {
            return Ok(false);
        }
        t.campaigns.remove(&campaign_id);

        let ad_set_ids: Vec<Uuid> = t
            .ad_sets
            .values()
            .filter(|e| e.row.campaign_id == campaign_id)
            .map(|e| e.row.id)
            .collect();
        for id in &ad_set_ids {
            t.ad_sets.remove(id);
        }
        t.ads.retain(|_, e| !ad_set_ids.contains(&e.row.ad_set_id));

        for entry in t.ad_copies.values_mut() {
            if entry.row.campaign_id == Some(campaign_id) {
                entry.row.campaign_id = None;
            }
        }
        Ok(true)
    }

    async fn claim_campaign_for_publish(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
        stale_after: Duration,
    ) -> Result<PublishClaim, StoreError> {
        let mut t = self.tables.write().await;
        let Some(entry) = t
            .campaigns
            .get_mut(&campaign_id)
            .filter(|e| e.row.user_id == user_id)
        else {
            return Ok(PublishClaim::NotFound);
        };
        let campaign = &mut entry.row;
        if campaign.meta_campaign_id.is_some() || campaign.publish_state == PublishState::Published {
            return Ok(PublishClaim::AlreadyPublished);
        }
        let now = Utc::now();
        if campaign.publish_state == PublishState::Publishing {
            let stale = campaign.publish_claimed_at.map_or(true, |at| {
                chrono::Duration::from_std(stale_after).map_or(false, |ttl| at + ttl <= now)
            });
            if !stale {
                return Ok(PublishClaim::InProgress);
            }
        }
        campaign.publish_state = PublishState::Publishing;
        campaign.publish_claimed_at = Some(now);
        Ok(PublishClaim::Claimed(campaign.clone()))
    }

    async fn complete_campaign_publish(
        &self,
        campaign_id: Uuid,
        meta_campaign_id: &str,
    ) -> Result<Campaign, StoreError> {
        let mut t = self.tables.write().await;
        let campaign = t
            .campaigns
            .get_mut(&campaign_id)
            .map(|e| &mut e.row)
            .filter(|c| c.publish_state == PublishState::Publishing && c.meta_campaign_id.is_none())
            .ok_or_else(|| StoreError::Missing(format!("publishing campaign {campaign_id}")))?;
        campaign.meta_campaign_id = Some(meta_campaign_id.to_string());
        campaign.publish_state = PublishState::Published;
        campaign.publish_claimed_at = None;
        campaign.status = CampaignStatus::Paused;
        campaign.updated_at = Utc::now();
        Ok(campaign.clone())
    }

    async fn release_campaign_publish(&self, campaign_id: Uuid) -> Result<(), StoreError> {
        let mut t = self.tables.write().await;
        if let Some(entry) = t.campaigns.get_mut(&campaign_id) {
            if entry.row.publish_state == PublishState::Publishing {
                entry.row.publish_state = PublishState::Unpublished;
                entry.row.publish_claimed_at = None;
            }
        }
        Ok(())
    }

    async fn insert_ad_set(&self, ad_set: NewAdSet) -> Result<AdSet, StoreError> {
        let mut t = self.tables.write().await;
        if !t.campaigns.contains_key(&ad_set.campaign_id) {
            return Err(StoreError::Missing(format!("campaign {}", ad_set.campaign_id)));
        }
        let now = Utc::now();
        let row = AdSet {
            id: Uuid::new_v4(),
            name: ad_set.name,
            targeting_options: ad_set.targeting_options,
            budget: ad_set.budget,
            bid_strategy: ad_set.bid_strategy,
            status: AdSetStatus::Draft,
            meta_ad_set_id: None,
            campaign_id: ad_set.campaign_id,
            created_at: now,
            updated_at: now,
        };
        let seq = t.seq();
        t.ad_sets.insert(row.id, Entry { seq, row: row.clone() });
        Ok(row)
    }

    async fn find_ad_set(&self, ad_set_id: Uuid) -> Result<Option<(AdSet, Uuid)>, StoreError> {
        let t = self.tables.read().await;
        Ok(t.ad_sets.get(&ad_set_id).and_then(|e| {
            t.campaigns
                .get(&e.row.campaign_id)
                .map(|c| (e.row.clone(), c.row.user_id))
        }))
    }

    async fn list_ad_sets(&self, campaign_ids: &[Uuid]) -> Result<Vec<AdSet>, StoreError> {
        let t = self.tables.read().await;
        Ok(oldest_first(
            t.ad_sets
                .values()
                .filter(|e| campaign_ids.contains(&e.row.campaign_id))
                .collect(),
        ))
    }

    async fn insert_ad(&self, ad: NewAd) -> Result<Ad, StoreError> {
        let mut t = self.tables.write().await;
        if !t.ad_sets.contains_key(&ad.ad_set_id) {
            return Err(StoreError::Missing(format!("ad set {}", ad.ad_set_id)));
        }
        let now = Utc::now();
        let row = Ad {
            id: Uuid::new_v4(),
            name: ad.name,
            status: AdStatus::Draft,
            meta_ad_id: None,
            ad_set_id: ad.ad_set_id,
            ad_copy_id: ad.ad_copy_id,
            ad_creative_id: ad.ad_creative_id,
            created_at: now,
            updated_at: now,
        };
        let seq = t.seq();
        t.ads.insert(row.id, Entry { seq, row: row.clone() });
        Ok(row)
    }

    async fn list_ads(&self, ad_set_ids: &[Uuid]) -> Result<Vec<Ad>, StoreError> {
        let t = self.tables.read().await;
        Ok(oldest_first(
            t.ads
                .values()
                .filter(|e| ad_set_ids.contains(&e.row.ad_set_id))
                .collect(),
        ))
    }

    async fn insert_ad_copy(&self, copy: NewAdCopy) -> Result<AdCopy, StoreError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let row = AdCopy {
            id: Uuid::new_v4(),
            headline: copy.headline,
            primary_text: copy.primary_text,
            description: copy.description,
            call_to_action: copy.call_to_action,
            prompt: copy.prompt,
            ai_model: copy.ai_model,
            temperature: copy.temperature,
            user_id: copy.user_id,
            campaign_id: copy.campaign_id,
            created_at: now,
            updated_at: now,
        };
        let seq = t.seq();
        t.ad_copies.insert(row.id, Entry { seq, row: row.clone() });
        Ok(row)
    }

    async fn find_ad_copies(&self, ids: &[Uuid]) -> Result<Vec<AdCopy>, StoreError> {
        let t = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| t.ad_copies.get(id).map(|e| e.row.clone()))
            .collect())
    }

    async fn list_ad_copies(&self, user_id: Uuid) -> Result<Vec<AdCopy>, StoreError> {
        let t = self.tables.read().await;
        Ok(newest_first(
            t.ad_copies.values().filter(|e| e.row.user_id == user_id).collect(),
        ))
    }

    async fn insert_ad_creative(&self, creative: NewAdCreative) -> Result<AdCreative, StoreError> {
        let mut t = self.tables.write().await;
        let now = Utc::now();
        let row = AdCreative {
            id: Uuid::new_v4(),
            creative_type: creative.creative_type,
            image_url: creative.image_url,
            video_url: creative.video_url,
            prompt: creative.prompt,
            ai_model: creative.ai_model,
            style: creative.style,
            user_id: creative.user_id,
            created_at: now,
            updated_at: now,
        };
        let seq = t.seq();
        t.ad_creatives.insert(row.id, Entry { seq, row: row.clone() });
        Ok(row)
    }

    async fn find_ad_creatives(&self, ids: &[Uuid]) -> Result<Vec<AdCreative>, StoreError> {
        let t = self.tables.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| t.ad_creatives.get(id).map(|e| e.row.clone()))
            .collect())
    }

    async fn list_ad_creatives(&self, user_id: Uuid) -> Result<Vec<AdCreative>, StoreError> {
        let t = self.tables.read().await;
        Ok(newest_first(
            t.ad_creatives.values().filter(|e| e.row.user_id == user_id).collect(),
        ))
    }
}
