use async_trait::async_trait;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use postgres_openssl::MakeTlsConnector;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::models::{Ad, AdCopy, AdCreative, AdSet, Campaign, PublishState, UnknownVariant, User};
use crate::store::{
    MetaIntegrationUpdate, NewAd, NewAdCopy, NewAdCreative, NewAdSet, NewCampaign, NewUser,
    PublishClaim, Store, StoreError,
};

const SCHEMA: &str = include_str!("schema.sql");

const USER_COLUMNS: &str = "id, email, password, name, meta_access_token, meta_user_id, \
     meta_ad_account_id, created_at, updated_at";

const CAMPAIGN_COLUMNS: &str = "id, name, objective::text AS objective, status::text AS status, \
     publish_state::text AS publish_state, publish_claimed_at, budget::float8 AS budget, \
     start_date, end_date, meta_campaign_id, user_id, created_at, updated_at";

const AD_SET_COLUMNS: &str = "id, name, targeting_options, budget::float8 AS budget, bid_strategy, \
     status::text AS status, meta_ad_set_id, campaign_id, created_at, updated_at";

const AD_COLUMNS: &str = "id, name, status::text AS status, meta_ad_id, ad_set_id, ad_copy_id, \
     ad_creative_id, created_at, updated_at";

const AD_COPY_COLUMNS: &str = "id, headline, primary_text, description, call_to_action, prompt, \
     ai_model, temperature::float8 AS temperature, user_id, campaign_id, created_at, updated_at";

const AD_CREATIVE_COLUMNS: &str = "id, type::text AS type, image_url, video_url, prompt, ai_model, \
     style, user_id, created_at, updated_at";

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] tokio_postgres::Error),
    #[error("SSL error: {0}")]
    SslError(#[from] openssl::error::ErrorStack),
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),
}

pub struct Database {
    client: Client,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        // Parse the connection config from URL
        let mut pg_config = Config::from_str(&config.url)
            .map_err(|e| DatabaseError::InvalidConnectionString(e.to_string()))?;
        pg_config.connect_timeout(Duration::from_secs(5));

        let client = if config.ssl {
            let mut builder = SslConnector::builder(SslMethod::tls())?;
            if config.accept_invalid_certs {
                builder.set_verify(SslVerifyMode::NONE);
            }
            let connector = MakeTlsConnector::new(builder.build());

            let (client, connection) = pg_config.connect(connector).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(error = %e, "database connection error");
                }
            });
            client
        } else {
            let (client, connection) = pg_config.connect(NoTls).await?;
            tokio::spawn(async move {
                if let Err(e) = connection.await {
                    error!(error = %e, "database connection error");
                }
            });
            client
        };

        info!(ssl = config.ssl, "connected to database");
        Ok(Self { client })
    }

    /// Applies the bundled schema. Safe to run on every start.
    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        self.client.batch_execute(SCHEMA).await?;
        info!("database schema is up to date");
        Ok(())
    }
}

fn parse<T: FromStr<Err = UnknownVariant>>(
    row: &Row,
    column: &str,
) -> Result<T, StoreError> {
    let raw: String = row.try_get(column)?;
    Ok(raw.parse()?)
}

fn user_from_row(row: &Row) -> Result<User, StoreError> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password")?,
        name: row.try_get("name")?,
        meta_access_token: row.try_get("meta_access_token")?,
        meta_user_id: row.try_get("meta_user_id")?,
        meta_ad_account_id: row.try_get("meta_ad_account_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn campaign_from_row(row: &Row) -> Result<Campaign, StoreError> {
    Ok(Campaign {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        objective: parse(row, "objective")?,
        status: parse(row, "status")?,
        publish_state: parse(row, "publish_state")?,
        publish_claimed_at: row.try_get("publish_claimed_at")?,
        budget: row.try_get("budget")?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        meta_campaign_id: row.try_get("meta_campaign_id")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ad_set_from_row(row: &Row) -> Result<AdSet, StoreError> {
    Ok(AdSet {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        targeting_options: row.try_get("targeting_options")?,
        budget: row.try_get("budget")?,
        bid_strategy: row.try_get("bid_strategy")?,
        status: parse(row, "status")?,
        meta_ad_set_id: row.try_get("meta_ad_set_id")?,
        campaign_id: row.try_get("campaign_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ad_from_row(row: &Row) -> Result<Ad, StoreError> {
    Ok(Ad {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        status: parse(row, "status")?,
        meta_ad_id: row.try_get("meta_ad_id")?,
        ad_set_id: row.try_get("ad_set_id")?,
        ad_copy_id: row.try_get("ad_copy_id")?,
        ad_creative_id: row.try_get("ad_creative_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ad_copy_from_row(row: &Row) -> Result<AdCopy, StoreError> {
    Ok(AdCopy {
        id: row.try_get("id")?,
        headline: row.try_get("headline")?,
        primary_text: row.try_get("primary_text")?,
        description: row.try_get("description")?,
        call_to_action: row.try_get("call_to_action")?,
        prompt: row.try_get("prompt")?,
        ai_model: row.try_get("ai_model")?,
        temperature: row.try_get("temperature")?,
        user_id: row.try_get("user_id")?,
        campaign_id: row.try_get("campaign_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn ad_creative_from_row(row: &Row) -> Result<AdCreative, StoreError> {
    Ok(AdCreative {
        id: row.try_get("id")?,
        creative_type: parse(row, "type")?,
        image_url: row.try_get("image_url")?,
        video_url: row.try_get("video_url")?,
        prompt: row.try_get("prompt")?,
        ai_model: row.try_get("ai_model")?,
        style: row.try_get("style")?,
        user_id: row.try_get("user_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn collect<T>(rows: &[Row], map: fn(&Row) -> Result<T, StoreError>) -> Result<Vec<T>, StoreError> {
    rows.iter().map(map).collect()
}

#[async_trait]
impl Store for Database {
    async fn insert_user(&self, user: NewUser) -> Result<User, StoreError> {
        let sql = format!(
            "INSERT INTO users (email, password, name) VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        );
        match self
            .client
            .query_one(&sql, &[&user.email, &user.password_hash, &user.name])
            .await
        {
            Ok(row) => user_from_row(&row),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                Err(StoreError::DuplicateEmail(user.email))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        self.client
            .query_opt(&sql, &[&id])
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        self.client
            .query_opt(&sql, &[&email])
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn update_meta_integration(
        &self,
        user_id: Uuid,
        update: &MetaIntegrationUpdate,
    ) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET
                meta_access_token = COALESCE($2, meta_access_token),
                meta_user_id = COALESCE($3, meta_user_id),
                meta_ad_account_id = COALESCE($4, meta_ad_account_id),
                updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        self.client
            .query_opt(
                &sql,
                &[
                    &user_id,
                    &update.access_token,
                    &update.meta_user_id,
                    &update.ad_account_id,
                ],
            )
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn clear_meta_integration(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let sql = format!(
            "UPDATE users SET
                meta_access_token = NULL,
                meta_user_id = NULL,
                meta_ad_account_id = NULL,
                updated_at = now()
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        );
        self.client
            .query_opt(&sql, &[&user_id])
            .await?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn insert_campaign(&self, campaign: NewCampaign) -> Result<Campaign, StoreError> {
        let sql = format!(
            "INSERT INTO campaigns (user_id, name, objective, budget, start_date, end_date)
             VALUES ($1, $2, $3::text::campaign_objective, $4::float8, $5, $6)
             RETURNING {CAMPAIGN_COLUMNS}"
        );
        let row = self
            .client
            .query_one(
                &sql,
                &[
                    &campaign.user_id,
                    &campaign.name,
                    &campaign.objective.as_str(),
                    &campaign.budget,
                    &campaign.start_date,
                    &campaign.end_date,
                ],
            )
            .await?;
        campaign_from_row(&row)
    }

    async fn find_campaign(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Option<Campaign>, StoreError> {
        let sql = format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1 AND user_id = $2");
        self.client
            .query_opt(&sql, &[&campaign_id, &user_id])
            .await?
            .as_ref()
            .map(campaign_from_row)
            .transpose()
    }

    async fn list_campaigns(&self, user_id: Uuid) -> Result<Vec<Campaign>, StoreError> {
        let sql = format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE user_id = $1
             ORDER BY created_at DESC, id"
        );
        let rows = self.client.query(&sql, &[&user_id]).await?;
        collect(&rows, campaign_from_row)
    }

    async fn delete_campaign(&self, user_id: Uuid, campaign_id: Uuid) -> Result<bool, StoreError> {
        // ad_sets and ads go with it through ON DELETE CASCADE
        let deleted = self
            .client
            .execute(
                "DELETE FROM campaigns WHERE id = $1 AND user_id = $2",
                &[&campaign_id, &user_id],
            )
            .await?;
        Ok(deleted > 0)
    }

    async fn claim_campaign_for_publish(
        &self,
        user_id: Uuid,
        campaign_id: Uuid,
        stale_after: Duration,
    ) -> Result<PublishClaim, StoreError> {
        let sql = format!(
            "UPDATE campaigns SET publish_state = 'PUBLISHING', publish_claimed_at = now()
             WHERE id = $1 AND user_id = $2
               AND meta_campaign_id IS NULL
               AND (publish_state = 'UNPUBLISHED'
                    OR (publish_state = 'PUBLISHING'
                        AND (publish_claimed_at IS NULL
                             OR publish_claimed_at <= now() - make_interval(secs => $3::float8))))
             RETURNING {CAMPAIGN_COLUMNS}"
        );
        let stale_secs = stale_after.as_secs_f64();
        if let Some(row) = self
            .client
            .query_opt(&sql, &[&campaign_id, &user_id, &stale_secs])
            .await?
        {
            return Ok(PublishClaim::Claimed(campaign_from_row(&row)?));
        }

        let row = self
            .client
            .query_opt(
                "SELECT publish_state::text AS publish_state, meta_campaign_id
                 FROM campaigns WHERE id = $1 AND user_id = $2",
                &[&campaign_id, &user_id],
            )
            .await?;
        let Some(row) = row else {
            return Ok(PublishClaim::NotFound);
        };
        let meta_campaign_id: Option<String> = row.try_get("meta_campaign_id")?;
        let state: PublishState = parse(&row, "publish_state")?;
        if meta_campaign_id.is_some() || state == PublishState::Published {
            Ok(PublishClaim::AlreadyPublished)
        } else {
            Ok(PublishClaim::InProgress)
        }
    }

    async fn complete_campaign_publish(
        &self,
        campaign_id: Uuid,
        meta_campaign_id: &str,
    ) -> Result<Campaign, StoreError> {
        let sql = format!(
            "UPDATE campaigns SET
                meta_campaign_id = $2,
                publish_state = 'PUBLISHED',
                publish_claimed_at = NULL,
                status = 'PAUSED',
                updated_at = now()
             WHERE id = $1 AND publish_state = 'PUBLISHING' AND meta_campaign_id IS NULL
             RETURNING {CAMPAIGN_COLUMNS}"
        );
        let row = self
            .client
            .query_opt(&sql, &[&campaign_id, &meta_campaign_id])
            .await?
            .ok_or_else(|| StoreError::Missing(format!("publishing campaign {campaign_id}")))?;
        campaign_from_row(&row)
    }

    async fn release_campaign_publish(&self, campaign_id: Uuid) -> Result<(), StoreError> {
        self.client
            .execute(
                "UPDATE campaigns SET publish_state = 'UNPUBLISHED', publish_claimed_at = NULL
                 WHERE id = $1 AND publish_state = 'PUBLISHING'",
                &[&campaign_id],
            )
            .await?;
        Ok(())
    }

    async fn insert_ad_set(&self, ad_set: NewAdSet) -> Result<AdSet, StoreError> {
        let sql = format!(
            "INSERT INTO ad_sets (campaign_id, name, targeting_options, budget, bid_strategy)
             VALUES ($1, $2, $3, $4::float8, $5)
             RETURNING {AD_SET_COLUMNS}"
        );
        let row = self
            .client
            .query_one(
                &sql,
                &[
                    &ad_set.campaign_id,
                    &ad_set.name,
                    &ad_set.targeting_options,
                    &ad_set.budget,
                    &ad_set.bid_strategy,
                ],
            )
            .await?;
        ad_set_from_row(&row)
    }

    async fn find_ad_set(&self, ad_set_id: Uuid) -> Result<Option<(AdSet, Uuid)>, StoreError> {
        let sql = format!(
            "SELECT {cols}, c.user_id AS owner_id
             FROM ad_sets s JOIN campaigns c ON c.id = s.campaign_id
             WHERE s.id = $1",
            cols = qualified(AD_SET_COLUMNS, "s")
        );
        let Some(row) = self.client.query_opt(&sql, &[&ad_set_id]).await? else {
            return Ok(None);
        };
        let owner: Uuid = row.try_get("owner_id")?;
        Ok(Some((ad_set_from_row(&row)?, owner)))
    }

    async fn list_ad_sets(&self, campaign_ids: &[Uuid]) -> Result<Vec<AdSet>, StoreError> {
        if campaign_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {AD_SET_COLUMNS} FROM ad_sets WHERE campaign_id = ANY($1)
             ORDER BY created_at, id"
        );
        let rows = self.client.query(&sql, &[&campaign_ids]).await?;
        collect(&rows, ad_set_from_row)
    }

    async fn insert_ad(&self, ad: NewAd) -> Result<Ad, StoreError> {
        let sql = format!(
            "INSERT INTO ads (ad_set_id, name, ad_copy_id, ad_creative_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {AD_COLUMNS}"
        );
        let row = self
            .client
            .query_one(
                &sql,
                &[&ad.ad_set_id, &ad.name, &ad.ad_copy_id, &ad.ad_creative_id],
            )
            .await?;
        ad_from_row(&row)
    }

    async fn list_ads(&self, ad_set_ids: &[Uuid]) -> Result<Vec<Ad>, StoreError> {
        if ad_set_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {AD_COLUMNS} FROM ads WHERE ad_set_id = ANY($1) ORDER BY created_at, id"
        );
        let rows = self.client.query(&sql, &[&ad_set_ids]).await?;
        collect(&rows, ad_from_row)
    }

    async fn insert_ad_copy(&self, copy: NewAdCopy) -> Result<AdCopy, StoreError> {
        let sql = format!(
            "INSERT INTO ad_copies (user_id, campaign_id, headline, primary_text, description,
                                    call_to_action, prompt, ai_model, temperature)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::float8)
             RETURNING {AD_COPY_COLUMNS}"
        );
        let row = self
            .client
            .query_one(
                &sql,
                &[
                    &copy.user_id,
                    &copy.campaign_id,
                    &copy.headline,
                    &copy.primary_text,
                    &copy.description,
                    &copy.call_to_action,
                    &copy.prompt,
                    &copy.ai_model,
                    &copy.temperature,
                ],
            )
            .await?;
        ad_copy_from_row(&row)
    }

    async fn find_ad_copies(&self, ids: &[Uuid]) -> Result<Vec<AdCopy>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {AD_COPY_COLUMNS} FROM ad_copies WHERE id = ANY($1)");
        let rows = self.client.query(&sql, &[&ids]).await?;
        collect(&rows, ad_copy_from_row)
    }

    async fn list_ad_copies(&self, user_id: Uuid) -> Result<Vec<AdCopy>, StoreError> {
        let sql = format!(
            "SELECT {AD_COPY_COLUMNS} FROM ad_copies WHERE user_id = $1
             ORDER BY created_at DESC, id"
        );
        let rows = self.client.query(&sql, &[&user_id]).await?;
        collect(&rows, ad_copy_from_row)
    }

    async fn insert_ad_creative(&self, creative: NewAdCreative) -> Result<AdCreative, StoreError> {
        let sql = format!(
            "INSERT INTO ad_creatives (user_id, type, image_url, video_url, prompt, ai_model, style)
             VALUES ($1, $2::text::creative_type, $3, $4, $5, $6, $7)
             RETURNING {AD_CREATIVE_COLUMNS}"
        );
        let row = self
            .client
            .query_one(
                &sql,
                &[
                    &creative.user_id,
                    &creative.creative_type.as_str(),
                    &creative.image_url,
                    &creative.video_url,
                    &creative.prompt,
                    &creative.ai_model,
                    &creative.style,
                ],
            )
            .await?;
        ad_creative_from_row(&row)
    }

    async fn find_ad_creatives(&self, ids: &[Uuid]) -> Result<Vec<AdCreative>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {AD_CREATIVE_COLUMNS} FROM ad_creatives WHERE id = ANY($1)");
        let rows = self.client.query(&sql, &[&ids]).await?;
        collect(&rows, ad_creative_from_row)
    }

    async fn list_ad_creatives(&self, user_id: Uuid) -> Result<Vec<AdCreative>, StoreError> {
        let sql = format!(
            "SELECT {AD_CREATIVE_COLUMNS} FROM ad_creatives WHERE user_id = $1
             ORDER BY created_at DESC, id"
        );
        let rows = self.client.query(&sql, &[&user_id]).await?;
        collect(&rows, ad_creative_from_row)
    }
}

/// Prefixes every column of a select list with a table alias.
fn qualified(columns: &str, alias: &str) -> String {
    columns
        .split(',')
        .map(|c| format!("{alias}.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
