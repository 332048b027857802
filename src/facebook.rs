use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::MetaConfig;
use crate::constants::{
    FACEBOOK_API_VERSION, FB_AD_ACCOUNT_FIELDS, FB_ME_FIELDS, FB_OAUTH_SCOPES,
};

// Upper bound on followed `paging.next` links when listing ad accounts.
const MAX_PAGES: usize = 10;

#[derive(Error, Debug)]
pub enum FacebookApiError {
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("{message}")]
    Graph { message: String, code: Option<i64> },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessToken {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// Ad account summary, serialized with Graph's own field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaAdAccount {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub account_status: i64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub timezone_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_spent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balance: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetaCampaignData {
    pub name: String,
    pub objective: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreatedObject {
    pub id: String,
}

/// The subset of the Graph API this service talks to. Access tokens are per
/// call because one client serves every user.
#[async_trait]
pub trait GraphApi: Send + Sync {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AccessToken, FacebookApiError>;

    /// Trades a short-lived user token for a long-lived one.
    async fn extend_token(&self, access_token: &str) -> Result<AccessToken, FacebookApiError>;

    async fn get_me(&self, access_token: &str) -> Result<MetaProfile, FacebookApiError>;

    async fn get_ad_accounts(
        &self,
        access_token: &str,
    ) -> Result<Vec<MetaAdAccount>, FacebookApiError>;

    async fn create_campaign(
        &self,
        access_token: &str,
        ad_account_id: &str,
        campaign: &MetaCampaignData,
    ) -> Result<CreatedObject, FacebookApiError>;
}

pub struct FacebookAPI {
    client: Client,
    app_id: String,
    app_secret: String,
    base_url: String,
}

impl FacebookAPI {
    pub fn new(config: &MetaConfig, timeout: Duration) -> Result<Self, FacebookApiError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            app_id: config.app_id.clone(),
            app_secret: config.app_secret.clone(),
            base_url: format!("{}/{}", config.graph_url, FACEBOOK_API_VERSION),
        })
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<serde_json::Value, FacebookApiError> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;
        read_graph_response(response).await
    }
}

/// Turns a Graph response into its JSON body, or the `error.message` Graph
/// reports when the call failed.
async fn read_graph_response(response: Response) -> Result<serde_json::Value, FacebookApiError> {
    let status = response.status();
    let text = response
        .text()
        .await
        .map_err(|e| FacebookApiError::InvalidResponse(e.to_string()))?;

    let body: serde_json::Value = match serde_json::from_str(&text) {
        Ok(body) => body,
        Err(_) if !status.is_success() => {
            return Err(FacebookApiError::RequestFailed(format!("HTTP {status}: {text}")));
        }
        Err(e) => return Err(FacebookApiError::InvalidResponse(e.to_string())),
    };

    if let Some(error) = body.get("error") {
        return Err(FacebookApiError::Graph {
            message: error["message"]
                .as_str()
                .unwrap_or("Unknown Graph API error")
                .to_string(),
            code: error["code"].as_i64(),
        });
    }
    if !status.is_success() {
        return Err(FacebookApiError::RequestFailed(format!("HTTP {status}: {text}")));
    }
    Ok(body)
}

fn decode<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, FacebookApiError> {
    serde_json::from_value(value).map_err(|e| FacebookApiError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl GraphApi for FacebookAPI {
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
    ) -> Result<AccessToken, FacebookApiError> {
        let url = format!("{}/oauth/access_token", self.base_url);
        let body = self
            .get_json(
                &url,
                &[
                    ("client_id", self.app_id.as_str()),
                    ("client_secret", self.app_secret.as_str()),
                    ("redirect_uri", redirect_uri),
                    ("code", code),
                ],
            )
            .await?;
        decode(body)
    }

    async fn extend_token(&self, access_token: &str) -> Result<AccessToken, FacebookApiError> {
        let url = format!("{}/oauth/access_token", self.base_url);
        let body = self
            .get_json(
                &url,
                &[
                    ("grant_type", "fb_exchange_token"),
                    ("client_id", self.app_id.as_str()),
                    ("client_secret", self.app_secret.as_str()),
                    ("fb_exchange_token", access_token),
                ],
            )
            .await?;
        decode(body)
    }

    async fn get_me(&self, access_token: &str) -> Result<MetaProfile, FacebookApiError> {
        let url = format!("{}/me", self.base_url);
        let body = self
            .get_json(&url, &[("access_token", access_token), ("fields", FB_ME_FIELDS)])
            .await?;
        decode(body)
    }

    async fn get_ad_accounts(
        &self,
        access_token: &str,
    ) -> Result<Vec<MetaAdAccount>, FacebookApiError> {
        let url = format!("{}/me/adaccounts", self.base_url);
        let mut page = self
            .get_json(
                &url,
                &[("access_token", access_token), ("fields", FB_AD_ACCOUNT_FIELDS)],
            )
            .await?;

        let mut accounts = Vec::new();
        let mut pages = 1;
        loop {
            if let Some(data) = page.get("data").cloned() {
                accounts.extend(decode::<Vec<MetaAdAccount>>(data)?);
            }
            let Some(next) = page["paging"]["next"].as_str().map(str::to_string) else {
                break;
            };
            if pages == MAX_PAGES {
                warn!(max_pages = MAX_PAGES, fetched = accounts.len(), "ad account listing truncated");
                break;
            }
            debug!(fetched = accounts.len(), "following ad account paging link");
            page = self.get_json(&next, &[]).await?;
            pages += 1;
        }

        Ok(accounts)
    }

    async fn create_campaign(
        &self,
        access_token: &str,
        ad_account_id: &str,
        campaign: &MetaCampaignData,
    ) -> Result<CreatedObject, FacebookApiError> {
        let url = format!(
            "{}/{}/campaigns",
            self.base_url,
            normalize_ad_account_id(ad_account_id)
        );

        let response = self
            .client
            .post(&url)
            .form(&[
                ("access_token", access_token),
                ("name", campaign.name.as_str()),
                ("objective", campaign.objective.as_str()),
                ("status", campaign.status.as_str()),
                ("special_ad_categories", "[]"),
            ])
            .send()
            .await
            .map_err(|e| FacebookApiError::RequestFailed(e.to_string()))?;

        decode(read_graph_response(response).await?)
    }
}

/// Graph addresses ad accounts as `act_<id>`; users may hand us either form.
pub fn normalize_ad_account_id(id: &str) -> String {
    let id = id.trim();
    if id.starts_with("act_") {
        id.to_string()
    } else {
        format!("act_{id}")
    }
}

/// Builds the Facebook Login dialog URL the browser is sent to.
pub fn oauth_dialog_url(
    oauth_base: &str,
    app_id: &str,
    redirect_uri: &str,
) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!("{oauth_base}/{FACEBOOK_API_VERSION}/dialog/oauth"))?;
    url.query_pairs_mut()
        .append_pair("client_id", app_id)
        .append_pair("redirect_uri", redirect_uri)
        .append_pair("scope", FB_OAUTH_SCOPES)
        .append_pair("response_type", "code");
    Ok(url)
}
