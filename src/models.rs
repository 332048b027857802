use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Declares a unit enum stored as its SCREAMING_SNAKE_CASE name, both on the
/// wire and in the database.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($kind:literal) {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal $(| $alias:literal)* ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                #[serde(rename = $text $(, alias = $alias)*)]
                $variant,
            )+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $text, )+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $text $(| $alias)* => Ok(Self::$variant), )+
                    other => Err(UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }
    };
}

string_enum! {
    /// Meta outcome-based campaign objectives. Legacy objective names are
    /// accepted on input and mapped to their outcome equivalent.
    CampaignObjective ("campaign objective") {
        Awareness => "OUTCOME_AWARENESS" | "AWARENESS" | "BRAND_AWARENESS" | "REACH",
        Traffic => "OUTCOME_TRAFFIC" | "TRAFFIC" | "LINK_CLICKS",
        Engagement => "OUTCOME_ENGAGEMENT" | "ENGAGEMENT" | "POST_ENGAGEMENT",
        Leads => "OUTCOME_LEADS" | "LEADS" | "LEAD_GENERATION",
        AppPromotion => "OUTCOME_APP_PROMOTION" | "APP_PROMOTION" | "APP_INSTALLS",
        Sales => "OUTCOME_SALES" | "SALES" | "CONVERSIONS",
    }
}

string_enum! {
    CampaignStatus ("campaign status") {
        Draft => "DRAFT",
        Active => "ACTIVE",
        Paused => "PAUSED",
        Completed => "COMPLETED",
    }
}

string_enum! {
    /// Where a campaign is in its one-time publication to Meta.
    PublishState ("publish state") {
        Unpublished => "UNPUBLISHED",
        Publishing => "PUBLISHING",
        Published => "PUBLISHED",
    }
}

string_enum! {
    AdSetStatus ("ad set status") {
        Draft => "DRAFT",
        Active => "ACTIVE",
        Paused => "PAUSED",
    }
}

string_enum! {
    AdStatus ("ad status") {
        Draft => "DRAFT",
        Active => "ACTIVE",
        Paused => "PAUSED",
    }
}

string_enum! {
    CreativeType ("creative type") {
        Image => "IMAGE",
        Video => "VIDEO",
        Carousel => "CAROUSEL",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub name: Option<String>,
    pub meta_access_token: Option<String>,
    pub meta_user_id: Option<String>,
    pub meta_ad_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_meta_token(&self) -> bool {
        self.meta_access_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// What a user may see about themselves. Never carries the password hash or
/// the Meta access token.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub meta_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_ad_account_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            meta_connected: user.has_meta_token(),
            meta_user_id: user.meta_user_id.clone(),
            meta_ad_account_id: user.meta_ad_account_id.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    pub objective: CampaignObjective,
    pub status: CampaignStatus,
    pub publish_state: PublishState,
    /// When the current `PUBLISHING` claim was taken.
    #[serde(skip)]
    pub publish_claimed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_campaign_id: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdSet {
    pub id: Uuid,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targeting_options: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bid_strategy: Option<String>,
    pub status: AdSetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_ad_set_id: Option<String>,
    pub campaign_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    pub id: Uuid,
    pub name: String,
    pub status: AdStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta_ad_id: Option<String>,
    pub ad_set_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_copy_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ad_creative_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdCopy {
    pub id: Uuid,
    pub headline: String,
    pub primary_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_to_action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdCreative {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub creative_type: CreativeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Eagerly loaded campaign tree, as returned by the ads endpoints.

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignDetails {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub ad_sets: Vec<AdSetDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdSetDetails {
    #[serde(flatten)]
    pub ad_set: AdSet,
    pub ads: Vec<AdDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdDetails {
    #[serde(flatten)]
    pub ad: Ad,
    pub ad_copy: Option<AdCopy>,
    pub ad_creative: Option<AdCreative>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_objectives_map_to_outcomes() {
        assert_eq!("CONVERSIONS".parse(), Ok(CampaignObjective::Sales));
        assert_eq!("TRAFFIC".parse(), Ok(CampaignObjective::Traffic));
        assert_eq!(
            "OUTCOME_LEADS".parse::<CampaignObjective>(),
            Ok(CampaignObjective::Leads)
        );
        assert!("SOMETHING_ELSE".parse::<CampaignObjective>().is_err());
    }

    #[test]
    fn objective_serializes_as_outcome_name() {
        let parsed: CampaignObjective = serde_json::from_str("\"CONVERSIONS\"").unwrap();
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"OUTCOME_SALES\"");
    }

    #[test]
    fn creative_type_uses_type_key() {
        let creative = AdCreative {
            id: Uuid::new_v4(),
            creative_type: CreativeType::Image,
            image_url: Some("https://cdn.example.com/a.png".to_string()),
            video_url: None,
            prompt: None,
            ai_model: None,
            style: None,
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&creative).unwrap();
        assert_eq!(json["type"], "IMAGE");
        assert_eq!(json["imageUrl"], "https://cdn.example.com/a.png");
        assert!(json.get("videoUrl").is_none());
    }
}
