// API Versions
pub const FACEBOOK_API_VERSION: &str = "v20.0";

// API Base URLs
pub const FACEBOOK_BASE_URL: &str = "https://graph.facebook.com";
pub const FACEBOOK_OAUTH_BASE_URL: &str = "https://www.facebook.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

// Content Types
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
pub const CONTENT_TYPE_JSON: &str = "application/json";

// Server Settings
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_JWT_TTL_SECS: i64 = 7 * 24 * 60 * 60;
pub const DEFAULT_LOG_FILTER: &str = "meta_ads_service=info,tower_http=info";

// Facebook OAuth
pub const FB_OAUTH_SCOPES: &str = "ads_management,ads_read,business_management";

// Facebook API Fields
pub const FB_ME_FIELDS: &str = "id,name";
pub const FB_AD_ACCOUNT_FIELDS: &str =
    "id,name,account_status,currency,timezone_name,amount_spent,balance";

// Campaigns are always created paused on Meta.
pub const FB_INITIAL_CAMPAIGN_STATUS: &str = "PAUSED";

// AI Generation
pub const DEFAULT_AI_COPY_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_AI_IMAGE_MODEL: &str = "dall-e-3";
pub const AI_COPY_TEMPERATURE: f64 = 0.8;
pub const AI_DEFAULT_VARIATIONS: u8 = 3;
pub const AI_MAX_VARIATIONS: u8 = 5;

// Auth
pub const MIN_PASSWORD_LEN: usize = 6;

// Exclusive upper bound of a NUMERIC(10, 2) budget column.
pub const MAX_BUDGET: f64 = 100_000_000.0;
