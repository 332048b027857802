use std::error::Error;
use std::sync::Arc;
use tracing::info;

use meta_ads_service::ads::AdsService;
use meta_ads_service::ai::AiService;
use meta_ads_service::auth::{AuthService, JwtManager};
use meta_ads_service::config::Config;
use meta_ads_service::constants::DEFAULT_LOG_FILTER;
use meta_ads_service::db::Database;
use meta_ads_service::facebook::FacebookAPI;
use meta_ads_service::logging::init_tracing;
use meta_ads_service::meta::MetaService;
use meta_ads_service::openai::OpenAiClient;
use meta_ads_service::routes::{build_router, AppState};
use meta_ads_service::store::Store;
use meta_ads_service::users::UsersService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Load configuration
    let config = Config::from_env()?;
    init_tracing(DEFAULT_LOG_FILTER, config.log_json);
    info!(bind_addr = %config.bind_addr, ssl = config.database.ssl, "configuration loaded");

    // Initialize database connection
    let db = Database::new(&config.database).await?;
    db.migrate().await?;
    let store: Arc<dyn Store> = Arc::new(db);

    // Upstream clients
    let graph = Arc::new(FacebookAPI::new(&config.meta, config.upstream_timeout)?);
    let generator = Arc::new(OpenAiClient::new(&config.ai, config.upstream_timeout)?);

    let users = UsersService::new(store.clone());
    let jwt = JwtManager::new(config.jwt.secret.as_bytes(), config.jwt.ttl_secs);
    let meta = MetaService::new(
        graph,
        users.clone(),
        config.meta.app_id.clone(),
        config.meta.oauth_url.clone(),
    );
    // A publish claim outlives any single Graph call before it can be taken over
    let claim_ttl = config.upstream_timeout * 2;
    let state = AppState {
        auth: AuthService::new(users.clone(), jwt),
        ads: AdsService::new(store.clone(), users.clone(), meta.clone(), claim_ttl),
        ai: AiService::new(store, generator),
        users,
        meta,
    };

    let app = build_router(state, config.frontend_url.as_deref());
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "meta-ads-service listening");
    axum::serve(listener, app).await?;

    Ok(())
}
