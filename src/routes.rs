//! HTTP surface. Handlers stay thin: extract, call one service, wrap the result.

use axum::extract::{FromRef, State};
use axum::http::{HeaderValue, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;
use uuid::Uuid;

use crate::ads::{AdsService, CreateAdRequest, CreateAdSetRequest, CreateCampaignRequest, PublishResult};
use crate::ai::{AiService, GenerateAdCopyRequest, GenerateAdImageRequest};
use crate::auth::{AuthResponse, AuthService, AuthUser, JwtManager, LoginRequest, RegisterRequest};
use crate::error::AppResult;
use crate::extract::{AppJson, AppPath, AppQuery};
use crate::facebook::MetaAdAccount;
use crate::meta::{ConnectionStatus, MetaService};
use crate::models::{Ad, AdCopy, AdCreative, AdSet, Campaign, CampaignDetails, UserProfile};
use crate::users::UsersService;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub users: UsersService,
    pub ads: AdsService,
    pub ai: AiService,
    pub meta: MetaService,
}

impl FromRef<AppState> for JwtManager {
    fn from_ref(state: &AppState) -> Self {
        state.auth.jwt().clone()
    }
}

pub fn build_router(state: AppState, frontend_url: Option<&str>) -> Router {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/users/profile", get(profile))
        .route("/ads/campaigns", get(list_campaigns).post(create_campaign))
        .route("/ads/campaigns/{id}", get(get_campaign).delete(delete_campaign))
        .route("/ads/campaigns/{id}/publish", post(publish_campaign))
        .route("/ads/ad-sets", post(create_ad_set))
        .route("/ads/ads", post(create_ad))
        .route("/ads/meta/ad-accounts", get(ads_meta_ad_accounts))
        .route("/ai/generate-copy", post(generate_copy))
        .route("/ai/generate-image", post(generate_image))
        .route("/ai/copy-history", get(copy_history))
        .route("/ai/creative-history", get(creative_history))
        .route("/meta/auth-url", get(meta_auth_url))
        .route("/meta/connect", post(meta_connect))
        .route("/meta/connection-status", get(meta_connection_status))
        .route("/meta/ad-accounts", get(meta_ad_accounts))
        .route("/meta/ad-account", post(meta_select_ad_account))
        .route("/meta/disconnect", post(meta_disconnect))
        .layer(cors_layer(frontend_url))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(frontend_url: Option<&str>) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    match frontend_url.map(HeaderValue::from_str) {
        Some(Ok(origin)) => base.allow_origin(origin),
        Some(Err(e)) => {
            warn!(error = %e, "FRONTEND_URL is not a valid origin; allowing any");
            base.allow_origin(Any)
        }
        None => base.allow_origin(Any),
    }
}

// Auth

async fn register(
    State(state): State<AppState>,
    AppJson(request): AppJson<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn login(
    State(state): State<AppState>,
    AppJson(request): AppJson<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    Ok(Json(state.auth.login(request).await?))
}

async fn profile(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<UserProfile>> {
    Ok(Json(state.users.profile(user.user_id).await?))
}

// Ads

async fn list_campaigns(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<CampaignDetails>>> {
    Ok(Json(state.ads.get_campaigns(user.user_id).await?))
}

async fn create_campaign(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<CreateCampaignRequest>,
) -> AppResult<(StatusCode, Json<Campaign>)> {
    let campaign = state.ads.create_campaign(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn get_campaign(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<CampaignDetails>> {
    Ok(Json(state.ads.get_campaign_by_id(user.user_id, id).await?))
}

async fn delete_campaign(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<StatusCode> {
    state.ads.delete_campaign(user.user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn publish_campaign(
    State(state): State<AppState>,
    user: AuthUser,
    AppPath(id): AppPath<Uuid>,
) -> AppResult<Json<PublishResult>> {
    Ok(Json(state.ads.publish_campaign_to_meta(user.user_id, id).await?))
}

async fn create_ad_set(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<CreateAdSetRequest>,
) -> AppResult<(StatusCode, Json<AdSet>)> {
    let ad_set = state.ads.create_ad_set(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ad_set)))
}

async fn create_ad(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<CreateAdRequest>,
) -> AppResult<(StatusCode, Json<Ad>)> {
    let ad = state.ads.create_ad(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(ad)))
}

async fn ads_meta_ad_accounts(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<MetaAdAccount>>> {
    Ok(Json(state.ads.get_meta_ad_accounts(user.user_id).await?))
}

// AI

async fn generate_copy(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<GenerateAdCopyRequest>,
) -> AppResult<Json<Vec<AdCopy>>> {
    Ok(Json(state.ai.generate_ad_copy(user.user_id, request).await?))
}

async fn generate_image(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<GenerateAdImageRequest>,
) -> AppResult<Json<AdCreative>> {
    Ok(Json(state.ai.generate_ad_image(user.user_id, request).await?))
}

async fn copy_history(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Vec<AdCopy>>> {
    Ok(Json(state.ai.copy_history(user.user_id).await?))
}

async fn creative_history(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<AdCreative>>> {
    Ok(Json(state.ai.creative_history(user.user_id).await?))
}

// Meta

#[derive(Debug, Deserialize)]
struct AuthUrlQuery {
    #[serde(alias = "redirectUri")]
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConnectRequest {
    code: String,
    #[serde(alias = "redirect_uri")]
    redirect_uri: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SelectAdAccountRequest {
    ad_account_id: String,
}

async fn meta_auth_url(
    State(state): State<AppState>,
    _user: AuthUser,
    AppQuery(query): AppQuery<AuthUrlQuery>,
) -> AppResult<Json<Value>> {
    let url = state.meta.auth_url(&query.redirect_uri)?;
    Ok(Json(json!({ "authUrl": url })))
}

async fn meta_connect(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<ConnectRequest>,
) -> AppResult<Json<ConnectionStatus>> {
    let status = state
        .meta
        .connect(user.user_id, &request.code, &request.redirect_uri)
        .await?;
    Ok(Json(status))
}

async fn meta_connection_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<ConnectionStatus>> {
    Ok(Json(state.meta.connection_status(user.user_id).await?))
}

async fn meta_ad_accounts(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<Vec<MetaAdAccount>>> {
    Ok(Json(state.meta.get_ad_accounts(user.user_id).await?))
}

async fn meta_select_ad_account(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<SelectAdAccountRequest>,
) -> AppResult<Json<Value>> {
    let profile = state
        .meta
        .select_ad_account(user.user_id, &request.ad_account_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "adAccountId": profile.meta_ad_account_id,
    })))
}

async fn meta_disconnect(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Value>> {
    state.meta.disconnect(user.user_id).await?;
    Ok(Json(json!({ "success": true })))
}
