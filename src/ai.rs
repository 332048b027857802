use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::constants::{AI_COPY_TEMPERATURE, AI_DEFAULT_VARIATIONS, AI_MAX_VARIATIONS};
use crate::error::{AppError, AppResult};
use crate::models::{AdCopy, AdCreative, CreativeType};
use crate::openai::{AdGenerator, OpenAiError};
use crate::store::{NewAdCopy, NewAdCreative, Store};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAdCopyRequest {
    pub product_name: String,
    pub product_description: String,
    pub target_audience: String,
    pub ad_objective: String,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub variations: Option<i64>,
    #[serde(default)]
    pub campaign_id: Option<Uuid>,
}

impl GenerateAdCopyRequest {
    /// Requested variation count, defaulted and clamped to what we allow.
    /// Any integer is accepted on the wire.
    pub fn variation_count(&self) -> u8 {
        let requested = self
            .variations
            .unwrap_or(i64::from(AI_DEFAULT_VARIATIONS))
            .clamp(1, i64::from(AI_MAX_VARIATIONS));
        u8::try_from(requested).unwrap_or(AI_MAX_VARIATIONS)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAdImageRequest {
    pub product_name: String,
    pub product_description: String,
    #[serde(default)]
    pub style: Option<String>,
    #[serde(default)]
    pub aspect_ratio: Option<String>,
}

/// Generates ad copy and images and keeps every result under its user.
#[derive(Clone)]
pub struct AiService {
    store: Arc<dyn Store>,
    generator: Arc<dyn AdGenerator>,
}

impl AiService {
    pub fn new(store: Arc<dyn Store>, generator: Arc<dyn AdGenerator>) -> Self {
        Self { store, generator }
    }

    pub async fn generate_ad_copy(
        &self,
        user_id: Uuid,
        request: GenerateAdCopyRequest,
    ) -> AppResult<Vec<AdCopy>> {
        require("productName", &request.product_name)?;
        require("productDescription", &request.product_description)?;
        require("targetAudience", &request.target_audience)?;
        require("adObjective", &request.ad_objective)?;
        if let Some(campaign_id) = request.campaign_id {
            self.store
                .find_campaign(user_id, campaign_id)
                .await?
                .ok_or_else(|| AppError::NotFound("Campaign not found".to_string()))?;
        }

        let count = request.variation_count();
        let prompt = build_copy_prompt(&request, count);
        let mut generated = self
            .generator
            .generate_copy(&prompt, AI_COPY_TEMPERATURE)
            .await
            .map_err(|e| upstream("Failed to generate ad copy", e))?;
        generated.truncate(usize::from(count));

        let mut copies = Vec::with_capacity(generated.len());
        for copy in generated {
            let saved = self
                .store
                .insert_ad_copy(NewAdCopy {
                    user_id,
                    campaign_id: request.campaign_id,
                    headline: copy.headline,
                    primary_text: copy.primary_text,
                    description: copy.description,
                    call_to_action: copy.call_to_action,
                    prompt: Some(prompt.clone()),
                    ai_model: Some(self.generator.copy_model().to_string()),
                    temperature: Some(AI_COPY_TEMPERATURE),
                })
                .await?;
            copies.push(saved);
        }
        info!(user_id = %user_id, count = copies.len(), "ad copy generated");
        Ok(copies)
    }

    pub async fn generate_ad_image(
        &self,
        user_id: Uuid,
        request: GenerateAdImageRequest,
    ) -> AppResult<AdCreative> {
        require("productName", &request.product_name)?;
        require("productDescription", &request.product_description)?;

        let prompt = build_image_prompt(&request);
        let size = aspect_ratio_size(request.aspect_ratio.as_deref());
        let image = self
            .generator
            .generate_image(&prompt, size)
            .await
            .map_err(|e| upstream("Failed to generate ad image", e))?;

        let creative = self
            .store
            .insert_ad_creative(NewAdCreative {
                user_id,
                creative_type: CreativeType::Image,
                image_url: Some(image.url),
                video_url: None,
                prompt: Some(image.revised_prompt.unwrap_or(prompt)),
                ai_model: Some(self.generator.image_model().to_string()),
                style: request.style.filter(|s| !s.trim().is_empty()),
            })
            .await?;
        info!(user_id = %user_id, creative_id = %creative.id, size, "ad image generated");
        Ok(creative)
    }

    pub async fn copy_history(&self, user_id: Uuid) -> AppResult<Vec<AdCopy>> {
        Ok(self.store.list_ad_copies(user_id).await?)
    }

    pub async fn creative_history(&self, user_id: Uuid) -> AppResult<Vec<AdCreative>> {
        Ok(self.store.list_ad_creatives(user_id).await?)
    }
}

fn require(field: &str, value: &str) -> AppResult<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    Ok(())
}

fn upstream(context: &str, err: OpenAiError) -> AppError {
    warn!(error = %err, "{context}");
    AppError::Upstream(format!("{context}: {err}"))
}

fn build_copy_prompt(request: &GenerateAdCopyRequest, count: u8) -> String {
    let tone = request
        .tone
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("professional");
    format!(
        "Write {count} distinct Facebook ad copy variations.\n\
         Product: {}\n\
         Description: {}\n\
         Target audience: {}\n\
         Objective: {}\n\
         Tone: {tone}\n\
         Keep headlines under 40 characters and primary text under 125 characters.",
        request.product_name.trim(),
        request.product_description.trim(),
        request.target_audience.trim(),
        request.ad_objective.trim(),
    )
}

fn build_image_prompt(request: &GenerateAdImageRequest) -> String {
    let mut prompt = format!(
        "Advertising image for {}: {}.",
        request.product_name.trim(),
        request.product_description.trim()
    );
    if let Some(style) = request.style.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        prompt.push_str(&format!(" Style: {style}."));
    }
    prompt.push_str(" No text overlays.");
    prompt
}

/// Image size for an aspect ratio; anything unrecognised is square.
pub fn aspect_ratio_size(aspect_ratio: Option<&str>) -> &'static str {
    match aspect_ratio.map(str::trim) {
        Some("16:9") => "1792x1024",
        Some("9:16") => "1024x1792",
        _ => "1024x1024",
    }
}
