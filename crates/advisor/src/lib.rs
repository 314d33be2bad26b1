use anyhow::Result;
use async_trait::async_trait;
use shared::domain::{ClothingItem, ClothingTags, WeatherRecord};

mod gemini;
mod matching;
mod prompt;

pub use gemini::{GeminiAdvisor, GeminiConfig, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
pub use matching::match_recommended_items;
pub use prompt::{parse_tags, recommendation_prompt, TAGGING_PROMPT};

#[derive(Debug, Clone, Copy)]
pub struct OutfitRequest<'a> {
    pub items: &'a [ClothingItem],
    pub weather: &'a WeatherRecord,
    pub style: &'a str,
    pub occasion: &'a str,
}

/// Generative collaborator behind recommendations and photo tagging.
#[async_trait]
pub trait OutfitAdvisor: Send + Sync {
    /// Free-form outfit advice for the given wardrobe and conditions.
    async fn recommend(&self, request: OutfitRequest<'_>) -> Result<String>;

    /// Describes one clothing photo.
    async fn tag_item(&self, image: &[u8], mime_type: &str) -> Result<ClothingTags>;
}
