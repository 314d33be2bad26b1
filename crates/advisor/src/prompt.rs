use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use shared::domain::{ClothingTags, MAX_WARMTH, MIN_WARMTH};

use crate::OutfitRequest;

const DEFAULT_WARMTH: u8 = 3;

pub const TAGGING_PROMPT: &str = "\
You are cataloguing a personal wardrobe. Look at the clothing item in the photo and \
answer with a single JSON object and nothing else, using these keys:
  \"name\": a short descriptive name, e.g. \"navy wool overcoat\"
  \"category\": one of top, bottom, outerwear, dress, shoes, accessory
  \"color\": the dominant color
  \"style\": one or two words such as casual, formal, sporty, street
  \"warmth\": an integer from 1 (very light) to 5 (very warm)";

pub fn recommendation_prompt(request: &OutfitRequest<'_>) -> String {
    let weather = request.weather;
    let mut prompt = format!(
        "You are a personal stylist. Build one outfit using only clothes from the wardrobe below.\n\n\
         Weather in {}: {}, {:.1}°C (feels like {:.1}°C, range {:.1}–{:.1}°C), humidity {}%, wind {:.1} m/s.\n\
         Requested style: {}\n\
         Occasion: {}\n\n\
         Wardrobe:\n",
        weather.city,
        weather.description,
        weather.temperature,
        weather.feels_like,
        weather.temp_min,
        weather.temp_max,
        weather.humidity,
        weather.wind_speed,
        request.style,
        request.occasion,
    );
    for item in request.items {
        prompt.push_str(&format!(
            "- {} ({}, {}, {}, warmth {}/{})\n",
            item.name, item.category, item.color, item.style, item.warmth, MAX_WARMTH
        ));
    }
    prompt.push_str(
        "\nName every chosen item exactly as written in the wardrobe list, \
         then explain briefly why the outfit suits the weather and occasion.",
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct RawTags {
    name: String,
    category: String,
    color: String,
    #[serde(default)]
    style: Option<String>,
    #[serde(default)]
    warmth: Option<serde_json::Value>,
}

/// Extracts the tag object from a model reply, tolerating code fences and
/// surrounding prose. Warmth is clamped into the 1..=5 scale.
pub fn parse_tags(reply: &str) -> Result<ClothingTags> {
    let start = reply
        .find('{')
        .ok_or_else(|| anyhow!("tag reply contains no JSON object"))?;
    let end = reply
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| anyhow!("tag reply contains no JSON object"))?;
    let raw: RawTags =
        serde_json::from_str(&reply[start..=end]).context("tag reply is not valid tag JSON")?;

    let warmth = raw
        .warmth
        .as_ref()
        .and_then(|value| match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .map(|w| w.round().clamp(f64::from(MIN_WARMTH), f64::from(MAX_WARMTH)) as u8)
        .unwrap_or(DEFAULT_WARMTH);

    Ok(ClothingTags {
        name: raw.name.trim().to_string(),
        category: raw.category.trim().to_string(),
        color: raw.color.trim().to_string(),
        style: raw.style.unwrap_or_default().trim().to_string(),
        warmth,
    })
}

#[cfg(test)]
#[path = "tests/prompt_tests.rs"]
mod tests;
