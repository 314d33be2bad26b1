use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(ItemId);

/// A wardrobe entry as exposed to the page. Image bytes stay in storage and are
/// served from `image_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClothingItem {
    pub item_id: ItemId,
    pub user_id: UserId,
    pub name: String,
    pub category: String,
    pub color: String,
    pub style: String,
    pub warmth: u8,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClothingTags {
    pub name: String,
    pub category: String,
    pub color: String,
    #[serde(default)]
    pub style: String,
    pub warmth: u8,
}

pub const MIN_WARMTH: u8 = 1;
pub const MAX_WARMTH: u8 = 5;

/// Normalized current conditions for one city. Temperatures are Celsius,
/// wind speed is metres per second.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub city: String,
    pub temperature: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub humidity: u8,
    pub description: String,
    pub wind_speed: f64,
}

pub fn image_url_for(item_id: &ItemId, user_id: &UserId) -> String {
    format!("/api/items/{}/image?user_id={}", item_id.0, user_id.0)
}
