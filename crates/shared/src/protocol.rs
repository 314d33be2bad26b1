//! Wire format of the page bridge.
//!
//! An action travels as flat `key=value` query pairs: `action=<name>`, the
//! action's parameters in a fixed order, then the `_t` cache-buster. Values
//! that are not scalars (the batch item-id list) are packed into a single
//! JSON string before they enter the query.

use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::atomic::{AtomicI64, Ordering},
};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::form_urlencoded;

use crate::domain::{ClothingItem, ClothingTags, ItemId, UserId, WeatherRecord};

pub const ACTION_KEY: &str = "action";
pub const CACHE_BUSTER_KEY: &str = "_t";

pub const DEFAULT_CITY: &str = "Taipei";
pub const DEFAULT_STYLE: &str = "no style restriction";
pub const DEFAULT_OCCASION: &str = "outing";

pub const INVALID_ITEM_IDS_MESSAGE: &str = "invalid item_ids format";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Login,
    Register,
    Weather,
    Wardrobe,
    Delete,
    BatchDelete,
    Recommendation,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Login,
        Action::Register,
        Action::Weather,
        Action::Wardrobe,
        Action::Delete,
        Action::BatchDelete,
        Action::Recommendation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Login => "login",
            Action::Register => "register",
            Action::Weather => "weather",
            Action::Wardrobe => "wardrobe",
            Action::Delete => "delete",
            Action::BatchDelete => "batch_delete",
            Action::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ProtocolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == raw)
            .ok_or_else(|| ProtocolError::UnknownAction(raw.to_string()))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("unknown action '{0}'")]
    UnknownAction(String),
    #[error("invalid item_ids format: {0}")]
    InvalidItemIds(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    Login {
        username: String,
        password: String,
    },
    Register {
        username: String,
        password: String,
    },
    Weather {
        city: String,
    },
    Wardrobe {
        user_id: UserId,
    },
    Delete {
        user_id: UserId,
        item_id: ItemId,
    },
    BatchDelete {
        user_id: UserId,
        item_ids: Vec<ItemId>,
    },
    Recommendation {
        user_id: UserId,
        city: String,
        style: String,
        occasion: String,
    },
}

impl ActionRequest {
    pub fn action(&self) -> Action {
        match self {
            ActionRequest::Login { .. } => Action::Login,
            ActionRequest::Register { .. } => Action::Register,
            ActionRequest::Weather { .. } => Action::Weather,
            ActionRequest::Wardrobe { .. } => Action::Wardrobe,
            ActionRequest::Delete { .. } => Action::Delete,
            ActionRequest::BatchDelete { .. } => Action::BatchDelete,
            ActionRequest::Recommendation { .. } => Action::Recommendation,
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        match self {
            ActionRequest::Login { username, password }
            | ActionRequest::Register { username, password } => vec![
                ("username", username.clone()),
                ("password", password.clone()),
            ],
            ActionRequest::Weather { city } => vec![("city", city.clone())],
            ActionRequest::Wardrobe { user_id } => vec![("user_id", user_id.0.clone())],
            ActionRequest::Delete { user_id, item_id } => vec![
                ("user_id", user_id.0.clone()),
                ("item_id", item_id.0.clone()),
            ],
            ActionRequest::BatchDelete { user_id, item_ids } => vec![
                ("user_id", user_id.0.clone()),
                ("item_ids", encode_item_ids(item_ids)),
            ],
            ActionRequest::Recommendation {
                user_id,
                city,
                style,
                occasion,
            } => vec![
                ("user_id", user_id.0.clone()),
                ("city", city.clone()),
                ("style", style.clone()),
                ("occasion", occasion.clone()),
            ],
        }
    }

    /// Canonical query string for this request, without the leading `?`.
    pub fn to_query(&self, cache_buster: i64) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.append_pair(ACTION_KEY, self.action().as_str());
        for (key, value) in self.params() {
            serializer.append_pair(key, &value);
        }
        serializer.append_pair(CACHE_BUSTER_KEY, &cache_buster.to_string());
        serializer.finish()
    }

    /// Reads a pending action out of the current query parameters.
    ///
    /// `Ok(None)` means "render only": either no action key is present or its
    /// value names no known action. Missing parameters take their defaults;
    /// only an undecodable item-id list is an error.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Option<Self>, ProtocolError> {
        let Some(raw) = params.get(ACTION_KEY) else {
            return Ok(None);
        };
        match raw.parse::<Action>() {
            Ok(action) => Self::decode(action, params).map(Some),
            Err(_) => {
                warn!(action = %raw, "no handler registered for action; ignoring");
                Ok(None)
            }
        }
    }

    pub fn decode(action: Action, params: &HashMap<String, String>) -> Result<Self, ProtocolError> {
        let request = match action {
            Action::Login => ActionRequest::Login {
                username: param(params, "username"),
                password: param(params, "password"),
            },
            Action::Register => ActionRequest::Register {
                username: param(params, "username"),
                password: param(params, "password"),
            },
            Action::Weather => ActionRequest::Weather {
                city: param_or(params, "city", DEFAULT_CITY),
            },
            Action::Wardrobe => ActionRequest::Wardrobe {
                user_id: UserId(param(params, "user_id")),
            },
            Action::Delete => ActionRequest::Delete {
                user_id: UserId(param(params, "user_id")),
                item_id: ItemId(param(params, "item_id")),
            },
            Action::BatchDelete => ActionRequest::BatchDelete {
                user_id: UserId(param(params, "user_id")),
                item_ids: decode_item_ids(&param_or(params, "item_ids", "[]"))?,
            },
            Action::Recommendation => ActionRequest::Recommendation {
                user_id: UserId(param(params, "user_id")),
                city: param_or(params, "city", DEFAULT_CITY),
                style: param_or(params, "style", DEFAULT_STYLE),
                occasion: param_or(params, "occasion", DEFAULT_OCCASION),
            },
        };
        Ok(request)
    }
}

fn param(params: &HashMap<String, String>, key: &str) -> String {
    params.get(key).cloned().unwrap_or_default()
}

fn param_or(params: &HashMap<String, String>, key: &str, default: &str) -> String {
    params
        .get(key)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

/// Packs an id list into the single string token carried by `item_ids`.
pub fn encode_item_ids(ids: &[ItemId]) -> String {
    serde_json::Value::Array(
        ids.iter()
            .map(|id| serde_json::Value::String(id.0.clone()))
            .collect(),
    )
    .to_string()
}

pub fn decode_item_ids(raw: &str) -> Result<Vec<ItemId>, ProtocolError> {
    serde_json::from_str::<Vec<ItemId>>(raw)
        .map_err(|e| ProtocolError::InvalidItemIds(e.to_string()))
}

pub fn parse_query(query: &str) -> HashMap<String, String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .into_owned()
        .collect()
}

static LAST_CACHE_BUSTER: AtomicI64 = AtomicI64::new(0);

/// Millisecond timestamp, strictly increasing across calls in this process.
pub fn next_cache_buster() -> i64 {
    let now = Utc::now().timestamp_millis();
    let previous = match LAST_CACHE_BUSTER.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last + 1))
    }) {
        Ok(previous) | Err(previous) => previous,
    };
    now.max(previous + 1)
}

/// Outcome of one action. Serialized flat: `success`, the payload's fields,
/// then `message` when present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(flatten)]
    pub payload: Option<ActionPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ActionResponse {
    pub fn ok(payload: ActionPayload) -> Self {
        Self {
            success: true,
            payload: Some(payload),
            message: None,
        }
    }

    pub fn ok_message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            payload: None,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ActionPayload {
    Login {
        user_id: UserId,
        username: String,
    },
    Weather(WeatherRecord),
    Wardrobe {
        items: Vec<ClothingItem>,
        total: usize,
    },
    Deleted {
        deleted: bool,
        item_id: ItemId,
    },
    BatchDeleted {
        deleted_count: u64,
        requested_count: usize,
    },
    Recommendation {
        recommendation: String,
        items: Vec<ClothingItem>,
        weather: WeatherRecord,
    },
    Uploaded {
        success_count: usize,
        duplicate_count: usize,
        fail_count: usize,
        items: Vec<ClothingTags>,
    },
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
