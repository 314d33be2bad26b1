use std::{collections::HashSet, sync::Arc};

use advisor::{match_recommended_items, OutfitAdvisor, OutfitRequest};
use shared::{
    domain::{ItemId, UserId},
    error::{ApiError, ErrorCode},
    protocol::{
        Action, ActionPayload, ActionRequest, ActionResponse, DEFAULT_OCCASION, DEFAULT_STYLE,
    },
};
use storage::Storage;
use tracing::{error, info};
use weather::WeatherProvider;

mod upload;

pub use upload::{
    item_image, upload_items, validate_upload, ImageKind, UploadFile, UploadRejection,
    MAX_UPLOAD_BYTES, MAX_UPLOAD_FILES,
};

pub const DATABASE_NOT_CONFIGURED: &str = "database not configured";
pub const WEATHER_NOT_CONFIGURED: &str = "weather service not configured";
pub const AI_NOT_CONFIGURED: &str = "AI service not configured";

pub const INCORRECT_CREDENTIALS: &str = "incorrect account or password";
pub const CREDENTIALS_REQUIRED: &str = "username and password are required";
pub const USERNAME_TAKEN: &str = "username already exists";
pub const REGISTERED: &str = "registration successful";
pub const WEATHER_UNAVAILABLE: &str = "weather data unavailable";
pub const WARDROBE_EMPTY: &str = "wardrobe is empty, upload clothes first";
pub const ITEM_NOT_FOUND: &str = "item not found";

/// The collaborators every handler may call. A `None` field means the
/// collaborator was never configured; handlers check before calling.
#[derive(Clone, Default)]
pub struct ApiContext {
    pub storage: Option<Storage>,
    pub weather: Option<Arc<dyn WeatherProvider>>,
    pub advisor: Option<Arc<dyn OutfitAdvisor>>,
}

/// Runs the single handler for `request`.
pub async fn handle(ctx: &ApiContext, request: ActionRequest) -> ActionResponse {
    match request {
        ActionRequest::Login { username, password } => login(ctx, &username, &password).await,
        ActionRequest::Register { username, password } => {
            register(ctx, &username, &password).await
        }
        ActionRequest::Weather { city } => weather(ctx, &city).await,
        ActionRequest::Wardrobe { user_id } => wardrobe(ctx, &user_id).await,
        ActionRequest::Delete { user_id, item_id } => delete_item(ctx, &user_id, &item_id).await,
        ActionRequest::BatchDelete { user_id, item_ids } => {
            batch_delete(ctx, &user_id, &item_ids).await
        }
        ActionRequest::Recommendation {
            user_id,
            city,
            style,
            occasion,
        } => recommendation(ctx, &user_id, &city, &style, &occasion).await,
    }
}

pub async fn login(ctx: &ApiContext, username: &str, password: &str) -> ActionResponse {
    let Some(storage) = &ctx.storage else {
        return ActionResponse::failure(DATABASE_NOT_CONFIGURED);
    };
    match storage.find_user_by_credentials(username, password).await {
        Ok(Some(user)) => {
            info!(user_id = %user.user_id, "user logged in");
            ActionResponse::ok(ActionPayload::Login {
                user_id: user.user_id,
                username: user.username,
            })
        }
        Ok(None) => ActionResponse::failure(INCORRECT_CREDENTIALS),
        Err(e) => failed(Action::Login, e),
    }
}

pub async fn register(ctx: &ApiContext, username: &str, password: &str) -> ActionResponse {
    let Some(storage) = &ctx.storage else {
        return ActionResponse::failure(DATABASE_NOT_CONFIGURED);
    };
    if username.trim().is_empty() || password.is_empty() {
        return ActionResponse::failure(CREDENTIALS_REQUIRED);
    }
    match storage.username_exists(username).await {
        Ok(true) => return ActionResponse::failure(USERNAME_TAKEN),
        Ok(false) => {}
        Err(e) => return failed(Action::Register, e),
    }
    match storage.create_user(username, password).await {
        Ok(user_id) => {
            info!(%user_id, "user registered");
            ActionResponse::ok_message(REGISTERED)
        }
        Err(e) => failed(Action::Register, e),
    }
}

pub async fn weather(ctx: &ApiContext, city: &str) -> ActionResponse {
    let Some(provider) = &ctx.weather else {
        return ActionResponse::failure(WEATHER_NOT_CONFIGURED);
    };
    match provider.current(city).await {
        Ok(Some(record)) => ActionResponse::ok(ActionPayload::Weather(record)),
        Ok(None) => ActionResponse::failure(WEATHER_UNAVAILABLE),
        Err(e) => failed(Action::Weather, e),
    }
}

pub async fn wardrobe(ctx: &ApiContext, user_id: &UserId) -> ActionResponse {
    let Some(storage) = &ctx.storage else {
        return ActionResponse::failure(DATABASE_NOT_CONFIGURED);
    };
    match storage.list_items_for_user(user_id).await {
        Ok(items) => ActionResponse::ok(ActionPayload::Wardrobe {
            total: items.len(),
            items,
        }),
        Err(e) => failed(Action::Wardrobe, e),
    }
}

pub async fn delete_item(ctx: &ApiContext, user_id: &UserId, item_id: &ItemId) -> ActionResponse {
    let Some(storage) = &ctx.storage else {
        return ActionResponse::failure(DATABASE_NOT_CONFIGURED);
    };
    match storage.delete_item(user_id, item_id).await {
        Ok(true) => {
            info!(%user_id, %item_id, "item deleted");
            ActionResponse::ok(ActionPayload::Deleted {
                deleted: true,
                item_id: item_id.clone(),
            })
        }
        Ok(false) => ActionResponse::failure(ITEM_NOT_FOUND),
        Err(e) => failed(Action::Delete, e),
    }
}

/// Removes the requested items that `user_id` owns. `deleted_count` is the
/// number of rows actually removed; `requested_count` counts distinct ids.
pub async fn batch_delete(
    ctx: &ApiContext,
    user_id: &UserId,
    item_ids: &[ItemId],
) -> ActionResponse {
    let Some(storage) = &ctx.storage else {
        return ActionResponse::failure(DATABASE_NOT_CONFIGURED);
    };
    let requested_count = item_ids.iter().collect::<HashSet<_>>().len();
    match storage.delete_items(user_id, item_ids).await {
        Ok(deleted_count) => {
            info!(%user_id, deleted_count, requested_count, "items deleted");
            ActionResponse::ok(ActionPayload::BatchDeleted {
                deleted_count,
                requested_count,
            })
        }
        Err(e) => failed(Action::BatchDelete, e),
    }
}

pub async fn recommendation(
    ctx: &ApiContext,
    user_id: &UserId,
    city: &str,
    style: &str,
    occasion: &str,
) -> ActionResponse {
    let Some(advisor) = &ctx.advisor else {
        return ActionResponse::failure(AI_NOT_CONFIGURED);
    };
    let Some(storage) = &ctx.storage else {
        return ActionResponse::failure(DATABASE_NOT_CONFIGURED);
    };
    let Some(provider) = &ctx.weather else {
        return ActionResponse::failure(WEATHER_NOT_CONFIGURED);
    };

    let items = match storage.list_items_for_user(user_id).await {
        Ok(items) if items.is_empty() => return ActionResponse::failure(WARDROBE_EMPTY),
        Ok(items) => items,
        Err(e) => return failed(Action::Recommendation, e),
    };
    let weather = match provider.current(city).await {
        Ok(Some(record)) => record,
        Ok(None) => return ActionResponse::failure(WEATHER_UNAVAILABLE),
        Err(e) => return failed(Action::Recommendation, e),
    };

    let style = non_blank_or(style, DEFAULT_STYLE);
    let occasion = non_blank_or(occasion, DEFAULT_OCCASION);
    let advice = advisor
        .recommend(OutfitRequest {
            items: &items,
            weather: &weather,
            style,
            occasion,
        })
        .await;
    match advice {
        Ok(recommendation) => {
            let matched = match_recommended_items(&recommendation, &items);
            info!(%user_id, matched = matched.len(), "recommendation generated");
            ActionResponse::ok(ActionPayload::Recommendation {
                recommendation,
                items: matched,
                weather,
            })
        }
        Err(e) => failed(Action::Recommendation, e),
    }
}

fn non_blank_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.trim().is_empty() {
        default
    } else {
        value
    }
}

/// Collaborator failures become a failure response carrying the error text.
fn failed(action: Action, err: anyhow::Error) -> ActionResponse {
    error!(%action, error = %err, "action handler failed");
    ActionResponse::failure(err.to_string())
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
