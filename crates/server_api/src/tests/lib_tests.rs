use super::*;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use shared::domain::{ClothingItem, ClothingTags, WeatherRecord};
use std::sync::atomic::{AtomicUsize, Ordering};
use storage::NewItem;

#[derive(Default)]
struct CountingWeather {
    calls: AtomicUsize,
}

#[async_trait]
impl WeatherProvider for CountingWeather {
    async fn current(&self, city: &str) -> Result<Option<WeatherRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if city == "Atlantis" {
            return Ok(None);
        }
        Ok(Some(WeatherRecord {
            city: city.to_string(),
            temperature: 12.0,
            feels_like: 10.5,
            temp_min: 9.0,
            temp_max: 14.0,
            humidity: 65,
            description: "overcast".into(),
            wind_speed: 3.2,
        }))
    }
}

struct ScriptedAdvisor {
    reply: Result<String, String>,
    seen_style: std::sync::Mutex<Option<(String, String)>>,
}

impl ScriptedAdvisor {
    fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            seen_style: Default::default(),
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            seen_style: Default::default(),
        }
    }
}

#[async_trait]
impl OutfitAdvisor for ScriptedAdvisor {
    async fn recommend(&self, request: OutfitRequest<'_>) -> Result<String> {
        *self.seen_style.lock().expect("lock") =
            Some((request.style.to_string(), request.occasion.to_string()));
        self.reply.clone().map_err(|message| anyhow!(message))
    }

    async fn tag_item(&self, _image: &[u8], _mime_type: &str) -> Result<ClothingTags> {
        Err(anyhow!("not used"))
    }
}

async fn storage() -> Storage {
    Storage::new("sqlite::memory:").await.expect("db")
}

async fn add_item(storage: &Storage, user_id: &UserId, name: &str) -> ClothingItem {
    let tags = ClothingTags {
        name: name.to_string(),
        category: "top".into(),
        color: "black".into(),
        style: "casual".into(),
        warmth: 2,
    };
    storage
        .insert_item(NewItem {
            user_id,
            tags: &tags,
            image_hash: name,
            image: b"img",
            image_mime: "image/jpeg",
        })
        .await
        .expect("item")
}

fn message(response: &ActionResponse) -> &str {
    response.message.as_deref().unwrap_or_default()
}

#[tokio::test]
async fn login_succeeds_with_matching_credentials() {
    let storage = storage().await;
    let user_id = storage.create_user("alice", "secret").await.expect("user");
    let ctx = ApiContext {
        storage: Some(storage),
        ..Default::default()
    };

    let response = login(&ctx, "alice", "secret").await;
    assert!(response.success);
    assert_eq!(
        response.payload,
        Some(ActionPayload::Login {
            user_id,
            username: "alice".into(),
        })
    );
}

#[tokio::test]
async fn wrong_password_and_unknown_user_look_the_same() {
    let storage = storage().await;
    storage.create_user("alice", "secret").await.expect("user");
    let ctx = ApiContext {
        storage: Some(storage),
        ..Default::default()
    };

    let wrong_password = login(&ctx, "alice", "nope").await;
    let unknown_user = login(&ctx, "mallory", "secret").await;
    assert!(!wrong_password.success);
    assert_eq!(wrong_password, unknown_user);
    assert_eq!(message(&wrong_password), INCORRECT_CREDENTIALS);
}

#[tokio::test]
async fn register_rejects_taken_username_and_accepts_new_one() {
    let storage = storage().await;
    storage.create_user("alice", "secret").await.expect("user");
    let ctx = ApiContext {
        storage: Some(storage),
        ..Default::default()
    };

    let taken = register(&ctx, "alice", "other").await;
    assert!(!taken.success);
    assert_eq!(message(&taken), USERNAME_TAKEN);

    let fresh = register(&ctx, "bob", "pw").await;
    assert!(fresh.success);
    assert_eq!(message(&fresh), REGISTERED);
    assert!(login(&ctx, "bob", "pw").await.success);

    let blank = register(&ctx, "  ", "pw").await;
    assert_eq!(message(&blank), CREDENTIALS_REQUIRED);
}

#[tokio::test]
async fn missing_collaborators_report_not_configured() {
    let ctx = ApiContext::default();
    let user_id = UserId::from("u1");

    assert_eq!(message(&login(&ctx, "a", "b").await), DATABASE_NOT_CONFIGURED);
    assert_eq!(message(&wardrobe(&ctx, &user_id).await), DATABASE_NOT_CONFIGURED);
    assert_eq!(message(&weather(&ctx, "Taipei").await), WEATHER_NOT_CONFIGURED);
    assert_eq!(
        message(&recommendation(&ctx, &user_id, "Taipei", "", "").await),
        AI_NOT_CONFIGURED
    );
}

#[tokio::test]
async fn recommendation_without_advisor_never_fetches_weather() {
    let provider = Arc::new(CountingWeather::default());
    let ctx = ApiContext {
        storage: Some(storage().await),
        weather: Some(provider.clone()),
        advisor: None,
    };

    let response = recommendation(&ctx, &UserId::from("u1"), "Taipei", "casual", "outing").await;
    assert!(!response.success);
    assert_eq!(message(&response), AI_NOT_CONFIGURED);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn weather_reports_unknown_city() {
    let ctx = ApiContext {
        weather: Some(Arc::new(CountingWeather::default())),
        ..Default::default()
    };

    let known = weather(&ctx, "Taipei").await;
    assert!(known.success);
    assert!(matches!(
        known.payload,
        Some(ActionPayload::Weather(ref record)) if record.city == "Taipei"
    ));

    let unknown = weather(&ctx, "Atlantis").await;
    assert_eq!(message(&unknown), WEATHER_UNAVAILABLE);
}

#[tokio::test]
async fn wardrobe_lists_only_the_owners_items() {
    let storage = storage().await;
    let alice = storage.create_user("alice", "pw").await.expect("user");
    let bob = storage.create_user("bob", "pw").await.expect("user");
    add_item(&storage, &alice, "hoodie").await;
    add_item(&storage, &alice, "jeans").await;
    add_item(&storage, &bob, "coat").await;
    let ctx = ApiContext {
        storage: Some(storage),
        ..Default::default()
    };

    let response = wardrobe(&ctx, &alice).await;
    let Some(ActionPayload::Wardrobe { items, total }) = response.payload else {
        panic!("expected wardrobe payload, got {response:?}");
    };
    assert_eq!(total, 2);
    assert!(items.iter().all(|item| item.user_id == alice));
}

#[tokio::test]
async fn delete_reports_missing_or_foreign_items() {
    let storage = storage().await;
    let alice = storage.create_user("alice", "pw").await.expect("user");
    let bob = storage.create_user("bob", "pw").await.expect("user");
    let coat = add_item(&storage, &bob, "coat").await;
    let ctx = ApiContext {
        storage: Some(storage),
        ..Default::default()
    };

    let foreign = delete_item(&ctx, &alice, &coat.item_id).await;
    assert_eq!(message(&foreign), ITEM_NOT_FOUND);

    let owned = delete_item(&ctx, &bob, &coat.item_id).await;
    assert_eq!(
        owned.payload,
        Some(ActionPayload::Deleted {
            deleted: true,
            item_id: coat.item_id.clone(),
        })
    );
    assert_eq!(message(&delete_item(&ctx, &bob, &coat.item_id).await), ITEM_NOT_FOUND);
}

#[tokio::test]
async fn batch_delete_counts_only_owned_rows() {
    let storage = storage().await;
    let u1 = storage.create_user("u1", "pw").await.expect("user");
    let u2 = storage.create_user("u2", "pw").await.expect("user");
    let a = add_item(&storage, &u1, "a").await;
    let b = add_item(&storage, &u1, "b").await;
    let c = add_item(&storage, &u2, "c").await;
    let ctx = ApiContext {
        storage: Some(storage.clone()),
        ..Default::default()
    };

    let response = batch_delete(
        &ctx,
        &u1,
        &[a.item_id.clone(), b.item_id.clone(), c.item_id.clone(), a.item_id],
    )
    .await;
    assert!(response.success);
    assert_eq!(
        response.payload,
        Some(ActionPayload::BatchDeleted {
            deleted_count: 2,
            requested_count: 3,
        })
    );
    assert_eq!(storage.list_items_for_user(&u2).await.expect("items").len(), 1);
}

#[tokio::test]
async fn batch_delete_of_nothing_succeeds() {
    let ctx = ApiContext {
        storage: Some(storage().await),
        ..Default::default()
    };
    let response = batch_delete(&ctx, &UserId::from("u1"), &[]).await;
    assert_eq!(
        response.payload,
        Some(ActionPayload::BatchDeleted {
            deleted_count: 0,
            requested_count: 0,
        })
    );
}

#[tokio::test]
async fn recommendation_matches_named_items_and_defaults_blank_inputs() {
    let storage = storage().await;
    let alice = storage.create_user("alice", "pw").await.expect("user");
    add_item(&storage, &alice, "Grey Hoodie").await;
    add_item(&storage, &alice, "linen shorts").await;
    let advisor = Arc::new(ScriptedAdvisor::replying(
        "Layer the grey hoodie over a tee; it is chilly.",
    ));
    let ctx = ApiContext {
        storage: Some(storage),
        weather: Some(Arc::new(CountingWeather::default())),
        advisor: Some(advisor.clone()),
    };

    let response = recommendation(&ctx, &alice, "Taipei", " ", "").await;
    let Some(ActionPayload::Recommendation {
        recommendation,
        items,
        weather,
    }) = response.payload
    else {
        panic!("expected recommendation payload, got {response:?}");
    };
    assert!(recommendation.contains("grey hoodie"));
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].name, "Grey Hoodie");
    assert_eq!(weather.city, "Taipei");
    assert_eq!(
        advisor.seen_style.lock().expect("lock").clone(),
        Some((DEFAULT_STYLE.to_string(), DEFAULT_OCCASION.to_string()))
    );
}

#[tokio::test]
async fn recommendation_needs_a_wardrobe() {
    let storage = storage().await;
    let alice = storage.create_user("alice", "pw").await.expect("user");
    let provider = Arc::new(CountingWeather::default());
    let ctx = ApiContext {
        storage: Some(storage),
        weather: Some(provider.clone()),
        advisor: Some(Arc::new(ScriptedAdvisor::replying("anything"))),
    };

    let response = recommendation(&ctx, &alice, "Taipei", "casual", "outing").await;
    assert_eq!(message(&response), WARDROBE_EMPTY);
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn advisor_errors_become_failure_messages() {
    let storage = storage().await;
    let alice = storage.create_user("alice", "pw").await.expect("user");
    add_item(&storage, &alice, "scarf").await;
    let ctx = ApiContext {
        storage: Some(storage),
        weather: Some(Arc::new(CountingWeather::default())),
        advisor: Some(Arc::new(ScriptedAdvisor::failing("quota exceeded"))),
    };

    let response = recommendation(&ctx, &alice, "Taipei", "casual", "outing").await;
    assert!(!response.success);
    assert_eq!(message(&response), "quota exceeded");
}

#[tokio::test]
async fn handle_routes_each_request_to_its_handler() {
    let ctx = ApiContext::default();
    let response = handle(
        &ctx,
        ActionRequest::Weather {
            city: "Taipei".into(),
        },
    )
    .await;
    assert_eq!(message(&response), WEATHER_NOT_CONFIGURED);

    let response = handle(
        &ctx,
        ActionRequest::BatchDelete {
            user_id: UserId::from("u1"),
            item_ids: vec![ItemId::from("a")],
        },
    )
    .await;
    assert_eq!(message(&response), DATABASE_NOT_CONFIGURED);
}
