use std::{sync::Arc, time::Duration};

use advisor::{GeminiAdvisor, GeminiConfig};
use server_api::ApiContext;
use storage::Storage;
use tracing::{info, warn};
use weather::{OpenWeatherClient, WeatherConfig};

use crate::config::Settings;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) api: ApiContext,
    pub(crate) action_timeout: Duration,
}

impl AppState {
    pub(crate) fn new(api: ApiContext, action_timeout: Duration) -> Self {
        Self {
            api,
            action_timeout,
        }
    }
}

/// Wires the collaborators the settings allow. A missing key leaves that
/// collaborator unset; handlers then answer "not configured".
pub(crate) fn build_api_context(
    settings: &Settings,
    storage: Option<Storage>,
) -> anyhow::Result<ApiContext> {
    let weather = match settings.weather_api_key.as_deref() {
        Some(key) => {
            let client = OpenWeatherClient::new(WeatherConfig {
                timeout: settings.http_timeout(),
                ..WeatherConfig::new(key)
            })?;
            info!("weather service configured");
            Some(Arc::new(client) as Arc<dyn weather::WeatherProvider>)
        }
        None => {
            warn!("WEATHER_API_KEY not set; weather actions will fail");
            None
        }
    };

    let advisor = match settings.gemini_api_key.as_deref() {
        Some(key) => {
            let mut config = GeminiConfig::new(key);
            config.timeout = settings.http_timeout();
            if let Some(model) = &settings.gemini_model {
                config.model = model.clone();
            }
            info!(model = %config.model, "AI service configured");
            Some(Arc::new(GeminiAdvisor::new(config)?) as Arc<dyn advisor::OutfitAdvisor>)
        }
        None => {
            warn!("GEMINI_API_KEY not set; recommendations and uploads will fail");
            None
        }
    };

    Ok(ApiContext {
        storage,
        weather,
        advisor,
    })
}
