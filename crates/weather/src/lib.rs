use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use shared::domain::WeatherRecord;
use tracing::debug;

pub const DEFAULT_WEATHER_BASE_URL: &str = "https://api.openweathermap.org";

/// Current-conditions lookup by city name. `Ok(None)` means the provider does
/// not know the city.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, city: &str) -> Result<Option<WeatherRecord>>;
}

#[derive(Debug, Clone)]
pub struct WeatherConfig {
    pub api_key: String,
    pub base_url: String,
    pub lang: String,
    pub timeout: Duration,
}

impl WeatherConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_WEATHER_BASE_URL.to_string(),
            lang: "zh_tw".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

pub struct OpenWeatherClient {
    http: Client,
    config: WeatherConfig,
}

#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    name: String,
    main: MainReadings,
    #[serde(default)]
    weather: Vec<Condition>,
    #[serde(default)]
    wind: Option<Wind>,
}

#[derive(Debug, Deserialize)]
struct MainReadings {
    temp: f64,
    feels_like: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct Condition {
    description: String,
}

#[derive(Debug, Deserialize)]
struct Wind {
    speed: f64,
}

impl OpenWeatherClient {
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build weather http client")?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current(&self, city: &str) -> Result<Option<WeatherRecord>> {
        let url = format!(
            "{}/data/2.5/weather",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(url)
            .query(&[
                ("q", city),
                ("appid", self.config.api_key.as_str()),
                ("units", "metric"),
                ("lang", self.config.lang.as_str()),
            ])
            .send()
            .await
            .with_context(|| format!("weather request for '{city}' failed"))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(%city, "weather provider does not know city");
            return Ok(None);
        }

        let body: CurrentWeatherResponse = response.error_for_status()?.json().await?;
        Ok(Some(normalize(city, body)))
    }
}

fn normalize(requested_city: &str, body: CurrentWeatherResponse) -> WeatherRecord {
    let city = if body.name.trim().is_empty() {
        requested_city.to_string()
    } else {
        body.name
    };
    WeatherRecord {
        city,
        temperature: round1(body.main.temp),
        feels_like: round1(body.main.feels_like),
        temp_min: round1(body.main.temp_min),
        temp_max: round1(body.main.temp_max),
        humidity: body.main.humidity.round().clamp(0.0, 100.0) as u8,
        description: body
            .weather
            .into_iter()
            .next()
            .map(|condition| condition.description)
            .unwrap_or_default(),
        wind_speed: body.wind.map(|wind| round1(wind.speed)).unwrap_or_default(),
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
