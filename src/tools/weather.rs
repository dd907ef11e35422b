// ABOUTME: Weather lookup tool resolving a city or coordinates to current conditions
// ABOUTME: Geocoding results are cached process-wide with a 24-hour TTL
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! Weather tool
//!
//! Resolves a city name to coordinates through a TTL-cached geocoding call,
//! then fetches current conditions. The upstream APIs sit behind the
//! [`WeatherApi`] trait so tests supply fakes and production wires in the
//! Google endpoints.

use crate::cache::TtlCache;
use crate::config::environment::WeatherConfig;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::{ChatTool, ToolError};

/// Name the model invokes the weather tool by
pub const WEATHER_TOOL_NAME: &str = "displayWeather";

/// Resolved geographic coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

/// Geocode cache shared across concurrent tool invocations
pub type GeocodeCache = TtlCache<String, Coordinates>;

/// Upstream weather service interface
#[async_trait]
pub trait WeatherApi: Send + Sync {
    /// Resolve a city name to coordinates; `None` when the city is unknown
    async fn geocode(&self, city: &str) -> AppResult<Option<Coordinates>>;

    /// Fetch current conditions for a location
    async fn current_conditions(&self, latitude: f64, longitude: f64) -> AppResult<Value>;
}

// ============================================================================
// Tool Input
// ============================================================================

#[derive(Debug, Deserialize)]
struct WeatherInput {
    #[serde(default)]
    latitude: Option<f64>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    city: Option<String>,
}

// ============================================================================
// Tool Implementation
// ============================================================================

/// Current-weather lookup tool
pub struct WeatherTool {
    api: Arc<dyn WeatherApi>,
    geocode_cache: Arc<GeocodeCache>,
}

impl WeatherTool {
    /// Create a weather tool over an API implementation and a shared cache
    #[must_use]
    pub fn new(api: Arc<dyn WeatherApi>, geocode_cache: Arc<GeocodeCache>) -> Self {
        Self { api, geocode_cache }
    }

    /// Resolve a city to coordinates, preferring a live cache entry
    async fn resolve_city(&self, city: &str) -> Result<Coordinates, ToolError> {
        let cache_key = city.to_lowercase();

        if let Some(coords) = self.geocode_cache.get(&cache_key) {
            debug!("Using cached geocode for: {}", city);
            return Ok(coords);
        }

        let coords = self
            .api
            .geocode(city)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?
            .ok_or_else(|| {
                ToolError::Execution(format!(
                    "Could not find coordinates for \"{city}\". Please check the city name."
                ))
            })?;

        self.geocode_cache.insert(cache_key, coords);
        Ok(coords)
    }
}

#[async_trait]
impl ChatTool for WeatherTool {
    fn name(&self) -> &'static str {
        WEATHER_TOOL_NAME
    }

    fn description(&self) -> &'static str {
        "Get the current weather for a location when the user asks for weather \
         information and provides coordinates or a city name."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "latitude": {"type": "number"},
                "longitude": {"type": "number"},
                "city": {
                    "type": "string",
                    "description": "City name in English (e.g., 'taipei', 'new taipei', 'taichung')"
                }
            }
        })
    }

    #[instrument(skip(self, input), fields(tool = WEATHER_TOOL_NAME))]
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let input: WeatherInput = serde_json::from_value(input)
            .map_err(|e| ToolError::Validation(format!("Invalid weather input: {e}")))?;

        let city = input.city.filter(|c| !c.trim().is_empty());

        let coords = if let Some(ref city) = city {
            self.resolve_city(city).await?
        } else if let (Some(latitude), Some(longitude)) = (input.latitude, input.longitude) {
            Coordinates {
                latitude,
                longitude,
            }
        } else {
            return Err(ToolError::Validation(
                "Please provide either a city name or both latitude and longitude coordinates."
                    .to_owned(),
            ));
        };

        let mut weather = self
            .api
            .current_conditions(coords.latitude, coords.longitude)
            .await
            .map_err(|e| ToolError::Execution(e.to_string()))?;

        if let (Some(city), Some(object)) = (city, weather.as_object_mut()) {
            object.insert("cityName".to_owned(), Value::String(city));
        }

        Ok(weather)
    }
}

// ============================================================================
// Google API Implementation
// ============================================================================

/// Google geocoding + current conditions client
pub struct GoogleWeatherApi {
    client: Client,
    api_key: String,
    geocode_base_url: String,
    conditions_base_url: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: GeocodeGeometry,
}

#[derive(Debug, Deserialize)]
struct GeocodeGeometry {
    location: GeocodeLocation,
}

#[derive(Debug, Deserialize)]
struct GeocodeLocation {
    lat: f64,
    lng: f64,
}

impl GoogleWeatherApi {
    /// Create the API client from weather configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no Google API key is configured
    pub fn from_config(config: &WeatherConfig) -> AppResult<Self> {
        let api_key = config
            .google_api_key
            .clone()
            .ok_or_else(|| AppError::config("Missing GOOGLE_API_KEY configuration"))?;

        Ok(Self {
            client: Client::new(),
            api_key,
            geocode_base_url: config.geocode_base_url.clone(),
            conditions_base_url: config.conditions_base_url.clone(),
        })
    }
}

#[async_trait]
impl WeatherApi for GoogleWeatherApi {
    #[instrument(skip(self), fields(service = "geocode"))]
    async fn geocode(&self, city: &str) -> AppResult<Option<Coordinates>> {
        info!("Fetching geocode data for city: {}", city);

        let url = format!(
            "{}/json?address={}&key={}",
            self.geocode_base_url,
            urlencoding::encode(city),
            self.api_key
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            AppError::external_service("Geocoding", format!("Failed to send request: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::external_service(
                "Geocoding",
                format!("API returned status: {status}"),
            ));
        }

        let geocode: GeocodeResponse = response.json().await.map_err(|e| {
            AppError::external_service("Geocoding", format!("Failed to parse response: {e}"))
        })?;

        Ok(geocode.results.into_iter().next().map(|result| Coordinates {
            latitude: result.geometry.location.lat,
            longitude: result.geometry.location.lng,
        }))
    }

    #[instrument(skip(self), fields(service = "weather", lat = %latitude, lon = %longitude))]
    async fn current_conditions(&self, latitude: f64, longitude: f64) -> AppResult<Value> {
        let url = format!(
            "{}/currentConditions:lookup?key={}&location.latitude={latitude}&location.longitude={longitude}&languageCode=zh-tw",
            self.conditions_base_url, self.api_key
        );

        let response = self.client.get(&url).send().await.map_err(|e| {
            AppError::external_service("Weather", format!("Failed to send request: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(AppError::external_service(
                "Weather",
                format!("Failed to fetch weather data. Status: {status}"),
            ));
        }

        response.json().await.map_err(|e| {
            AppError::external_service("Weather", format!("Failed to parse response: {e}"))
        })
    }
}
