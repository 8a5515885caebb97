//! Google Places URL source.
//!
//! Finds businesses matching `"<keyword> in <location>"` and extracts
//! their website URLs. The Places nearby-search API caps results per
//! query, so the location's bounding box is tiled into fixed-radius
//! cells and each cell is searched independently; place-details calls
//! (the only way to get the website field) are throttled and
//! deduplicated by place id.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use siteaudit_core::{Error, Result};

use crate::Source;

/// Search radius per tile, metres.
const TILE_SIZE_METRES: f64 = 500.0;
/// Bounding-box expansion so outskirts are included.
const BOUNDS_BUFFER_PERCENT: f64 = 0.15;
/// Place-details call budget, queries per second.
const PLACE_DETAIL_QPS: u64 = 5;
/// Required delay before a nearby-search page token becomes valid.
const PAGE_TOKEN_DELAY: Duration = Duration::from_secs(2);

const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";
const NEARBY_SEARCH_URL: &str = "https://maps.googleapis.com/maps/api/place/nearbysearch/json";
const PLACE_DETAILS_URL: &str = "https://maps.googleapis.com/maps/api/place/details/json";

#[derive(Debug, Clone, Copy, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct LatLngBounds {
    northeast: LatLng,
    southwest: LatLng,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    bounds: Option<LatLngBounds>,
    viewport: Option<LatLngBounds>,
}

#[derive(Debug, Deserialize)]
struct NearbySearchResponse {
    status: String,
    #[serde(default)]
    results: Vec<NearbyPlace>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NearbyPlace {
    place_id: String,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaceDetailsResponse {
    status: String,
    result: Option<PlaceDetails>,
}

#[derive(Debug, Deserialize)]
struct PlaceDetails {
    website: Option<String>,
}

/// Extracts business website URLs from the Google Places API.
pub struct GooglePlacesSource {
    keyword: String,
    location: String,
}

impl GooglePlacesSource {
    /// Validate the `"<keyword> in <location>"` prompt format before any
    /// network work.
    pub fn new(prompt: &str) -> Result<Self> {
        let (keyword, location) = parse_prompt(prompt)?;
        Ok(Self { keyword, location })
    }
}

#[async_trait]
impl Source for GooglePlacesSource {
    fn name(&self) -> &'static str {
        "google places"
    }

    async fn extract(&self) -> Result<Vec<String>> {
        let api_key = std::env::var("MAPS_API_KEY")
            .map_err(|_| Error::Config("MAPS_API_KEY is required for the search source".to_string()))?;

        let client = reqwest::Client::new();

        let bounds = geocode_bounds(&client, &self.location, &api_key).await?;
        let expanded = expand_bounds(bounds, BOUNDS_BUFFER_PERCENT);
        let tiles = generate_tiles(expanded, TILE_SIZE_METRES);
        debug!(tiles = tiles.len(), "searching location grid");

        let mut urls = Vec::new();
        // place id -> website; one details call per place across all tiles
        let mut seen: HashMap<String, Option<String>> = HashMap::new();

        let mut throttle =
            tokio::time::interval(Duration::from_millis(1_000 / PLACE_DETAIL_QPS));

        for centre in tiles {
            let places =
                search_nearby(&client, &self.keyword, centre, TILE_SIZE_METRES, &api_key).await?;

            for place in places {
                if seen.contains_key(&place.place_id) {
                    continue;
                }

                throttle.tick().await;

                let website =
                    match fetch_website(&client, &place.place_id, &api_key).await {
                        Ok(website) => website,
                        Err(e) => {
                            warn!(
                                place = place.name.as_deref().unwrap_or("?"),
                                "failed place details: {}", e
                            );
                            seen.insert(place.place_id, None);
                            continue;
                        }
                    };

                if let Some(url) = &website {
                    urls.push(url.clone());
                }
                seen.insert(place.place_id, website);
            }
        }

        Ok(urls)
    }
}

/// Split and validate a `"<keyword> in <location>"` prompt.
pub fn parse_prompt(prompt: &str) -> Result<(String, String)> {
    let Some((keyword, location)) = prompt.split_once(" in ") else {
        return Err(Error::Config(
            "search prompt must be in format: \"[Business Type] in [Location]\"".to_string(),
        ));
    };

    let keyword = keyword.trim();
    let location = location.trim();
    if keyword.is_empty() || location.is_empty() {
        return Err(Error::Config(
            "search prompt must contain both business type and location".to_string(),
        ));
    }

    Ok((keyword.to_string(), location.to_string()))
}

/// Geocode a location name to its bounding box.
async fn geocode_bounds(
    client: &reqwest::Client,
    location: &str,
    api_key: &str,
) -> Result<LatLngBounds> {
    let response: GeocodeResponse = client
        .get(GEOCODE_URL)
        .query(&[("address", location), ("key", api_key)])
        .send()
        .await
        .map_err(|e| Error::Extract(format!("failed to geocode {}: {}", location, e)))?
        .json()
        .await
        .map_err(|e| Error::Extract(format!("bad geocode response: {}", e)))?;

    if response.status != "OK" || response.results.is_empty() {
        return Err(Error::Extract(format!(
            "no geocode results for {} (status {})",
            location, response.status
        )));
    }

    let geometry = &response.results[0].geometry;
    geometry
        .bounds
        .or(geometry.viewport)
        .ok_or_else(|| Error::Extract(format!("no bounds for {}", location)))
}

/// Fetch up to 60 places around a tile centre, following page tokens.
async fn search_nearby(
    client: &reqwest::Client,
    keyword: &str,
    centre: LatLng,
    radius_metres: f64,
    api_key: &str,
) -> Result<Vec<NearbyPlace>> {
    let location = format!("{},{}", centre.lat, centre.lng);
    let radius = format!("{}", radius_metres as u64);
    let mut places = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let mut request = client.get(NEARBY_SEARCH_URL).query(&[
            ("location", location.as_str()),
            ("radius", radius.as_str()),
            ("keyword", keyword),
            ("key", api_key),
        ]);
        if let Some(token) = &page_token {
            request = request.query(&[("pagetoken", token.as_str())]);
        }

        let response: NearbySearchResponse = request
            .send()
            .await
            .map_err(|e| Error::Extract(format!("failed nearby search at {}: {}", location, e)))?
            .json()
            .await
            .map_err(|e| Error::Extract(format!("bad nearby search response: {}", e)))?;

        // ZERO_RESULTS is a normal outcome for tiles without matches.
        if response.status != "OK" && response.status != "ZERO_RESULTS" {
            return Err(Error::Extract(format!(
                "nearby search failed at {}: status {}",
                location, response.status
            )));
        }

        places.extend(response.results);

        match response.next_page_token {
            Some(token) => {
                page_token = Some(token);
                tokio::time::sleep(PAGE_TOKEN_DELAY).await;
            }
            None => break,
        }
    }

    Ok(places)
}

/// Fetch one place's website field.
async fn fetch_website(
    client: &reqwest::Client,
    place_id: &str,
    api_key: &str,
) -> Result<Option<String>> {
    let response: PlaceDetailsResponse = client
        .get(PLACE_DETAILS_URL)
        .query(&[("place_id", place_id), ("fields", "website"), ("key", api_key)])
        .send()
        .await
        .map_err(|e| Error::Extract(format!("failed place details for {}: {}", place_id, e)))?
        .json()
        .await
        .map_err(|e| Error::Extract(format!("bad place details response: {}", e)))?;

    if response.status != "OK" {
        return Err(Error::Extract(format!(
            "place details failed for {}: status {}",
            place_id, response.status
        )));
    }

    Ok(response
        .result
        .and_then(|details| details.website)
        .filter(|website| !website.is_empty()))
}

/// Add a buffer around the original bounds.
fn expand_bounds(bounds: LatLngBounds, buffer_percent: f64) -> LatLngBounds {
    let lat_buffer = (bounds.northeast.lat - bounds.southwest.lat) * buffer_percent;
    let lng_buffer = (bounds.northeast.lng - bounds.southwest.lng) * buffer_percent;

    LatLngBounds {
        northeast: LatLng {
            lat: bounds.northeast.lat + lat_buffer,
            lng: bounds.northeast.lng + lng_buffer,
        },
        southwest: LatLng {
            lat: bounds.southwest.lat - lat_buffer,
            lng: bounds.southwest.lng - lng_buffer,
        },
    }
}

/// Split bounds into a grid of tile centres, one search per tile.
fn generate_tiles(bounds: LatLngBounds, tile_size_metres: f64) -> Vec<LatLng> {
    let lat_step = metres_to_lat(tile_size_metres);
    let mid_lat = (bounds.northeast.lat + bounds.southwest.lat) / 2.0;
    let lng_step = metres_to_lng(tile_size_metres, mid_lat);

    let mut tiles = Vec::new();
    let mut lat = bounds.southwest.lat;
    while lat <= bounds.northeast.lat {
        let mut lng = bounds.southwest.lng;
        while lng <= bounds.northeast.lng {
            tiles.push(LatLng { lat, lng });
            lng += lng_step;
        }
        lat += lat_step;
    }

    tiles
}

fn metres_to_lat(metres: f64) -> f64 {
    metres / 111_320.0
}

fn metres_to_lng(metres: f64, lat: f64) -> f64 {
    metres / (111_320.0 * (lat * std::f64::consts::PI / 180.0).cos())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_prompt() {
        let (keyword, location) = parse_prompt("barbers in Manchester").unwrap();
        assert_eq!(keyword, "barbers");
        assert_eq!(location, "Manchester");

        assert!(parse_prompt("barbers").is_err());
        assert!(parse_prompt(" in Manchester").is_err());
        assert!(parse_prompt("barbers in ").is_err());
    }

    #[test]
    fn test_expand_bounds_adds_buffer() {
        let bounds = LatLngBounds {
            northeast: LatLng { lat: 1.0, lng: 2.0 },
            southwest: LatLng { lat: 0.0, lng: 0.0 },
        };
        let expanded = expand_bounds(bounds, 0.15);
        assert!((expanded.northeast.lat - 1.15).abs() < 1e-9);
        assert!((expanded.northeast.lng - 2.3).abs() < 1e-9);
        assert!((expanded.southwest.lat + 0.15).abs() < 1e-9);
        assert!((expanded.southwest.lng + 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_generate_tiles_covers_bounds() {
        let bounds = LatLngBounds {
            northeast: LatLng { lat: 0.02, lng: 0.02 },
            southwest: LatLng { lat: 0.0, lng: 0.0 },
        };
        let tiles = generate_tiles(bounds, 500.0);
        assert!(!tiles.is_empty());
        // ~500m steps over a ~2.2km box: a handful of rows and columns.
        assert!(tiles.len() > 9 && tiles.len() < 50, "got {}", tiles.len());
        for tile in &tiles {
            assert!(tile.lat >= 0.0 && tile.lat <= 0.02);
            assert!(tile.lng >= 0.0 && tile.lng <= 0.02);
        }
    }

    #[test]
    fn test_metres_conversion_grows_with_latitude() {
        let at_equator = metres_to_lng(500.0, 0.0);
        let at_60_north = metres_to_lng(500.0, 60.0);
        assert!(at_60_north > at_equator * 1.9);
    }
}
