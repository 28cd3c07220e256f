use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::domain::GeoPoint;
use crate::error::TempoError;
use crate::net;

pub const NOMINATIM_SEARCH_URL: &str = "https://nominatim.openstreetmap.org/search";

pub trait Geocoder: Send + Sync {
    fn locate(&self, place: &str) -> Result<Option<GeoPoint>, TempoError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: String,
    lon: String,
}

#[derive(Clone)]
pub struct NominatimGeocoder {
    client: Client,
    search_url: String,
}

impl NominatimGeocoder {
    pub fn new(search_url: &str, user_agent: &str) -> Result<Self, TempoError> {
        let client =
            net::build_client(user_agent, Duration::from_secs(30)).map_err(TempoError::GeocoderHttp)?;
        Ok(Self {
            client,
            search_url: search_url.to_string(),
        })
    }
}

impl Geocoder for NominatimGeocoder {
    fn locate(&self, place: &str) -> Result<Option<GeoPoint>, TempoError> {
        let response = net::send_with_retries(|| {
            self.client
                .get(&self.search_url)
                .query(&[("q", place), ("format", "jsonv2"), ("limit", "1")])
        })
        .map_err(|err| TempoError::GeocoderHttp(err.to_string()))?;
        let response = net::check_status(response, "geocoder request failed")
            .map_err(|(status, message)| TempoError::GeocoderStatus { status, message })?;
        let body = response
            .text()
            .map_err(|err| TempoError::GeocoderHttp(err.to_string()))?;
        parse_search_response(&body)
    }
}

pub fn parse_search_response(body: &str) -> Result<Option<GeoPoint>, TempoError> {
    let places: Vec<NominatimPlace> =
        serde_json::from_str(body).map_err(|err| TempoError::GeocoderHttp(err.to_string()))?;
    let Some(place) = places.into_iter().next() else {
        return Ok(None);
    };
    let latitude = place
        .lat
        .parse::<f64>()
        .map_err(|err| TempoError::GeocoderHttp(format!("latitude {:?}: {err}", place.lat)))?;
    let longitude = place
        .lon
        .parse::<f64>()
        .map_err(|err| TempoError::GeocoderHttp(format!("longitude {:?}: {err}", place.lon)))?;
    Ok(Some(GeoPoint::new(latitude, longitude)))
}
