use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{Collection, GeoPoint, TimeRange};
use crate::error::TempoError;
use crate::net;
use crate::session::EarthdataSession;

pub const CMR_GRANULE_SEARCH_URL: &str = "https://cmr.earthdata.nasa.gov/search/granules.json";

const DATA_REL: &str = "http://esipfed.org/ns/fedsearch/1.1/data#";
const SEARCH_AFTER_HEADER: &str = "cmr-search-after";
pub const PAGE_SIZE: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GranuleHandle {
    pub id: String,
    pub url: String,
    pub filename: String,
}

impl GranuleHandle {
    pub fn from_url(id: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        let filename = url
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            id: id.into(),
            url,
            filename,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GranuleSearch<'a> {
    pub collection: &'a Collection,
    pub time_range: &'a TimeRange,
    pub point: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Granules(Vec<GranuleHandle>),
    NoResults,
    LookupFailed { reason: String },
}

pub trait GranuleCatalog: Send + Sync {
    fn search(&self, request: &GranuleSearch<'_>) -> SearchOutcome;
}

#[derive(Debug, Deserialize)]
struct CmrResponse {
    feed: CmrFeed,
}

#[derive(Debug, Deserialize)]
struct CmrFeed {
    #[serde(default)]
    entry: Vec<CmrEntry>,
}

#[derive(Debug, Deserialize)]
struct CmrEntry {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    links: Vec<CmrLink>,
}

#[derive(Debug, Deserialize)]
struct CmrLink {
    href: String,
    #[serde(default)]
    rel: String,
    #[serde(default)]
    inherited: bool,
}

#[derive(Clone)]
pub struct CmrCatalog {
    client: Client,
    search_url: String,
    session: Option<Arc<EarthdataSession>>,
}

impl CmrCatalog {
    pub fn new(
        search_url: &str,
        user_agent: &str,
        session: Option<Arc<EarthdataSession>>,
    ) -> Result<Self, TempoError> {
        let client =
            net::build_client(user_agent, Duration::from_secs(60)).map_err(TempoError::CatalogHttp)?;
        Ok(Self {
            client,
            search_url: search_url.to_string(),
            session,
        })
    }

    fn fetch_all(&self, request: &GranuleSearch<'_>) -> Result<Vec<GranuleHandle>, TempoError> {
        let temporal = request.time_range.to_temporal_param();
        let point = format!("{},{}", request.point.longitude, request.point.latitude);
        let page_size = PAGE_SIZE.to_string();
        let mut handles = Vec::new();
        let mut search_after: Option<String> = None;
        let credentials = match &self.session {
            Some(session) => match session.credentials() {
                Ok(credentials) => Some(credentials),
                Err(err) => {
                    debug!(%err, "searching catalog without credentials");
                    None
                }
            },
            None => None,
        };

        loop {
            let response = net::send_with_retries(|| {
                let mut builder = self.client.get(&self.search_url).query(&[
                    ("short_name", request.collection.short_name.as_str()),
                    ("version", request.collection.version.as_str()),
                    ("temporal", temporal.as_str()),
                    ("point", point.as_str()),
                    ("page_size", page_size.as_str()),
                    ("sort_key", "start_date"),
                ]);
                if let Some(token) = &search_after {
                    builder = builder.header(SEARCH_AFTER_HEADER, token.as_str());
                }
                match &credentials {
                    Some(credentials) => credentials.apply(builder),
                    None => builder,
                }
            })
            .map_err(|err| TempoError::CatalogHttp(err.to_string()))?;
            let response = net::check_status(response, "catalog request failed")
                .map_err(|(status, message)| TempoError::CatalogStatus { status, message })?;
            let next = response
                .headers()
                .get(SEARCH_AFTER_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);
            let body = response
                .text()
                .map_err(|err| TempoError::CatalogHttp(err.to_string()))?;
            let page = parse_granule_feed(&body)?;
            let full_page = page.entries >= PAGE_SIZE;
            handles.extend(page.handles);

            match next {
                Some(token) if full_page => search_after = Some(token),
                _ => break,
            }
        }
        Ok(handles)
    }
}

impl GranuleCatalog for CmrCatalog {
    fn search(&self, request: &GranuleSearch<'_>) -> SearchOutcome {
        match self.fetch_all(request) {
            Ok(handles) if handles.is_empty() => SearchOutcome::NoResults,
            Ok(handles) => {
                debug!(count = handles.len(), collection = %request.collection, "catalog search");
                SearchOutcome::Granules(handles)
            }
            Err(err) => {
                warn!(%err, collection = %request.collection, "catalog lookup failed");
                SearchOutcome::LookupFailed {
                    reason: err.to_string(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GranulePage {
    pub handles: Vec<GranuleHandle>,
    pub entries: usize,
}

pub fn parse_granule_feed(body: &str) -> Result<GranulePage, TempoError> {
    let response: CmrResponse =
        serde_json::from_str(body).map_err(|err| TempoError::CatalogHttp(err.to_string()))?;
    let entries = response.feed.entry.len();
    let handles = response
        .feed
        .entry
        .into_iter()
        .filter_map(|entry| {
            let link = entry
                .links
                .into_iter()
                .find(|link| link.rel == DATA_REL && !link.inherited && link.href.starts_with("https://"))?;
            let id = if entry.title.is_empty() {
                entry.id
            } else {
                entry.title
            };
            Some(GranuleHandle::from_url(id, link.href))
        })
        .collect();
    Ok(GranulePage { handles, entries })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_is_last_path_segment() {
        let handle = GranuleHandle::from_url(
            "G1",
            "https://data.asdc.earthdata.nasa.gov/asdc-prod-protected/TEMPO/TEMPO_NO2_L3_V03/2024.01.01/TEMPO_NO2_L3_V03_20240101T140000Z_S004.nc",
        );
        assert_eq!(handle.filename, "TEMPO_NO2_L3_V03_20240101T140000Z_S004.nc");
    }

    #[test]
    fn parses_data_links_in_feed_order() {
        let body = r#"{"feed": {"entry": [
            {"id": "G1", "title": "A.nc", "links": [
                {"href": "https://example.org/collection", "rel": "http://esipfed.org/ns/fedsearch/1.1/data#", "inherited": true},
                {"href": "s3://bucket/A.nc", "rel": "http://esipfed.org/ns/fedsearch/1.1/data#"},
                {"href": "https://example.org/A.nc", "rel": "http://esipfed.org/ns/fedsearch/1.1/data#"}
            ]},
            {"id": "G2", "title": "no-data", "links": [
                {"href": "https://example.org/browse.png", "rel": "http://esipfed.org/ns/fedsearch/1.1/browse#"}
            ]},
            {"id": "G3", "title": "B.nc", "links": [
                {"href": "https://example.org/B.nc", "rel": "http://esipfed.org/ns/fedsearch/1.1/data#"}
            ]}
        ]}}"#;
        let page = parse_granule_feed(body).unwrap();
        assert_eq!(page.entries, 3);
        let handles = page.handles;
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].url, "https://example.org/A.nc");
        assert_eq!(handles[0].filename, "A.nc");
        assert_eq!(handles[1].id, "B.nc");
    }

    #[test]
    fn empty_feed_has_no_handles() {
        let page = parse_granule_feed(r#"{"feed": {"entry": []}}"#).unwrap();
        assert_eq!(page, GranulePage::default());
    }
}
