use std::path::Path;
use std::time::Instant;

use camino::Utf8PathBuf;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregate::Aggregator;
use crate::cache::QueryCache;
use crate::catalog::{GranuleCatalog, GranuleSearch, SearchOutcome};
use crate::config::ResolvedConfig;
use crate::domain::{BoundingBox, Collection, GeoPoint, Observation, Query, Window};
use crate::error::TempoError;
use crate::geocode::Geocoder;
use crate::granule::{GranuleAttributes, GranuleReader, granule_name};
use crate::region;
use crate::transfer::GranuleTransfer;

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub collection: Collection,
    pub window: Window,
    pub download_dir: Utf8PathBuf,
}

impl From<&ResolvedConfig> for ServiceSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            collection: config.collection.clone(),
            window: config.window,
            download_dir: config.download_dir.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Cache,
    Computed,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub point: GeoPoint,
    pub source: ResultSource,
    pub observations: Vec<Observation>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GranuleSummary {
    pub granule: String,
    pub point: GeoPoint,
    pub attributes: GranuleAttributes,
    pub grid_rows: usize,
    pub grid_cols: usize,
    pub observations: Vec<Observation>,
}

pub struct QueryService<G: Geocoder, C: GranuleCatalog, T: GranuleTransfer, R: GranuleReader> {
    geocoder: G,
    catalog: C,
    transfer: T,
    reader: R,
    cache: QueryCache,
    settings: ServiceSettings,
}

impl<G: Geocoder, C: GranuleCatalog, T: GranuleTransfer, R: GranuleReader> QueryService<G, C, T, R> {
    pub fn new(
        geocoder: G,
        catalog: C,
        transfer: T,
        reader: R,
        cache: QueryCache,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            geocoder,
            catalog,
            transfer,
            reader,
            cache,
            settings,
        }
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn run(&self, query: &Query) -> Result<QueryOutcome, TempoError> {
        let point = self.locate(&query.place)?;
        let time_range = query.time_range()?;

        if let Some(observations) = self.cache.get(query) {
            info!(place = %query.place, count = observations.len(), "cache hit");
            return Ok(QueryOutcome {
                point,
                source: ResultSource::Cache,
                observations,
            });
        }
        info!(place = %query.place, %point, %time_range, "cache miss; starting retrieval");

        let search = GranuleSearch {
            collection: &self.settings.collection,
            time_range: &time_range,
            point,
        };
        let handles = match self.catalog.search(&search) {
            SearchOutcome::Granules(handles) => handles,
            SearchOutcome::NoResults => {
                info!(place = %query.place, %time_range, "catalog returned no granules");
                return Err(TempoError::NoData(query.place.clone()));
            }
            SearchOutcome::LookupFailed { reason } => {
                warn!(place = %query.place, %reason, "catalog lookup failed; reporting no data");
                return Err(TempoError::NoData(query.place.clone()));
            }
        };
        info!(count = handles.len(), "granules matched");

        let paths = self.transfer.fetch(&handles, &self.settings.download_dir)?;
        let bbox = BoundingBox::new(point, self.settings.window);
        let started = Instant::now();
        let report = Aggregator::new(&self.reader).aggregate(&paths, &bbox)?;
        info!(
            granules = report.granules_read,
            empty = report.granules_empty,
            observations = report.observations.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "aggregation finished"
        );

        if let Err(err) = self.cache.put(query, &report.observations) {
            warn!(%err, "failed to store query result in cache");
        }

        Ok(QueryOutcome {
            point,
            source: ResultSource::Computed,
            observations: report.observations,
        })
    }

    pub fn inspect(&self, path: &Path, point: GeoPoint) -> Result<GranuleSummary, TempoError> {
        let data = self.reader.read(path)?;
        let bbox = BoundingBox::new(point, self.settings.window);
        let observations = region::subset(&data, &bbox);
        Ok(GranuleSummary {
            granule: granule_name(path),
            point,
            grid_rows: data.latitude().len(),
            grid_cols: data.longitude().len(),
            attributes: data.attributes().clone(),
            observations,
        })
    }

    fn locate(&self, place: &str) -> Result<GeoPoint, TempoError> {
        match self.geocoder.locate(place) {
            Ok(Some(point)) => Ok(point),
            Ok(None) => Err(TempoError::PlaceNotFound(place.to_string())),
            Err(err) => {
                warn!(%place, %err, "geocoder failed");
                Err(TempoError::PlaceNotFound(place.to_string()))
            }
        }
    }
}
