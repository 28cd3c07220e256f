use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::catalog::CMR_GRANULE_SEARCH_URL;
use crate::domain::{Collection, Window};
use crate::error::TempoError;
use crate::geocode::NOMINATIM_SEARCH_URL;
use crate::net::default_user_agent;

pub const DEFAULT_CONFIG_FILE: &str = "tempo-no2.json";
pub const DEFAULT_LISTEN: &str = "127.0.0.1:8000";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default)]
    pub collection: Option<CollectionEntry>,
    #[serde(default)]
    pub window: Option<WindowEntry>,
    #[serde(default)]
    pub geocoder_url: Option<String>,
    #[serde(default)]
    pub catalog_url: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default)]
    pub allowed_origins: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CollectionEntry {
    #[serde(default)]
    pub short_name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct WindowEntry {
    #[serde(default)]
    pub half_width_lat: Option<f64>,
    #[serde(default)]
    pub half_width_lon: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub cache_dir: Utf8PathBuf,
    pub download_dir: Utf8PathBuf,
    pub collection: Collection,
    pub window: Window,
    pub geocoder_url: String,
    pub catalog_url: String,
    pub user_agent: String,
    pub listen: String,
    pub allowed_origins: Vec<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, TempoError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| TempoError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| TempoError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, TempoError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let (cache_dir, download_dir) = match (config.cache_dir, config.download_dir) {
            (Some(cache), Some(download)) => (Utf8PathBuf::from(cache), Utf8PathBuf::from(download)),
            (cache, download) => {
                let root = default_data_root()?;
                (
                    cache.map(Utf8PathBuf::from).unwrap_or_else(|| root.join("data_cache")),
                    download.map(Utf8PathBuf::from).unwrap_or_else(|| root.join("granules")),
                )
            }
        };

        let defaults = Collection::default();
        let collection = match config.collection {
            Some(entry) => Collection {
                short_name: entry.short_name.unwrap_or(defaults.short_name),
                version: entry.version.unwrap_or(defaults.version),
            },
            None => defaults,
        };

        let default_window = Window::default();
        let window = match config.window {
            Some(entry) => Window {
                half_width_lat: entry.half_width_lat.unwrap_or(default_window.half_width_lat),
                half_width_lon: entry.half_width_lon.unwrap_or(default_window.half_width_lon),
            },
            None => default_window,
        };
        for (name, value) in [
            ("half_width_lat", window.half_width_lat),
            ("half_width_lon", window.half_width_lon),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(TempoError::ConfigParse(format!(
                    "window.{name} must be a positive number, got {value}"
                )));
            }
        }

        Ok(ResolvedConfig {
            schema_version,
            cache_dir,
            download_dir,
            collection,
            window,
            geocoder_url: config
                .geocoder_url
                .unwrap_or_else(|| NOMINATIM_SEARCH_URL.to_string()),
            catalog_url: config
                .catalog_url
                .unwrap_or_else(|| CMR_GRANULE_SEARCH_URL.to_string()),
            user_agent: config.user_agent.unwrap_or_else(default_user_agent),
            listen: config.listen.unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            allowed_origins: config
                .allowed_origins
                .unwrap_or_else(default_allowed_origins),
        })
    }
}

pub fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

pub fn default_data_root() -> Result<Utf8PathBuf, TempoError> {
    BaseDirs::new()
        .and_then(|dirs| Utf8PathBuf::from_path_buf(dirs.cache_dir().join("tempo-no2")).ok())
        .ok_or_else(|| TempoError::Filesystem("unable to resolve cache directory".to_string()))
}
