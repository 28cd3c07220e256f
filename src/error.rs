use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TempoError {
    #[error("Could not find coordinates for the city: {0}")]
    PlaceNotFound(String),

    #[error("No TEMPO data is available for {0} in the selected date range.")]
    NoData(String),

    #[error("granule {granule} is missing variable {variable}")]
    MissingVariable { granule: String, variable: String },

    #[error("failed to read granule {granule}: {message}")]
    GranuleRead { granule: String, message: String },

    #[error("geocoder request failed: {0}")]
    GeocoderHttp(String),

    #[error("geocoder returned status {status}: {message}")]
    GeocoderStatus { status: u16, message: String },

    #[error("catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("granule download failed: {0}")]
    TransferHttp(String),

    #[error("granule download returned status {status}: {message}")]
    TransferStatus { status: u16, message: String },

    #[error("downloaded granule {granule} is not a NetCDF file: {reason}")]
    InvalidGranule { granule: String, reason: String },

    #[error("missing Earthdata credentials (set EARTHDATA_TOKEN or EARTHDATA_USERNAME/EARTHDATA_PASSWORD)")]
    MissingCredentials,

    #[error("Earthdata session has been revoked")]
    SessionRevoked,

    #[error("failed to read cache entry {0}")]
    CacheRead(String),

    #[error("failed to write cache entry {0}")]
    CacheWrite(String),

    #[error("invalid date (expected YYYY-MM-DD): {0}")]
    InvalidDate(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("server error: {0}")]
    Server(String),
}
