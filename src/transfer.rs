use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8Path;
use reqwest::Url;
use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::redirect::Policy;
use tempfile::Builder;
use tracing::{debug, info, warn};

use crate::catalog::GranuleHandle;
use crate::error::TempoError;
use crate::net;
use crate::session::{Credentials, EarthdataSession};

pub const EARTHDATA_LOGIN_HOST: &str = "urs.earthdata.nasa.gov";

const MAX_REDIRECTS: usize = 10;
const HDF5_SIGNATURE: &[u8] = b"\x89HDF\r\n\x1a\n";

pub trait GranuleTransfer: Send + Sync {
    fn fetch(
        &self,
        granules: &[GranuleHandle],
        destination: &Utf8Path,
    ) -> Result<Vec<PathBuf>, TempoError>;
}

#[derive(Clone)]
pub struct EarthdataTransfer {
    client: Client,
    session: Arc<EarthdataSession>,
    login_hosts: Vec<String>,
}

impl EarthdataTransfer {
    pub fn new(user_agent: &str, session: Arc<EarthdataSession>) -> Result<Self, TempoError> {
        let client = net::client_builder(user_agent, Duration::from_secs(600))
            .map_err(TempoError::TransferHttp)?
            .redirect(Policy::none())
            .cookie_store(true)
            .build()
            .map_err(|err| TempoError::TransferHttp(err.to_string()))?;
        Ok(Self {
            client,
            session,
            login_hosts: vec![EARTHDATA_LOGIN_HOST.to_string()],
        })
    }

    fn open(&self, granule: &GranuleHandle) -> Result<Response, TempoError> {
        let credentials = self.session.credentials()?;
        let mut url = Url::parse(&granule.url)
            .map_err(|err| TempoError::TransferHttp(format!("{}: {err}", granule.url)))?;
        let origin = url.host_str().map(str::to_string);

        for _ in 0..=MAX_REDIRECTS {
            let auth = self
                .is_trusted(&url, origin.as_deref())
                .then_some(&credentials);
            let response = send(&self.client, &url, auth)?;
            if !response.status().is_redirection() {
                return Ok(response);
            }
            let next = response
                .headers()
                .get(LOCATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|location| url.join(location).ok())
                .ok_or_else(|| {
                    TempoError::TransferHttp(format!("redirect from {url} has no usable location"))
                })?;
            debug!(from = %url, to = %next, "following redirect");
            url = next;
        }
        Err(TempoError::TransferHttp(format!(
            "too many redirects for {}",
            granule.url
        )))
    }

    fn is_trusted(&self, url: &Url, origin: Option<&str>) -> bool {
        match url.host_str() {
            Some(host) => origin == Some(host) || self.login_hosts.iter().any(|login| login == host),
            None => false,
        }
    }

    fn download(&self, granule: &GranuleHandle, target: &Utf8Path) -> Result<(), TempoError> {
        let parent = target
            .parent()
            .ok_or_else(|| TempoError::Filesystem(format!("invalid download path {target}")))?;
        let mut response = self.open(granule)?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "granule download failed".to_string());
            return Err(TempoError::TransferStatus { status, message });
        }
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        let mut temp = Builder::new()
            .prefix(".tempo-granule")
            .suffix(".part")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| TempoError::Filesystem(err.to_string()))?;
        response
            .copy_to(temp.as_file_mut())
            .map_err(|err| TempoError::TransferHttp(err.to_string()))?;
        temp.flush()
            .map_err(|err| TempoError::Filesystem(err.to_string()))?;

        let valid = has_netcdf_signature(temp.as_file_mut())
            .map_err(|err| TempoError::Filesystem(err.to_string()))?;
        if !valid {
            return Err(TempoError::InvalidGranule {
                granule: granule.filename.clone(),
                reason: format!("unexpected content (content-type {content_type})"),
            });
        }
        temp.persist(target.as_std_path())
            .map_err(|err| TempoError::Filesystem(err.error.to_string()))?;
        Ok(())
    }
}

impl GranuleTransfer for EarthdataTransfer {
    fn fetch(
        &self,
        granules: &[GranuleHandle],
        destination: &Utf8Path,
    ) -> Result<Vec<PathBuf>, TempoError> {
        fs::create_dir_all(destination.as_std_path())
            .map_err(|err| TempoError::Filesystem(err.to_string()))?;
        let mut paths = Vec::with_capacity(granules.len());
        for granule in granules {
            if matches!(granule.filename.as_str(), "" | "." | "..") {
                return Err(TempoError::TransferHttp(format!(
                    "granule {} has no file name in {}",
                    granule.id, granule.url
                )));
            }
            let target = destination.join(&granule.filename);
            if is_local_granule(&target) {
                debug!(file = %granule.filename, "found local granule; skipping download");
            } else {
                info!(file = %granule.filename, "downloading granule");
                self.download(granule, &target)?;
            }
            paths.push(target.into_std_path_buf());
        }
        Ok(paths)
    }
}

fn send(client: &Client, url: &Url, auth: Option<&Credentials>) -> Result<Response, TempoError> {
    net::send_with_retries(|| {
        let request = client.get(url.clone());
        match auth {
            Some(credentials) => credentials.apply(request),
            None => request,
        }
    })
    .map_err(|err| TempoError::TransferHttp(err.to_string()))
}

fn is_local_granule(path: &Utf8Path) -> bool {
    if !path.as_std_path().exists() {
        return false;
    }
    match File::open(path.as_std_path()).and_then(|mut file| has_netcdf_signature(&mut file)) {
        Ok(true) => true,
        Ok(false) => {
            warn!(%path, "local granule is not a NetCDF file; downloading again");
            false
        }
        Err(err) => {
            warn!(%path, %err, "local granule is unreadable; downloading again");
            false
        }
    }
}

fn has_netcdf_signature(file: &mut File) -> io::Result<bool> {
    file.seek(SeekFrom::Start(0))?;
    let mut head = Vec::with_capacity(HDF5_SIGNATURE.len());
    file.take(HDF5_SIGNATURE.len() as u64).read_to_end(&mut head)?;
    Ok(is_netcdf_signature(&head))
}

fn is_netcdf_signature(head: &[u8]) -> bool {
    match head {
        [b'C', b'D', b'F', 1 | 2 | 5, ..] => true,
        _ => head.starts_with(HDF5_SIGNATURE),
    }
}
