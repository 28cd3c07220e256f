#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use camino::Utf8Path;
use ndarray::{Array1, Array3};

use tempo_no2::catalog::{GranuleCatalog, GranuleHandle, GranuleSearch, SearchOutcome};
use tempo_no2::domain::GeoPoint;
use tempo_no2::error::TempoError;
use tempo_no2::geocode::Geocoder;
use tempo_no2::granule::{GranuleAttributes, GranuleData, GranuleReader, granule_name};

/// Single-time-step granule; `trop`, `strat` and `flags` are row-major over (lat, lon).
pub fn synthetic_granule(
    lats: &[f64],
    lons: &[f64],
    trop: &[f64],
    strat: &[f64],
    flags: &[i32],
) -> GranuleData {
    let shape = (1, lats.len(), lons.len());
    GranuleData::new(
        "synthetic.nc",
        Array1::from_vec(lats.to_vec()),
        Array1::from_vec(lons.to_vec()),
        Array3::from_shape_vec(shape, strat.to_vec()).unwrap(),
        Array3::from_shape_vec(shape, trop.to_vec()).unwrap(),
        Array3::from_shape_vec(shape, flags.to_vec()).unwrap(),
        GranuleAttributes {
            strat_fill_value: Some(-1.0e30),
            trop_fill_value: Some(-1.0e30),
            unit: Some("molecules/cm^2".to_string()),
        },
    )
    .unwrap()
}

/// 4x4 grid around Houston where exactly cells (0, 1) and (2, 3) pass the quality gate.
pub fn houston_granule() -> GranuleData {
    let lats = [29.0, 30.0, 31.0, 32.0];
    let lons = [-98.0, -96.0, -94.0, -92.0];
    #[rustfmt::skip]
    let trop = [
        1.0e15, 2.0e15, 3.0e15, -1.0e30,
        1.0e15, 0.0,    1.0e15, 1.0e15,
        1.0e15, 1.0e15, 1.0e15, 4.0e15,
        1.0e15, 1.0e15, 1.0e15, 1.0e15,
    ];
    #[rustfmt::skip]
    let strat = [
        3.0e15, 3.5e15, 3.0e15, 3.0e15,
        3.0e15, 3.0e15, -2.0,   3.0e15,
        3.0e15, 3.0e15, 3.0e15, 2.5e15,
        3.0e15, 3.0e15, 3.0e15, 3.0e15,
    ];
    #[rustfmt::skip]
    let flags = [
        1, 0, 2, 0,
        1, 0, 0, 1,
        1, 1, 2, 0,
        1, 1, 1, 1,
    ];
    synthetic_granule(&lats, &lons, &trop, &strat, &flags)
}

pub enum MockGranule {
    Data(GranuleData),
    MissingVariable(&'static str),
}

/// Serves granules by file name and counts reads.
#[derive(Default)]
pub struct MockReader {
    granules: HashMap<String, MockGranule>,
    pub reads: Mutex<usize>,
}

impl MockReader {
    pub fn with(mut self, name: &str, granule: MockGranule) -> Self {
        self.granules.insert(name.to_string(), granule);
        self
    }

    pub fn reads(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl GranuleReader for MockReader {
    fn read(&self, path: &Path) -> Result<GranuleData, TempoError> {
        *self.reads.lock().unwrap() += 1;
        let name = granule_name(path);
        match self.granules.get(&name) {
            Some(MockGranule::Data(data)) => Ok(data.clone()),
            Some(MockGranule::MissingVariable(variable)) => Err(TempoError::MissingVariable {
                granule: name,
                variable: variable.to_string(),
            }),
            None => Err(TempoError::GranuleRead {
                granule: name,
                message: "no such file".to_string(),
            }),
        }
    }
}

pub struct MockGeocoder {
    pub point: Option<GeoPoint>,
    pub calls: Mutex<usize>,
}

impl MockGeocoder {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            point: Some(GeoPoint::new(latitude, longitude)),
            calls: Mutex::new(0),
        }
    }

    pub fn nowhere() -> Self {
        Self {
            point: None,
            calls: Mutex::new(0),
        }
    }
}

impl MockGeocoder {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl Geocoder for MockGeocoder {
    fn locate(&self, _place: &str) -> Result<Option<GeoPoint>, TempoError> {
        *self.calls.lock().unwrap() += 1;
        Ok(self.point)
    }
}

pub struct MockCatalog {
    pub outcome: SearchOutcome,
    pub calls: Mutex<usize>,
}

impl MockCatalog {
    pub fn returning(outcome: SearchOutcome) -> Self {
        Self {
            outcome,
            calls: Mutex::new(0),
        }
    }

    pub fn with_files(names: &[&str]) -> Self {
        let handles = names
            .iter()
            .map(|name| GranuleHandle::from_url(*name, format!("https://example.org/{name}")))
            .collect();
        Self::returning(SearchOutcome::Granules(handles))
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl GranuleCatalog for MockCatalog {
    fn search(&self, _request: &GranuleSearch<'_>) -> SearchOutcome {
        *self.calls.lock().unwrap() += 1;
        self.outcome.clone()
    }
}

/// Resolves handles to `<destination>/<filename>` without touching the network.
#[derive(Default)]
pub struct MockTransfer {
    pub calls: Mutex<usize>,
}

impl MockTransfer {
    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

impl tempo_no2::transfer::GranuleTransfer for MockTransfer {
    fn fetch(
        &self,
        granules: &[GranuleHandle],
        destination: &Utf8Path,
    ) -> Result<Vec<PathBuf>, TempoError> {
        *self.calls.lock().unwrap() += 1;
        Ok(granules
            .iter()
            .map(|handle| destination.join(&handle.filename).into_std_path_buf())
            .collect())
    }
}

// Borrowed forms let a test keep the mock and read its counters after the run.

impl GranuleReader for &MockReader {
    fn read(&self, path: &Path) -> Result<GranuleData, TempoError> {
        (**self).read(path)
    }
}

impl Geocoder for &MockGeocoder {
    fn locate(&self, place: &str) -> Result<Option<GeoPoint>, TempoError> {
        (**self).locate(place)
    }
}

impl GranuleCatalog for &MockCatalog {
    fn search(&self, request: &GranuleSearch<'_>) -> SearchOutcome {
        (**self).search(request)
    }
}

impl tempo_no2::transfer::GranuleTransfer for &MockTransfer {
    fn fetch(
        &self,
        granules: &[GranuleHandle],
        destination: &Utf8Path,
    ) -> Result<Vec<PathBuf>, TempoError> {
        (**self).fetch(granules, destination)
    }
}

#[derive(Debug, Clone)]
pub struct StubRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl StubRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

pub struct StubResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl StubResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, body)
    }

    pub fn redirect(location: &str) -> Self {
        Self::new(302, Vec::new()).with_header("Location", location)
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// Minimal HTTP/1.1 server on a loopback port, one connection per request.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<StubRequest>>>,
}

impl StubServer {
    pub fn start<F>(handler: F) -> Self
    where
        F: Fn(&StubRequest) -> StubResponse + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let Some(request) = read_request(&mut stream) else {
                    continue;
                };
                let response = handler(&request);
                seen.lock().unwrap().push(request);
                let _ = write_response(&mut stream, &response);
            }
        });
        Self { base_url, requests }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn requests(&self) -> Vec<StubRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<StubRequest> {
    let mut reader = BufReader::new(stream.try_clone().ok()?);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let path = line.split_whitespace().nth(1)?.to_string();
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.push((name.trim().to_string(), value.trim().to_string()));
        }
    }
    Some(StubRequest { path, headers })
}

fn write_response(stream: &mut std::net::TcpStream, response: &StubResponse) -> std::io::Result<()> {
    let mut head = format!(
        "HTTP/1.1 {} Stub\r\nContent-Length: {}\r\nConnection: close\r\n",
        response.status,
        response.body.len()
    );
    for (name, value) in &response.headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");
    stream.write_all(head.as_bytes())?;
    stream.write_all(&response.body)?;
    stream.flush()
}
