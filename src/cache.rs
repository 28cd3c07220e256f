use std::fmt;
use std::fs;
use std::io::Write;
use std::sync::LazyLock;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use tempfile::Builder;
use tracing::{debug, warn};

use crate::domain::{Observation, Query};
use crate::error::TempoError;

const TEMP_PREFIX: &str = ".tempo-cache";
const TEMP_SUFFIX: &str = ".tmp";

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\p{Alphabetic}\p{N}\p{M}]*_\d{4}-\d{2}-\d{2}_\d{4}-\d{2}-\d{2}$")
        .expect("static cache key pattern")
});

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_query(query: &Query) -> Self {
        let place = query
            .place
            .chars()
            .filter(|ch| ch.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect::<String>();
        Self(format!("{place}_{}_{}", query.start_date, query.end_date))
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(".json")?;
        KEY_RE.is_match(stem).then(|| Self(stem.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntrySummary {
    pub key: String,
    pub observations: usize,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct QueryCache {
    root: Utf8PathBuf,
}

impl QueryCache {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn entry_path(&self, key: &CacheKey) -> Utf8PathBuf {
        self.root.join(key.file_name())
    }

    pub fn get(&self, query: &Query) -> Option<Vec<Observation>> {
        let key = CacheKey::for_query(query);
        let path = self.entry_path(&key);
        match Self::read_entry(&path) {
            Ok(Some(observations)) => {
                debug!(%key, count = observations.len(), "cache hit");
                Some(observations)
            }
            Ok(None) => {
                debug!(%key, "cache miss");
                None
            }
            Err(err) => {
                warn!(%key, %err, "unreadable cache entry treated as miss");
                None
            }
        }
    }

    pub fn put(&self, query: &Query, observations: &[Observation]) -> Result<(), TempoError> {
        let key = CacheKey::for_query(query);
        let path = self.entry_path(&key);
        let write_err = |err: &dyn fmt::Display| TempoError::CacheWrite(format!("{path}: {err}"));

        fs::create_dir_all(self.root.as_std_path()).map_err(|err| write_err(&err))?;
        let content = serde_json::to_vec(observations).map_err(|err| write_err(&err))?;
        let mut temp = Builder::new()
            .prefix(TEMP_PREFIX)
            .suffix(TEMP_SUFFIX)
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| write_err(&err))?;
        temp.write_all(&content).map_err(|err| write_err(&err))?;
        temp.as_file().sync_all().map_err(|err| write_err(&err))?;
        temp.persist(path.as_std_path())
            .map_err(|err| write_err(&err.error))?;
        debug!(%key, count = observations.len(), "cache entry written");
        Ok(())
    }

    pub fn entries(&self) -> Result<Vec<CacheEntrySummary>, TempoError> {
        let mut entries = Vec::new();
        for (key, path) in self.entry_files()? {
            match Self::read_entry(&path) {
                Ok(Some(observations)) => entries.push(CacheEntrySummary {
                    key: key.to_string(),
                    observations: observations.len(),
                    path: path.to_string(),
                }),
                Ok(None) => {}
                Err(err) => warn!(%path, %err, "skipping unreadable cache entry"),
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    pub fn clear(&self) -> Result<usize, TempoError> {
        let mut removed = 0;
        let mut targets = self
            .entry_files()?
            .into_iter()
            .map(|(_, path)| path)
            .collect::<Vec<_>>();
        targets.extend(self.temp_files()?);
        for path in targets {
            fs::remove_file(path.as_std_path())
                .map_err(|err| TempoError::Filesystem(format!("{path}: {err}")))?;
            removed += 1;
        }
        debug!(root = %self.root, removed, "cache cleared");
        Ok(removed)
    }

    fn entry_files(&self) -> Result<Vec<(CacheKey, Utf8PathBuf)>, TempoError> {
        Ok(self
            .files()?
            .into_iter()
            .filter_map(|path| {
                let key = CacheKey::from_file_name(path.file_name()?)?;
                Some((key, path))
            })
            .collect())
    }

    fn temp_files(&self) -> Result<Vec<Utf8PathBuf>, TempoError> {
        Ok(self
            .files()?
            .into_iter()
            .filter(|path| {
                path.file_name().is_some_and(|name| {
                    name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX)
                })
            })
            .collect())
    }

    fn files(&self) -> Result<Vec<Utf8PathBuf>, TempoError> {
        if !self.root.as_std_path().is_dir() {
            return Ok(Vec::new());
        }
        let dir = fs::read_dir(self.root.as_std_path())
            .map_err(|err| TempoError::Filesystem(err.to_string()))?;
        let mut files = Vec::new();
        for entry in dir {
            let entry = entry.map_err(|err| TempoError::Filesystem(err.to_string()))?;
            let is_file = entry
                .file_type()
                .map_err(|err| TempoError::Filesystem(err.to_string()))?
                .is_file();
            if let (true, Ok(path)) = (is_file, Utf8PathBuf::from_path_buf(entry.path())) {
                files.push(path);
            }
        }
        Ok(files)
    }

    fn read_entry(path: &Utf8Path) -> Result<Option<Vec<Observation>>, TempoError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read(path.as_std_path())
            .map_err(|err| TempoError::CacheRead(format!("{path}: {err}")))?;
        let observations = serde_json::from_slice(&content)
            .map_err(|err| TempoError::CacheRead(format!("{path}: {err}")))?;
        Ok(Some(observations))
    }
}
