use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, error};

use crate::domain::{BoundingBox, Observation};
use crate::error::TempoError;
use crate::granule::{GranuleReader, granule_name};
use crate::region;

#[derive(Debug, Clone, Default, Serialize)]
pub struct AggregateReport {
    pub observations: Vec<Observation>,
    pub granules_read: usize,
    pub granules_empty: usize,
}

pub struct Aggregator<'a, R: GranuleReader> {
    reader: &'a R,
}

impl<'a, R: GranuleReader> Aggregator<'a, R> {
    pub fn new(reader: &'a R) -> Self {
        Self { reader }
    }

    pub fn aggregate(
        &self,
        granules: &[PathBuf],
        bbox: &BoundingBox,
    ) -> Result<AggregateReport, TempoError> {
        let mut report = AggregateReport::default();
        for path in granules {
            let data = self.reader.read(path).inspect_err(|err| {
                error!(granule = %granule_name(path), %err, "granule read failed; aborting query");
            })?;
            report.granules_read += 1;

            let observations = region::subset(&data, bbox);
            if observations.is_empty() {
                debug!(granule = %granule_name(path), "no accepted cells inside window");
                report.granules_empty += 1;
                continue;
            }
            debug!(
                granule = %granule_name(path),
                count = observations.len(),
                "accepted cells"
            );
            report.observations.extend(observations);
        }
        Ok(report)
    }
}
