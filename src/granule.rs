use std::path::Path;

use ndarray::{Array1, Array3};
use serde::Serialize;

use crate::error::TempoError;

pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const PRODUCT_GROUP: &str = "product";
pub const STRAT_COLUMN: &str = "vertical_column_stratosphere";
pub const TROP_COLUMN: &str = "vertical_column_troposphere";
pub const QUALITY_FLAG: &str = "main_data_quality_flag";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GranuleAttributes {
    pub strat_fill_value: Option<f64>,
    pub trop_fill_value: Option<f64>,
    pub unit: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GranuleData {
    latitude: Array1<f64>,
    longitude: Array1<f64>,
    strat_column: Array3<f64>,
    trop_column: Array3<f64>,
    quality_flag: Array3<i32>,
    attributes: GranuleAttributes,
}

impl GranuleData {
    pub fn new(
        granule: &str,
        latitude: Array1<f64>,
        longitude: Array1<f64>,
        strat_column: Array3<f64>,
        trop_column: Array3<f64>,
        quality_flag: Array3<i32>,
        attributes: GranuleAttributes,
    ) -> Result<Self, TempoError> {
        let (n_lat, n_lon) = (latitude.len(), longitude.len());
        let fields = [
            (STRAT_COLUMN, strat_column.dim()),
            (TROP_COLUMN, trop_column.dim()),
            (QUALITY_FLAG, quality_flag.dim()),
        ];
        for (name, (n_time, rows, cols)) in fields {
            if n_time == 0 || rows != n_lat || cols != n_lon {
                return Err(TempoError::GranuleRead {
                    granule: granule.to_string(),
                    message: format!(
                        "{name} has shape ({n_time}, {rows}, {cols}), expected (>=1, {n_lat}, {n_lon})"
                    ),
                });
            }
        }
        Ok(Self {
            latitude,
            longitude,
            strat_column,
            trop_column,
            quality_flag,
            attributes,
        })
    }

    pub fn latitude(&self) -> &Array1<f64> {
        &self.latitude
    }

    pub fn longitude(&self) -> &Array1<f64> {
        &self.longitude
    }

    pub fn strat_column(&self) -> &Array3<f64> {
        &self.strat_column
    }

    pub fn trop_column(&self) -> &Array3<f64> {
        &self.trop_column
    }

    pub fn quality_flag(&self) -> &Array3<i32> {
        &self.quality_flag
    }

    pub fn attributes(&self) -> &GranuleAttributes {
        &self.attributes
    }
}

pub trait GranuleReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<GranuleData, TempoError>;
}

pub fn granule_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(feature = "netcdf")]
pub use self::nc::NetcdfGranuleReader;

#[cfg(feature = "netcdf")]
mod nc {
    use std::path::Path;

    use ndarray::{Array1, Array3};
    use netcdf::{AttributeValue, Variable};

    use super::*;

    #[derive(Debug, Clone, Copy, Default)]
    pub struct NetcdfGranuleReader;

    impl GranuleReader for NetcdfGranuleReader {
        fn read(&self, path: &Path) -> Result<GranuleData, TempoError> {
            let granule = granule_name(path);
            let file = netcdf::open(path).map_err(|err| read_error(&granule, err))?;

            let latitude = read_axis(&granule, file.variable(LATITUDE), LATITUDE)?;
            let longitude = read_axis(&granule, file.variable(LONGITUDE), LONGITUDE)?;

            let product = file
                .group(PRODUCT_GROUP)
                .map_err(|err| read_error(&granule, err))?
                .ok_or_else(|| missing(&granule, PRODUCT_GROUP))?;
            let strat_var = product
                .variable(STRAT_COLUMN)
                .ok_or_else(|| missing(&granule, STRAT_COLUMN))?;
            let trop_var = product
                .variable(TROP_COLUMN)
                .ok_or_else(|| missing(&granule, TROP_COLUMN))?;
            let qf_var = product
                .variable(QUALITY_FLAG)
                .ok_or_else(|| missing(&granule, QUALITY_FLAG))?;

            let attributes = GranuleAttributes {
                strat_fill_value: numeric_attribute(&strat_var, "_FillValue"),
                trop_fill_value: numeric_attribute(&trop_var, "_FillValue"),
                unit: string_attribute(&trop_var, "units"),
            };

            let strat_column = read_field::<f64>(&granule, &strat_var)?;
            let trop_column = read_field::<f64>(&granule, &trop_var)?;
            let quality_flag = read_field::<i32>(&granule, &qf_var)?;

            GranuleData::new(
                &granule,
                latitude,
                longitude,
                strat_column,
                trop_column,
                quality_flag,
                attributes,
            )
        }
    }

    fn read_axis(
        granule: &str,
        variable: Option<Variable<'_>>,
        name: &str,
    ) -> Result<Array1<f64>, TempoError> {
        let variable = variable.ok_or_else(|| missing(granule, name))?;
        let values = variable
            .get_values::<f64, _>(..)
            .map_err(|err| read_error(granule, err))?;
        Ok(Array1::from_vec(values))
    }

    fn read_field<T>(granule: &str, variable: &Variable<'_>) -> Result<Array3<T>, TempoError>
    where
        T: netcdf::NcTypeDescriptor + Copy,
    {
        let shape = variable
            .dimensions()
            .iter()
            .map(|dim| dim.len())
            .collect::<Vec<_>>();
        let &[n_time, n_lat, n_lon] = shape.as_slice() else {
            return Err(TempoError::GranuleRead {
                granule: granule.to_string(),
                message: format!("{} has {} dimensions, expected 3", variable.name(), shape.len()),
            });
        };
        let values = variable
            .get_values::<T, _>(..)
            .map_err(|err| read_error(granule, err))?;
        Array3::from_shape_vec((n_time, n_lat, n_lon), values).map_err(|err| {
            TempoError::GranuleRead {
                granule: granule.to_string(),
                message: err.to_string(),
            }
        })
    }

    fn numeric_attribute(variable: &Variable<'_>, name: &str) -> Option<f64> {
        match variable.attribute(name)?.value().ok()? {
            AttributeValue::Double(value) => Some(value),
            AttributeValue::Float(value) => Some(f64::from(value)),
            AttributeValue::Int(value) => Some(f64::from(value)),
            AttributeValue::Short(value) => Some(f64::from(value)),
            _ => None,
        }
    }

    fn string_attribute(variable: &Variable<'_>, name: &str) -> Option<String> {
        match variable.attribute(name)?.value().ok()? {
            AttributeValue::Str(value) => Some(value),
            _ => None,
        }
    }

    fn missing(granule: &str, variable: &str) -> TempoError {
        TempoError::MissingVariable {
            granule: granule.to_string(),
            variable: variable.to_string(),
        }
    }

    fn read_error(granule: &str, err: netcdf::Error) -> TempoError {
        TempoError::GranuleRead {
            granule: granule.to_string(),
            message: err.to_string(),
        }
    }
}
