use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Zip};

use crate::domain::{BoundingBox, Observation};
use crate::granule::GranuleData;

pub fn axis_mask(axis: ArrayView1<'_, f64>, center: f64, half_width: f64) -> Vec<bool> {
    axis.iter()
        .map(|&value| center - half_width < value && value < center + half_width)
        .collect()
}

pub fn selected_indices(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(index, &keep)| keep.then_some(index))
        .collect()
}

pub fn build_coordinate_grid(lats: &[f64], lons: &[f64]) -> Array2<(f64, f64)> {
    Array2::from_shape_fn((lats.len(), lons.len()), |(i, j)| (lats[i], lons[j]))
}

pub fn quality_mask(
    quality_flag: ArrayView2<'_, i32>,
    trop_column: ArrayView2<'_, f64>,
    strat_column: ArrayView2<'_, f64>,
) -> Array2<bool> {
    Zip::from(quality_flag)
        .and(trop_column)
        .and(strat_column)
        .map_collect(|&flag, &trop, &strat| flag == 0 && trop > 0.0 && strat > 0.0)
}

pub fn subset(granule: &GranuleData, bbox: &BoundingBox) -> Vec<Observation> {
    let lat_mask = axis_mask(
        granule.latitude().view(),
        bbox.center.latitude,
        bbox.window.half_width_lat,
    );
    let lon_mask = axis_mask(
        granule.longitude().view(),
        bbox.center.longitude,
        bbox.window.half_width_lon,
    );
    let lat_idx = selected_indices(&lat_mask);
    let lon_idx = selected_indices(&lon_mask);
    if lat_idx.is_empty() || lon_idx.is_empty() {
        return Vec::new();
    }

    let strat = select_cells(granule.strat_column().index_axis(Axis(0), 0), &lat_idx, &lon_idx);
    let trop = select_cells(granule.trop_column().index_axis(Axis(0), 0), &lat_idx, &lon_idx);
    let flags = select_cells(granule.quality_flag().index_axis(Axis(0), 0), &lat_idx, &lon_idx);

    let lats = lat_idx
        .iter()
        .map(|&i| granule.latitude()[i])
        .collect::<Vec<_>>();
    let lons = lon_idx
        .iter()
        .map(|&j| granule.longitude()[j])
        .collect::<Vec<_>>();
    let grid = build_coordinate_grid(&lats, &lons);
    let accepted = quality_mask(flags.view(), trop.view(), strat.view());

    accepted
        .indexed_iter()
        .filter(|(_, keep)| **keep)
        .map(|(cell, _)| {
            let (latitude, longitude) = grid[cell];
            Observation {
                latitude,
                longitude,
                no2_total_column: trop[cell] + strat[cell],
            }
        })
        .collect()
}

fn select_cells<T: Copy>(field: ArrayView2<'_, T>, rows: &[usize], cols: &[usize]) -> Array2<T> {
    field.select(Axis(0), rows).select(Axis(1), cols)
}
