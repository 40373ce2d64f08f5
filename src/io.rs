// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use ndarray::Array2;

use crate::error::{BenderError, Result};
use crate::geometry::GeoPoint;
use crate::model::{LayeredModel, ModelDescription};
use crate::ray_info::RayInfo;

/// Load a layered Earth model from a JSON file.
pub fn load_model(path: &Path) -> Result<LayeredModel> {
    let file = File::open(path)?;
    let description: ModelDescription = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| BenderError::InvalidModel(format!("{}: {}", path.display(), e)))?;
    LayeredModel::new(description)
}

/// Save a layered Earth model as JSON.
pub fn save_model(model: &LayeredModel, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, model.description())
        .map_err(|e| BenderError::Other(format!("JSON write error: {}", e)))?;
    writer.flush()?;
    Ok(())
}

/// Write ray results to a binary file: an `i32` record count followed by the
/// records.
pub fn write_ray_infos(path: &Path, infos: &[RayInfo]) -> Result<()> {
    let count = i32::try_from(infos.len())
        .map_err(|_| BenderError::Format(format!("too many records: {}", infos.len())))?;
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_i32::<BigEndian>(count)?;
    for info in infos {
        info.write_to(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

/// Read a file written by [`write_ray_infos`].
pub fn read_ray_infos(path: &Path) -> Result<Vec<RayInfo>> {
    let mut reader = BufReader::new(File::open(path)?);
    let count = reader.read_i32::<BigEndian>()?;
    let count = usize::try_from(count)
        .map_err(|_| BenderError::Format(format!("negative record count {}", count)))?;
    (0..count).map(|_| RayInfo::read_from(&mut reader)).collect()
}

/// Save a ray path to a .npy file as an `n x 3` array of latitude, longitude
/// and depth.
pub fn save_ray_path_npy(path: &Path, points: &[GeoPoint]) -> Result<()> {
    let data: Vec<f64> = points
        .iter()
        .flat_map(|p| [p.lat, p.lon, p.depth])
        .collect();
    let arr = Array2::from_shape_vec((points.len(), 3), data)
        .map_err(|e| BenderError::Other(format!("shape error: {}", e)))?;
    ndarray_npy::write_npy(path, &arr)
        .map_err(|e| BenderError::Other(format!("npy write error: {}", e)))?;
    Ok(())
}

/// Load a ray path written by [`save_ray_path_npy`].
pub fn load_ray_path_npy(path: &Path) -> Result<Vec<GeoPoint>> {
    let arr: Array2<f64> = ndarray_npy::read_npy(path)
        .map_err(|e| BenderError::Format(format!("npy read error: {}", e)))?;
    if arr.ncols() != 3 {
        return Err(BenderError::Format(format!(
            "expected 3 columns (lat, lon, depth), got {}",
            arr.ncols()
        )));
    }
    Ok(arr
        .rows()
        .into_iter()
        .map(|row| GeoPoint::new(row[0], row[1], row[2]))
        .collect())
}
