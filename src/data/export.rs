//! Writes datasets and subsets as self-contained GeoJSON files.
//!
//! Every write goes to a temporary file in the destination directory, is
//! flushed with `sync_all()`, then renamed over the destination.  A failure at
//! any step leaves the previous export intact (or absent), never truncated.

use std::io::Write;
use std::path::{Path, PathBuf};

use geojson::{Feature as GeoJsonFeature, FeatureCollection, Geometry, JsonObject};
use serde_json::json;

use super::model::Dataset;
use crate::error::{PipelineError, Result};

/// Deterministic export location for a dataset or subset.
pub fn export_path(dir: &Path, file_stem: &str) -> PathBuf {
    dir.join(format!("{file_stem}.geojson"))
}

/// Serialise `dataset` to `path` as a GeoJSON `FeatureCollection` carrying its
/// CRS and attribute schema.
pub fn export(dataset: &Dataset, path: &Path) -> Result<PathBuf> {
    let body = geojson::GeoJson::from(to_geojson(dataset)).to_string();
    write_atomic(path, body.as_bytes()).map_err(|source| PipelineError::Export {
        dataset: dataset.name.clone(),
        path: path.to_path_buf(),
        source,
    })?;
    log::info!(
        "Exported '{}' ({} features) to {}",
        dataset.name,
        dataset.len(),
        path.display()
    );
    Ok(path.to_path_buf())
}

fn to_geojson(dataset: &Dataset) -> FeatureCollection {
    let features = dataset
        .features
        .iter()
        .map(|f| {
            let properties: JsonObject = f
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect();
            GeoJsonFeature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&f.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    let mut foreign = JsonObject::new();
    foreign.insert(
        "crs".to_string(),
        json!({ "type": "name", "properties": { "name": dataset.crs.urn() } }),
    );
    foreign.insert("attributes".to_string(), json!(dataset.schema));
    foreign.insert("name".to_string(), json!(dataset.name));

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: Some(foreign),
    }
}

/// Write-to-temp-then-rename.  The temp file lives next to `path` so the
/// rename never crosses filesystems.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
