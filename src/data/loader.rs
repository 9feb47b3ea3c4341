use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use geojson::{FeatureCollection, GeoJson, JsonObject};

use super::model::{AttributeValue, Dataset, Feature};
use super::project::Crs;
use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a dataset from a file and tag it with `name`.  Dispatch by extension.
///
/// Supported formats:
/// * `.geojson` / `.json` – a `FeatureCollection` carrying a `crs` member
pub fn load_dataset(name: &str, path: &Path) -> Result<Dataset, PipelineError> {
    load_file(name, path).map_err(|e| PipelineError::Load {
        dataset: name.to_string(),
        path: path.to_path_buf(),
        reason: format!("{e:#}"),
    })
}

fn load_file(name: &str, path: &Path) -> Result<Dataset> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "geojson" | "json" => load_geojson(name, path),
        other => bail!("Unsupported file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// GeoJSON loader
// ---------------------------------------------------------------------------

/// Expected layout (as written by GDAL and by the exporter):
///
/// ```json
/// {
///   "type": "FeatureCollection",
///   "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::2248" } },
///   "attributes": ["TAZ", "TAZ_Area"],
///   "features": [ ... ]
/// }
/// ```
///
/// `attributes` is optional; without it the schema is the union of the
/// features' property names.
fn load_geojson(name: &str, path: &Path) -> Result<Dataset> {
    let text = std::fs::read_to_string(path).context("reading GeoJSON file")?;
    let geojson: GeoJson = text.parse().context("parsing GeoJSON")?;

    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => bail!("Expected a top-level FeatureCollection"),
    };

    let crs = read_crs(&collection)?;
    let schema = read_schema(&collection)?;

    let mut features = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        let geometry = feature
            .geometry
            .with_context(|| format!("Feature {i} has no geometry"))?;
        let geometry = geo::Geometry::<f64>::try_from(geometry)
            .with_context(|| format!("Feature {i}: unsupported geometry"))?;

        let attributes: BTreeMap<String, AttributeValue> = feature
            .properties
            .unwrap_or_default()
            .iter()
            .map(|(k, v)| (k.clone(), AttributeValue::from_json(v)))
            .collect();

        features.push(Feature::new(geometry, attributes));
    }

    let mut dataset = Dataset::from_features(name, crs, features);
    if let Some(schema) = schema {
        dataset.schema = schema;
    }
    log::info!(
        "Loaded '{name}' from {}: {} features in {crs}, attributes {:?}",
        path.display(),
        dataset.len(),
        dataset.schema
    );
    Ok(dataset)
}

fn foreign<'a>(collection: &'a FeatureCollection, key: &str) -> Option<&'a serde_json::Value> {
    collection
        .foreign_members
        .as_ref()
        .and_then(|m: &JsonObject| m.get(key))
}

/// Read the legacy GeoJSON `crs` member.  A dataset without one is rejected:
/// every dataset must have a known coordinate reference before normalization.
fn read_crs(collection: &FeatureCollection) -> Result<Crs> {
    let crs = foreign(collection, "crs").context("FeatureCollection has no 'crs' member")?;
    let name = crs
        .pointer("/properties/name")
        .and_then(|v| v.as_str())
        .context("'crs' member has no properties.name")?;
    name.parse::<Crs>().map_err(anyhow::Error::msg)
}

fn read_schema(collection: &FeatureCollection) -> Result<Option<Vec<String>>> {
    let Some(value) = foreign(collection, "attributes") else {
        return Ok(None);
    };
    let names = value
        .as_array()
        .context("'attributes' member is not an array")?
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .context("'attributes' entries must be strings")
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Some(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(dir: &tempfile::TempDir, file: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(file);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    const TAZ: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::2248" } },
        "features": [
            { "type": "Feature",
              "geometry": { "type": "Polygon", "coordinates": [[[1420000, 590000], [1421000, 590000], [1421000, 591000], [1420000, 590000]]] },
              "properties": { "TAZ": 1, "NAME": "Canton", "Community": "Southeast", "TAZ_Area": 12.5 } }
        ]
    }"#;

    #[test]
    fn loads_feature_collection_with_crs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_temp(&dir, "taz.geojson", TAZ);
        let ds = load_dataset("taz", &path).unwrap();
        assert_eq!(ds.name, "taz");
        assert_eq!(ds.crs, Crs::MarylandFeet);
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.schema, vec!["Community", "NAME", "TAZ", "TAZ_Area"]);
        assert_eq!(
            ds.features[0].get("TAZ_Area"),
            Some(&AttributeValue::Float(12.5))
        );
        assert!(matches!(ds.features[0].geometry, geo::Geometry::Polygon(_)));
    }

    #[test]
    fn missing_crs_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{ "type": "FeatureCollection", "features": [] }"#;
        let path = write_temp(&dir, "nocrs.geojson", body);
        let err = load_dataset("centroid", &path).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Load);
        assert!(err.to_string().contains("crs"), "{err}");
    }

    #[test]
    fn unreadable_and_unsupported_sources_fail() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.geojson");
        assert!(matches!(
            load_dataset("taz", &missing),
            Err(PipelineError::Load { .. })
        ));
        let shp = write_temp(&dir, "taz.shp", "");
        let err = load_dataset("taz", &shp).unwrap_err();
        assert!(err.to_string().contains("Unsupported"), "{err}");
    }

    #[test]
    fn explicit_schema_survives_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{
            "type": "FeatureCollection",
            "crs": { "type": "name", "properties": { "name": "EPSG:4326" } },
            "attributes": ["ABSPCTDIFF"],
            "features": []
        }"#;
        let path = write_temp(&dir, "filter4.geojson", body);
        let ds = load_dataset("filter4", &path).unwrap();
        assert!(ds.is_empty());
        assert!(ds.has_attribute("ABSPCTDIFF"));
    }
}
