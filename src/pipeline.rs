use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::color::{generate_palette, ColorScale, DEFAULT_FALLBACK};
use crate::config::{LayerConfig, PipelineConfig, StyleConfig};
use crate::data::export::{export, export_path, write_atomic};
use crate::data::filter::{self, Criterion};
use crate::data::loader::load_dataset;
use crate::data::model::Dataset;
use crate::data::project::normalize;
use crate::error::{PipelineError, Result};
use crate::map::group::build_groups;
use crate::map::layer::{compose, OverlayLayer, StyleRule};
use crate::map::MapDocument;

/// File name of the manifest written next to the exports.
pub const MANIFEST: &str = "map.json";

/// A dataset or subset after export, addressable by name.
struct Exported {
    data: Dataset,
    path: PathBuf,
}

// ---------------------------------------------------------------------------
// End-to-end run
// ---------------------------------------------------------------------------

/// Run every stage once: load → normalize → filter → export → scale →
/// compose → group, then write the manifest.
///
/// Any error aborts the whole run; no manifest is written for a failed run.
pub fn run(config: &PipelineConfig) -> Result<MapDocument> {
    let sources = prepare_sources(config)?;
    let scales = build_scales(config, &sources)?;
    let layers = compose_layers(config, &sources, &scales)?;

    let entries = config
        .groups
        .iter()
        .map(|g| {
            let members = g
                .layers
                .iter()
                .map(|name| {
                    layers.get(name).cloned().ok_or_else(|| {
                        PipelineError::Config(format!(
                            "group '{}' refers to unknown layer '{name}'",
                            g.name
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok((g.name.clone(), members))
        })
        .collect::<Result<Vec<_>>>()?;
    let overrides: HashMap<String, bool> = config
        .groups
        .iter()
        .filter_map(|g| g.exclusive.map(|e| (g.name.clone(), e)))
        .collect();
    let groups = build_groups(entries, config.exclusive_groups, &overrides)?;

    for name in layers.keys() {
        if !config.groups.iter().any(|g| g.layers.contains(name)) {
            log::warn!("layer '{name}' is not in any group and will not be shown");
        }
    }

    let document = MapDocument {
        view: config.view.clone(),
        crs: config.target_crs,
        groups,
        legends: config
            .color_scales
            .iter()
            .filter_map(|s| scales.get(&s.name).cloned())
            .collect(),
    };
    let manifest = write_manifest(&document, &config.export_dir)?;
    log::info!(
        "Pipeline finished: {} groups, {} layers, manifest {}",
        document.groups.len(),
        document.layers().count(),
        manifest.display()
    );
    Ok(document)
}

/// Load, normalize and export every dataset, then filter and export every
/// subset.  Returns them keyed by dataset / filter name.
fn prepare_sources(config: &PipelineConfig) -> Result<BTreeMap<String, Exported>> {
    check_export_stems(config)?;
    let mut sources: BTreeMap<String, Exported> = BTreeMap::new();

    for ds in &config.datasets {
        if sources.contains_key(&ds.name) {
            return Err(PipelineError::Config(format!(
                "dataset '{}' is defined twice",
                ds.name
            )));
        }
        let data = normalize(load_dataset(&ds.name, &ds.path)?, config.target_crs)?;
        let path = export(&data, &export_path(&config.export_dir, &ds.stem()))?;
        sources.insert(ds.name.clone(), Exported { data, path });
    }

    if let Some(orphan) = config
        .filters
        .iter()
        .find(|f| !config.datasets.iter().any(|d| d.name == f.dataset))
    {
        return Err(PipelineError::Config(format!(
            "filter '{}' refers to unknown dataset '{}'",
            orphan.name, orphan.dataset
        )));
    }

    for ds in &config.datasets {
        let filters: Vec<_> = config.filters.iter().filter(|f| f.dataset == ds.name).collect();
        if filters.is_empty() {
            continue;
        }
        let criteria = filters
            .iter()
            .map(|f| Criterion::parse(f.name.clone(), &f.expr))
            .collect::<Result<Vec<_>>>()?;
        let subsets = filter::apply(&sources[&ds.name].data, &criteria)?;

        for (f, subset) in filters.into_iter().zip(subsets) {
            if sources.contains_key(&f.name) {
                return Err(PipelineError::Config(format!(
                    "filter '{}' reuses an existing source name",
                    f.name
                )));
            }
            let path = export(&subset.data, &export_path(&config.export_dir, &f.stem()))?;
            log::info!("Subset '{}': {} features", f.name, subset.data.len());
            sources.insert(
                f.name.clone(),
                Exported {
                    data: subset.data,
                    path,
                },
            );
        }
    }
    Ok(sources)
}

/// Every dataset and subset needs its own export file.  Checked before
/// anything is written so a clash never overwrites an earlier export.
fn check_export_stems(config: &PipelineConfig) -> Result<()> {
    let stems = config
        .datasets
        .iter()
        .map(|d| (d.stem(), format!("dataset '{}'", d.name)))
        .chain(
            config
                .filters
                .iter()
                .map(|f| (f.stem(), format!("filter '{}'", f.name))),
        );

    let mut owners: BTreeMap<String, String> = BTreeMap::new();
    for (stem, owner) in stems {
        if stem.is_empty() {
            return Err(PipelineError::Config(format!(
                "{owner} has no usable export file name"
            )));
        }
        if let Some(first) = owners.get(&stem) {
            return Err(PipelineError::Config(format!(
                "{owner} and {first} both export to '{stem}.geojson'"
            )));
        }
        owners.insert(stem, owner);
    }
    Ok(())
}

fn build_scales(
    config: &PipelineConfig,
    sources: &BTreeMap<String, Exported>,
) -> Result<BTreeMap<String, ColorScale>> {
    let mut scales = BTreeMap::new();
    for s in &config.color_scales {
        let source = lookup(sources, &s.dataset, || format!("colour scale '{}'", s.name))?;
        let scale = ColorScale::from_dataset(
            &source.data,
            &s.attribute,
            &s.palette,
            s.fallback.unwrap_or(DEFAULT_FALLBACK),
        )?
        .with_caption(s.caption.clone().unwrap_or_else(|| s.attribute.clone()));
        scales.insert(s.name.clone(), scale);
    }
    Ok(scales)
}

fn compose_layers(
    config: &PipelineConfig,
    sources: &BTreeMap<String, Exported>,
    scales: &BTreeMap<String, ColorScale>,
) -> Result<BTreeMap<String, OverlayLayer>> {
    let uncoloured = config
        .layers
        .iter()
        .filter(|l| matches!(l.style, StyleConfig::Static { color: None, .. }))
        .count();
    let mut spare_colors = generate_palette(uncoloured).into_iter();

    let mut layers = BTreeMap::new();
    for layer in &config.layers {
        if layers.contains_key(&layer.name) {
            return Err(PipelineError::Config(format!(
                "layer '{}' is defined twice",
                layer.name
            )));
        }
        let source = lookup(sources, &layer.source, || format!("layer '{}'", layer.name))?;
        let style = style_rule(layer, scales, &mut spare_colors)?;
        let composed = compose(
            &layer.name,
            &source.data,
            &source.path,
            style,
            layer.tooltip.clone(),
        )?;
        layers.insert(layer.name.clone(), composed);
    }
    Ok(layers)
}

fn style_rule(
    layer: &LayerConfig,
    scales: &BTreeMap<String, ColorScale>,
    spare_colors: &mut impl Iterator<Item = crate::color::Color>,
) -> Result<StyleRule> {
    match &layer.style {
        StyleConfig::Static {
            color,
            fill_color,
            weight,
            opacity,
            fill_opacity,
        } => {
            let stroke = match color {
                Some(c) => *c,
                None => spare_colors.next().unwrap_or(DEFAULT_FALLBACK),
            };
            Ok(StyleRule::Static {
                stroke,
                fill: *fill_color,
                weight: *weight,
                opacity: *opacity,
                fill_opacity: *fill_opacity,
            })
        }
        StyleConfig::Scaled {
            scale,
            attribute,
            color,
            weight,
            fill_opacity,
        } => {
            let found = scales.get(scale).ok_or_else(|| {
                PipelineError::Config(format!(
                    "layer '{}' refers to unknown colour scale '{scale}'",
                    layer.name
                ))
            })?;
            Ok(StyleRule::Scaled {
                attribute: attribute
                    .clone()
                    .unwrap_or_else(|| found.attribute().to_string()),
                scale: found.clone(),
                stroke: *color,
                weight: *weight,
                fill_opacity: *fill_opacity,
            })
        }
    }
}

fn lookup<'a>(
    sources: &'a BTreeMap<String, Exported>,
    name: &str,
    who: impl FnOnce() -> String,
) -> Result<&'a Exported> {
    sources.get(name).ok_or_else(|| {
        PipelineError::Config(format!("{} refers to unknown source '{name}'", who()))
    })
}

/// Serialise `document` to `<dir>/map.json` with the same atomic write as
/// the exports.
pub fn write_manifest(document: &MapDocument, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(MANIFEST);
    let to_export_err = |source: std::io::Error| PipelineError::Export {
        dataset: "manifest".to_string(),
        path: path.clone(),
        source,
    };
    let body = serde_json::to_vec_pretty(document).map_err(|e| to_export_err(e.into()))?;
    write_atomic(&path, &body).map_err(to_export_err)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatasetConfig, GroupConfig};
    use crate::data::model::{AttributeValue, Feature};
    use crate::data::project::Crs;
    use geo::{line_string, polygon, Geometry};

    fn attrs(pairs: &[(&str, AttributeValue)]) -> BTreeMap<String, AttributeValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn int(v: i64) -> AttributeValue {
        AttributeValue::Integer(v)
    }

    fn float(v: f64) -> AttributeValue {
        AttributeValue::Float(v)
    }

    fn text(v: &str) -> AttributeValue {
        AttributeValue::String(v.to_string())
    }

    /// Writes the three input datasets in Maryland state plane feet and
    /// returns a Baltimore-style config pointing at them.
    fn fixture(dir: &Path) -> PipelineConfig {
        let x0 = 1_420_000.0;
        let y0 = 590_000.0;
        let zones: Vec<Feature> = (0..3)
            .map(|i| {
                let x = x0 + i as f64 * 2_000.0;
                Feature::new(
                    Geometry::Polygon(polygon![
                        (x: x, y: y0),
                        (x: x + 2_000.0, y: y0),
                        (x: x + 2_000.0, y: y0 + 2_000.0),
                        (x: x, y: y0 + 2_000.0),
                    ]),
                    attrs(&[
                        ("TAZ", int(i + 1)),
                        ("NAME", text(&format!("Zone {i}"))),
                        ("Community", text("Southeast")),
                        ("TAZ_Area", int(i * 10)),
                    ]),
                )
            })
            .collect();
        let connectors = vec![Feature::new(
            Geometry::LineString(line_string![(x: x0 + 1_000.0, y: y0 + 1_000.0), (x: x0 + 3_000.0, y: y0 + 500.0)]),
            attrs(&[
                ("TAZ", int(1)),
                ("ATYPE", int(3)),
                ("MDLANE", int(1)),
                ("MDLIMIT", int(25)),
                ("TIMEPEN", float(0.5)),
            ]),
        )];
        let links = [(100, -30.0, 23.0, 23.0), (0, -30.0, 0.0, 0.0), (50, 25.0, 21.5, 1.5)];
        let highway: Vec<Feature> = links
            .iter()
            .enumerate()
            .map(|(i, &(awdt, dif, pct, abs))| {
                let y = y0 + i as f64 * 1_500.0;
                Feature::new(
                    Geometry::LineString(line_string![(x: x0, y: y), (x: x0 + 6_000.0, y: y)]),
                    attrs(&[
                        ("AWDT_2023", int(awdt)),
                        ("CNT2LOADDIF", float(dif)),
                        ("CNT2LOADPCT", float(pct)),
                        ("ABSPCTDIFF", float(abs)),
                    ]),
                )
            })
            .collect();

        let input = dir.join("input");
        for (name, features) in [("taz", zones), ("centroid", connectors), ("highway", highway)] {
            let ds = Dataset::from_features(name, Crs::MarylandFeet, features);
            export(&ds, &export_path(&input, name)).unwrap();
        }

        let mut config = PipelineConfig::baltimore();
        config.export_dir = dir.join("out");
        config.datasets = ["taz", "centroid", "highway"]
            .into_iter()
            .map(|name| DatasetConfig {
                name: name.to_string(),
                path: export_path(&input, name),
            })
            .collect();
        config
    }

    #[test]
    fn baltimore_run_produces_ordered_groups_and_exports() {
        let dir = tempfile::tempdir().unwrap();
        let config = fixture(dir.path());
        let doc = run(&config).unwrap();

        let group_names: Vec<_> = doc.groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(group_names, vec!["Zones", "Filtered Highways"]);
        assert!(doc.groups.iter().all(|g| !g.exclusive));

        let highways = &doc.groups[1].layers;
        assert_eq!(highways.len(), 4);
        assert_eq!(highways[0].name, "Filter1: AWDT>0 & CNT2LOADDIF<-20");
        let counts: Vec<_> = highways.iter().map(|l| l.source.feature_count).collect();
        // Filter2 (pct > 20) and Filter4 (abs > 1) overlap on two links.
        assert_eq!(counts, vec![1, 2, 1, 2]);

        for stem in ["taz", "centroid", "highway", "filter1", "filter2", "filter3", "filter4"] {
            assert!(export_path(&config.export_dir, stem).exists(), "{stem} not exported");
        }

        let reloaded = load_dataset("filter1", &highways[0].source.path).unwrap();
        assert_eq!(reloaded.crs, Crs::Wgs84);
        assert_eq!(reloaded.features[0].get("AWDT_2023"), Some(&int(100)));

        assert_eq!(doc.legends.len(), 1);
        assert_eq!((doc.legends[0].min(), doc.legends[0].max()), (0.0, 20.0));
        assert_eq!(doc.legends[0].caption, "TAZ Area");

        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(config.export_dir.join(MANIFEST)).unwrap())
                .unwrap();
        assert_eq!(manifest["groups"][0]["layers"][0]["style"]["kind"], "scaled");
        assert_eq!(manifest["groups"][0]["layers"][1]["style"]["stroke"], "#ffff00");
        assert_eq!(manifest["legends"][0]["palette"], "YlGn_09");
        assert_eq!(manifest["crs"], "EPSG:4326");
    }

    #[test]
    fn missing_tooltip_field_aborts_run_without_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.layers[1].tooltip.push("SPEED_CLASS".to_string());

        let err = run(&config).unwrap_err();
        match &err {
            PipelineError::AttributeMissing {
                attribute, context, ..
            } => {
                assert_eq!(attribute, "SPEED_CLASS");
                assert!(context.contains("Centroid Connectors"));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!config.export_dir.join(MANIFEST).exists());
    }

    #[test]
    fn layer_shared_between_groups_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.groups.push(GroupConfig {
            name: "Everything".to_string(),
            layers: vec!["TAZ Area".to_string()],
            exclusive: Some(true),
        });
        let err = run(&config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DuplicateLayer);
    }

    #[test]
    fn dangling_references_are_config_errors() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = fixture(dir.path());
        config.filters[0].dataset = "roads".to_string();
        assert_eq!(run(&config).unwrap_err().kind(), crate::error::ErrorKind::Config);

        let mut config = fixture(dir.path());
        config.groups[0].layers.push("Bus Routes".to_string());
        assert_eq!(run(&config).unwrap_err().kind(), crate::error::ErrorKind::Config);

        let mut config = fixture(dir.path());
        config.color_scales[0].palette = "Plasma_11".to_string();
        assert_eq!(run(&config).unwrap_err().kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn unreadable_input_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.datasets[2].path = dir.path().join("missing.geojson");
        let err = run(&config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Load);
        assert!(err.to_string().contains("highway"));
    }

    #[test]
    fn clashing_export_names_are_rejected_before_writing() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = fixture(dir.path());
        config.filters[1].file_stem = Some("highway".to_string());
        let err = run(&config).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
        assert!(err.to_string().contains("highway.geojson"), "{err}");
        assert!(!export_path(&config.export_dir, "highway").exists());

        let mut config = fixture(dir.path());
        config.filters[3].file_stem = Some("Filter1".to_string());
        let err = run(&config).unwrap_err();
        assert!(err.to_string().contains("filter1.geojson"), "{err}");
        assert!(!config.export_dir.exists());
    }

    #[test]
    fn dataset_names_cannot_leave_the_export_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = fixture(dir.path());
        config.datasets[1].name = "../centroid".to_string();
        config.layers[1].source = "../centroid".to_string();
        let doc = run(&config).unwrap();
        let connectors = &doc.groups[0].layers[1];
        assert_eq!(connectors.source.path, export_path(&config.export_dir, "centroid"));
        assert!(!dir.path().join("centroid.geojson").exists());
    }
}
