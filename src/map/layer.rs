use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::color::{Color, ColorScale};
use crate::data::model::{Dataset, Feature};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Style rules
// ---------------------------------------------------------------------------

/// How an overlay's features are painted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StyleRule {
    /// Fixed colours for every feature.
    Static {
        stroke: Color,
        fill: Option<Color>,
        weight: f32,
        opacity: f32,
        fill_opacity: f32,
    },
    /// Fill colour comes from a colour scale evaluated on `attribute`.
    Scaled {
        attribute: String,
        scale: ColorScale,
        stroke: Color,
        weight: f32,
        fill_opacity: f32,
    },
}

/// The resolved paint for one feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureStyle {
    pub stroke: Color,
    pub fill: Option<Color>,
    pub weight: f32,
    pub opacity: f32,
    pub fill_opacity: f32,
}

impl StyleRule {
    /// Attribute the style reads, if any.
    pub fn attribute(&self) -> Option<&str> {
        match self {
            StyleRule::Static { .. } => None,
            StyleRule::Scaled { attribute, .. } => Some(attribute),
        }
    }

    /// Fill for `feature`.  For scaled styles the sentinel override applies
    /// first; values that are missing or not numeric also get the fallback.
    pub fn fill_for(&self, feature: &Feature) -> Option<Color> {
        match self {
            StyleRule::Static { fill, .. } => *fill,
            StyleRule::Scaled {
                attribute, scale, ..
            } => Some(
                feature
                    .get(attribute)
                    .and_then(|v| v.as_f64())
                    .map(|v| scale.evaluate(v))
                    .unwrap_or_else(|| scale.fallback()),
            ),
        }
    }

    pub fn resolve(&self, feature: &Feature) -> FeatureStyle {
        let fill = self.fill_for(feature);
        match self {
            StyleRule::Static {
                stroke,
                weight,
                opacity,
                fill_opacity,
                ..
            } => FeatureStyle {
                stroke: *stroke,
                fill,
                weight: *weight,
                opacity: *opacity,
                fill_opacity: *fill_opacity,
            },
            StyleRule::Scaled {
                stroke,
                weight,
                fill_opacity,
                ..
            } => FeatureStyle {
                stroke: *stroke,
                fill,
                weight: *weight,
                opacity: 1.0,
                fill_opacity: *fill_opacity,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Overlay layers
// ---------------------------------------------------------------------------

/// Where a layer's features live.  The renderer loads them from `path`
/// rather than from the in-memory dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceRef {
    pub dataset: String,
    pub path: PathBuf,
    pub feature_count: usize,
}

/// A styled, inspectable presentation of one dataset or subset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayLayer {
    pub name: String,
    pub source: SourceRef,
    pub style: StyleRule,
    /// Attributes shown on hover, in display order.
    pub tooltip: Vec<String>,
}

/// Bind `source` (already exported to `export`) to a style and tooltip
/// fields.  Every tooltip field and the scaled attribute must exist in the
/// source schema; otherwise no layer is produced.
pub fn compose(
    name: &str,
    source: &Dataset,
    export: &Path,
    style: StyleRule,
    tooltip: Vec<String>,
) -> Result<OverlayLayer> {
    let referenced = style
        .attribute()
        .into_iter()
        .chain(tooltip.iter().map(String::as_str));
    for attribute in referenced {
        if !source.has_attribute(attribute) {
            return Err(PipelineError::AttributeMissing {
                attribute: attribute.to_string(),
                context: format!("layer '{name}'"),
                dataset: source.name.clone(),
            });
        }
    }

    log::debug!(
        "Composed layer '{name}' over '{}' ({} features), tooltip {tooltip:?}",
        source.name,
        source.len()
    );
    Ok(OverlayLayer {
        name: name.to_string(),
        source: SourceRef {
            dataset: source.name.clone(),
            path: export.to_path_buf(),
            feature_count: source.len(),
        },
        style,
        tooltip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::DEFAULT_FALLBACK;
    use crate::data::model::AttributeValue;
    use crate::data::project::Crs;
    use geo::{point, Geometry};

    fn zones() -> Dataset {
        let features = [0, 10, 20]
            .into_iter()
            .enumerate()
            .map(|(i, area)| {
                Feature::new(
                    Geometry::Point(point!(x: 0.0, y: 0.0)),
                    [
                        ("TAZ".to_string(), AttributeValue::Integer(i as i64 + 1)),
                        ("NAME".to_string(), AttributeValue::String(format!("Zone {i}"))),
                        ("TAZ_Area".to_string(), AttributeValue::Integer(area)),
                    ]
                    .into_iter()
                    .collect(),
                )
            })
            .collect();
        Dataset::from_features("taz", Crs::Wgs84, features)
    }

    fn scaled(ds: &Dataset) -> StyleRule {
        StyleRule::Scaled {
            attribute: "TAZ_Area".to_string(),
            scale: ColorScale::from_dataset(ds, "TAZ_Area", "YlGn_09", DEFAULT_FALLBACK).unwrap(),
            stroke: Color::rgb(0, 0, 0),
            weight: 0.5,
            fill_opacity: 0.4,
        }
    }

    #[test]
    fn scaled_fill_applies_sentinel_then_ramp() {
        let ds = zones();
        let style = scaled(&ds);
        assert_eq!(style.fill_for(&ds.features[0]), Some(DEFAULT_FALLBACK));
        assert_eq!(
            style.fill_for(&ds.features[2]),
            Some("#004529".parse().unwrap())
        );

        let mut odd = ds.features[1].clone();
        odd.attributes
            .insert("TAZ_Area".to_string(), AttributeValue::String("?".into()));
        assert_eq!(style.fill_for(&odd), Some(DEFAULT_FALLBACK));
    }

    #[test]
    fn compose_records_source_and_tooltip_order() {
        let ds = zones();
        let layer = compose(
            "TAZ Area",
            &ds,
            Path::new("static/geojson/taz.geojson"),
            scaled(&ds),
            vec!["TAZ_Area".into(), "NAME".into(), "TAZ".into()],
        )
        .unwrap();
        assert_eq!(layer.name, "TAZ Area");
        assert_eq!(layer.source.feature_count, 3);
        assert_eq!(layer.source.path, PathBuf::from("static/geojson/taz.geojson"));
        assert_eq!(layer.tooltip, vec!["TAZ_Area", "NAME", "TAZ"]);
    }

    #[test]
    fn unknown_tooltip_field_produces_no_layer() {
        let ds = zones();
        let style = StyleRule::Static {
            stroke: "yellow".parse().unwrap(),
            fill: None,
            weight: 0.7,
            opacity: 1.0,
            fill_opacity: 0.5,
        };
        let result = compose(
            "TAZ Area",
            &ds,
            Path::new("taz.geojson"),
            style,
            vec!["TAZ".into(), "Community".into()],
        );
        match result {
            Err(PipelineError::AttributeMissing {
                attribute, context, ..
            }) => {
                assert_eq!(attribute, "Community");
                assert!(context.contains("TAZ Area"));
            }
            other => panic!("expected AttributeMissing, got {other:?}"),
        }
    }

    #[test]
    fn scaled_attribute_must_exist() {
        let ds = zones();
        let mut style = scaled(&ds);
        if let StyleRule::Scaled { attribute, .. } = &mut style {
            *attribute = "AREA_SQMI".to_string();
        }
        let err = compose("TAZ Area", &ds, Path::new("taz.geojson"), style, Vec::new()).unwrap_err();
        assert!(err.to_string().contains("AREA_SQMI"));
    }

    #[test]
    fn static_style_resolves_fixed_paint() {
        let ds = zones();
        let style = StyleRule::Static {
            stroke: "red".parse().unwrap(),
            fill: None,
            weight: 2.0,
            opacity: 1.0,
            fill_opacity: 0.2,
        };
        let paint = style.resolve(&ds.features[1]);
        assert_eq!(paint.stroke, Color::rgb(255, 0, 0));
        assert_eq!(paint.fill, None);
        assert_eq!(paint.weight, 2.0);
    }
}
