use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::data::project::Crs;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

/// Everything a pipeline run needs: inputs, filter rules, scales, layer
/// styles and grouping.  Passed explicitly so runs with different rule sets
/// never share state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_crs")]
    pub target_crs: Crs,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
    #[serde(default)]
    pub view: ViewConfig,
    #[serde(default)]
    pub datasets: Vec<DatasetConfig>,
    #[serde(default)]
    pub filters: Vec<FilterConfig>,
    #[serde(default)]
    pub color_scales: Vec<ScaleConfig>,
    #[serde(default)]
    pub layers: Vec<LayerConfig>,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
    /// Default exclusivity for groups that don't set their own.
    #[serde(default)]
    pub exclusive_groups: bool,
}

fn default_crs() -> Crs {
    Crs::Wgs84
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("static/geojson")
}

/// Initial map view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// `[lat, lon]`.
    pub center: [f64; 2],
    pub zoom: u8,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            center: [39.23, -76.68],
            zoom: 11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub name: String,
    pub path: PathBuf,
}

impl DatasetConfig {
    /// Export file name without extension.
    pub fn stem(&self) -> String {
        slugify(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub name: String,
    /// Dataset the predicate runs against.
    pub dataset: String,
    /// Export file name without extension; derived from `name` when absent.
    #[serde(default)]
    pub file_stem: Option<String>,
    /// e.g. `AWDT_2023>0 & CNT2LOADDIF<-20`.
    pub expr: String,
}

impl FilterConfig {
    /// Export file name without extension, always reduced to a plain slug so
    /// it stays inside the export directory.
    pub fn stem(&self) -> String {
        slugify(self.file_stem.as_deref().unwrap_or(&self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub name: String,
    /// Dataset or filter whose values define the domain.
    pub dataset: String,
    pub attribute: String,
    pub palette: String,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub fallback: Option<Color>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub name: String,
    /// Dataset or filter name.
    pub source: String,
    pub style: StyleConfig,
    #[serde(default)]
    pub tooltip: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StyleConfig {
    Static {
        /// Stroke colour; a distinct colour is assigned when absent.
        #[serde(default)]
        color: Option<Color>,
        #[serde(default)]
        fill_color: Option<Color>,
        #[serde(default = "default_line_weight")]
        weight: f32,
        #[serde(default = "one")]
        opacity: f32,
        #[serde(default = "default_fill_opacity")]
        fill_opacity: f32,
    },
    Scaled {
        /// Name of a configured colour scale.
        scale: String,
        /// Attribute to look up per feature; defaults to the scale's attribute.
        #[serde(default)]
        attribute: Option<String>,
        #[serde(default = "black")]
        color: Color,
        #[serde(default = "default_outline_weight")]
        weight: f32,
        #[serde(default = "default_fill_opacity")]
        fill_opacity: f32,
    },
}

fn default_line_weight() -> f32 {
    2.0
}

fn default_outline_weight() -> f32 {
    0.5
}

fn default_fill_opacity() -> f32 {
    0.2
}

fn one() -> f32 {
    1.0
}

fn black() -> Color {
    Color::rgb(0, 0, 0)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub layers: Vec<String>,
    /// Overrides `PipelineConfig::exclusive_groups` for this group.
    #[serde(default)]
    pub exclusive: Option<bool>,
}

/// Lower-case, with runs of non-alphanumerics collapsed to `_`.
pub fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl PipelineConfig {
    /// Read a JSON config.  Relative paths inside it resolve against the
    /// config file's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut config: PipelineConfig = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Config(format!("cannot parse {}: {e}", path.display()))
        })?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        log::info!(
            "Loaded config {}: {} datasets, {} filters, {} layers, {} groups",
            path.display(),
            config.datasets.len(),
            config.filters.len(),
            config.layers.len(),
            config.groups.len()
        );
        Ok(config)
    }

    /// Make relative dataset and export paths relative to `base`.
    pub fn rebase(&mut self, base: &Path) {
        for ds in &mut self.datasets {
            if ds.path.is_relative() {
                ds.path = base.join(&ds.path);
            }
        }
        if self.export_dir.is_relative() {
            self.export_dir = base.join(&self.export_dir);
        }
    }

    /// The zone / connector / highway map: four highway count-vs-model
    /// filters, a TAZ area ramp and two non-exclusive groups.
    pub fn baltimore() -> Self {
        let filter = |name: &str, stem: &str, expr: &str| FilterConfig {
            name: name.to_string(),
            dataset: "highway".to_string(),
            file_stem: Some(stem.to_string()),
            expr: expr.to_string(),
        };
        let highway_layer = |name: &str, color: &str, tooltip: &[&str]| LayerConfig {
            name: name.to_string(),
            source: name.to_string(),
            style: StyleConfig::Static {
                color: color.parse().ok(),
                fill_color: None,
                weight: 2.0,
                opacity: 1.0,
                fill_opacity: 0.2,
            },
            tooltip: strings(tooltip),
        };

        let filters = vec![
            filter(
                "Filter1: AWDT>0 & CNT2LOADDIF<-20",
                "filter1",
                "AWDT_2023>0 & CNT2LOADDIF<-20",
            ),
            filter("Filter2: CNT2LOADPCT>20", "filter2", "CNT2LOADPCT>20"),
            filter(
                "Filter3: AWDT>0 & CNT2LOADDIF>20",
                "filter3",
                "AWDT_2023>0 & CNT2LOADDIF>20",
            ),
            filter("Filter4: ABSPCTDIFF>1", "filter4", "ABSPCTDIFF>1"),
        ];

        let mut layers = vec![
            LayerConfig {
                name: "TAZ Area".to_string(),
                source: "taz".to_string(),
                style: StyleConfig::Scaled {
                    scale: "taz_area".to_string(),
                    attribute: None,
                    color: black(),
                    weight: 0.5,
                    fill_opacity: 0.4,
                },
                tooltip: strings(&["TAZ", "NAME", "Community", "TAZ_Area"]),
            },
            LayerConfig {
                name: "Centroid Connectors".to_string(),
                source: "centroid".to_string(),
                style: StyleConfig::Static {
                    color: "yellow".parse().ok(),
                    fill_color: "yellow".parse().ok(),
                    weight: 0.7,
                    opacity: 1.0,
                    fill_opacity: 0.5,
                },
                tooltip: strings(&["TAZ", "ATYPE", "MDLANE", "MDLIMIT", "TIMEPEN"]),
            },
        ];
        let filter_colors = ["red", "blue", "green", "orange"];
        let filter_fields: [&[&str]; 4] = [
            &["AWDT_2023", "CNT2LOADDIF"],
            &["CNT2LOADPCT"],
            &["AWDT_2023", "CNT2LOADDIF"],
            &["ABSPCTDIFF"],
        ];
        for ((f, color), fields) in filters.iter().zip(filter_colors).zip(filter_fields) {
            layers.push(highway_layer(&f.name, color, fields));
        }

        PipelineConfig {
            target_crs: Crs::Wgs84,
            export_dir: default_export_dir(),
            view: ViewConfig::default(),
            datasets: vec![
                DatasetConfig {
                    name: "taz".to_string(),
                    path: PathBuf::from("TPBTAZ3722_TPBMod.geojson"),
                },
                DatasetConfig {
                    name: "centroid".to_string(),
                    path: PathBuf::from("Zonehwy_Line_Centroid_Connectors.geojson"),
                },
                DatasetConfig {
                    name: "highway".to_string(),
                    path: PathBuf::from("I4_Assign_OutputwAWDT.geojson"),
                },
            ],
            groups: vec![
                GroupConfig {
                    name: "Zones".to_string(),
                    layers: strings(&["TAZ Area", "Centroid Connectors"]),
                    exclusive: None,
                },
                GroupConfig {
                    name: "Filtered Highways".to_string(),
                    layers: filters.iter().map(|f| f.name.clone()).collect(),
                    exclusive: None,
                },
            ],
            filters,
            color_scales: vec![ScaleConfig {
                name: "taz_area".to_string(),
                dataset: "taz".to_string(),
                attribute: "TAZ_Area".to_string(),
                palette: "YlGn_09".to_string(),
                caption: Some("TAZ Area".to_string()),
                fallback: "#faded1".parse().ok(),
            }],
            layers,
            exclusive_groups: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::baltimore()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
