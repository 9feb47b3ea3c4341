use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::data::loader::load_dataset;
use crate::data::model::Dataset;
use crate::map::layer::OverlayLayer;
use crate::map::MapDocument;
use crate::pipeline;

// ---------------------------------------------------------------------------
// Application state
// ---------------------------------------------------------------------------

/// The full viewer state, independent of rendering.
pub struct AppState {
    /// Configuration the current document was produced from.
    pub config: PipelineConfig,

    /// Where `config` came from (None for the built-in configuration).
    pub config_path: Option<PathBuf>,

    /// Result of the last successful pipeline run.
    pub document: Option<MapDocument>,

    /// Per group, per layer: is the layer switched on.
    pub visibility: Vec<Vec<bool>>,

    /// Features read back from each layer's export, keyed by layer name.
    pub layer_data: BTreeMap<String, Dataset>,

    /// Status / error message shown in the UI.
    pub status_message: Option<String>,
}

impl AppState {
    pub fn new(config: PipelineConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
            document: None,
            visibility: Vec::new(),
            layer_data: BTreeMap::new(),
            status_message: None,
        }
    }

    /// Run the pipeline for the current config and show the result.  On
    /// failure the previous document is dropped rather than shown stale.
    pub fn rerun(&mut self) {
        match pipeline::run(&self.config) {
            Ok(document) => {
                self.set_document(document);
                self.status_message = None;
            }
            Err(e) => {
                log::error!("Pipeline failed: {e:#}");
                self.document = None;
                self.visibility.clear();
                self.layer_data.clear();
                self.status_message = Some(format!("Error: {e}"));
            }
        }
    }

    /// Replace the config (e.g. from File → Open) and rerun.
    pub fn set_config(&mut self, config: PipelineConfig, path: Option<PathBuf>) {
        self.config = config;
        self.config_path = path;
        self.rerun();
    }

    /// Ingest a new document.  Every layer of a non-exclusive group starts
    /// visible; exclusive groups start with their first layer selected.
    pub fn set_document(&mut self, document: MapDocument) {
        self.visibility = document
            .groups
            .iter()
            .map(|g| {
                (0..g.layers.len())
                    .map(|i| !g.exclusive || i == 0)
                    .collect()
            })
            .collect();
        self.layer_data.clear();
        self.document = Some(document);
    }

    pub fn is_visible(&self, group: usize, layer: usize) -> bool {
        self.visibility
            .get(group)
            .and_then(|g| g.get(layer))
            .copied()
            .unwrap_or(false)
    }

    /// Toggle a layer.  In an exclusive group, switching one on switches the
    /// others off; switching the visible one off leaves the group empty.
    pub fn toggle_layer(&mut self, group: usize, layer: usize) {
        let exclusive = self
            .document
            .as_ref()
            .and_then(|d| d.groups.get(group))
            .map(|g| g.exclusive)
            .unwrap_or(false);
        let Some(flags) = self.visibility.get_mut(group) else {
            return;
        };
        if layer >= flags.len() {
            return;
        }
        let now = !flags[layer];
        if exclusive && now {
            flags.iter_mut().for_each(|f| *f = false);
        }
        flags[layer] = now;
    }

    /// Visible layers in draw order (group order, then layer order).
    pub fn visible_layers(&self) -> Vec<&OverlayLayer> {
        let Some(doc) = &self.document else {
            return Vec::new();
        };
        doc.groups
            .iter()
            .enumerate()
            .flat_map(|(gi, g)| {
                g.layers
                    .iter()
                    .enumerate()
                    .filter(move |(li, _)| self.is_visible(gi, *li))
                    .map(|(_, l)| l)
            })
            .collect()
    }

    /// Read each visible layer's export the first time it is shown.
    pub fn load_visible_layers(&mut self) {
        let pending: Vec<(String, PathBuf)> = self
            .visible_layers()
            .into_iter()
            .filter(|l| !self.layer_data.contains_key(&l.name))
            .map(|l| (l.name.clone(), l.source.path.clone()))
            .collect();

        for (name, path) in pending {
            match load_dataset(&name, &path) {
                Ok(dataset) => {
                    self.layer_data.insert(name, dataset);
                }
                Err(e) => {
                    log::error!("Failed to load layer '{name}': {e}");
                    self.status_message = Some(format!("Error: {e}"));
                    // Keep an empty placeholder so the load isn't retried every frame.
                    self.layer_data.insert(
                        name.clone(),
                        Dataset::from_features(name, self.config.target_crs, Vec::new()),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewConfig;
    use crate::map::group::Group;
    use crate::map::layer::{SourceRef, StyleRule};

    fn layer(name: &str) -> OverlayLayer {
        OverlayLayer {
            name: name.to_string(),
            source: SourceRef {
                dataset: name.to_string(),
                path: PathBuf::from(format!("/nonexistent/{name}.geojson")),
                feature_count: 0,
            },
            style: StyleRule::Static {
                stroke: "red".parse().unwrap(),
                fill: None,
                weight: 2.0,
                opacity: 1.0,
                fill_opacity: 0.2,
            },
            tooltip: Vec::new(),
        }
    }

    fn state() -> AppState {
        let mut state = AppState::new(PipelineConfig::default(), None);
        state.set_document(MapDocument {
            view: ViewConfig::default(),
            crs: crate::data::project::Crs::Wgs84,
            groups: vec![
                Group {
                    name: "Zones".into(),
                    layers: vec![layer("TAZ Area"), layer("Centroid Connectors")],
                    exclusive: false,
                },
                Group {
                    name: "Scenarios".into(),
                    layers: vec![layer("Filter1"), layer("Filter2"), layer("Filter3")],
                    exclusive: true,
                },
            ],
            legends: Vec::new(),
        });
        state
    }

    fn visible_names(state: &AppState) -> Vec<&str> {
        state
            .visible_layers()
            .into_iter()
            .map(|l| l.name.as_str())
            .collect()
    }

    #[test]
    fn initial_visibility_respects_exclusivity() {
        let state = state();
        assert_eq!(
            visible_names(&state),
            vec!["TAZ Area", "Centroid Connectors", "Filter1"]
        );
    }

    #[test]
    fn exclusive_group_keeps_at_most_one_layer() {
        let mut state = state();
        state.toggle_layer(1, 2);
        assert_eq!(
            visible_names(&state),
            vec!["TAZ Area", "Centroid Connectors", "Filter3"]
        );
        state.toggle_layer(1, 2);
        assert_eq!(visible_names(&state), vec!["TAZ Area", "Centroid Connectors"]);
    }

    #[test]
    fn independent_group_toggles_each_layer() {
        let mut state = state();
        state.toggle_layer(0, 0);
        assert!(!state.is_visible(0, 0));
        assert!(state.is_visible(0, 1));
        state.toggle_layer(0, 0);
        assert!(state.is_visible(0, 0));
        // Out of range is ignored.
        state.toggle_layer(5, 0);
        state.toggle_layer(0, 9);
    }

    #[test]
    fn unreadable_export_is_reported_once() {
        let mut state = state();
        state.load_visible_layers();
        assert!(state.status_message.is_some());
        assert_eq!(state.layer_data.len(), 3);
        assert!(state.layer_data.values().all(|d| d.is_empty()));
    }
}
