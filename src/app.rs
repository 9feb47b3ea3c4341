use std::path::PathBuf;

use eframe::egui;

use crate::config::PipelineConfig;
use crate::state::AppState;
use crate::ui::{panels, plot};

// ---------------------------------------------------------------------------
// eframe App implementation
// ---------------------------------------------------------------------------

pub struct MapViewerApp {
    pub state: AppState,
}

impl MapViewerApp {
    /// Runs the pipeline once up front so the first frame has a map.
    pub fn new(config: PipelineConfig, config_path: Option<PathBuf>) -> Self {
        let mut state = AppState::new(config, config_path);
        state.rerun();
        Self { state }
    }
}

impl eframe::App for MapViewerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.state.load_visible_layers();

        // ---- Top panel: menu bar ----
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            panels::top_bar(ui, &mut self.state);
        });

        // ---- Left side panel: layer control + legend ----
        egui::SidePanel::left("layer_panel")
            .default_width(260.0)
            .resizable(true)
            .show(ctx, |ui| {
                panels::side_panel(ui, &mut self.state);
            });

        // ---- Central panel: map ----
        egui::CentralPanel::default().show(ctx, |ui| {
            plot::map_plot(ui, &self.state);
        });
    }
}
