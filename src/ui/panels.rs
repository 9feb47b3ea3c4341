use eframe::egui::{self, Color32, Pos2, Rect, RichText, ScrollArea, Sense, Ui};

use crate::color::ColorScale;
use crate::config::PipelineConfig;
use crate::map::layer::StyleRule;
use crate::state::AppState;
use crate::ui::to_color32;

// ---------------------------------------------------------------------------
// Left side panel – grouped layer control and legends
// ---------------------------------------------------------------------------

/// Render the layer control and legends.
pub fn side_panel(ui: &mut Ui, state: &mut AppState) {
    ui.heading("Layers");
    ui.separator();

    let Some(doc) = &state.document else {
        ui.label("No map. Open a config or re-run the pipeline.");
        return;
    };

    // Collect what we need so we can mutate state inside the loop.
    let groups: Vec<(String, bool, Vec<(String, Color32, usize)>)> = doc
        .groups
        .iter()
        .map(|g| {
            let layers = g
                .layers
                .iter()
                .map(|l| {
                    let swatch = match &l.style {
                        StyleRule::Static { stroke, .. } => to_color32(*stroke, 1.0),
                        StyleRule::Scaled { scale, .. } => to_color32(scale.evaluate(scale.max()), 1.0),
                    };
                    (l.name.clone(), swatch, l.source.feature_count)
                })
                .collect();
            (g.name.clone(), g.exclusive, layers)
        })
        .collect();
    let legends = doc.legends.clone();

    let mut toggled = None;
    ScrollArea::vertical()
        .auto_shrink([false, false])
        .show(ui, |ui: &mut Ui| {
            for (gi, (name, exclusive, layers)) in groups.iter().enumerate() {
                egui::CollapsingHeader::new(RichText::new(name).strong())
                    .id_salt(("group", gi))
                    .default_open(true)
                    .show(ui, |ui: &mut Ui| {
                        for (li, (layer, swatch, count)) in layers.iter().enumerate() {
                            let text = RichText::new(format!("{layer}  ({count})")).color(*swatch);
                            let visible = state.is_visible(gi, li);
                            let clicked = if *exclusive {
                                ui.radio(visible, text).clicked()
                            } else {
                                let mut checked = visible;
                                ui.checkbox(&mut checked, text).changed()
                            };
                            if clicked {
                                toggled = Some((gi, li));
                            }
                        }
                    });
            }

            if !legends.is_empty() {
                ui.add_space(8.0);
                ui.strong("Legend");
                ui.separator();
                for scale in &legends {
                    legend(ui, scale);
                    ui.add_space(6.0);
                }
            }
        });

    if let Some((gi, li)) = toggled {
        state.toggle_layer(gi, li);
    }
}

/// Horizontal gradient with min/max labels and the sentinel swatch.
fn legend(ui: &mut Ui, scale: &ColorScale) {
    ui.label(&scale.caption);

    let width = ui.available_width().min(220.0);
    let (rect, _) = ui.allocate_exact_size(egui::vec2(width, 14.0), Sense::hover());
    let steps = 48;
    let samples = scale.legend_stops(steps + 1);
    for (k, (_, color)) in samples.iter().take(steps).enumerate() {
        let x0 = rect.left() + rect.width() * k as f32 / steps as f32;
        let x1 = rect.left() + rect.width() * (k + 1) as f32 / steps as f32;
        let strip = Rect::from_min_max(Pos2::new(x0, rect.top()), Pos2::new(x1, rect.bottom()));
        ui.painter().rect_filled(strip, 0.0, to_color32(*color, 1.0));
    }

    ui.horizontal(|ui: &mut Ui| {
        ui.small(format!("{:.2}", scale.min()));
        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui: &mut Ui| {
            ui.small(format!("{:.2}", scale.max()));
        });
    });
    ui.horizontal(|ui: &mut Ui| {
        let (swatch, _) = ui.allocate_exact_size(egui::vec2(14.0, 14.0), Sense::hover());
        ui.painter()
            .rect_filled(swatch, 2.0, to_color32(scale.fallback(), 1.0));
        ui.small(format!("0 (no data)  ·  {}", scale.palette()));
    });
}

// ---------------------------------------------------------------------------
// Top bar
// ---------------------------------------------------------------------------

/// Render the top menu / toolbar.
pub fn top_bar(ui: &mut Ui, state: &mut AppState) {
    egui::menu::bar(ui, |ui: &mut Ui| {
        ui.menu_button("File", |ui: &mut Ui| {
            if ui.button("Open config…").clicked() {
                open_config_dialog(state);
                ui.close_menu();
            }
            if ui.button("Use built-in config").clicked() {
                state.set_config(PipelineConfig::baltimore(), None);
                ui.close_menu();
            }
        });

        if ui.button("Re-run pipeline").clicked() {
            state.rerun();
        }

        ui.separator();

        if let Some(doc) = &state.document {
            ui.label(format!(
                "{} layers in {} groups, {} visible",
                doc.layers().count(),
                doc.groups.len(),
                state.visible_layers().len()
            ));
        }

        if let Some(path) = &state.config_path {
            ui.separator();
            ui.label(RichText::new(path.display().to_string()).weak());
        }

        if let Some(msg) = &state.status_message {
            ui.separator();
            ui.label(RichText::new(msg).color(Color32::RED));
        }
    });
}

// ---------------------------------------------------------------------------
// File dialog
// ---------------------------------------------------------------------------

pub fn open_config_dialog(state: &mut AppState) {
    let file = rfd::FileDialog::new()
        .set_title("Open pipeline config")
        .add_filter("JSON", &["json"])
        .pick_file();

    if let Some(path) = file {
        match PipelineConfig::load(&path) {
            Ok(config) => state.set_config(config, Some(path)),
            Err(e) => {
                log::error!("Failed to load config: {e}");
                state.status_message = Some(format!("Error: {e}"));
            }
        }
    }
}
