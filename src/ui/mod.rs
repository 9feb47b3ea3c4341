pub mod panels;
pub mod plot;

use eframe::egui::Color32;

use crate::color::Color;

/// Convert a pipeline colour to egui with the given opacity in `[0, 1]`.
pub fn to_color32(color: Color, opacity: f32) -> Color32 {
    let (r, g, b) = color.components();
    let alpha = (opacity.clamp(0.0, 1.0) * 255.0).round() as u8;
    Color32::from_rgba_unmultiplied(r, g, b, alpha)
}
