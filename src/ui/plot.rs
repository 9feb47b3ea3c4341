use eframe::egui::{Stroke, Ui};
use egui_plot::{Line, Plot, PlotPoints, PlotUi, Points, Polygon};
use geo::{Contains, Coord, EuclideanDistance, Geometry, LineString, Point};

use crate::config::ViewConfig;
use crate::data::model::Feature;
use crate::data::project::Crs;
use crate::map::layer::FeatureStyle;
use crate::state::AppState;
use crate::ui::to_color32;

// ---------------------------------------------------------------------------
// Map plot (central panel)
// ---------------------------------------------------------------------------

/// Tooltip contents for the feature under the pointer.
struct Hovered {
    layer: String,
    fields: Vec<(String, String)>,
}

/// Render the visible overlay layers in the document's CRS.
pub fn map_plot(ui: &mut Ui, state: &AppState) {
    let Some(doc) = &state.document else {
        ui.centered_and_justified(|ui: &mut Ui| {
            ui.heading("No map yet  (File → Open config…)");
        });
        return;
    };

    let frame = view_frame(&doc.view, doc.crs);
    let layers = state.visible_layers();

    let mut plot = Plot::new("overlay_map")
        .data_aspect(frame.aspect)
        .x_axis_label(frame.x_label)
        .y_axis_label(frame.y_label);
    if let Some((min, max)) = frame.bounds {
        plot = plot
            .include_x(min[0])
            .include_x(max[0])
            .include_y(min[1])
            .include_y(max[1]);
    }

    let response = plot
        .allow_boxed_zoom(true)
        .allow_drag(true)
        .allow_scroll(true)
        .allow_zoom(true)
        .show(ui, |plot_ui| {
            for layer in &layers {
                let Some(dataset) = state.layer_data.get(&layer.name) else {
                    continue;
                };
                for feature in &dataset.features {
                    let style = layer.style.resolve(feature);
                    draw_geometry(plot_ui, &feature.geometry, &style);
                }
            }

            let pointer = plot_ui.pointer_coordinate()?;
            let point = Point::new(pointer.x, pointer.y);
            let tolerance = plot_ui.plot_bounds().width() * 0.004;

            // Topmost layer wins.
            layers.iter().rev().find_map(|layer| {
                let dataset = state.layer_data.get(&layer.name)?;
                let feature = dataset
                    .features
                    .iter()
                    .rev()
                    .find(|f| hit(&f.geometry, point, tolerance))?;
                Some(Hovered {
                    layer: layer.name.clone(),
                    fields: tooltip_fields(feature, &layer.tooltip),
                })
            })
        });

    if let Some(hovered) = response.inner {
        response.response.on_hover_ui_at_pointer(|ui: &mut Ui| {
            ui.strong(&hovered.layer);
            field_grid(ui, &hovered.fields);
        });
    }
}

// ---------------------------------------------------------------------------
// Initial view
// ---------------------------------------------------------------------------

/// The initial view expressed in the layers' CRS.
#[derive(Debug, Clone, PartialEq)]
struct ViewFrame {
    /// `(min, max)` corners; `None` when the view cannot be projected.
    bounds: Option<([f64; 2], [f64; 2])>,
    aspect: f32,
    x_label: &'static str,
    y_label: &'static str,
}

/// The view's centre and zoom are lon/lat based; project the corners of
/// that box into `crs` so projected layers land on screen too.
fn view_frame(view: &ViewConfig, crs: Crs) -> ViewFrame {
    let [lat, lon] = view.center;
    let span = 360.0 / 2f64.powi(view.zoom as i32);
    let corners = [
        Coord { x: lon - span / 2.0, y: lat - span / 4.0 },
        Coord { x: lon + span / 2.0, y: lat + span / 4.0 },
    ];
    let mut min = [f64::INFINITY; 2];
    let mut max = [f64::NEG_INFINITY; 2];
    for corner in corners {
        let p = match Crs::Wgs84.transform(crs, corner) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("view corner {corner:?} is not representable in {crs}: {e}");
                continue;
            }
        };
        min = [min[0].min(p.x), min[1].min(p.y)];
        max = [max[0].max(p.x), max[1].max(p.y)];
    }
    let bounds = (min[0].is_finite() && max[0].is_finite()).then_some((min, max));

    if crs.is_geographic() {
        ViewFrame {
            bounds,
            aspect: (1.0 / lat.to_radians().cos()) as f32,
            x_label: "Longitude",
            y_label: "Latitude",
        }
    } else {
        ViewFrame {
            bounds,
            aspect: 1.0,
            x_label: "Easting",
            y_label: "Northing",
        }
    }
}

fn field_grid(ui: &mut Ui, fields: &[(String, String)]) {
    eframe::egui::Grid::new("tooltip_fields")
        .num_columns(2)
        .show(ui, |ui: &mut Ui| {
            for (name, value) in fields {
                ui.label(name);
                ui.label(value);
                ui.end_row();
            }
        });
}

fn tooltip_fields(feature: &Feature, names: &[String]) -> Vec<(String, String)> {
    names
        .iter()
        .map(|n| {
            let value = feature
                .get(n)
                .map(|v| v.to_string())
                .unwrap_or_default();
            (n.clone(), value)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Drawing
// ---------------------------------------------------------------------------

fn draw_geometry(plot_ui: &mut PlotUi, geometry: &Geometry<f64>, style: &FeatureStyle) {
    match geometry {
        Geometry::Polygon(p) => draw_ring(plot_ui, p.exterior(), style),
        Geometry::MultiPolygon(mp) => {
            for p in mp {
                draw_ring(plot_ui, p.exterior(), style);
            }
        }
        Geometry::LineString(ls) => draw_line(plot_ui, ls, style),
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                draw_line(plot_ui, ls, style);
            }
        }
        Geometry::Point(p) => draw_points(plot_ui, vec![[p.x(), p.y()]], style),
        Geometry::MultiPoint(mp) => {
            draw_points(plot_ui, mp.iter().map(|p| [p.x(), p.y()]).collect(), style)
        }
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                draw_geometry(plot_ui, g, style);
            }
        }
        _ => {}
    }
}

fn draw_ring(plot_ui: &mut PlotUi, ring: &LineString<f64>, style: &FeatureStyle) {
    let points: PlotPoints = ring.coords().map(|c| [c.x, c.y]).collect();
    let stroke = Stroke::new(style.weight, to_color32(style.stroke, style.opacity));
    let mut polygon = Polygon::new(points).stroke(stroke);
    polygon = match style.fill {
        Some(fill) => polygon.fill_color(to_color32(fill, style.fill_opacity)),
        None => polygon.fill_color(eframe::egui::Color32::TRANSPARENT),
    };
    plot_ui.polygon(polygon);
}

fn draw_line(plot_ui: &mut PlotUi, line: &LineString<f64>, style: &FeatureStyle) {
    let points: PlotPoints = line.coords().map(|c| [c.x, c.y]).collect();
    plot_ui.line(
        Line::new(points)
            .color(to_color32(style.stroke, style.opacity))
            .width(style.weight.max(0.5)),
    );
}

fn draw_points(plot_ui: &mut PlotUi, points: Vec<[f64; 2]>, style: &FeatureStyle) {
    let fill = style.fill.unwrap_or(style.stroke);
    plot_ui.points(
        Points::new(points)
            .color(to_color32(fill, style.opacity))
            .radius(3.0 + style.weight),
    );
}

// ---------------------------------------------------------------------------
// Hit testing
// ---------------------------------------------------------------------------

fn hit(geometry: &Geometry<f64>, p: Point<f64>, tolerance: f64) -> bool {
    match geometry {
        Geometry::Polygon(poly) => poly.contains(&p),
        Geometry::MultiPolygon(mp) => mp.contains(&p),
        Geometry::LineString(ls) => ls.euclidean_distance(&p) <= tolerance,
        Geometry::MultiLineString(mls) => mls.iter().any(|ls| ls.euclidean_distance(&p) <= tolerance),
        Geometry::Point(q) => q.euclidean_distance(&p) <= tolerance,
        Geometry::MultiPoint(mp) => mp.iter().any(|q| q.euclidean_distance(&p) <= tolerance),
        Geometry::GeometryCollection(gc) => gc.iter().any(|g| hit(g, p, tolerance)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::AttributeValue;
    use geo::{line_string, polygon};

    #[test]
    fn polygons_hit_inside_lines_hit_within_tolerance() {
        let zone: Geometry<f64> = polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0),
        ]
        .into();
        assert!(hit(&zone, Point::new(0.5, 0.5), 0.01));
        assert!(!hit(&zone, Point::new(1.5, 0.5), 0.01));

        let link: Geometry<f64> = line_string![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0)].into();
        assert!(hit(&link, Point::new(5.0, 0.005), 0.01));
        assert!(!hit(&link, Point::new(5.0, 0.5), 0.01));
    }

    #[test]
    fn tooltip_lists_fields_in_requested_order() {
        let feature = Feature::new(
            Point::new(0.0, 0.0).into(),
            [
                ("AWDT_2023".to_string(), AttributeValue::Integer(41250)),
                ("CNT2LOADDIF".to_string(), AttributeValue::Integer(-31)),
            ]
            .into_iter()
            .collect(),
        );
        let fields = tooltip_fields(
            &feature,
            &["CNT2LOADDIF".to_string(), "AWDT_2023".to_string()],
        );
        assert_eq!(
            fields,
            vec![
                ("CNT2LOADDIF".to_string(), "-31".to_string()),
                ("AWDT_2023".to_string(), "41250".to_string()),
            ]
        );
    }

    #[test]
    fn view_frame_follows_the_layer_crs() {
        let view = ViewConfig::default();
        let geographic = view_frame(&view, Crs::Wgs84);
        assert_eq!(geographic.x_label, "Longitude");
        let (min, max) = geographic.bounds.unwrap();
        assert!(min[0] < -76.68 && -76.68 < max[0]);
        assert!(min[1] < 39.23 && 39.23 < max[1]);
        assert!(geographic.aspect > 1.0);

        // The default centre lies around 1.40M ft east, 0.57M ft north.
        let feet = view_frame(&view, Crs::MarylandFeet);
        assert_eq!(feet.x_label, "Easting");
        assert_eq!(feet.aspect, 1.0);
        let (min, max) = feet.bounds.unwrap();
        assert!(min[0] < 1_400_000.0 && 1_400_000.0 < max[0], "{feet:?}");
        assert!(min[1] < 570_000.0 && 570_000.0 < max[1], "{feet:?}");

        let mercator = view_frame(&view, Crs::WebMercator);
        let (min, max) = mercator.bounds.unwrap();
        assert!(min[0] < -8_535_000.0 && -8_535_000.0 < max[0], "{mercator:?}");

        let polar = ViewConfig {
            center: [88.0, 0.0],
            zoom: 11,
        };
        assert_eq!(view_frame(&polar, Crs::WebMercator).bounds, None);
    }
}
