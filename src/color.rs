use std::fmt;
use std::str::FromStr;

use palette::{Hsl, IntoColor, Srgb};
use serde::Serialize;

use crate::data::model::Dataset;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Color – an sRGB triple with CSS-style parsing
// ---------------------------------------------------------------------------

/// An opaque 8-bit sRGB colour.  Parses CSS names (`"red"`) and hex
/// (`"#faded1"`); displays and serialises as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Color { r, g, b }
    }

    const fn hex(v: u32) -> Self {
        Color::rgb((v >> 16) as u8, (v >> 8) as u8, v as u8)
    }

    pub fn components(self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }

    fn to_srgb(self) -> Srgb<f32> {
        Srgb::new(self.r, self.g, self.b).into_format()
    }
}

impl From<Srgb<u8>> for Color {
    fn from(c: Srgb<u8>) -> Self {
        Color::rgb(c.red, c.green, c.blue)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (r, g, b) = self.components();
        write!(f, "#{r:02x}{g:02x}{b:02x}")
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(named) = palette::named::from_str(&s.to_ascii_lowercase()) {
            return Ok(Color::from(named));
        }
        if s.starts_with('#') {
            return s
                .parse::<Srgb<u8>>()
                .map(Color::from)
                .map_err(|e| format!("invalid hex colour '{s}': {e}"));
        }
        Err(format!("unknown colour '{s}'"))
    }
}

impl Serialize for Color {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Color {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Distinct colours for layers that don't name one
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color> {
    if n == 0 {
        return Vec::new();
    }
    (0..n)
        .map(|i| {
            let hue = (i as f32 / n as f32) * 360.0;
            let hsl = Hsl::new(hue, 0.75, 0.55);
            let rgb: Srgb = hsl.into_color();
            Color::from(rgb.into_format::<u8>())
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Named sequential palettes (ColorBrewer, 9 classes)
// ---------------------------------------------------------------------------

pub const PALETTES: &[(&str, [u32; 9])] = &[
    (
        "YlGn_09",
        [
            0xffffe5, 0xf7fcb9, 0xd9f0a3, 0xaddd8e, 0x78c679, 0x41ab5d, 0x238443, 0x006837,
            0x004529,
        ],
    ),
    (
        "YlOrRd_09",
        [
            0xffffcc, 0xffeda0, 0xfed976, 0xfeb24c, 0xfd8d3c, 0xfc4e2a, 0xe31a1c, 0xbd0026,
            0x800026,
        ],
    ),
    (
        "Blues_09",
        [
            0xf7fbff, 0xdeebf7, 0xc6dbef, 0x9ecae1, 0x6baed6, 0x4292c6, 0x2171b5, 0x08519c,
            0x08306b,
        ],
    ),
    (
        "RdYlGn_09",
        [
            0xd73027, 0xf46d43, 0xfdae61, 0xfee08b, 0xffffbf, 0xd9ef8b, 0xa6d96a, 0x66bd63,
            0x1a9850,
        ],
    ),
];

/// Stops of a named palette, lowest value first.
pub fn palette_stops(name: &str) -> Option<Vec<Color>> {
    PALETTES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, hexes)| hexes.iter().map(|&h| Color::hex(h)).collect())
}

// ---------------------------------------------------------------------------
// ColorScale – numeric attribute → colour ramp
// ---------------------------------------------------------------------------

/// The input value that bypasses interpolation.
pub const SENTINEL: f64 = 0.0;

/// Used when a scale is not given an explicit fallback.
pub const DEFAULT_FALLBACK: Color = Color::rgb(0xfa, 0xde, 0xd1);

/// A linear colour ramp over `[min, max]` with a sentinel override.
///
/// The domain is fixed when the scale is built; it does not follow later
/// changes to the source dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColorScale {
    pub caption: String,
    /// Attribute the domain was computed from; empty for explicit bounds.
    attribute: String,
    palette: String,
    stops: Vec<Color>,
    min: f64,
    max: f64,
    fallback: Color,
}

impl ColorScale {
    /// Build a scale from explicit bounds.  `min` and `max` are swapped if
    /// given in the wrong order.
    pub fn new(palette: &str, min: f64, max: f64, fallback: Color) -> Result<Self> {
        let stops = palette_stops(palette)
            .ok_or_else(|| PipelineError::Config(format!("unknown palette '{palette}'")))?;
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Ok(ColorScale {
            caption: String::new(),
            attribute: String::new(),
            palette: palette.to_string(),
            stops,
            min,
            max,
            fallback,
        })
    }

    /// Range over the observed values of `attribute` in `dataset`.
    ///
    /// Features where the attribute is absent, null, non-numeric or NaN are
    /// ignored; if none remain the scale cannot be built.
    pub fn from_dataset(
        dataset: &Dataset,
        attribute: &str,
        palette: &str,
        fallback: Color,
    ) -> Result<Self> {
        let (min, max) = dataset
            .features
            .iter()
            .filter_map(|f| f.get(attribute)?.as_f64())
            .filter(|v| !v.is_nan())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
            .ok_or_else(|| PipelineError::InsufficientData {
                dataset: dataset.name.clone(),
                attribute: attribute.to_string(),
            })?;

        let mut scale = Self::new(palette, min, max, fallback)?;
        scale.caption = attribute.to_string();
        scale.attribute = attribute.to_string();
        log::info!(
            "Colour scale on '{}'.'{attribute}': [{min}, {max}] using {palette}",
            dataset.name
        );
        Ok(scale)
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn palette(&self) -> &str {
        &self.palette
    }

    pub fn fallback(&self) -> Color {
        self.fallback
    }

    /// Colour for `value`.  The sentinel (and NaN) map to the fallback colour;
    /// everything else is clamped into the domain and interpolated.
    pub fn evaluate(&self, value: f64) -> Color {
        if value == SENTINEL || value.is_nan() {
            return self.fallback;
        }
        let last = self.stops.len() - 1;
        let t = if self.max > self.min {
            (value.clamp(self.min, self.max) - self.min) / (self.max - self.min)
        } else {
            0.0
        };
        let pos = t * last as f64;
        let i = pos.floor() as usize;
        if i >= last {
            return self.stops[last];
        }
        let frac = pos - i as f64;
        if frac == 0.0 {
            return self.stops[i];
        }
        // Straight per-channel lerp in gamma-encoded sRGB.
        let lo = self.stops[i].to_srgb();
        let hi = self.stops[i + 1].to_srgb();
        let f = frac as f32;
        let mixed = Srgb::new(
            lo.red + (hi.red - lo.red) * f,
            lo.green + (hi.green - lo.green) * f,
            lo.blue + (hi.blue - lo.blue) * f,
        );
        Color::from(mixed.into_format::<u8>())
    }

    /// `n` evenly spaced `(value, colour)` samples from `min` to `max`, for legends.
    pub fn legend_stops(&self, n: usize) -> Vec<(f64, Color)> {
        match n {
            0 => Vec::new(),
            1 => vec![(self.max, self.stops[self.stops.len() - 1])],
            _ => (0..n)
                .map(|k| {
                    let v = self.min + (self.max - self.min) * k as f64 / (n - 1) as f64;
                    (v, self.ramp(v))
                })
                .collect(),
        }
    }

    /// Interpolated colour ignoring the sentinel override.
    fn ramp(&self, value: f64) -> Color {
        if value == SENTINEL {
            // Nudge off the sentinel so legends show the ramp, not the fallback.
            return self.evaluate(value + f64::EPSILON);
        }
        self.evaluate(value)
    }
}
