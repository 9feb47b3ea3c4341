use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};
use std::fmt;
use std::str::FromStr;

use geo::{Coord, MapCoords};

use super::model::{Dataset, Feature};
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Coordinate reference systems
// ---------------------------------------------------------------------------

/// The coordinate reference systems the normalizer can read and write.
///
/// NAD83 is treated as coincident with WGS84; the datum shift is well below
/// the precision a zone map needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Crs {
    /// EPSG:4326 – longitude/latitude in degrees (x = lon, y = lat).
    Wgs84,
    /// EPSG:3857 – spherical Web Mercator, metres.
    WebMercator,
    /// EPSG:26985 – NAD83 / Maryland, Lambert Conformal Conic, metres.
    MarylandMetres,
    /// EPSG:2248 – NAD83 / Maryland, Lambert Conformal Conic, US survey feet.
    MarylandFeet,
}

impl Crs {
    pub fn epsg(self) -> u32 {
        match self {
            Crs::Wgs84 => 4326,
            Crs::WebMercator => 3857,
            Crs::MarylandMetres => 26985,
            Crs::MarylandFeet => 2248,
        }
    }

    /// Lon/lat degrees rather than projected units.
    pub fn is_geographic(self) -> bool {
        matches!(self, Crs::Wgs84)
    }

    /// OGC URN as written in a GeoJSON `crs` member.
    pub fn urn(self) -> String {
        format!("urn:ogc:def:crs:EPSG::{}", self.epsg())
    }

    fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(Crs::Wgs84),
            3857 | 900913 => Some(Crs::WebMercator),
            26985 => Some(Crs::MarylandMetres),
            2248 => Some(Crs::MarylandFeet),
            _ => None,
        }
    }

    /// Convert a coordinate in this CRS to WGS84 lon/lat degrees.
    fn to_geographic(self, c: Coord<f64>) -> std::result::Result<Coord<f64>, String> {
        check_finite(c)?;
        let geo = match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => {
                let lon = (c.x / EARTH_RADIUS).to_degrees();
                let lat = (2.0 * (c.y / EARTH_RADIUS).exp().atan() - FRAC_PI_2).to_degrees();
                Coord { x: lon, y: lat }
            }
            Crs::MarylandMetres => LambertConic::maryland(1.0).inverse(c),
            Crs::MarylandFeet => LambertConic::maryland(US_SURVEY_FOOT).inverse(c),
        };
        check_geographic(geo)?;
        Ok(geo)
    }

    /// Convert WGS84 lon/lat degrees into this CRS.
    fn from_geographic(self, c: Coord<f64>) -> std::result::Result<Coord<f64>, String> {
        let out = match self {
            Crs::Wgs84 => c,
            Crs::WebMercator => {
                if c.y.abs() > WEB_MERCATOR_MAX_LAT {
                    return Err(format!(
                        "latitude {} is outside the Web Mercator domain",
                        c.y
                    ));
                }
                let x = EARTH_RADIUS * c.x.to_radians();
                let y = EARTH_RADIUS * (FRAC_PI_4 + c.y.to_radians() / 2.0).tan().ln();
                Coord { x, y }
            }
            Crs::MarylandMetres => LambertConic::maryland(1.0).forward(c),
            Crs::MarylandFeet => LambertConic::maryland(US_SURVEY_FOOT).forward(c),
        };
        check_finite(out)?;
        Ok(out)
    }

    /// Transform a single coordinate from `self` into `target`.
    pub fn transform(self, target: Crs, c: Coord<f64>) -> std::result::Result<Coord<f64>, String> {
        if self == target {
            check_finite(c)?;
            return Ok(c);
        }
        target.from_geographic(self.to_geographic(c)?)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

impl FromStr for Crs {
    type Err = String;

    /// Accepts `EPSG:4326`, `epsg:4326`, `4326`, `urn:ogc:def:crs:EPSG::4326`
    /// and the CRS84 spellings.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        let upper = s.to_ascii_uppercase();
        if upper.ends_with("CRS84") {
            return Ok(Crs::Wgs84);
        }
        let code = upper
            .rsplit(':')
            .next()
            .and_then(|tail| tail.parse::<u32>().ok())
            .ok_or_else(|| format!("unrecognised CRS identifier '{s}'"))?;
        Crs::from_epsg(code).ok_or_else(|| format!("unsupported CRS EPSG:{code}"))
    }
}

impl serde::Serialize for Crs {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Crs {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Projection maths
// ---------------------------------------------------------------------------

const EARTH_RADIUS: f64 = 6_378_137.0;
const WEB_MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;
const US_SURVEY_FOOT: f64 = 1200.0 / 3937.0;
const GRS80_A: f64 = 6_378_137.0;
const GRS80_INV_F: f64 = 298.257_222_101;

fn check_finite(c: Coord<f64>) -> std::result::Result<(), String> {
    if c.x.is_finite() && c.y.is_finite() {
        Ok(())
    } else {
        Err(format!("non-finite coordinate ({}, {})", c.x, c.y))
    }
}

fn check_geographic(c: Coord<f64>) -> std::result::Result<(), String> {
    check_finite(c)?;
    if c.y.abs() > 90.0 || c.x.abs() > 540.0 {
        return Err(format!("coordinate ({}, {}) is not a valid lon/lat", c.x, c.y));
    }
    Ok(())
}

/// Lambert Conformal Conic with two standard parallels on GRS80.
struct LambertConic {
    e: f64,
    n: f64,
    big_f: f64,
    rho0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
    /// Metres per projected unit.
    unit: f64,
}

impl LambertConic {
    /// NAD83 / Maryland zone parameters, expressed in the given unit.
    fn maryland(unit: f64) -> Self {
        Self::new(
            38.0 + 18.0 / 60.0,
            39.0 + 27.0 / 60.0,
            37.0 + 40.0 / 60.0,
            -77.0,
            400_000.0,
            0.0,
            unit,
        )
    }

    fn new(lat1: f64, lat2: f64, lat0: f64, lon0: f64, fe: f64, fn_: f64, unit: f64) -> Self {
        let f = 1.0 / GRS80_INV_F;
        let e = (f * (2.0 - f)).sqrt();
        let (p1, p2, p0) = (lat1.to_radians(), lat2.to_radians(), lat0.to_radians());
        let m1 = Self::m(e, p1);
        let m2 = Self::m(e, p2);
        let t1 = Self::t(e, p1);
        let t2 = Self::t(e, p2);
        let n = (m1.ln() - m2.ln()) / (t1.ln() - t2.ln());
        let big_f = m1 / (n * t1.powf(n));
        let rho0 = GRS80_A * big_f * Self::t(e, p0).powf(n);
        LambertConic {
            e,
            n,
            big_f,
            rho0,
            lon0: lon0.to_radians(),
            false_easting: fe,
            false_northing: fn_,
            unit,
        }
    }

    fn m(e: f64, phi: f64) -> f64 {
        phi.cos() / (1.0 - (e * phi.sin()).powi(2)).sqrt()
    }

    fn t(e: f64, phi: f64) -> f64 {
        let es = e * phi.sin();
        (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
    }

    fn forward(&self, c: Coord<f64>) -> Coord<f64> {
        let (lon, lat) = (c.x.to_radians(), c.y.to_radians());
        let rho = GRS80_A * self.big_f * Self::t(self.e, lat).powf(self.n);
        let theta = self.n * (lon - self.lon0);
        let x = self.false_easting + rho * theta.sin();
        let y = self.false_northing + self.rho0 - rho * theta.cos();
        Coord {
            x: x / self.unit,
            y: y / self.unit,
        }
    }

    fn inverse(&self, c: Coord<f64>) -> Coord<f64> {
        let dx = c.x * self.unit - self.false_easting;
        let dy = self.rho0 - (c.y * self.unit - self.false_northing);
        let sign = self.n.signum();
        let rho = sign * (dx * dx + dy * dy).sqrt();
        let t = (rho / (GRS80_A * self.big_f)).powf(1.0 / self.n);
        let theta = (sign * dx).atan2(sign * dy);
        let lon = theta / self.n + self.lon0;

        let mut lat = FRAC_PI_2 - 2.0 * t.atan();
        for _ in 0..15 {
            let es = self.e * lat.sin();
            let next =
                FRAC_PI_2 - 2.0 * (t * ((1.0 - es) / (1.0 + es)).powf(self.e / 2.0)).atan();
            if (next - lat).abs() < 1e-12 {
                lat = next;
                break;
            }
            lat = next;
        }
        Coord {
            x: lon.to_degrees(),
            y: lat.to_degrees(),
        }
    }
}

// ---------------------------------------------------------------------------
// Dataset normalizer
// ---------------------------------------------------------------------------

/// Reproject every feature of `dataset` into `target`.  Attributes are
/// carried over untouched.
pub fn normalize(dataset: Dataset, target: Crs) -> Result<Dataset> {
    let source = dataset.crs;
    if source == target {
        log::debug!("'{}' already in {target}", dataset.name);
        return Ok(dataset);
    }

    let mut features = Vec::with_capacity(dataset.features.len());
    for (i, feature) in dataset.features.iter().enumerate() {
        let geometry = feature
            .geometry
            .try_map_coords(move |c| source.transform(target, c))
            .map_err(|reason| PipelineError::Reprojection {
                dataset: dataset.name.clone(),
                feature: i,
                target: target.to_string(),
                reason,
            })?;
        features.push(Feature::new(geometry, feature.attributes.clone()));
    }

    log::info!(
        "Reprojected '{}' ({} features) from {source} to {target}",
        dataset.name,
        features.len()
    );
    Ok(Dataset {
        name: dataset.name,
        crs: target,
        schema: dataset.schema,
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::AttributeValue;
    use geo::{line_string, Geometry};
    use std::collections::BTreeMap;

    const BALTIMORE: Coord<f64> = Coord {
        x: -76.6122,
        y: 39.2904,
    };

    #[test]
    fn parses_common_crs_spellings() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("urn:ogc:def:crs:EPSG::2248".parse::<Crs>().unwrap(), Crs::MarylandFeet);
        assert_eq!("urn:ogc:def:crs:OGC:1.3:CRS84".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("3857".parse::<Crs>().unwrap(), Crs::WebMercator);
        assert!("EPSG:9999".parse::<Crs>().is_err());
        assert!("wgs".parse::<Crs>().is_err());
    }

    #[test]
    fn maryland_origin_maps_to_false_easting() {
        let origin = Coord {
            x: -77.0,
            y: 37.0 + 40.0 / 60.0,
        };
        let p = Crs::Wgs84.transform(Crs::MarylandMetres, origin).unwrap();
        assert!((p.x - 400_000.0).abs() < 1e-6, "x = {}", p.x);
        assert!(p.y.abs() < 1e-6, "y = {}", p.y);
    }

    #[test]
    fn maryland_metres_matches_reference_point() {
        let p = Crs::Wgs84.transform(Crs::MarylandMetres, BALTIMORE).unwrap();
        assert!((p.x - 433_455.061).abs() < 0.01, "x = {}", p.x);
        assert!((p.y - 180_315.742).abs() < 0.01, "y = {}", p.y);

        let ft = Crs::Wgs84.transform(Crs::MarylandFeet, BALTIMORE).unwrap();
        assert!((ft.x - 1_422_093.814).abs() < 0.03, "x = {}", ft.x);
        assert!((ft.y - 591_585.896).abs() < 0.03, "y = {}", ft.y);
    }

    #[test]
    fn maryland_feet_round_trip_is_tight() {
        let projected = Crs::Wgs84.transform(Crs::MarylandFeet, BALTIMORE).unwrap();
        // Downtown Baltimore sits roughly 1.43M ft east, 0.59M ft north.
        assert!((1_380_000.0..1_480_000.0).contains(&projected.x), "{projected:?}");
        assert!((550_000.0..640_000.0).contains(&projected.y), "{projected:?}");
        let back = Crs::MarylandFeet.transform(Crs::Wgs84, projected).unwrap();
        assert!((back.x - BALTIMORE.x).abs() < 1e-9);
        assert!((back.y - BALTIMORE.y).abs() < 1e-9);
    }

    #[test]
    fn web_mercator_edge_and_domain() {
        let edge = Crs::Wgs84
            .transform(Crs::WebMercator, Coord { x: 180.0, y: 0.0 })
            .unwrap();
        assert!((edge.x - 20_037_508.342_789_244).abs() < 1e-6);
        assert!(Crs::Wgs84
            .transform(Crs::WebMercator, Coord { x: 0.0, y: 89.0 })
            .is_err());
    }

    #[test]
    fn normalize_changes_geometry_only() {
        let mut attrs = BTreeMap::new();
        attrs.insert("AWDT_2023".to_string(), AttributeValue::Integer(100));
        let line: Geometry<f64> = line_string![
            (x: 1_420_000.0, y: 590_000.0),
            (x: 1_421_000.0, y: 591_000.0),
        ]
        .into();
        let ds = Dataset::from_features(
            "highway",
            Crs::MarylandFeet,
            vec![Feature::new(line, attrs.clone())],
        );
        let out = normalize(ds, Crs::Wgs84).unwrap();
        assert_eq!(out.crs, Crs::Wgs84);
        assert_eq!(out.features[0].attributes, attrs);
        let Geometry::LineString(ls) = &out.features[0].geometry else {
            panic!("geometry kind changed");
        };
        assert!(ls.0.iter().all(|c| (-78.0..-76.0).contains(&c.x) && (38.5..40.0).contains(&c.y)));
    }

    #[test]
    fn degenerate_coordinates_fail_with_reprojection_error() {
        let bad: Geometry<f64> = geo::Point::new(f64::NAN, 0.0).into();
        let ds = Dataset::from_features(
            "taz",
            Crs::WebMercator,
            vec![Feature::new(bad, BTreeMap::new())],
        );
        let err = normalize(ds, Crs::Wgs84).unwrap_err();
        match err {
            PipelineError::Reprojection { dataset, feature, .. } => {
                assert_eq!(dataset, "taz");
                assert_eq!(feature, 0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
