//! Writes a small synthetic zone / connector / highway network in Maryland
//! State Plane feet, matching the file names the built-in config expects.
//!
//! Usage: `generate_sample [OUTPUT_DIR]`

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde_json::{json, Value};

/// Lower-left corner of the zone grid (EPSG:2248, US survey feet).
const ORIGIN: (f64, f64) = (1_395_000.0, 570_000.0);
const ZONE_SIZE: f64 = 6_000.0;
const COLS: usize = 8;
const ROWS: usize = 6;

const COMMUNITIES: [&str; 4] = ["Hampden", "Roland Park", "Towson", "Catonsville"];
const AREA_TYPES: [i64; 4] = [1, 2, 3, 5];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }

    fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        &items[(self.next_u64() % items.len() as u64) as usize]
    }
}

fn collection(name: &str, features: Vec<Value>, attributes: &[&str]) -> Value {
    json!({
        "type": "FeatureCollection",
        "name": name,
        "crs": {
            "type": "name",
            "properties": { "name": "urn:ogc:def:crs:EPSG::2248" }
        },
        "attributes": attributes,
        "features": features,
    })
}

fn feature(geometry: Value, properties: Value) -> Value {
    json!({ "type": "Feature", "geometry": geometry, "properties": properties })
}

fn zone_corner(col: usize, row: usize) -> (f64, f64) {
    (
        ORIGIN.0 + col as f64 * ZONE_SIZE,
        ORIGIN.1 + row as f64 * ZONE_SIZE,
    )
}

fn zones(rng: &mut SimpleRng) -> Value {
    let mut features = Vec::new();
    for row in 0..ROWS {
        for col in 0..COLS {
            let taz = (row * COLS + col + 1) as i64;
            let (x0, y0) = zone_corner(col, row);
            let (x1, y1) = (x0 + ZONE_SIZE, y0 + ZONE_SIZE);
            // Every seventh zone has no recorded area.
            let area = if taz % 7 == 0 {
                0.0
            } else {
                (rng.range(0.2, 3.5) * 100.0).round() / 100.0
            };
            features.push(feature(
                json!({
                    "type": "Polygon",
                    "coordinates": [[[x0, y0], [x1, y0], [x1, y1], [x0, y1], [x0, y0]]]
                }),
                json!({
                    "TAZ": taz,
                    "NAME": format!("Zone {taz}"),
                    "Community": rng.pick(&COMMUNITIES),
                    "TAZ_Area": area,
                }),
            ));
        }
    }
    collection(
        "TPBTAZ3722_TPBMod",
        features,
        &["TAZ", "NAME", "Community", "TAZ_Area"],
    )
}

fn connectors(rng: &mut SimpleRng) -> Value {
    let mut features = Vec::new();
    for row in 0..ROWS {
        for col in 0..COLS {
            let taz = (row * COLS + col + 1) as i64;
            let (x0, y0) = zone_corner(col, row);
            let centroid = [x0 + ZONE_SIZE / 2.0, y0 + ZONE_SIZE / 2.0];
            // Connect to the nearest highway node at the zone's lower-left corner.
            features.push(feature(
                json!({ "type": "LineString", "coordinates": [centroid, [x0, y0]] }),
                json!({
                    "TAZ": taz,
                    "ATYPE": rng.pick(&AREA_TYPES),
                    "MDLANE": 1,
                    "MDLIMIT": 25,
                    "TIMEPEN": (rng.range(0.5, 3.0) * 10.0).round() / 10.0,
                }),
            ));
        }
    }
    collection(
        "Zonehwy_Line_Centroid_Connectors",
        features,
        &["TAZ", "ATYPE", "MDLANE", "MDLIMIT", "TIMEPEN"],
    )
}

fn highway_link(rng: &mut SimpleRng, a: (f64, f64), b: (f64, f64), id: i64) -> Value {
    // About a third of the links have no count station.
    let awdt = if rng.next_f64() < 0.33 {
        0.0
    } else {
        rng.range(2_000.0, 90_000.0).round()
    };
    let volume = rng.range(2_000.0, 90_000.0).round();
    let diff = if awdt > 0.0 {
        ((volume - awdt) / 1_000.0).round()
    } else {
        0.0
    };
    let pct = if awdt > 0.0 {
        ((volume - awdt) / awdt * 100.0 * 10.0).round() / 10.0
    } else {
        0.0
    };
    feature(
        json!({ "type": "LineString", "coordinates": [[a.0, a.1], [b.0, b.1]] }),
        json!({
            "LINKID": id,
            "AWDT_2023": awdt,
            "CNT2LOADDIF": diff,
            "CNT2LOADPCT": pct,
            "ABSPCTDIFF": (pct.abs()).round() / 100.0,
        }),
    )
}

fn highways(rng: &mut SimpleRng) -> Value {
    let mut features = Vec::new();
    let mut id = 1;
    for row in 0..=ROWS {
        for col in 0..=COLS {
            let here = zone_corner(col, row);
            if col < COLS {
                features.push(highway_link(rng, here, zone_corner(col + 1, row), id));
                id += 1;
            }
            if row < ROWS {
                features.push(highway_link(rng, here, zone_corner(col, row + 1), id));
                id += 1;
            }
        }
    }
    collection(
        "I4_Assign_OutputwAWDT",
        features,
        &["LINKID", "AWDT_2023", "CNT2LOADDIF", "CNT2LOADPCT", "ABSPCTDIFF"],
    )
}

fn write(dir: &Path, file: &str, doc: &Value) -> anyhow::Result<()> {
    let path = dir.join(file);
    let text = serde_json::to_string_pretty(doc)?;
    std::fs::write(&path, text).with_context(|| format!("writing {}", path.display()))?;
    let count = doc["features"].as_array().map_or(0, |f| f.len());
    println!("Wrote {count} features to {}", path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let dir = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut rng = SimpleRng::new(42);
    write(&dir, "TPBTAZ3722_TPBMod.geojson", &zones(&mut rng))?;
    write(
        &dir,
        "Zonehwy_Line_Centroid_Connectors.geojson",
        &connectors(&mut rng),
    )?;
    write(&dir, "I4_Assign_OutputwAWDT.geojson", &highways(&mut rng))?;
    Ok(())
}
