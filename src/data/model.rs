use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use geo::Geometry;

use super::project::Crs;

// ---------------------------------------------------------------------------
// AttributeValue – a single cell in an attribute table
// ---------------------------------------------------------------------------

/// A dynamically-typed attribute value as found in GeoJSON properties.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::String(s) => write!(f, "{s}"),
            AttributeValue::Integer(i) => write!(f, "{i}"),
            AttributeValue::Float(v) => write!(f, "{v}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
            AttributeValue::Null => write!(f, "<null>"),
        }
    }
}

impl AttributeValue {
    /// Try to interpret the value as an `f64` for comparisons and colour ramps.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Float(v) => Some(*v),
            AttributeValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn from_json(val: &serde_json::Value) -> Self {
        use serde_json::Value as JsonValue;
        match val {
            JsonValue::String(s) => AttributeValue::String(s.clone()),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttributeValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    AttributeValue::Float(f)
                } else {
                    AttributeValue::String(n.to_string())
                }
            }
            JsonValue::Bool(b) => AttributeValue::Bool(*b),
            JsonValue::Null => AttributeValue::Null,
            other => AttributeValue::String(other.to_string()),
        }
    }

    /// Non-finite floats have no JSON representation and are written as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as JsonValue;
        match self {
            AttributeValue::String(s) => JsonValue::String(s.clone()),
            AttributeValue::Integer(i) => JsonValue::from(*i),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            AttributeValue::Bool(b) => JsonValue::Bool(*b),
            AttributeValue::Null => JsonValue::Null,
        }
    }
}

// ---------------------------------------------------------------------------
// Feature – one geometry plus its attributes
// ---------------------------------------------------------------------------

/// A single geometric record.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    /// Attribute name → value.
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>, attributes: BTreeMap<String, AttributeValue>) -> Self {
        Self {
            geometry,
            attributes,
        }
    }

    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }
}

// ---------------------------------------------------------------------------
// Dataset – features sharing a schema and a coordinate reference
// ---------------------------------------------------------------------------

/// An ordered collection of features in one CRS.
///
/// The schema is carried explicitly rather than re-derived from the
/// features, so an empty subset still knows which attributes it exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub crs: Crs,
    /// Sorted attribute names.
    pub schema: Vec<String>,
    pub features: Vec<Feature>,
}

impl Dataset {
    /// Build a dataset whose schema is the union of its features' attributes.
    pub fn from_features(name: impl Into<String>, crs: Crs, features: Vec<Feature>) -> Self {
        let schema: BTreeSet<String> = features
            .iter()
            .flat_map(|f| f.attributes.keys().cloned())
            .collect();
        Dataset {
            name: name.into(),
            crs,
            schema: schema.into_iter().collect(),
            features,
        }
    }

    /// Same schema and CRS as `self`, different name and features.
    pub fn derive(&self, name: impl Into<String>, features: Vec<Feature>) -> Self {
        Dataset {
            name: name.into(),
            crs: self.crs,
            schema: self.schema.clone(),
            features,
        }
    }

    pub fn has_attribute(&self, attribute: &str) -> bool {
        self.schema.iter().any(|a| a == attribute)
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::point;

    fn feature(pairs: &[(&str, AttributeValue)]) -> Feature {
        Feature::new(
            Geometry::Point(point!(x: 0.0, y: 0.0)),
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn schema_is_union_of_feature_attributes() {
        let ds = Dataset::from_features(
            "taz",
            Crs::Wgs84,
            vec![
                feature(&[("TAZ", AttributeValue::Integer(1))]),
                feature(&[("NAME", AttributeValue::String("Canton".into()))]),
            ],
        );
        assert_eq!(ds.schema, vec!["NAME".to_string(), "TAZ".to_string()]);
        assert!(ds.has_attribute("TAZ"));
        assert!(!ds.has_attribute("TAZ_Area"));
    }

    #[test]
    fn derived_empty_dataset_keeps_schema() {
        let ds = Dataset::from_features(
            "taz",
            Crs::Wgs84,
            vec![feature(&[("TAZ", AttributeValue::Integer(1))])],
        );
        let empty = ds.derive("none", Vec::new());
        assert!(empty.is_empty());
        assert!(empty.has_attribute("TAZ"));
    }

    #[test]
    fn json_conversion_keeps_integers_and_floats_apart() {
        let int = AttributeValue::from_json(&serde_json::json!(3));
        let float = AttributeValue::from_json(&serde_json::json!(3.5));
        assert_eq!(int, AttributeValue::Integer(3));
        assert_eq!(float, AttributeValue::Float(3.5));
        assert_eq!(AttributeValue::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn floats_display_their_raw_value() {
        assert_eq!(AttributeValue::Float(12.5).to_string(), "12.5");
        assert_eq!(AttributeValue::Float(-23.75).to_string(), "-23.75");
        assert_eq!(AttributeValue::Float(0.1).to_string(), "0.1");
        assert_eq!(AttributeValue::Integer(41250).to_string(), "41250");
    }
}
