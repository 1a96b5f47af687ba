//! Normalized view of one material JSON document.
//!
//! Source databases disagree on field names and shapes, so the document is
//! read as a `serde_json::Value` and folded into a fixed set of known fields
//! plus an open bag of extra scalar metadata.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::isotherm_csv::KNOWN_COLUMNS;

/// Fields tried, in order, for the material identifier.
pub const ID_FIELDS: [&str; 4] = ["mofid", "mofkey", "id", "name"];

const SURFACE_AREA_M2G_FIELD: &str = "surface_area_m2g";
const SURFACE_AREA_M2CM3_FIELD: &str = "surface_area_m2cm3";
const ISOTHERMS_FIELD: &str = "isotherms";

/// Top-level fields never copied into the extra metadata bag.
const EXCLUDED_EXTRA_FIELDS: [&str; 2] = ["cif", ISOTHERMS_FIELD];

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("invalid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("no identifier field present (tried {})", ID_FIELDS.join(", "))]
    MissingIdentifier,
}

/// A scalar metadata value as found in the source document.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(String),
    Text(String),
    Bool(bool),
}

impl Scalar {
    /// `None` for null, arrays and objects.
    pub fn from_json(value: &Value) -> Option<Scalar> {
        match value {
            Value::Number(n) => Some(Scalar::Number(n.to_string())),
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            _ => None,
        }
    }

    pub fn to_cell(&self) -> String {
        match self {
            Scalar::Number(n) => n.clone(),
            Scalar::Text(s) => s.clone(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Text of a numeric value, verbatim. JSON numbers keep their own
/// rendering; strings are accepted when they parse as a finite number.
pub fn numeric_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => {
            let trimmed = s.trim();
            match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Some(trimmed.to_string()),
                _ => None,
            }
        }
        _ => None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if s.trim().is_empty() => None,
        other => Scalar::from_json(other).map(|s| s.to_cell()),
    }
}

fn identifier_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsothermPoint {
    pub pressure: String,
    pub loading: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IsothermBlock {
    pub id: String,
    pub adsorbate: Option<String>,
    pub temperature: Option<String>,
    pub pressure_units: Option<String>,
    pub loading_units: Option<String>,
    pub points: Vec<IsothermPoint>,
    /// Points present in the source but lacking a numeric pressure or loading.
    pub dropped_points: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaterialRecord {
    pub id: String,
    /// Which of [`ID_FIELDS`] supplied the identifier.
    pub id_field: &'static str,
    pub surface_area_m2g: Option<String>,
    pub surface_area_m2cm3: Option<String>,
    pub extra: BTreeMap<String, Option<Scalar>>,
    pub isotherms: Vec<IsothermBlock>,
}

#[derive(Deserialize, Debug)]
struct RawIsotherm {
    id: Option<Value>,
    #[serde(rename = "DOI")]
    doi: Option<Value>,
    temperature: Option<Value>,
    #[serde(rename = "pressureUnits")]
    pressure_units: Option<Value>,
    #[serde(rename = "adsorptionUnits")]
    adsorption_units: Option<Value>,
    adsorbates: Option<Value>,
    adsorbate: Option<Value>,
    isotherm_data: Option<Value>,
    points: Option<Value>,
}

impl MaterialRecord {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, RecordError> {
        let value: Value = serde_json::from_slice(bytes)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, RecordError> {
        let Value::Object(mut doc) = value else {
            return Err(RecordError::NotAnObject);
        };

        let (id_field, id) = ID_FIELDS
            .iter()
            .find_map(|field| doc.get(*field).and_then(identifier_text).map(|id| (*field, id)))
            .ok_or(RecordError::MissingIdentifier)?;

        let surface_area_m2g = doc.get(SURFACE_AREA_M2G_FIELD).and_then(numeric_text);
        let surface_area_m2cm3 = doc.get(SURFACE_AREA_M2CM3_FIELD).and_then(numeric_text);
        let isotherms = doc
            .remove(ISOTHERMS_FIELD)
            .map(parse_isotherms)
            .unwrap_or_default();
        let extra = collect_extra(&doc, id_field);

        Ok(MaterialRecord {
            id,
            id_field,
            surface_area_m2g,
            surface_area_m2cm3,
            extra,
            isotherms,
        })
    }

    pub fn point_count(&self) -> usize {
        self.isotherms.iter().map(|iso| iso.points.len()).sum()
    }

    pub fn dropped_point_count(&self) -> usize {
        self.isotherms.iter().map(|iso| iso.dropped_points).sum()
    }
}

fn collect_extra(doc: &Map<String, Value>, id_field: &str) -> BTreeMap<String, Option<Scalar>> {
    doc.iter()
        .filter(|(key, _)| {
            key.as_str() != id_field
                && key.as_str() != SURFACE_AREA_M2G_FIELD
                && key.as_str() != SURFACE_AREA_M2CM3_FIELD
                && !EXCLUDED_EXTRA_FIELDS.contains(&key.as_str())
                && !KNOWN_COLUMNS.contains(&key.as_str())
        })
        .filter_map(|(key, value)| match value {
            Value::Null => Some((key.clone(), None)),
            Value::Array(_) | Value::Object(_) => None,
            scalar => Some((key.clone(), Scalar::from_json(scalar))),
        })
        .collect()
}

fn parse_isotherms(value: Value) -> Vec<IsothermBlock> {
    let blocks = match value {
        Value::Array(items) => items,
        obj @ Value::Object(_) => vec![obj],
        _ => return Vec::new(),
    };

    blocks
        .into_iter()
        .enumerate()
        .filter(|(_, block)| block.is_object())
        .filter_map(|(idx, block)| serde_json::from_value::<RawIsotherm>(block).ok().map(|raw| (idx, raw)))
        .map(|(idx, raw)| normalize_isotherm(idx, raw))
        .collect()
}

fn normalize_isotherm(idx: usize, raw: RawIsotherm) -> IsothermBlock {
    let id = raw
        .id
        .as_ref()
        .and_then(scalar_text)
        .or_else(|| raw.doi.as_ref().and_then(scalar_text))
        .unwrap_or_else(|| idx.to_string());

    let adsorbate = raw
        .adsorbates
        .as_ref()
        .and_then(adsorbate_names)
        .or_else(|| raw.adsorbate.as_ref().and_then(adsorbate_names));

    let (points, dropped_points) = match (raw.isotherm_data, raw.points) {
        (Some(Value::Array(data)), _) => collect_points(&data),
        (_, Some(Value::Array(pairs))) => collect_points(&pairs),
        _ => (Vec::new(), 0),
    };

    IsothermBlock {
        id,
        adsorbate,
        temperature: raw.temperature.as_ref().and_then(scalar_text),
        pressure_units: raw.pressure_units.as_ref().and_then(scalar_text),
        loading_units: raw.adsorption_units.as_ref().and_then(scalar_text),
        points,
        dropped_points,
    }
}

/// `[{"name": "CO2"}, {"name": "N2"}]` -> "CO2;N2". Also accepts a plain
/// string or a single object.
fn adsorbate_names(value: &Value) -> Option<String> {
    let name_of = |v: &Value| match v {
        Value::Object(obj) => obj
            .get("name")
            .or_else(|| obj.get("formula"))
            .and_then(scalar_text),
        other => scalar_text(other),
    };

    let names: Vec<String> = match value {
        Value::Array(items) => items.iter().filter_map(name_of).collect(),
        other => name_of(other).into_iter().collect(),
    };
    if names.is_empty() {
        None
    } else {
        Some(names.join(";"))
    }
}

fn collect_points(items: &[Value]) -> (Vec<IsothermPoint>, usize) {
    let mut points = Vec::with_capacity(items.len());
    let mut dropped = 0;
    for item in items {
        let pair = match item {
            Value::Object(obj) => {
                let loading = obj.get("total_adsorption").or_else(|| obj.get("loading"));
                (obj.get("pressure").and_then(numeric_text), loading.and_then(numeric_text))
            }
            Value::Array(pair) if pair.len() >= 2 => (numeric_text(&pair[0]), numeric_text(&pair[1])),
            _ => (None, None),
        };
        match pair {
            (Some(pressure), Some(loading)) => points.push(IsothermPoint { pressure, loading }),
            _ => dropped += 1,
        }
    }
    (points, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identifier_priority() {
        let record = MaterialRecord::from_value(json!({"id": 7, "name": "hMOF-7", "mofkey": "K7"})).unwrap();
        assert_eq!(record.id, "K7");
        assert_eq!(record.id_field, "mofkey");

        let record = MaterialRecord::from_value(json!({"id": 7, "name": "hMOF-7"})).unwrap();
        assert_eq!(record.id, "7");
        assert_eq!(record.id_field, "id");
    }

    #[test]
    fn test_missing_identifier_is_an_error() {
        let err = MaterialRecord::from_value(json!({"surface_area_m2g": 10})).unwrap_err();
        assert!(matches!(err, RecordError::MissingIdentifier));

        let err = MaterialRecord::from_value(json!({"id": "   ", "name": null})).unwrap_err();
        assert!(matches!(err, RecordError::MissingIdentifier));

        let err = MaterialRecord::from_value(json!({"id": true, "name": ["a"]})).unwrap_err();
        assert!(matches!(err, RecordError::MissingIdentifier));

        let record = MaterialRecord::from_value(json!({"mofid": false, "name": "UiO-66"})).unwrap();
        assert_eq!(record.id, "UiO-66");
        assert_eq!(record.id_field, "name");
    }

    #[test]
    fn test_malformed_and_non_object_documents() {
        let err = MaterialRecord::from_json_slice(b"{\"id\": ").unwrap_err();
        assert!(matches!(err, RecordError::Malformed(_)));

        let err = MaterialRecord::from_json_slice(b"[1, 2]").unwrap_err();
        assert!(matches!(err, RecordError::NotAnObject));
    }

    #[test]
    fn test_surface_area_missing_zero_and_non_numeric() {
        let zero = MaterialRecord::from_value(json!({"id": "a", "surface_area_m2g": 0})).unwrap();
        assert_eq!(zero.surface_area_m2g.as_deref(), Some("0"));

        let absent = MaterialRecord::from_value(json!({"id": "a"})).unwrap();
        assert_eq!(absent.surface_area_m2g, None);

        let text = MaterialRecord::from_value(json!({"id": "a", "surface_area_m2g": "unknown"})).unwrap();
        assert_eq!(text.surface_area_m2g, None);

        let numeric_text = MaterialRecord::from_value(json!({"id": "a", "surface_area_m2g": " 1500.5 "})).unwrap();
        assert_eq!(numeric_text.surface_area_m2g.as_deref(), Some("1500.5"));
    }

    #[test]
    fn test_single_isotherm_object_and_pairs() {
        let record = MaterialRecord::from_value(json!({
            "id": "MOF-2",
            "isotherms": {"points": [[0.1, 2.3], [0.5, 6.1]]}
        }))
        .unwrap();
        assert_eq!(record.isotherms.len(), 1);
        let iso = &record.isotherms[0];
        assert_eq!(iso.id, "0");
        assert_eq!(iso.points[0], IsothermPoint { pressure: "0.1".into(), loading: "2.3".into() });
        assert_eq!(iso.points[1], IsothermPoint { pressure: "0.5".into(), loading: "6.1".into() });
    }

    #[test]
    fn test_mofdb_style_isotherm_keeps_source_order_and_drops_incomplete_points() {
        let record = MaterialRecord::from_value(json!({
            "mofid": "Zn.MOF-5",
            "isotherms": [
                "not an object",
                {
                    "DOI": "10.1/abc",
                    "temperature": 298,
                    "pressureUnits": "bar",
                    "adsorptionUnits": "mol/kg",
                    "adsorbates": [{"name": "Carbon Dioxide"}, {"name": "Nitrogen"}],
                    "isotherm_data": [
                        {"pressure": 5, "total_adsorption": 3.2},
                        {"pressure": 1, "total_adsorption": 1.1},
                        {"pressure": 2},
                        {"pressure": "x", "total_adsorption": 1}
                    ]
                }
            ]
        }))
        .unwrap();

        assert_eq!(record.isotherms.len(), 1);
        let iso = &record.isotherms[0];
        assert_eq!(iso.id, "10.1/abc");
        assert_eq!(iso.adsorbate.as_deref(), Some("Carbon Dioxide;Nitrogen"));
        assert_eq!(iso.temperature.as_deref(), Some("298"));
        assert_eq!(iso.pressure_units.as_deref(), Some("bar"));
        assert_eq!(iso.loading_units.as_deref(), Some("mol/kg"));
        let pressures: Vec<_> = iso.points.iter().map(|p| p.pressure.as_str()).collect();
        assert_eq!(pressures, vec!["5", "1"]);
        assert_eq!(iso.dropped_points, 2);
        assert_eq!(record.point_count(), 2);
        assert_eq!(record.dropped_point_count(), 2);
    }

    #[test]
    fn test_extra_bag_keeps_scalars_only() {
        let record = MaterialRecord::from_value(json!({
            "id": 12,
            "name": "hMOF-12",
            "void_fraction": 0.61,
            "url": null,
            "cif": "data_block\n...",
            "elements": [{"symbol": "Zn"}],
            "database": "hMOF",
            "is_public": true,
            "surface_area_m2cm3": 900
        }))
        .unwrap();

        assert_eq!(record.id_field, "id");
        let keys: Vec<_> = record.extra.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["is_public", "name", "url", "void_fraction"]);
        assert_eq!(record.extra["void_fraction"], Some(Scalar::Number("0.61".into())));
        assert_eq!(record.extra["url"], None);
        assert_eq!(record.extra["is_public"], Some(Scalar::Bool(true)));
        assert_eq!(record.surface_area_m2cm3.as_deref(), Some("900"));
    }
}
