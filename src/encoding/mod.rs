//! Label-to-index tables for the fare model's categorical inputs.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::{EncodingError, ViewError},
    record::{AIRLINE, DESTINATION, SOURCE, TOTAL_STOPS},
    view::ColumnarView,
};

/// Dimensions fed to the model, in input order.
pub const MODEL_DIMENSIONS: [&str; 4] = [AIRLINE, SOURCE, DESTINATION, TOTAL_STOPS];

/// Ordered known categories per dimension; a category's index is its position.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryMapping {
    pub dimensions: BTreeMap<String, Vec<String>>,
}

impl CategoryMapping {
    /// Parses a mapping document. YAML is a superset of JSON, so both work.
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|error| format!("failed to read '{}': {error}", path.display()))?;
        Self::from_yaml_str(&content)
            .map_err(|error| format!("failed to parse '{}': {error}", path.display()))
    }

    /// Sorted distinct values of each model dimension, the order a label
    /// encoder fitted on the same data assigns.
    pub fn from_view(view: &ColumnarView) -> Result<Self, ViewError> {
        let mut dimensions = BTreeMap::new();
        for dimension in MODEL_DIMENSIONS {
            dimensions.insert(dimension.to_string(), view.unique(dimension)?);
        }
        Ok(Self { dimensions })
    }
}

pub fn encode_with_mapping(
    mapping: &CategoryMapping,
    dimension: &str,
    value: &str,
) -> Result<usize, EncodingError> {
    let categories =
        mapping
            .dimensions
            .get(dimension)
            .ok_or_else(|| EncodingError::UnknownDimension {
                dimension: dimension.to_string(),
            })?;

    categories
        .iter()
        .position(|category| category == value)
        .ok_or_else(|| EncodingError::UnknownCategory {
            dimension: dimension.to_string(),
            value: value.to_string(),
        })
}

/// One row of raw model inputs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PredictionInput {
    pub airline: String,
    pub source: String,
    pub destination: String,
    pub total_stops: String,
}

impl PredictionInput {
    /// Encodes the inputs as `[airline, source, destination, total_stops]` indices.
    pub fn encode(
        &self,
        mapping: &CategoryMapping,
    ) -> Result<[usize; 4], EncodingError> {
        Ok([
            encode_with_mapping(mapping, AIRLINE, &self.airline)?,
            encode_with_mapping(mapping, SOURCE, &self.source)?,
            encode_with_mapping(mapping, DESTINATION, &self.destination)?,
            encode_with_mapping(mapping, TOTAL_STOPS, &self.total_stops)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::{error::EncodingError, record::FlightRecord, table::WorkingTable, view::build_view};

    use super::{CategoryMapping, PredictionInput, encode_with_mapping};

    fn mapping(entries: &[(&str, &[&str])]) -> CategoryMapping {
        CategoryMapping {
            dimensions: entries
                .iter()
                .map(|(dimension, values)| {
                    (
                        dimension.to_string(),
                        values.iter().map(|value| value.to_string()).collect(),
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn encodes_known_categories_by_position() {
        let mapping = mapping(&[("Airline", &["A", "B"])]);
        assert_eq!(encode_with_mapping(&mapping, "Airline", "A"), Ok(0));
        assert_eq!(encode_with_mapping(&mapping, "Airline", "B"), Ok(1));
    }

    #[test]
    fn unknown_category_is_an_error_not_zero() {
        let mapping = mapping(&[("Airline", &["A", "B"])]);
        assert_eq!(
            encode_with_mapping(&mapping, "Airline", "C"),
            Err(EncodingError::UnknownCategory {
                dimension: "Airline".to_string(),
                value: "C".to_string(),
            })
        );
        assert_eq!(
            encode_with_mapping(&mapping, "Source", "Delhi"),
            Err(EncodingError::UnknownDimension {
                dimension: "Source".to_string(),
            })
        );
    }

    #[test]
    fn parses_yaml_and_json_mappings() {
        let yaml = CategoryMapping::from_yaml_str("Airline:\n  - Air India\n  - IndiGo\n")
            .expect("yaml must parse");
        let json = CategoryMapping::from_yaml_str(r#"{"Airline": ["Air India", "IndiGo"]}"#)
            .expect("json must parse");

        assert_eq!(yaml, json);
        assert_eq!(encode_with_mapping(&yaml, "Airline", "IndiGo"), Ok(1));
    }

    #[test]
    fn encodes_prediction_input_in_model_order() {
        let mapping = mapping(&[
            ("Airline", &["Air India", "IndiGo"]),
            ("Source", &["Banglore", "Delhi"]),
            ("Destination", &["Cochin", "New Delhi"]),
            ("Total_Stops", &["1 stop", "non-stop"]),
        ]);
        let input = PredictionInput {
            airline: "IndiGo".to_string(),
            source: "Delhi".to_string(),
            destination: "Cochin".to_string(),
            total_stops: "non-stop".to_string(),
        };
        assert_eq!(input.encode(&mapping), Ok([1, 1, 0, 1]));

        let unknown = PredictionInput {
            total_stops: "4 stops".to_string(),
            ..input
        };
        assert!(matches!(
            unknown.encode(&mapping),
            Err(EncodingError::UnknownCategory { ref dimension, .. }) if dimension == "Total_Stops"
        ));
    }

    #[test]
    fn derives_sorted_tables_from_a_view() {
        let records = ["SpiceJet", "Air India", "SpiceJet"]
            .iter()
            .map(|airline| FlightRecord {
                airline: airline.to_string(),
                source: "Delhi".to_string(),
                destination: "Cochin".to_string(),
                total_stops: "non-stop".to_string(),
                duration: "2h".to_string(),
                price: 5000.0,
            })
            .collect();
        let mapping = CategoryMapping::from_view(&build_view(WorkingTable::from_records(records)))
            .expect("mapping must derive");

        assert_eq!(
            mapping.dimensions.get("Airline"),
            Some(&vec!["Air India".to_string(), "SpiceJet".to_string()])
        );
        assert_eq!(mapping.dimensions.len(), 4);
    }
}
