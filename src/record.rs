use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Field the document store adds to every record on its own.
pub const STORE_ID_FIELD: &str = "_id";

pub const AIRLINE: &str = "Airline";
pub const SOURCE: &str = "Source";
pub const DESTINATION: &str = "Destination";
pub const TOTAL_STOPS: &str = "Total_Stops";
pub const DURATION: &str = "Duration";
pub const PRICE: &str = "Price";

/// A document exactly as the store returned it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRecord {
    pub fields: BTreeMap<String, Value>,
}

impl RawRecord {
    /// Wraps a JSON object; any other JSON value is not a record.
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self {
                fields: map.into_iter().collect(),
            }),
            _ => None,
        }
    }

    pub fn get(
        &self,
        field: &str,
    ) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// One validated row of the flight-fare dataset.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FlightRecord {
    #[serde(rename = "Airline")]
    pub airline: String,
    #[serde(rename = "Source")]
    pub source: String,
    #[serde(rename = "Destination")]
    pub destination: String,
    #[serde(rename = "Total_Stops")]
    pub total_stops: String,
    #[serde(rename = "Duration")]
    pub duration: String,
    #[serde(rename = "Price")]
    pub price: f64,
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::RawRecord;

    #[test]
    fn from_json_accepts_objects_only() {
        let record = RawRecord::from_json(json!({"Airline": "IndiGo", "Price": 3897}))
            .expect("object must convert");
        assert_eq!(
            record.get("Airline"),
            Some(&Value::String("IndiGo".to_string()))
        );
        assert_eq!(record.get("Price"), Some(&Value::from(3897)));

        assert!(RawRecord::from_json(json!(["IndiGo"])).is_none());
        assert!(RawRecord::from_json(Value::Null).is_none());
    }
}
