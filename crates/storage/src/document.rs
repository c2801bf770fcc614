//! The persisted document and the types it aggregates.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Current wall-clock time as epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// A stored user holding a capability token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub key: String,
    pub created_at: i64,
}

impl User {
    pub fn new(name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            created_at: now_millis(),
        }
    }
}

/// Silhouette used to draw a car.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IconType {
    #[default]
    Suv,
    Sedan,
    Hatch,
    Truck,
    Sport,
}

/// A tracked vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Car {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon_type: IconType,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub text_color: String,
}

/// Shared configuration: cars, parking layout and display hints.
///
/// `grid_columns` and `custom_icons` are optional because a config update
/// replaces them wholesale; an update that omits them leaves them absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub cars: Vec<Car>,
    pub floors: Vec<String>,
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_columns: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_icons: Option<BTreeMap<String, serde_json::Value>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cars: Vec::new(),
            floors: vec!["1".into(), "2".into(), "3".into()],
            sections: vec!["A".into(), "B".into()],
            grid_columns: Some(2),
            custom_icons: Some(BTreeMap::new()),
        }
    }
}

impl Config {
    pub fn car(&self, id: &str) -> Option<&Car> {
        self.cars.iter().find(|c| c.id == id)
    }
}

/// Where a car was last parked, and by whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEntry {
    pub location: String,
    pub timestamp: i64,
    pub user: String,
}

/// Latest park entry per car id.
pub type StatusMap = BTreeMap<String, StatusEntry>;

/// The single persisted aggregate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub config: Config,
    #[serde(default)]
    pub status: StatusMap,
    #[serde(default)]
    pub users: Vec<User>,

    /// Store revision this copy was loaded at. Not part of the persisted form.
    #[serde(skip)]
    pub revision: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_document_is_seeded() {
        let doc = Document::default();
        assert!(doc.config.cars.is_empty());
        assert_eq!(doc.config.floors, ["1", "2", "3"]);
        assert_eq!(doc.config.sections, ["A", "B"]);
        assert_eq!(doc.config.grid_columns, Some(2));
        assert!(doc.status.is_empty());
        assert!(doc.users.is_empty());
    }

    #[test]
    fn wire_names_are_camel_case() {
        let car = Car {
            id: "c1".into(),
            name: "Civic".into(),
            icon_type: IconType::Hatch,
            color: "#ff0000".into(),
            text_color: "#ffffff".into(),
        };
        let json = serde_json::to_value(&car).unwrap();
        assert_eq!(json["iconType"], "hatch");
        assert_eq!(json["textColor"], "#ffffff");

        let user = serde_json::to_value(User::new("Dad", "k1")).unwrap();
        assert!(user["createdAt"].as_i64().unwrap() > 0);
    }

    #[test]
    fn car_icon_defaults_to_suv() {
        let car: Car = serde_json::from_str(r#"{"id":"c1","name":"Van"}"#).unwrap();
        assert_eq!(car.icon_type, IconType::Suv);
    }

    #[test]
    fn absent_optional_config_fields_stay_absent() {
        let config = Config {
            grid_columns: None,
            custom_icons: None,
            ..Config::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("gridColumns").is_none());
        assert!(json.get("customIcons").is_none());
    }

    #[test]
    fn legacy_document_without_users_parses() {
        let doc: Document = serde_json::from_str(
            r#"{"config":{"cars":[],"floors":["1"],"sections":["A"],"gridColumns":2},"status":{}}"#,
        )
        .unwrap();
        assert!(doc.users.is_empty());
        assert_eq!(doc.config.custom_icons, None);
    }
}
