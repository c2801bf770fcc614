//! Document operations behind the HTTP surface.

use crate::{Error, Result};
use policy::{AccessRequest, AuthGate, Principal};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use storage::{Car, Config, Document, DocumentStore, StatusEntry, StatusMap, User, now_millis};
use tokio::sync::Mutex;
use tracing::{debug, info};

const MISSING_USER_FIELDS: &str = "Missing name or key";
const INVALID_CONFIG: &str = "Invalid config structure";
const MISSING_PARK_FIELDS: &str = "Missing carId or location";

/// Body of a user creation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub name: Option<String>,
    pub key: Option<String>,
}

/// Body of a config replacement request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigUpdate {
    pub cars: Option<Vec<Car>>,
    pub floors: Option<Vec<String>>,
    pub sections: Option<Vec<String>>,
    pub grid_columns: Option<u32>,
    pub custom_icons: Option<BTreeMap<String, serde_json::Value>>,
}

/// Body of a park request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParkRequest {
    pub car_id: Option<String>,
    pub location: Option<String>,
    pub timestamp: Option<i64>,
    pub user: Option<String>,
}

/// Read and mutation operations on the shared document.
///
/// Every mutation is a full load, modify, save cycle. Mutations are funnelled
/// through a single writer lock so two concurrent requests cannot both start
/// from the same prior document and drop each other's change.
pub struct Api {
    store: Arc<dyn DocumentStore>,
    gate: AuthGate,
    writer: Mutex<()>,
}

impl Api {
    pub fn new(store: Arc<dyn DocumentStore>, gate: AuthGate) -> Self {
        Self {
            store,
            gate,
            writer: Mutex::new(()),
        }
    }

    /// Resolve the principal for a presented key. Runs before any other logic.
    pub fn authorize(&self, key: Option<&str>, origin: &str) -> Result<Principal> {
        let doc = self.store.load()?;
        Ok(self.gate.authorize(&doc.users, &AccessRequest { key, origin })?)
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        Ok(self.store.load()?.users)
    }

    pub async fn create_user(&self, request: NewUser) -> Result<User> {
        let name = non_empty(request.name);
        let key = non_empty(request.key);
        let (Some(name), Some(key)) = (name, key) else {
            return Err(Error::Validation(MISSING_USER_FIELDS.into()));
        };

        let user = self
            .mutate(|doc| {
                if self.gate.is_root_token(&key) || doc.users.iter().any(|u| u.key == key) {
                    return Err(Error::Conflict("Key already in use".into()));
                }
                let user = User::new(name, key);
                doc.users.push(user.clone());
                Ok(user)
            })
            .await?;

        info!(name = %user.name, "created user");
        Ok(user)
    }

    /// Remove the user holding `key`. Returns whether a user was removed;
    /// removing an absent key is a successful no-op.
    pub async fn delete_user(&self, key: &str) -> Result<bool> {
        let removed = self
            .mutate(|doc| {
                let before = doc.users.len();
                doc.users.retain(|u| u.key != key);
                Ok(doc.users.len() < before)
            })
            .await?;

        if removed {
            info!(key, "deleted user");
        }
        Ok(removed)
    }

    pub fn get_config(&self) -> Result<Config> {
        Ok(self.store.load()?.config)
    }

    /// Replace the config.
    ///
    /// `gridColumns` and `customIcons` are overwritten with whatever the
    /// update carries, so omitting them clears them.
    pub async fn set_config(&self, update: ConfigUpdate) -> Result<Config> {
        let (Some(cars), Some(floors), Some(sections)) = (update.cars, update.floors, update.sections)
        else {
            return Err(Error::Validation(INVALID_CONFIG.into()));
        };

        let mut seen = HashSet::new();
        if let Some(dup) = cars.iter().find(|c| !seen.insert(c.id.as_str())) {
            return Err(Error::Validation(format!("Duplicate car id: {}", dup.id)));
        }

        let config = Config {
            cars,
            floors,
            sections,
            grid_columns: update.grid_columns,
            custom_icons: update.custom_icons,
        };

        self.mutate(|doc| {
            doc.config = config;
            Ok(doc.config.clone())
        })
        .await
    }

    pub fn get_status(&self) -> Result<StatusMap> {
        Ok(self.store.load()?.status)
    }

    /// Record where a car is parked, replacing any previous entry for it.
    pub async fn record_park(&self, principal: &Principal, request: ParkRequest) -> Result<StatusEntry> {
        let (Some(car_id), Some(location)) = (non_empty(request.car_id), non_empty(request.location))
        else {
            return Err(Error::Validation(MISSING_PARK_FIELDS.into()));
        };

        let entry = StatusEntry {
            location,
            timestamp: request.timestamp.filter(|t| *t != 0).unwrap_or_else(now_millis),
            user: non_empty(request.user).unwrap_or_else(|| principal.display_name().to_string()),
        };

        let car_name = self
            .mutate(|doc| {
                doc.status.insert(car_id.clone(), entry.clone());
                Ok(doc.config.car(&car_id).map_or_else(|| "Car".to_string(), |c| c.name.clone()))
            })
            .await?;

        info!(car = %car_name, location = %entry.location, user = %entry.user, "parked");
        Ok(entry)
    }

    async fn mutate<T>(&self, apply: impl FnOnce(&mut Document) -> Result<T>) -> Result<T> {
        let _writer = self.writer.lock().await;
        let mut doc = self.store.load()?;
        let before = doc.clone();
        let out = apply(&mut doc)?;
        if doc != before {
            self.store.save(&doc)?;
        } else {
            debug!("mutation left document unchanged; skipping save");
        }
        Ok(out)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
