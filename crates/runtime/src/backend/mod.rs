//! Parking API backend abstraction.
//!
//! Provides a trait for the remote document API so the client cache and sync
//! loop can run against the real HTTP server or a scripted stand-in.

mod http;

pub use http::HttpApi;

use crate::Result;
use serde::Serialize;
use std::future::Future;
use storage::{Config, StatusEntry, StatusMap, User};

/// A park report sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Park {
    pub car_id: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// Trait for parking API backends.
///
/// Every call presents `key` as the capability token.
pub trait ParkingApi: Send + Sync {
    fn get_config(&self, key: &str) -> impl Future<Output = Result<Config>> + Send;

    fn get_status(&self, key: &str) -> impl Future<Output = Result<StatusMap>> + Send;

    /// Replace the shared config, returning what the server stored.
    fn set_config(&self, key: &str, config: &Config) -> impl Future<Output = Result<Config>> + Send;

    /// Report a park, returning the stored entry.
    fn record_park(&self, key: &str, park: &Park) -> impl Future<Output = Result<StatusEntry>> + Send;

    fn list_users(&self, key: &str) -> impl Future<Output = Result<Vec<User>>> + Send;

    fn create_user(
        &self,
        key: &str,
        name: &str,
        user_key: &str,
    ) -> impl Future<Output = Result<User>> + Send;

    fn delete_user(&self, key: &str, user_key: &str) -> impl Future<Output = Result<()>> + Send;
}
