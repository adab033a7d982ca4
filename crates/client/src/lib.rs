//! Luxus client session layer.
//!
//! Custody and renewal of the bearer credential, a request gateway that
//! renews it at most once however many calls fail concurrently, and
//! local-first cart and favorites kept in step with the server at login,
//! logout and resume.
//!
//! Most applications only need [`Session`].

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cache;
pub mod catalog;
pub mod collections;
pub mod config;
pub mod error;
pub mod gateway;
pub mod session;
pub mod storage;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use auth::{Credential, CredentialStore, RefreshCoordinator, RefreshError, UserStore};
pub use catalog::{CatalogClient, Category, ProductPage};
pub use collections::{Cart, Favorites};
pub use config::{ClientConfig, ConfigError};
pub use error::ApiError;
pub use gateway::{ApiRequest, ApiResponse, RequestGateway, RetryPolicy};
pub use session::Session;
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use sync::{CollectionSync, ReconcileReport, SyncReconciler};
