//! # residents-api
//!
//! Buildings, rooms and residents behind one generic CRUD API.
//!
//! Every endpoint names the record kind it acts on with a `type` value, which
//! is resolved once into an [`EntityType`](dispatch::EntityType) and
//! dispatched to code written generically over
//! [`Resource`](repository::Resource).
//!
//! ## Layers
//!
//! - **Routes** ([`routes`]): HTTP handlers and wiring
//! - **Operations** ([`operations`]): transactional create/update/delete/list
//! - **Repository** ([`repository`]): SQLite store via SQLX
//! - **Cache** ([`service`], [`backend`]): whole-response cache cleared on
//!   every write
//! - **Auth** ([`auth`], [`throttle`]): token authentication and per-user
//!   rate limits
//!
//! ## Quick Start
//!
//! ```ignore
//! use actix_web::{web, App, HttpServer};
//! use residents_api::{routes, AppState, Settings, Store};
//!
//! let settings = Settings::from_env()?;
//! let store = Store::connect(&settings.database_url, settings.db_max_connections).await?;
//! store.migrate().await?;
//! let state = web::Data::new(AppState::new(store, settings));
//!
//! HttpServer::new(move || App::new().app_data(state.clone()).configure(routes::configure))
//!     .bind("127.0.0.1:8080")?
//!     .run()
//!     .await?;
//! ```

#[macro_use]
extern crate log;

pub mod audit;
pub mod auth;
pub mod backend;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod key;
pub mod models;
pub mod observability;
pub mod operations;
pub mod pagination;
pub mod payload;
pub mod repository;
pub mod routes;
pub mod serialization;
pub mod service;
pub mod state;
pub mod throttle;
pub mod validators;

// Re-exports for convenience
pub use config::Settings;
pub use dispatch::EntityType;
pub use error::{ApiError, Error, Result};
pub use repository::Store;
pub use service::ResponseCache;
pub use state::AppState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
