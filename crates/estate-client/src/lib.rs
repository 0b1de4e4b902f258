//! # estate-client
//!
//! REST client for the estate catalog backend.
//!
//! This crate provides:
//! - [`RestClient`]: sign-in, paginated/filtered listing, CRUD, file import,
//!   flat analytics, and the admin-approval workflow
//! - [`EntityFetcher`]: a [`CollectionFetcher`] bound to one entity kind
//! - [`ClientConfig`]: environment-driven connection settings
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use estate_client::{EntityFetcher, RestClient};
//! use estate_core::{CollectionFetcher, Flat, Query};
//!
//! #[tokio::main]
//! async fn main() {
//!     let client = Arc::new(RestClient::from_env().unwrap());
//!     let flats = EntityFetcher::<Flat>::new(client);
//!     let page = flats.fetch(&Query::default()).await.unwrap();
//!     println!("{} flats on page 0 of {}", page.items.len(), page.total_pages);
//! }
//! ```

pub mod config;
pub mod fetcher;
pub mod rest;

// Re-export core types
pub use estate_core::*;

pub use config::ClientConfig;
pub use fetcher::EntityFetcher;
pub use rest::{RestClient, UploadReceipt};
