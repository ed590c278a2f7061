//! Product API client.
//!
//! A small async client for the Product resource. It focuses on:
//!
//! - Validating the configured base URL before any request is built
//! - Attaching the `Authorization: Bearer <token>` header to every request
//! - Decoding successful bodies into [`product_types::Product`] values
//! - Surfacing every non-2xx response as [`ApiError::RequestFailed`]
//!
//! # Example
//!
//! ```ignore
//! use product_api::{AuthToken, ProductClient};
//!
//! async fn show() -> Result<(), product_api::ApiError> {
//!     let client = ProductClient::new("http://localhost:8080", AuthToken::timestamp())?;
//!     let product = client.get_product("10").await?;
//!     println!("{:?}", product.name);
//!     Ok(())
//! }
//! ```

mod client;
mod config;
mod error;

pub use client::ProductClient;
pub use config::{AuthToken, BASE_URL_ENV, ClientConfig, DEFAULT_BASE_URL, TOKEN_ENV};
pub use error::ApiError;
pub use product_types::{Product, ProductUpdate};
