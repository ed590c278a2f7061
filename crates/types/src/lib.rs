//! Shared wire and domain types for the Product resource.
//!
//! Both the API client and the contract suite decode provider payloads into
//! these types, so they are kept permissive: unknown keys survive decoding and
//! nothing here rejects a payload for missing fields.

mod product;

pub use product::{Product, ProductUpdate};
