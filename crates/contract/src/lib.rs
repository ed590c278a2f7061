//! Consumer contract suite for the Product API.
//!
//! This crate lets consumer tests declare the exact requests they will send
//! and the responses they must tolerate, replays those declarations from a
//! local mock provider, and records the verified interactions as a Pact v2
//! contract file for provider-side verification.
//!
//! The main entry point is [`ContractSuite`]:
//!
//! ```ignore
//! use product_contract::{ContractConfig, ContractSuite, Interaction, RequestSpec, ResponseSpec, like};
//!
//! let mut suite = ContractSuite::start(ContractConfig::from_env()?).await?;
//! suite.add_interaction(
//!     Interaction::new("a request to get a product")
//!         .given("a product with ID 10 exists")
//!         .with_request(RequestSpec::get("/product/10"))
//!         .will_respond_with(ResponseSpec::new(200).with_body(like(serde_json::json!({"id": "10"})))),
//! )?;
//! // exercise the client against suite.base_url()
//! suite.verify()?;
//! suite.finalize().await?;
//! ```

pub mod config;
mod errors;
pub mod interaction;
pub mod matchers;
pub mod pact_file;
pub mod server;
mod suite;

pub use config::{ContractConfig, PactWriteMode, resolve_bind_address};
pub use errors::ContractError;
pub use interaction::{GeneratedResponse, Interaction, InteractionSummary, RecordedRequest, RequestSpec, ResponseSpec};
pub use matchers::{CompareOptions, Matcher, Mismatch, MismatchKind, each_like, each_like_min, exact, like, regex};
pub use pact_file::{PactFile, Pacticipant};
pub use server::{CandidateMismatch, MockProvider, UnmatchedRequest};
pub use suite::{ContractSuite, VerificationFailure, VerificationReport};
