//! Contract suite lifecycle.
//!
//! A [`ContractSuite`] owns the mock provider for one run:
//!
//! 1. [`ContractSuite::start`] binds the provider
//! 2. [`ContractSuite::add_interaction`] registers the scenario's expectations
//! 3. the client under test talks to [`ContractSuite::base_url`]
//! 4. [`ContractSuite::verify`] checks the scenario and clears it
//! 5. [`ContractSuite::finalize`] writes the pact file and stops the provider
//!
//! Dropping the suite without finalizing still stops the provider.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::ContractError;
use crate::config::ContractConfig;
use crate::interaction::{Interaction, InteractionSummary};
use crate::pact_file::PactFile;
use crate::server::{MockProvider, ScenarioRecord, UnmatchedRequest};

/// One reason a scenario failed verification.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum VerificationFailure {
    /// A request arrived that no registered interaction accepted.
    UnmatchedRequest(UnmatchedRequest),
    /// A registered interaction was never exercised.
    UnfulfilledInteraction { interaction: InteractionSummary },
    /// A registered interaction was exercised more than once.
    RepeatedInteraction { interaction: InteractionSummary, hits: usize },
}

impl fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmatchedRequest(unmatched) => fmt::Display::fmt(unmatched, f),
            Self::UnfulfilledInteraction { interaction } => write!(f, "unfulfilled interaction {interaction}"),
            Self::RepeatedInteraction { interaction, hits } => {
                write!(f, "interaction {interaction} was exercised {hits} times; expected exactly once")
            }
        }
    }
}

/// Outcome of verifying one scenario.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VerificationReport {
    pub failures: Vec<VerificationFailure>,
}

impl VerificationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn unmatched_requests(&self) -> impl Iterator<Item = &UnmatchedRequest> {
        self.failures.iter().filter_map(|failure| match failure {
            VerificationFailure::UnmatchedRequest(unmatched) => Some(unmatched),
            _ => None,
        })
    }

    pub fn unfulfilled_interactions(&self) -> impl Iterator<Item = &InteractionSummary> {
        self.failures.iter().filter_map(|failure| match failure {
            VerificationFailure::UnfulfilledInteraction { interaction } => Some(interaction),
            _ => None,
        })
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, failure) in self.failures.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "  - {failure}")?;
        }
        Ok(())
    }
}

/// Split a scenario record into satisfied interactions and failures.
fn evaluate(record: ScenarioRecord) -> (Vec<Interaction>, VerificationReport) {
    let mut report = VerificationReport::default();
    report
        .failures
        .extend(record.unmatched.into_iter().map(VerificationFailure::UnmatchedRequest));

    let mut satisfied = Vec::new();
    for active in record.interactions {
        match active.hits {
            0 => report.failures.push(VerificationFailure::UnfulfilledInteraction {
                interaction: active.interaction.summary(),
            }),
            1 => satisfied.push(active.interaction),
            hits => report.failures.push(VerificationFailure::RepeatedInteraction {
                interaction: active.interaction.summary(),
                hits,
            }),
        }
    }
    (satisfied, report)
}

/// Handle for one contract run: the mock provider plus the contract being recorded.
#[derive(Debug)]
pub struct ContractSuite {
    config: ContractConfig,
    provider: MockProvider,
    pact: PactFile,
}

impl ContractSuite {
    /// Start the mock provider. It is listening when this returns.
    pub async fn start(config: ContractConfig) -> Result<Self, ContractError> {
        let provider = MockProvider::start(config.bind_address).await?;
        let pact = PactFile::new(config.consumer.clone(), config.provider.clone());
        info!(
            consumer = %config.consumer,
            provider = %config.provider,
            base_url = %provider.base_url(),
            "contract suite started"
        );
        Ok(Self { config, provider, pact })
    }

    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    /// Address of the mock provider for the client under test.
    pub fn base_url(&self) -> String {
        self.provider.base_url()
    }

    /// Contract recorded from the scenarios verified so far.
    pub fn pact(&self) -> &PactFile {
        &self.pact
    }

    /// Register an interaction for the current scenario.
    pub fn add_interaction(&mut self, interaction: Interaction) -> Result<(), ContractError> {
        interaction.validate()?;
        self.provider.register(interaction)
    }

    /// Check that every registered interaction was exercised exactly once and
    /// no request went unmatched, then clear the scenario.
    ///
    /// Only interactions from a passing scenario are added to the contract.
    pub fn verify(&mut self) -> Result<(), ContractError> {
        let record = self.provider.take_record();
        self.settle(record)
    }

    fn settle(&mut self, record: ScenarioRecord) -> Result<(), ContractError> {
        let (satisfied, report) = evaluate(record);
        if !report.is_success() {
            warn!(failures = report.failures.len(), "scenario failed verification");
            return Err(ContractError::Verification(report));
        }
        for interaction in &satisfied {
            self.pact.add_interaction(interaction)?;
        }
        info!(interactions = satisfied.len(), "scenario verified");
        Ok(())
    }

    /// Verify anything still registered, write the pact file and stop the
    /// provider. The provider is stopped even when verification or writing fails.
    ///
    /// Returns the written path, or `None` when pact writing is disabled.
    pub async fn finalize(mut self) -> Result<Option<PathBuf>, ContractError> {
        let pending = self.provider.take_record();
        let written = self.finish(pending);
        let stopped = self.provider.stop().await;
        let path = written?;
        stopped?;
        info!("contract suite finalized");
        Ok(path)
    }

    fn finish(&mut self, pending: ScenarioRecord) -> Result<Option<PathBuf>, ContractError> {
        if !pending.is_empty() {
            self.settle(pending)?;
        }
        if !self.config.write_pact {
            return Ok(None);
        }
        self.pact.write(&self.config.pact_dir, self.config.write_mode).map(Some)
    }
}
