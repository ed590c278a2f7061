//! Pact v2 contract file.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::ContractError;
use crate::config::PactWriteMode;
use crate::interaction::Interaction;

pub const PACT_SPECIFICATION_VERSION: &str = "2.0.0";

/// Named participant in a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pacticipant {
    pub name: String,
}

/// Contract document handed to provider verification.
///
/// Interactions are kept in their serialized form so a file written by
/// another tool can be merged without loss.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PactFile {
    pub consumer: Pacticipant,
    pub provider: Pacticipant,
    #[serde(default)]
    pub interactions: Vec<Value>,
    #[serde(default = "default_metadata")]
    pub metadata: Value,
}

fn default_metadata() -> Value {
    json!({
        "pactSpecification": {"version": PACT_SPECIFICATION_VERSION},
        "client": {"name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION")},
    })
}

impl PactFile {
    pub fn new(consumer: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            consumer: Pacticipant { name: consumer.into() },
            provider: Pacticipant { name: provider.into() },
            interactions: Vec::new(),
            metadata: default_metadata(),
        }
    }

    /// `{consumer}-{provider}.json`
    pub fn file_name(&self) -> String {
        format!("{}-{}.json", self.consumer.name, self.provider.name)
    }

    /// Record `interaction`. Returns `false` when an identical entry was
    /// already present; a different entry with the same description and
    /// provider state is a conflict.
    pub fn add_interaction(&mut self, interaction: &Interaction) -> Result<bool, ContractError> {
        self.add_pact_interaction(interaction.to_pact())
    }

    fn add_pact_interaction(&mut self, interaction: Value) -> Result<bool, ContractError> {
        let (description, provider_state) = identity(&interaction);
        match self.interactions.iter().find(|existing| identity(existing) == (description, provider_state)) {
            Some(existing) if *existing == interaction => Ok(false),
            Some(_) => Err(ContractError::conflicting_interaction(description, provider_state)),
            None => {
                self.interactions.push(interaction);
                Ok(true)
            }
        }
    }

    pub fn read(path: &Path) -> Result<Self, ContractError> {
        let content = fs::read_to_string(path).map_err(|error| ContractError::pact_io(path, error))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the file into `dir`, creating the directory when needed.
    pub fn write(&self, dir: &Path, mode: PactWriteMode) -> Result<PathBuf, ContractError> {
        fs::create_dir_all(dir).map_err(|error| ContractError::pact_io(dir, error))?;
        let path = dir.join(self.file_name());

        let document = match mode {
            PactWriteMode::Merge if path.exists() => {
                let mut existing = Self::read(&path)?;
                for interaction in &self.interactions {
                    existing.add_pact_interaction(interaction.clone())?;
                }
                existing.metadata = self.metadata.clone();
                existing
            }
            _ => self.clone(),
        };

        let content = serde_json::to_string_pretty(&document)?;
        fs::write(&path, content).map_err(|error| ContractError::pact_io(&path, error))?;
        info!(path = %path.display(), interactions = document.interactions.len(), "wrote pact file");
        Ok(path)
    }
}

fn identity(interaction: &Value) -> (&str, &str) {
    (str_field(interaction, "description"), str_field(interaction, "providerState"))
}

fn str_field<'a>(value: &'a Value, name: &str) -> &'a str {
    value.get(name).and_then(Value::as_str).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interaction::{RequestSpec, ResponseSpec};
    use crate::matchers::{each_like, like};

    fn all_products() -> Interaction {
        Interaction::new("a request to get all products")
            .given("products exist")
            .with_request(RequestSpec::get("/products").with_header("Authorization", like("Bearer token")))
            .will_respond_with(ResponseSpec::new(200).with_body(each_like(json!({"id": "10", "type": "CREDIT_CARD", "name": "28 Degrees"}))))
    }

    fn missing_product() -> Interaction {
        Interaction::new("a request to get a product")
            .given("a product with ID 11 does not exist")
            .with_request(RequestSpec::get("/product/11"))
            .will_respond_with(ResponseSpec::new(404))
    }

    #[test]
    fn identical_interactions_are_deduplicated() {
        let mut pact = PactFile::new("consumer", "provider");
        assert!(pact.add_interaction(&all_products()).unwrap());
        assert!(!pact.add_interaction(&all_products()).unwrap());
        assert_eq!(pact.interactions.len(), 1);
    }

    #[test]
    fn differing_interaction_with_same_identity_conflicts() {
        let mut pact = PactFile::new("consumer", "provider");
        pact.add_interaction(&all_products()).unwrap();
        let changed = all_products().will_respond_with(ResponseSpec::new(500));
        assert!(matches!(pact.add_interaction(&changed), Err(ContractError::ConflictingInteraction { .. })));
    }

    #[test]
    fn write_creates_directory_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("pacts");
        let mut pact = PactFile::new("pactflow-example-consumer", "pactflow-example-provider");
        pact.add_interaction(&all_products()).unwrap();

        let path = pact.write(&target, PactWriteMode::Overwrite).unwrap();
        assert_eq!(path, target.join("pactflow-example-consumer-pactflow-example-provider.json"));

        let written = PactFile::read(&path).unwrap();
        assert_eq!(written, pact);
        assert_eq!(written.metadata["pactSpecification"]["version"], "2.0.0");
        assert_eq!(written.interactions[0]["response"]["matchingRules"]["$.body"], json!({"min": 1, "match": "type"}));
    }

    #[test]
    fn overwrite_replaces_and_merge_accumulates() {
        let dir = tempfile::tempdir().unwrap();

        let mut first = PactFile::new("c", "p");
        first.add_interaction(&all_products()).unwrap();
        first.write(dir.path(), PactWriteMode::Overwrite).unwrap();

        let mut second = PactFile::new("c", "p");
        second.add_interaction(&missing_product()).unwrap();
        let path = second.write(dir.path(), PactWriteMode::Merge).unwrap();
        assert_eq!(PactFile::read(&path).unwrap().interactions.len(), 2);

        second.write(dir.path(), PactWriteMode::Overwrite).unwrap();
        assert_eq!(PactFile::read(&path).unwrap().interactions.len(), 1);
    }

    #[test]
    fn merge_rejects_conflicts_with_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = PactFile::new("c", "p");
        first.add_interaction(&missing_product()).unwrap();
        first.write(dir.path(), PactWriteMode::Overwrite).unwrap();

        let mut second = PactFile::new("c", "p");
        second.add_interaction(&missing_product().will_respond_with(ResponseSpec::new(410))).unwrap();
        assert!(matches!(
            second.write(dir.path(), PactWriteMode::Merge),
            Err(ContractError::ConflictingInteraction { .. })
        ));
    }
}
