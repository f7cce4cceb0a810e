//! Sandbox configuration as stored and as accepted by `create`.

use serde::{Deserialize, Serialize};

use quayside_core::{CounterpartConfiguration, PartyConfiguration};

fn default_max_parallel_scenarios() -> usize {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardConfiguration {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfiguration {
    #[serde(default = "default_max_parallel_scenarios")]
    pub max_parallel_scenarios: usize,
}

impl Default for OrchestratorConfiguration {
    fn default() -> Self {
        Self {
            max_parallel_scenarios: default_max_parallel_scenarios(),
        }
    }
}

/// One sandbox: which standard it runs, which parties it simulates and how
/// to reach the ones it does not.
///
/// Without an `orchestrator` section the sandbox only simulates its parties
/// and runs no scenarios.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SandboxConfiguration {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub standard: StandardConfiguration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator: Option<OrchestratorConfiguration>,
    pub parties: Vec<PartyConfiguration>,
    #[serde(default)]
    pub counterparts: Vec<CounterpartConfiguration>,
    /// Roles reported on; all roles of the standard when empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tested_roles: Vec<String>,
}

impl SandboxConfiguration {
    pub fn party(&self, name: &str) -> Option<&PartyConfiguration> {
        self.parties.iter().find(|p| p.name == name)
    }

    pub fn counterpart(&self, name: &str) -> Option<&CounterpartConfiguration> {
        self.counterparts.iter().find(|c| c.name == name)
    }

    pub fn in_sandbox_parties(&self) -> impl Iterator<Item = &PartyConfiguration> {
        self.parties.iter().filter(|p| p.in_sandbox)
    }
}
