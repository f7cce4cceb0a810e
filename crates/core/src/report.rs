//! Conformance reports built from evaluated check trees.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::check::CheckOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConformanceStatus {
    Conformant,
    PartiallyConformant,
    NonConformant,
    NoTraffic,
}

impl ConformanceStatus {
    /// Combine the statuses of sibling checks.
    ///
    /// Any `NON_CONFORMANT` wins, then any `PARTIALLY_CONFORMANT`. Otherwise
    /// the result is `CONFORMANT` or `NO_TRAFFIC` when all agree and
    /// `PARTIALLY_CONFORMANT` when they are mixed. An empty set has no
    /// traffic.
    pub fn reduce<I: IntoIterator<Item = ConformanceStatus>>(statuses: I) -> ConformanceStatus {
        let mut conformant = 0usize;
        let mut no_traffic = 0usize;
        let mut partial = false;
        for status in statuses {
            match status {
                ConformanceStatus::NonConformant => return ConformanceStatus::NonConformant,
                ConformanceStatus::PartiallyConformant => partial = true,
                ConformanceStatus::Conformant => conformant += 1,
                ConformanceStatus::NoTraffic => no_traffic += 1,
            }
        }
        if partial || (conformant > 0 && no_traffic > 0) {
            ConformanceStatus::PartiallyConformant
        } else if conformant > 0 {
            ConformanceStatus::Conformant
        } else {
            ConformanceStatus::NoTraffic
        }
    }
}

impl fmt::Display for ConformanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConformanceStatus::Conformant => "CONFORMANT",
            ConformanceStatus::PartiallyConformant => "PARTIALLY_CONFORMANT",
            ConformanceStatus::NonConformant => "NON_CONFORMANT",
            ConformanceStatus::NoTraffic => "NO_TRAFFIC",
        };
        f.write_str(name)
    }
}

/// Detailed report for one role. The tree mirrors the check tree: standard,
/// module, scenario, action, leaf.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceReport {
    pub title: String,
    pub status: ConformanceStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_reports: Vec<ConformanceReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_messages: Vec<String>,
}

impl ConformanceReport {
    pub fn from_outcome(outcome: &CheckOutcome) -> Self {
        let error_messages = if outcome.children.is_empty() {
            outcome.violations.iter().cloned().collect()
        } else {
            Vec::new()
        };
        Self {
            title: outcome.title.clone(),
            status: outcome.status,
            sub_reports: outcome.children.iter().map(Self::from_outcome).collect(),
            error_messages,
        }
    }

    /// All violation messages below this node, in tree order.
    pub fn all_error_messages(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.error_messages.iter().map(String::as_str).collect();
        for sub in &self.sub_reports {
            out.extend(sub.all_error_messages());
        }
        out
    }

    pub fn digest(&self) -> ReportDigest {
        ReportDigest {
            title: self.title.clone(),
            status: self.status,
            modules: self
                .sub_reports
                .iter()
                .map(|module| ModuleDigest {
                    title: module.title.clone(),
                    status: module.status,
                    scenarios: module
                        .sub_reports
                        .iter()
                        .map(|scenario| ScenarioDigest {
                            title: scenario.title.clone(),
                            status: scenario.status,
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {}", self.title, self.status)?;
        for module in &self.sub_reports {
            writeln!(f, "  {}: {}", module.title, module.status)?;
            for scenario in &module.sub_reports {
                writeln!(f, "    [{}] {}", scenario.status, scenario.title)?;
                if scenario.status == ConformanceStatus::NonConformant {
                    for message in scenario.all_error_messages() {
                        writeln!(f, "      - {message}")?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Per-scenario verdicts without the violation detail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDigest {
    pub title: String,
    pub status: ConformanceStatus,
    pub modules: Vec<ModuleDigest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDigest {
    pub title: String,
    pub status: ConformanceStatus,
    pub scenarios: Vec<ScenarioDigest>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioDigest {
    pub title: String,
    pub status: ConformanceStatus,
}
