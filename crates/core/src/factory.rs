use std::collections::BTreeMap;

use crate::error::EngineError;
use crate::party::{ConformanceParty, CounterpartConfiguration, PartyConfiguration};
use crate::scenario::{ContextLayer, ScenarioModule};

/// Party name for each role of a standard, checked to be one per role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyNames {
    by_role: BTreeMap<String, String>,
}

impl PartyNames {
    /// Map every role of the standard to the name of its party. Rejects a
    /// role named twice, a role unknown to the standard and a missing role.
    pub fn from_configuration(
        roles: &[&str],
        parties: &[PartyConfiguration],
    ) -> Result<Self, EngineError> {
        let mut by_role = BTreeMap::new();
        for party in parties {
            if !roles.contains(&party.role.as_str()) {
                return Err(EngineError::Configuration(format!(
                    "party '{}' has role '{}' which is not one of {:?}",
                    party.name, party.role, roles
                )));
            }
            if by_role
                .insert(party.role.clone(), party.name.clone())
                .is_some()
            {
                return Err(EngineError::Configuration(format!(
                    "role '{}' is assigned to more than one party",
                    party.role
                )));
            }
        }
        if let Some(missing) = roles.iter().find(|role| !by_role.contains_key(**role)) {
            return Err(EngineError::Configuration(format!(
                "no party has role '{missing}'"
            )));
        }
        Ok(Self { by_role })
    }

    pub fn name_of(&self, role: &str) -> Option<&str> {
        self.by_role.get(role).map(String::as_str)
    }
}

/// Everything a sandbox needs to run one API standard.
pub trait ComponentFactory: Send + Sync + 'static {
    type Context: ContextLayer;

    fn standard_name(&self) -> &str;

    fn standard_version(&self) -> &str;

    fn role_names(&self) -> &[&'static str];

    /// Instantiate the parties simulated by the sandbox, one per in-sandbox
    /// configuration.
    fn create_parties(
        &self,
        parties: &[PartyConfiguration],
        counterparts: &[CounterpartConfiguration],
    ) -> Result<Vec<Box<dyn ConformanceParty>>, EngineError>;

    fn create_scenario_modules(&self, names: &PartyNames) -> Vec<ScenarioModule<Self::Context>>;

    fn expected_api_version(&self) -> &str {
        self.standard_version()
    }

    /// Title of the root of the report tree.
    fn report_title(&self) -> String {
        format!("{} {}", self.standard_name(), self.standard_version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLES: &[&str] = &["Publisher", "Subscriber"];

    fn party(name: &str, role: &str) -> PartyConfiguration {
        PartyConfiguration {
            name: name.into(),
            role: role.into(),
            in_sandbox: true,
        }
    }

    #[test]
    fn one_party_per_role() {
        let names = PartyNames::from_configuration(
            ROLES,
            &[party("P1", "Publisher"), party("S1", "Subscriber")],
        )
        .unwrap();
        assert_eq!(names.name_of("Subscriber"), Some("S1"));
    }

    #[test]
    fn duplicate_role_is_rejected() {
        let err = PartyNames::from_configuration(
            ROLES,
            &[party("P1", "Publisher"), party("P2", "Publisher")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("more than one party"));
    }

    #[test]
    fn unknown_and_missing_roles_are_rejected() {
        assert!(PartyNames::from_configuration(ROLES, &[party("X", "Carrier")]).is_err());
        assert!(PartyNames::from_configuration(ROLES, &[party("P1", "Publisher")]).is_err());
    }
}
