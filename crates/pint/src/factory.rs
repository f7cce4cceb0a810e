use std::sync::Arc;

use quayside_core::check::SchemaCache;
use quayside_core::{
    ComponentFactory, ConformanceParty, CounterpartConfiguration, EngineError, PartyConfiguration,
    PartyNames, ScenarioModule,
};

use crate::model::{
    PintContext, RECEIVING_PLATFORM, ROLES, SENDING_PLATFORM, STANDARD_NAME, STANDARD_VERSION,
};
use crate::parties::{PintReceivingPlatform, PintSendingPlatform};
use crate::scenarios::{scenario_modules, PintScenarioSettings};
use crate::schemas::PintSchemas;

/// Parties and scenarios of the PINT standard.
pub struct PintComponentFactory {
    schemas: Arc<PintSchemas>,
}

impl PintComponentFactory {
    pub fn new() -> Result<Self, EngineError> {
        let schemas = PintSchemas::load(&SchemaCache::new())?;
        Ok(Self {
            schemas: Arc::new(schemas),
        })
    }
}

impl ComponentFactory for PintComponentFactory {
    type Context = PintContext;

    fn standard_name(&self) -> &str {
        STANDARD_NAME
    }

    fn standard_version(&self) -> &str {
        STANDARD_VERSION
    }

    fn role_names(&self) -> &[&'static str] {
        ROLES
    }

    fn create_parties(
        &self,
        parties: &[PartyConfiguration],
        counterparts: &[CounterpartConfiguration],
    ) -> Result<Vec<Box<dyn ConformanceParty>>, EngineError> {
        PartyNames::from_configuration(ROLES, parties)?;
        let mut created: Vec<Box<dyn ConformanceParty>> = Vec::new();
        for party in parties.iter().filter(|p| p.in_sandbox) {
            let counterpart = counterparts.iter().find(|c| c.role != party.role).cloned();
            match party.role.as_str() {
                SENDING_PLATFORM => {
                    created.push(Box::new(PintSendingPlatform::new(party.clone(), counterpart)))
                }
                RECEIVING_PLATFORM => {
                    created.push(Box::new(PintReceivingPlatform::new(party.clone(), counterpart)))
                }
                other => {
                    return Err(EngineError::Configuration(format!(
                        "PINT has no party for role '{other}'"
                    )))
                }
            }
        }
        Ok(created)
    }

    fn create_scenario_modules(&self, names: &PartyNames) -> Vec<ScenarioModule<PintContext>> {
        let settings = PintScenarioSettings {
            sender: names.name_of(SENDING_PLATFORM).unwrap_or(SENDING_PLATFORM).to_string(),
            receiver: names.name_of(RECEIVING_PLATFORM).unwrap_or(RECEIVING_PLATFORM).to_string(),
            schemas: self.schemas.clone(),
        };
        scenario_modules(&settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn party(name: &str, role: &str, in_sandbox: bool) -> PartyConfiguration {
        PartyConfiguration {
            name: name.into(),
            role: role.into(),
            in_sandbox,
        }
    }

    #[test]
    fn only_in_sandbox_parties_are_created() {
        let factory = PintComponentFactory::new().unwrap();
        let parties = factory
            .create_parties(
                &[
                    party("Sender1", SENDING_PLATFORM, true),
                    party("Receiver1", RECEIVING_PLATFORM, false),
                ],
                &[],
            )
            .unwrap();
        assert_eq!(parties.len(), 1);
        assert_eq!(parties[0].name(), "Sender1");
        assert_eq!(parties[0].role(), SENDING_PLATFORM);
    }

    #[test]
    fn a_missing_role_is_a_configuration_error() {
        let factory = PintComponentFactory::new().unwrap();
        let err = factory
            .create_parties(&[party("Sender1", SENDING_PLATFORM, true)], &[])
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Configuration(_)));
    }

    #[test]
    fn report_title_names_the_standard() {
        let factory = PintComponentFactory::new().unwrap();
        assert_eq!(factory.report_title(), "PINT 3.0.0");
    }
}
