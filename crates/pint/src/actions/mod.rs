//! PINT scenario actions.

mod supply;
mod transfer;
mod validation;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use quayside_core::EngineError;

pub use supply::{
    ReceiverStateSetup, ResetScenarioClass, SupplySenderParameters, SupplyValidationParameters,
};
pub use transfer::{EnvelopeTransfer, FinishTransfer, StartExpectation, TransferDocument};
pub use validation::ReceiverValidation;

/// Prompt kinds understood by the PINT parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PintActionType {
    SupplySenderParameters,
    ReceiverStateSetup,
    ResetScenarioClass,
    SupplyValidationParameters,
    StartTransfer,
    RetryTransfer,
    TransferDocument,
    TransferDocumentReceiverFailure,
    FinishTransfer,
    ReceiverValidation,
}

impl PintActionType {
    pub fn name(self) -> &'static str {
        match self {
            PintActionType::SupplySenderParameters => "SupplySenderParameters",
            PintActionType::ReceiverStateSetup => "ReceiverStateSetup",
            PintActionType::ResetScenarioClass => "ResetScenarioClass",
            PintActionType::SupplyValidationParameters => "SupplyValidationParameters",
            PintActionType::StartTransfer => "StartTransfer",
            PintActionType::RetryTransfer => "RetryTransfer",
            PintActionType::TransferDocument => "TransferDocument",
            PintActionType::TransferDocumentReceiverFailure => "TransferDocumentReceiverFailure",
            PintActionType::FinishTransfer => "FinishTransfer",
            PintActionType::ReceiverValidation => "ReceiverValidation",
        }
    }
}

impl fmt::Display for PintActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse party input into `T`, naming the action on failure.
pub(crate) fn parse_input<T: serde::de::DeserializeOwned>(
    action_path: &str,
    input: &Value,
) -> Result<T, EngineError> {
    serde_json::from_value(input.clone()).map_err(|e| EngineError::UnexpectedInput {
        action_path: action_path.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_type_names_round_trip_through_serde() {
        for kind in [
            PintActionType::StartTransfer,
            PintActionType::TransferDocumentReceiverFailure,
            PintActionType::SupplyValidationParameters,
        ] {
            let value = serde_json::to_value(kind).unwrap();
            assert_eq!(value, Value::String(kind.name().to_string()));
            assert_eq!(serde_json::from_value::<PintActionType>(value).unwrap(), kind);
        }
    }
}
