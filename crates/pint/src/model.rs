//! PINT roles, scenario parameters and the context carried through a
//! scenario.

use std::fmt;

use serde::{Deserialize, Serialize};

use quayside_core::scenario::overlay_field;
use quayside_core::ContextLayer;

pub const STANDARD_NAME: &str = "PINT";
pub const STANDARD_VERSION: &str = "3.0.0";
pub const URL_PREFIX: &str = "/v3";

pub const SENDING_PLATFORM: &str = "SendingPlatform";
pub const RECEIVING_PLATFORM: &str = "ReceivingPlatform";
pub const ROLES: &[&str] = &[SENDING_PLATFORM, RECEIVING_PLATFORM];

pub const TRANSPORT_DOCUMENT_REFERENCE: &str = "transportDocumentReference";
pub const ENVELOPE_REFERENCE: &str = "envelopeReference";

// ── Classes ─────────────────────────────────────────────────────────────────

/// How the receiving platform behaves for a document reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScenarioClass {
    NoIssues,
    InvalidRecipient,
    #[serde(rename = "FAIL_W_503")]
    FailW503,
}

impl fmt::Display for ScenarioClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScenarioClass::NoIssues => "NO_ISSUES",
            ScenarioClass::InvalidRecipient => "INVALID_RECIPIENT",
            ScenarioClass::FailW503 => "FAIL_W_503",
        })
    }
}

/// How the sending platform builds the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderTransmissionClass {
    ValidTransfer,
    SignatureIssue,
    WrongRecipientPlatform,
    /// The last chain entry and the manifest are signed again.
    ResignedLatestEntry,
    /// An earlier chain entry is altered after its successor linked to it.
    ManipulatedTransactions,
}

impl fmt::Display for SenderTransmissionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SenderTransmissionClass::ValidTransfer => "VALID_TRANSFER",
            SenderTransmissionClass::SignatureIssue => "SIGNATURE_ISSUE",
            SenderTransmissionClass::WrongRecipientPlatform => "WRONG_RECIPIENT_PLATFORM",
            SenderTransmissionClass::ResignedLatestEntry => "RESIGNED_LATEST_ENTRY",
            SenderTransmissionClass::ManipulatedTransactions => "MANIPULATED_TRANSACTIONS",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentTransmission {
    ValidDocument,
    CorruptedDocument,
    /// A document the manifest does not list.
    UnrelatedDocument,
}

impl fmt::Display for DocumentTransmission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentTransmission::ValidDocument => "VALID_DOCUMENT",
            DocumentTransmission::CorruptedDocument => "CORRUPTED_DOCUMENT",
            DocumentTransmission::UnrelatedDocument => "UNRELATED_DOCUMENT",
        })
    }
}

/// Codes of signed receiver responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseCode {
    /// Received: the transfer is accepted.
    #[serde(rename = "RECE")]
    Received,
    /// Bad signature.
    #[serde(rename = "BSIG")]
    BadSignature,
    /// Bad envelope.
    #[serde(rename = "BENV")]
    BadEnvelope,
    /// Inconsistent document.
    #[serde(rename = "INCD")]
    InconsistentDocument,
    /// Missing documents.
    #[serde(rename = "MDOC")]
    MissingDocuments,
}

impl ResponseCode {
    pub fn code(self) -> &'static str {
        match self {
            ResponseCode::Received => "RECE",
            ResponseCode::BadSignature => "BSIG",
            ResponseCode::BadEnvelope => "BENV",
            ResponseCode::InconsistentDocument => "INCD",
            ResponseCode::MissingDocuments => "MDOC",
        }
    }

    pub fn http_status(self) -> u16 {
        match self {
            ResponseCode::Received => 200,
            ResponseCode::BadSignature | ResponseCode::BadEnvelope => 422,
            ResponseCode::InconsistentDocument | ResponseCode::MissingDocuments => 409,
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Transfer state of a document reference at the receiving platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferState {
    NotStarted,
    IssuanceRequested,
    Accepted,
    Refused,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferState::NotStarted => "NOT_STARTED",
            TransferState::IssuanceRequested => "ISSUANCE_REQUESTED",
            TransferState::Accepted => "ACCEPTED",
            TransferState::Refused => "REFUSED",
        })
    }
}

// ── Parameters ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyingCode {
    pub code_list_provider: String,
    pub party_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverParty {
    pub party_name: String,
    pub party_code: String,
    pub code_list_provider: String,
}

/// Supplied by the sending platform before a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SenderScenarioParameters {
    pub transport_document_reference: String,
    pub senders_public_key: String,
    pub ebl_platform: String,
    pub document_count: usize,
}

/// Supplied by the receiving platform before a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiverScenarioParameters {
    pub ebl_platform: String,
    pub receiver_party: ReceiverParty,
    pub receivers_public_key: String,
    pub scenario_class: ScenarioClass,
}

/// Learned from the traffic as the transfer progresses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicScenarioParameters {
    pub transport_document_checksum: Option<String>,
    pub envelope_reference: Option<String>,
    #[serde(default)]
    pub document_checksums: Vec<String>,
    #[serde(default)]
    pub missing_document_checksums: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationParameters {
    pub code_list_provider: String,
    pub party_code: String,
}

// ── Scenario context ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PintContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderScenarioParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<ReceiverScenarioParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicScenarioParameters>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationParameters>,
}

impl PintContext {
    pub fn transport_document_reference(&self) -> Option<&str> {
        self.sender
            .as_ref()
            .map(|s| s.transport_document_reference.as_str())
    }

    pub fn dynamic_or_default(&self) -> DynamicScenarioParameters {
        self.dynamic.clone().unwrap_or_default()
    }
}

impl ContextLayer for PintContext {
    fn overlay(&mut self, newer: &Self) {
        overlay_field(&mut self.sender, &newer.sender);
        overlay_field(&mut self.receiver, &newer.receiver);
        overlay_field(&mut self.dynamic, &newer.dynamic);
        overlay_field(&mut self.validation, &newer.validation);
    }

    fn business_key(&self, name: &str) -> Option<String> {
        match name {
            TRANSPORT_DOCUMENT_REFERENCE => self.transport_document_reference().map(str::to_string),
            ENVELOPE_REFERENCE => self.dynamic.as_ref()?.envelope_reference.clone(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use quayside_core::scenario::resolve;

    fn sender(tdr: &str) -> SenderScenarioParameters {
        SenderScenarioParameters {
            transport_document_reference: tdr.into(),
            senders_public_key: "key".into(),
            ebl_platform: "BOLE".into(),
            document_count: 0,
        }
    }

    #[test]
    fn later_layers_override_earlier_ones() {
        let first = PintContext {
            sender: Some(sender("HHL71800000AAAAAAAAA")),
            ..Default::default()
        };
        let second = PintContext {
            dynamic: Some(DynamicScenarioParameters {
                envelope_reference: Some("env-1".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let resolved: PintContext = resolve([&first, &second]);
        assert_eq!(
            resolved.business_key(TRANSPORT_DOCUMENT_REFERENCE).as_deref(),
            Some("HHL71800000AAAAAAAAA")
        );
        assert_eq!(resolved.business_key(ENVELOPE_REFERENCE).as_deref(), Some("env-1"));
    }

    #[test]
    fn wire_names() {
        assert_eq!(json!(ScenarioClass::FailW503), json!("FAIL_W_503"));
        assert_eq!(json!(ResponseCode::BadEnvelope), json!("BENV"));
        assert_eq!(ResponseCode::MissingDocuments.http_status(), 409);
        assert_eq!(TransferState::IssuanceRequested.to_string(), "ISSUANCE_REQUESTED");
        for class in [
            SenderTransmissionClass::ResignedLatestEntry,
            SenderTransmissionClass::ManipulatedTransactions,
        ] {
            assert_eq!(json!(class), json!(class.to_string()));
        }
        assert_eq!(
            json!(DocumentTransmission::UnrelatedDocument),
            json!(DocumentTransmission::UnrelatedDocument.to_string())
        );
        let ssp = serde_json::to_value(sender("X")).unwrap();
        assert_eq!(ssp["sendersPublicKey"], "key");
    }
}
