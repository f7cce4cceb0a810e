use std::collections::BTreeMap;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use quayside_core::{
    ConformanceParty, ConformanceRequest, ConformanceResponse, CounterpartConfiguration,
    EngineError, PartyConfiguration, PartyCore, PartyOutbound, API_VERSION_HEADER,
};

use super::{decode_prompt, error_response, now_rfc3339, prompt_field, PromptHeader};
use crate::actions::PintActionType;
use crate::crypto::PayloadSigner;
use crate::envelope::{
    resign_latest_entry, transport_document, EnvelopeParts, SupportingDocument, TransactionParty,
    MISSING_DOCUMENTS_FIELD,
};
use crate::model::{
    DocumentTransmission, ReceiverScenarioParameters, SenderScenarioParameters,
    SenderTransmissionClass, ValidationParameters, RECEIVING_PLATFORM, SENDING_PLATFORM,
    STANDARD_VERSION, URL_PREFIX,
};

pub const SENDER_PLATFORM: &str = "BOLE";

const REFERENCE_PREFIX: &str = "HHL71800000";

/// What the sender keeps about one transport document it is transferring.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutgoingTransfer {
    transport_document: Value,
    documents: Vec<SupportingDocument>,
    /// The valid envelope, built once so that resends are identical.
    envelope: Option<Value>,
    envelope_reference: Option<String>,
    pending_documents: Vec<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendingState {
    signing_key: String,
    transfers: BTreeMap<String, OutgoingTransfer>,
}

/// The eBL platform that sends transport documents.
pub struct PintSendingPlatform {
    core: PartyCore,
    signer: PayloadSigner,
    transfers: BTreeMap<String, OutgoingTransfer>,
}

fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| char::from(rng.gen_range(b'A'..=b'Z')))
        .collect();
    format!("{REFERENCE_PREFIX}{suffix}")
}

impl PintSendingPlatform {
    pub fn new(
        configuration: PartyConfiguration,
        counterpart: Option<CounterpartConfiguration>,
    ) -> Self {
        Self {
            core: PartyCore::new(configuration, counterpart),
            signer: PayloadSigner::generate(),
            transfers: BTreeMap::new(),
        }
    }

    fn error(&self, message: impl Into<String>) -> EngineError {
        EngineError::party(self.core.name(), message)
    }

    fn request(&self, method: &str, path: &str, target: &str) -> ConformanceRequest {
        ConformanceRequest::new(method, path)
            .from_party(self.core.name(), SENDING_PLATFORM)
            .to_party(target, RECEIVING_PLATFORM)
            .with_header(API_VERSION_HEADER, STANDARD_VERSION)
    }

    fn transfer(&self, reference: &str) -> Result<&OutgoingTransfer, EngineError> {
        self.transfers
            .get(reference)
            .ok_or_else(|| self.error(format!("unknown transport document '{reference}'")))
    }

    fn transfer_mut(&mut self, reference: &str) -> Result<&mut OutgoingTransfer, EngineError> {
        let name = self.core.name().to_string();
        self.transfers.get_mut(reference).ok_or_else(|| {
            EngineError::party(&name, format!("unknown transport document '{reference}'"))
        })
    }

    async fn supply_parameters(
        &mut self,
        header: &PromptHeader,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let document_count: usize = prompt_field(self.core.name(), prompt, "documentCount")?;
        let reference = generate_reference();
        self.transfers.insert(
            reference.clone(),
            OutgoingTransfer {
                transport_document: transport_document(&reference, SENDER_PLATFORM),
                documents: (0..document_count).map(SupportingDocument::generate).collect(),
                envelope: None,
                envelope_reference: None,
                pending_documents: Vec::new(),
            },
        );
        let parameters = SenderScenarioParameters {
            transport_document_reference: reference.clone(),
            senders_public_key: self.signer.public_key_base64(),
            ebl_platform: SENDER_PLATFORM.to_string(),
            document_count,
        };
        self.core.add_operator_log_entry(format!(
            "Prepared transport document '{reference}' with {document_count} additional documents"
        ));
        outbound
            .post_input(header.action_id, serde_json::to_value(parameters)?)
            .await
    }

    fn build_envelope(
        &self,
        transfer: &OutgoingTransfer,
        receiver: &ReceiverScenarioParameters,
        class: SenderTransmissionClass,
    ) -> Result<Value, EngineError> {
        let mut recipient = TransactionParty::recipient_of(receiver);
        if class == SenderTransmissionClass::WrongRecipientPlatform {
            let other_platform = if receiver.ebl_platform == "WAVE" { "BOLE" } else { "WAVE" };
            recipient.ebl_platform = other_platform.into();
        }
        let now = now_rfc3339(self.core.name())?;
        let parts = EnvelopeParts {
            transport_document: &transfer.transport_document,
            platform: SENDER_PLATFORM,
            issuer: TransactionParty::new(SENDER_PLATFORM, "Sandbox Carrier", "12345-carrier"),
            holder: TransactionParty::new(SENDER_PLATFORM, "Sandbox Shipper", "12345-shipper"),
            recipient,
            documents: &transfer.documents,
            action_date_time: &now,
        };
        Ok(match class {
            SenderTransmissionClass::SignatureIssue => {
                parts.sign(&self.signer, &PayloadSigner::generate())
            }
            SenderTransmissionClass::ManipulatedTransactions => {
                parts.sign_with_manipulated_issuance(&self.signer)
            }
            _ => parts.sign(&self.signer, &self.signer),
        })
    }

    async fn send_envelope(
        &mut self,
        header: &PromptHeader,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let name = self.core.name().to_string();
        let sender: SenderScenarioParameters =
            prompt_field(&name, prompt, "senderScenarioParameters")?;
        let receiver: ReceiverScenarioParameters =
            prompt_field(&name, prompt, "receiverScenarioParameters")?;
        let class: Option<SenderTransmissionClass> =
            prompt_field(&name, prompt, "transmissionClass")?;
        let class = class.unwrap_or(SenderTransmissionClass::ValidTransfer);
        let reference = sender.transport_document_reference;

        let transfer = self.transfer(&reference)?;
        let body = match (&transfer.envelope, class) {
            (Some(envelope), SenderTransmissionClass::ValidTransfer) => envelope.clone(),
            (Some(envelope), SenderTransmissionClass::ResignedLatestEntry) => {
                resign_latest_entry(envelope, &self.signer, &now_rfc3339(&name)?)
                    .map_err(|reason| self.error(reason))?
            }
            _ => self.build_envelope(transfer, &receiver, class)?,
        };
        if class == SenderTransmissionClass::ValidTransfer {
            self.transfer_mut(&reference)?.envelope = Some(body.clone());
        }

        let request = self
            .request("POST", &format!("{URL_PREFIX}/envelopes"), &header.target_party_name)
            .with_body(body);
        let response = outbound.send_request(request).await?;

        if response.status_code == 201 {
            let response_body = &response.message.body;
            let transfer = self.transfer_mut(&reference)?;
            transfer.envelope_reference = response_body
                .get("envelopeReference")
                .and_then(Value::as_str)
                .map(str::to_string);
            transfer.pending_documents = response_body
                .get(MISSING_DOCUMENTS_FIELD)
                .and_then(Value::as_array)
                .map(|missing| {
                    missing.iter().filter_map(|c| c.as_str().map(str::to_string)).collect()
                })
                .unwrap_or_default();
        }
        self.core.add_operator_log_entry(format!(
            "Sent {} for transport document '{reference}': response status {}",
            header.action_type, response.status_code
        ));
        Ok(())
    }

    async fn send_document(
        &mut self,
        header: &PromptHeader,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let name = self.core.name().to_string();
        let sender: SenderScenarioParameters =
            prompt_field(&name, prompt, "senderScenarioParameters")?;
        let transmission = match header.action_type {
            PintActionType::TransferDocumentReceiverFailure => DocumentTransmission::ValidDocument,
            _ => prompt_field(&name, prompt, "documentTransmission")?,
        };
        let reference = sender.transport_document_reference;

        let transfer = self.transfer(&reference)?;
        let envelope_reference = transfer
            .envelope_reference
            .clone()
            .ok_or_else(|| self.error(format!("no transfer of '{reference}' has been started")))?;
        let (checksum, content) = if transmission == DocumentTransmission::UnrelatedDocument {
            let unrelated = SupportingDocument::generate(transfer.documents.len());
            (unrelated.checksum, unrelated.content)
        } else {
            let document = transfer
                .pending_documents
                .first()
                .and_then(|checksum| transfer.documents.iter().find(|d| &d.checksum == checksum))
                .or_else(|| transfer.documents.first())
                .ok_or_else(|| {
                    self.error(format!(
                        "transport document '{reference}' has no additional documents"
                    ))
                })?;
            let content = match transmission {
                DocumentTransmission::CorruptedDocument => document.corrupted_content(),
                _ => document.content.clone(),
            };
            (document.checksum.clone(), content)
        };

        let path =
            format!("{URL_PREFIX}/envelopes/{envelope_reference}/additional-documents/{checksum}");
        let request = self
            .request("PUT", &path, &header.target_party_name)
            .with_body(json!(content));
        let response = outbound.send_request(request).await?;

        if response.status_code == 204 {
            self.transfer_mut(&reference)?
                .pending_documents
                .retain(|c| c != &checksum);
        }
        self.core.add_operator_log_entry(format!(
            "Sent {transmission} '{checksum}' of transport document '{reference}': \
             response status {}",
            response.status_code
        ));
        Ok(())
    }

    async fn finish_transfer(
        &mut self,
        header: &PromptHeader,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let sender: SenderScenarioParameters =
            prompt_field(self.core.name(), prompt, "senderScenarioParameters")?;
        let reference = sender.transport_document_reference;
        let envelope_reference = self
            .transfer(&reference)?
            .envelope_reference
            .clone()
            .ok_or_else(|| self.error(format!("no transfer of '{reference}' has been started")))?;

        let request = self.request(
            "PUT",
            &format!("{URL_PREFIX}/envelopes/{envelope_reference}/finish-transfer"),
            &header.target_party_name,
        );
        let response = outbound.send_request(request).await?;
        self.core.add_operator_log_entry(format!(
            "Finished transfer of transport document '{reference}': response status {}",
            response.status_code
        ));
        Ok(())
    }

    async fn validate_receiver(
        &mut self,
        header: &PromptHeader,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let parameters: ValidationParameters =
            prompt_field(self.core.name(), prompt, "validationParameters")?;
        let path = format!("{URL_PREFIX}/receiver-validation");
        let request = self
            .request("POST", &path, &header.target_party_name)
            .with_body(serde_json::to_value(&parameters)?);
        let response = outbound.send_request(request).await?;
        self.core.add_operator_log_entry(format!(
            "Asked for validation of party '{}': response status {}",
            parameters.party_code, response.status_code
        ));
        Ok(())
    }
}

#[async_trait]
impl ConformanceParty for PintSendingPlatform {
    fn configuration(&self) -> &PartyConfiguration {
        self.core.configuration()
    }

    fn operator_log(&self) -> Vec<String> {
        self.core.operator_log()
    }

    fn reset(&mut self) {
        self.core.reset();
        self.transfers.clear();
    }

    fn export_state(&self) -> Result<Value, EngineError> {
        let state = SendingState {
            signing_key: self.signer.secret_base64(),
            transfers: self.transfers.clone(),
        };
        Ok(self.core.export(serde_json::to_value(state)?))
    }

    fn import_state(&mut self, state: &Value) -> Result<(), EngineError> {
        let state: SendingState = serde_json::from_value(self.core.import(state)?)?;
        self.signer = PayloadSigner::from_secret_base64(&state.signing_key)
            .map_err(|e| EngineError::StateImport(e.to_string()))?;
        self.transfers = state.transfers;
        Ok(())
    }

    async fn handle_prompt(
        &mut self,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let header = decode_prompt(self.core.name(), prompt)?;
        if self.core.is_handled(header.action_id) {
            tracing::debug!(
                party = %self.core.name(),
                action = %header.action_id,
                "prompt already handled"
            );
            return Ok(());
        }
        tracing::info!(party = %self.core.name(), action = %header.action_type, "handling prompt");
        let result = match header.action_type {
            PintActionType::SupplySenderParameters => {
                self.supply_parameters(&header, prompt, outbound).await
            }
            PintActionType::StartTransfer | PintActionType::RetryTransfer => {
                self.send_envelope(&header, prompt, outbound).await
            }
            PintActionType::TransferDocument | PintActionType::TransferDocumentReceiverFailure => {
                self.send_document(&header, prompt, outbound).await
            }
            PintActionType::FinishTransfer => {
                self.finish_transfer(&header, prompt, outbound).await
            }
            PintActionType::ReceiverValidation => {
                self.validate_receiver(&header, prompt, outbound).await
            }
            other => Err(self.error(format!(
                "the sending platform does not handle {other} prompts"
            ))),
        };
        self.core.record_prompt_outcome(header.action_id, header.action_type, &result);
        result
    }

    async fn handle_request(
        &mut self,
        request: &ConformanceRequest,
    ) -> Result<ConformanceResponse, EngineError> {
        self.core.add_operator_log_entry(format!(
            "Rejecting unexpected {} request to '{}'",
            request.method,
            request.path()
        ));
        Ok(error_response(request, 404, "The sending platform serves no endpoints"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn references_are_twenty_characters() {
        let reference = generate_reference();
        assert_eq!(reference.len(), 20);
        assert!(reference.starts_with(REFERENCE_PREFIX));
        assert!(reference[REFERENCE_PREFIX.len()..].chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn state_survives_export_and_import() {
        let config = PartyConfiguration {
            name: "Sender1".into(),
            role: SENDING_PLATFORM.into(),
            in_sandbox: true,
        };
        let mut party = PintSendingPlatform::new(config.clone(), None);
        party.transfers.insert(
            "HHL71800000ABCDEFGHI".into(),
            OutgoingTransfer {
                transport_document: json!({"transportDocumentReference": "HHL71800000ABCDEFGHI"}),
                documents: vec![SupportingDocument::generate(0)],
                envelope: None,
                envelope_reference: Some("env-1".into()),
                pending_documents: Vec::new(),
            },
        );
        let exported = party.export_state().unwrap();

        let mut restored = PintSendingPlatform::new(config, None);
        restored.import_state(&exported).unwrap();
        assert_eq!(restored.signer.public_key_base64(), party.signer.public_key_base64());
        assert_eq!(restored.export_state().unwrap(), exported);
    }
}
