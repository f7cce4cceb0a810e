use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use quayside_core::{
    ConformanceParty, ConformanceRequest, ConformanceResponse, CounterpartConfiguration,
    EngineError, PartyConfiguration, PartyCore, PartyOutbound,
};

use super::{decode_prompt, error_response, prompt_field, respond, PromptHeader};
use crate::actions::PintActionType;
use crate::crypto::{self, PayloadSigner};
use crate::envelope::{EnvelopeView, MISSING_DOCUMENTS_FIELD, RECEIVED_DOCUMENTS_FIELD};
use crate::model::{
    ReceiverParty, ReceiverScenarioParameters, ResponseCode, ScenarioClass,
    SenderScenarioParameters, TransferState, ValidationParameters,
};

pub const RECEIVER_PLATFORM: &str = "CARX";
pub const RECEIVER_PARTY_NAME: &str = "Jane Doe";
pub const RECEIVER_PARTY_CODE: &str = "12345-jane-doe";

const CODE_LIST_PROVIDER: &str = "EPUI";
const INVALID_PARTY_CODE: &str = "12345-invalid";
const UNAVAILABLE: &str = "The receiving platform is temporarily unavailable";

fn unknown_envelope(request: &ConformanceRequest, envelope_reference: &str) -> ConformanceResponse {
    error_response(request, 404, &format!("Unknown envelope '{envelope_reference}'"))
}

/// What the receiver knows about one incoming transport document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingTransfer {
    state: TransferState,
    scenario_class: ScenarioClass,
    senders_public_key: String,
    envelope_reference: Option<String>,
    manifest_checksum: Option<String>,
    transport_document_checksum: Option<String>,
    expected_documents: Vec<String>,
    received_documents: Vec<String>,
}

impl IncomingTransfer {
    fn missing_documents(&self) -> Vec<String> {
        self.expected_documents
            .iter()
            .filter(|c| !self.received_documents.contains(c))
            .cloned()
            .collect()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReceivingState {
    signing_key: String,
    transfers: BTreeMap<String, IncomingTransfer>,
}

/// The eBL platform that receives transport documents.
pub struct PintReceivingPlatform {
    core: PartyCore,
    signer: PayloadSigner,
    transfers: BTreeMap<String, IncomingTransfer>,
}

impl PintReceivingPlatform {
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

    pub fn public_key_base64(&self) -> String {
        self.signer.public_key_base64()
    }

    fn signed_response(
        &self,
        request: &ConformanceRequest,
        code: ResponseCode,
        reason: Option<String>,
        documents: Option<(&str, Vec<String>)>,
    ) -> ConformanceResponse {
        let mut payload = json!({ "responseCode": code });
        if let Some(reason) = reason {
            payload["reason"] = json!(reason);
        }
        if let Some((field, checksums)) = documents {
            payload[field] = json!(checksums);
        }
        respond(request, code.http_status(), json!(self.signer.sign(&payload)))
    }

    fn reference_of_envelope(&self, envelope_reference: &str) -> Option<String> {
        self.transfers
            .iter()
            .find(|(_, t)| t.envelope_reference.as_deref() == Some(envelope_reference))
            .map(|(reference, _)| reference.clone())
    }

    // ── Prompts ─────────────────────────────────────────────────────────

    async fn set_up_transfer(
        &mut self,
        header: &PromptHeader,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let name = self.core.name().to_string();
        let scenario_class: ScenarioClass = prompt_field(&name, prompt, "scenarioClass")?;
        let sender: SenderScenarioParameters =
            prompt_field(&name, prompt, "senderScenarioParameters")?;
        let reference = sender.transport_document_reference;
        self.transfers.insert(
            reference.clone(),
            IncomingTransfer {
                state: TransferState::NotStarted,
                scenario_class,
                senders_public_key: sender.senders_public_key,
                envelope_reference: None,
                manifest_checksum: None,
                transport_document_checksum: None,
                expected_documents: Vec::new(),
                received_documents: Vec::new(),
            },
        );
        let party_code = match scenario_class {
            ScenarioClass::InvalidRecipient => INVALID_PARTY_CODE,
            _ => RECEIVER_PARTY_CODE,
        };
        let parameters = ReceiverScenarioParameters {
            ebl_platform: RECEIVER_PLATFORM.to_string(),
            receiver_party: ReceiverParty {
                party_name: RECEIVER_PARTY_NAME.to_string(),
                party_code: party_code.to_string(),
                code_list_provider: CODE_LIST_PROVIDER.to_string(),
            },
            receivers_public_key: self.signer.public_key_base64(),
            scenario_class,
        };
        self.core.add_operator_log_entry(format!(
            "Prepared to receive transport document '{reference}' \
             in scenario class {scenario_class}"
        ));
        outbound
            .post_input(header.action_id, serde_json::to_value(parameters)?)
            .await
    }

    async fn reset_scenario_class(
        &mut self,
        header: &PromptHeader,
        prompt: &Value,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let name = self.core.name().to_string();
        let scenario_class: ScenarioClass = prompt_field(&name, prompt, "scenarioClass")?;
        let reference: String = prompt_field(&name, prompt, "transportDocumentReference")?;
        let transfer = self.transfers.get_mut(&reference).ok_or_else(|| {
            EngineError::party(&name, format!("unknown transport document '{reference}'"))
        })?;
        transfer.scenario_class = scenario_class;
        self.core.add_operator_log_entry(format!(
            "Switched transport document '{reference}' to scenario class {scenario_class}"
        ));
        outbound
            .post_input(header.action_id, json!({ "scenarioClass": scenario_class }))
            .await
    }

    async fn supply_validation_parameters(
        &mut self,
        header: &PromptHeader,
        outbound: &dyn PartyOutbound,
    ) -> Result<(), EngineError> {
        let parameters = ValidationParameters {
            code_list_provider: CODE_LIST_PROVIDER.to_string(),
            party_code: RECEIVER_PARTY_CODE.to_string(),
        };
        self.core.add_operator_log_entry(format!(
            "Supplied party code '{RECEIVER_PARTY_CODE}' for validation"
        ));
        outbound
            .post_input(header.action_id, serde_json::to_value(parameters)?)
            .await
    }

    // ── Endpoints ───────────────────────────────────────────────────────

    fn start_transfer(&mut self, request: &ConformanceRequest) -> ConformanceResponse {
        let body = &request.message.body;
        let view = match EnvelopeView::parse(body) {
            Ok(view) => view,
            Err(e) => return error_response(request, 400, &format!("Malformed envelope: {e}")),
        };
        let Some(reference) = view.transport_document_reference().map(str::to_string) else {
            return error_response(
                request,
                400,
                "The transport document has no transportDocumentReference",
            );
        };
        let Some(transfer) = self.transfers.get(&reference).cloned() else {
            return error_response(
                request,
                400,
                &format!("Unknown transport document '{reference}'"),
            );
        };
        if transfer.scenario_class == ScenarioClass::FailW503 {
            self.core.add_operator_log_entry(format!(
                "Failing transfer request for '{reference}' with 503 as configured"
            ));
            return error_response(request, 503, UNAVAILABLE);
        }

        let same_manifest = transfer.manifest_checksum.as_deref()
            == Some(crypto::signed_content_checksum(view.manifest).as_str());
        let response = match transfer.state {
            TransferState::NotStarted => self.accept_envelope(request, &reference, &view, transfer),
            TransferState::IssuanceRequested
                if same_manifest && !transfer.missing_documents().is_empty() =>
            {
                self.started_response(request, &transfer)
            }
            TransferState::IssuanceRequested
                if same_manifest && !transfer.expected_documents.is_empty() =>
            {
                self.complete_transfer(request, &reference)
            }
            state => error_response(
                request,
                409,
                &format!(
                    "Rejecting transfer request for document '{reference}' \
                     because it is in state '{state}'"
                ),
            ),
        };
        let state = self
            .transfers
            .get(&reference)
            .map(|t| t.state)
            .unwrap_or(TransferState::NotStarted);
        self.core.add_operator_log_entry(format!(
            "Handling transfer request for eBL with transportDocumentReference '{reference}' \
             (now in state '{state}')"
        ));
        response
    }

    fn accept_envelope(
        &mut self,
        request: &ConformanceRequest,
        reference: &str,
        view: &EnvelopeView<'_>,
        mut transfer: IncomingTransfer,
    ) -> ConformanceResponse {
        let key = transfer.senders_public_key.as_str();
        if let Err(e) = crypto::verify(view.manifest, key) {
            return self.signed_response(
                request,
                ResponseCode::BadSignature,
                Some(format!("Cannot verify the envelope manifest: {e}")),
                None,
            );
        }
        if let Err(e) = crypto::verify(view.last_entry(), key) {
            return self.signed_response(
                request,
                ResponseCode::BadSignature,
                Some(format!("Cannot verify the last transfer chain entry: {e}")),
                None,
            );
        }

        let mut problems = view.chain_linkage_violations();
        problems.extend(view.manifest_violations());
        match view.final_recipient() {
            Some(recipient) => {
                if recipient.ebl_platform != RECEIVER_PLATFORM {
                    problems.push(format!(
                        "The recipient platform was '{}' but this is '{RECEIVER_PLATFORM}'",
                        recipient.ebl_platform
                    ));
                }
                let known = recipient.identifying_codes.iter().any(|code| {
                    code.code_list_provider == CODE_LIST_PROVIDER
                        && code.party_code == RECEIVER_PARTY_CODE
                });
                if !known {
                    problems.push("The recipient is not a party of this platform".to_string());
                }
            }
            None => problems.push("The last transfer chain entry names no recipient".to_string()),
        }
        if transfer.scenario_class == ScenarioClass::InvalidRecipient && problems.is_empty() {
            problems.push("The recipient is not accepted by this platform".to_string());
        }
        if let Some(problem) = problems.into_iter().next() {
            transfer.state = TransferState::Refused;
            self.transfers.insert(reference.to_string(), transfer);
            return self.signed_response(request, ResponseCode::BadEnvelope, Some(problem), None);
        }

        transfer.state = TransferState::IssuanceRequested;
        transfer.envelope_reference = Some(Uuid::new_v4().to_string());
        transfer.manifest_checksum = Some(crypto::signed_content_checksum(view.manifest));
        transfer.transport_document_checksum = Some(crypto::json_checksum(view.transport_document));
        transfer.expected_documents = view.manifest_document_checksums();
        transfer.received_documents.clear();
        let response = self.started_response(request, &transfer);
        self.transfers.insert(reference.to_string(), transfer);
        response
    }

    fn started_response(
        &self,
        request: &ConformanceRequest,
        transfer: &IncomingTransfer,
    ) -> ConformanceResponse {
        respond(
            request,
            201,
            json!({
                "envelopeReference": transfer.envelope_reference,
                "transportDocumentChecksum": transfer.transport_document_checksum,
                MISSING_DOCUMENTS_FIELD: transfer.missing_documents(),
            }),
        )
    }

    fn receive_document(
        &mut self,
        request: &ConformanceRequest,
        envelope_reference: &str,
        checksum: &str,
    ) -> ConformanceResponse {
        let Some(reference) = self.reference_of_envelope(envelope_reference) else {
            return unknown_envelope(request, envelope_reference);
        };
        let Some(transfer) = self.transfers.get(&reference).cloned() else {
            return unknown_envelope(request, envelope_reference);
        };
        if transfer.scenario_class == ScenarioClass::FailW503 {
            return error_response(request, 503, UNAVAILABLE);
        }
        if transfer.state != TransferState::IssuanceRequested {
            return error_response(
                request,
                409,
                &format!("Envelope '{envelope_reference}' is in state '{}'", transfer.state),
            );
        }
        if !transfer.expected_documents.iter().any(|c| c == checksum) {
            self.core.add_operator_log_entry(format!(
                "Rejected additional document '{checksum}' of '{reference}': \
                 not listed in the manifest"
            ));
            return self.signed_response(
                request,
                ResponseCode::InconsistentDocument,
                Some(format!(
                    "Document '{checksum}' is not listed in the manifest \
                     of envelope '{envelope_reference}'"
                )),
                None,
            );
        }
        let actual = request.message.body.as_str().and_then(crypto::document_checksum);
        if actual.as_deref() != Some(checksum) {
            self.core.add_operator_log_entry(format!(
                "Rejected additional document '{checksum}' of '{reference}': content does not match"
            ));
            return self.signed_response(
                request,
                ResponseCode::InconsistentDocument,
                Some(format!("The content of document '{checksum}' does not match its checksum")),
                None,
            );
        }
        if let Some(transfer) = self.transfers.get_mut(&reference) {
            if !transfer.received_documents.iter().any(|c| c == checksum) {
                transfer.received_documents.push(checksum.to_string());
            }
        }
        self.core.add_operator_log_entry(format!(
            "Received additional document '{checksum}' of '{reference}'"
        ));
        request.create_response(204)
    }

    fn finish_transfer(
        &mut self,
        request: &ConformanceRequest,
        envelope_reference: &str,
    ) -> ConformanceResponse {
        let Some(reference) = self.reference_of_envelope(envelope_reference) else {
            return unknown_envelope(request, envelope_reference);
        };
        let Some(transfer) = self.transfers.get_mut(&reference) else {
            return unknown_envelope(request, envelope_reference);
        };
        if transfer.scenario_class == ScenarioClass::FailW503 {
            return error_response(request, 503, UNAVAILABLE);
        }
        if transfer.state != TransferState::IssuanceRequested {
            let state = transfer.state;
            return error_response(
                request,
                409,
                &format!("Envelope '{envelope_reference}' is in state '{state}'"),
            );
        }
        let missing = transfer.missing_documents();
        if !missing.is_empty() {
            let response = self.signed_response(
                request,
                ResponseCode::MissingDocuments,
                Some(format!("{} additional documents are missing", missing.len())),
                Some((MISSING_DOCUMENTS_FIELD, missing)),
            );
            self.core.add_operator_log_entry(format!(
                "Cannot finish transfer of '{reference}': documents are missing"
            ));
            return response;
        }
        self.complete_transfer(request, &reference)
    }

    /// Accept the transfer of `reference` and answer with a signed RECE.
    fn complete_transfer(
        &mut self,
        request: &ConformanceRequest,
        reference: &str,
    ) -> ConformanceResponse {
        let received = match self.transfers.get_mut(reference) {
            Some(transfer) => {
                transfer.state = TransferState::Accepted;
                transfer.received_documents.clone()
            }
            None => Vec::new(),
        };
        self.core.add_operator_log_entry(format!(
            "Accepted transfer of transport document '{reference}'"
        ));
        self.signed_response(
            request,
            ResponseCode::Received,
            None,
            Some((RECEIVED_DOCUMENTS_FIELD, received)),
        )
    }

    fn validate_party(&mut self, request: &ConformanceRequest) -> ConformanceResponse {
        let parameters: Option<ValidationParameters> =
            serde_json::from_value(request.message.body.clone()).ok();
        match parameters {
            Some(p)
                if p.code_list_provider == CODE_LIST_PROVIDER
                    && p.party_code == RECEIVER_PARTY_CODE =>
            {
                self.core
                    .add_operator_log_entry(format!("Validated party code '{}'", p.party_code));
                respond(request, 200, json!({ "partyName": RECEIVER_PARTY_NAME }))
            }
            Some(p) => {
                self.core
                    .add_operator_log_entry(format!("Unknown party code '{}'", p.party_code));
                error_response(request, 404, "Unknown party")
            }
            None => error_response(request, 400, "Malformed receiver validation request"),
        }
    }
}

#[async_trait]
impl ConformanceParty for PintReceivingPlatform {
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
        let state = ReceivingState {
            signing_key: self.signer.secret_base64(),
            transfers: self.transfers.clone(),
        };
        Ok(self.core.export(serde_json::to_value(state)?))
    }

    fn import_state(&mut self, state: &Value) -> Result<(), EngineError> {
        let state: ReceivingState = serde_json::from_value(self.core.import(state)?)?;
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
            PintActionType::ReceiverStateSetup => {
                self.set_up_transfer(&header, prompt, outbound).await
            }
            PintActionType::ResetScenarioClass => {
                self.reset_scenario_class(&header, prompt, outbound).await
            }
            PintActionType::SupplyValidationParameters => {
                self.supply_validation_parameters(&header, outbound).await
            }
            other => Err(EngineError::party(
                self.core.name(),
                format!("the receiving platform does not handle {other} prompts"),
            )),
        };
        self.core.record_prompt_outcome(header.action_id, header.action_type, &result);
        result
    }

    async fn handle_request(
        &mut self,
        request: &ConformanceRequest,
    ) -> Result<ConformanceResponse, EngineError> {
        let path = request.path().trim_matches('/').to_string();
        let segments: Vec<&str> = path.split('/').collect();
        let method = request.method.to_ascii_uppercase();
        let response = match (method.as_str(), segments.as_slice()) {
            ("POST", [.., "envelopes"]) => self.start_transfer(request),
            ("PUT", [.., "envelopes", reference, "additional-documents", checksum]) => {
                self.receive_document(request, reference, checksum)
            }
            ("PUT", [.., "envelopes", reference, "finish-transfer"]) => {
                self.finish_transfer(request, reference)
            }
            ("POST", [.., "receiver-validation"]) => self.validate_party(request),
            _ => error_response(
                request,
                404,
                &format!("No endpoint for {} '{}'", request.method, request.path()),
            ),
        };
        Ok(response)
    }
}
