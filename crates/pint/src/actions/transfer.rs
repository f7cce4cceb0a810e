//! Actions where the sending platform calls the receiving platform.

use std::fmt;
use std::sync::Arc;

use serde_json::{json, Map, Value};

use quayside_core::check::{
    api_version_header_check, http_method_check, json_schema_check, response_status_check,
    url_path_check,
};
use quayside_core::{
    ActionCore, BusinessKey, Capabilities, ConformanceAction, ConformanceCheck,
    ConformanceExchange, EngineError, HttpMessageType,
};

use super::PintActionType;
use crate::checks::{
    additional_document_check, manifest_commitment_check, missing_documents_listed_check,
    missing_documents_size_check, request_signatures_check, signed_content_schema_check,
    signed_response_check, signed_response_payload_schema_check, transfer_chain_linkage_check,
    transport_document_reference_check,
};
use crate::envelope::{EnvelopeView, MISSING_DOCUMENTS_FIELD};
use crate::model::{
    DocumentTransmission, PintContext, ResponseCode, SenderTransmissionClass, ENVELOPE_REFERENCE,
    RECEIVING_PLATFORM, SENDING_PLATFORM, TRANSPORT_DOCUMENT_REFERENCE, URL_PREFIX,
};
use crate::schemas::PintSchemas;

/// The response an action expects from the receiving platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartExpectation {
    /// `201` listing this many missing additional documents.
    Started { missing_documents: usize },
    /// A signed response with this code.
    Signed(ResponseCode),
    /// A plain error status such as `409` or `503`.
    Status(u16),
}

impl StartExpectation {
    pub fn http_status(self) -> u16 {
        match self {
            StartExpectation::Started { .. } => 201,
            StartExpectation::Signed(code) => code.http_status(),
            StartExpectation::Status(status) => status,
        }
    }

    fn response_checks(
        self,
        exchange_uuid: Option<uuid::Uuid>,
        ctx_receiver_key: Option<String>,
        schemas: &PintSchemas,
    ) -> Vec<ConformanceCheck> {
        match self {
            StartExpectation::Started { missing_documents } => vec![
                json_schema_check(
                    RECEIVING_PLATFORM,
                    exchange_uuid,
                    HttpMessageType::Response,
                    schemas.transfer_started_response.clone(),
                ),
                missing_documents_size_check(exchange_uuid, missing_documents),
                missing_documents_listed_check(exchange_uuid),
            ],
            StartExpectation::Signed(code) => vec![
                json_schema_check(
                    RECEIVING_PLATFORM,
                    exchange_uuid,
                    HttpMessageType::Response,
                    schemas.signed_response.clone(),
                ),
                signed_response_payload_schema_check(
                    exchange_uuid,
                    schemas.signed_response_payload.clone(),
                ),
                signed_response_check(exchange_uuid, ctx_receiver_key, code),
            ],
            StartExpectation::Status(_) => Vec::new(),
        }
    }
}

impl fmt::Display for StartExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartExpectation::Started { missing_documents } => write!(f, "MD:{missing_documents}"),
            StartExpectation::Signed(code) => write!(f, "{code}"),
            StartExpectation::Status(status) => write!(f, "{status}"),
        }
    }
}

/// The envelope reference in `/v3/envelopes/{reference}/...`.
fn envelope_reference_in(exchange: &ConformanceExchange) -> Option<BusinessKey> {
    let mut segments = exchange.request.path().split('/');
    segments.find(|s| *s == "envelopes")?;
    segments
        .next()
        .filter(|s| !s.is_empty())
        .map(|reference| BusinessKey {
            name: ENVELOPE_REFERENCE,
            value: reference.to_string(),
        })
}

fn is_request(
    exchange: &ConformanceExchange,
    method: &str,
    matches_path: impl Fn(&str) -> bool,
) -> bool {
    exchange.request.method.eq_ignore_ascii_case(method) && matches_path(exchange.request.path())
}

fn receiver_key(ctx: &PintContext) -> Option<String> {
    ctx.receiver.as_ref().map(|r| r.receivers_public_key.clone())
}

// ── POST /envelopes ─────────────────────────────────────────────────────────

/// Start a transfer, or send the same envelope again.
pub struct EnvelopeTransfer {
    core: ActionCore<PintContext>,
    kind: PintActionType,
    transmission_class: SenderTransmissionClass,
    expectation: StartExpectation,
    schemas: Arc<PintSchemas>,
}

impl EnvelopeTransfer {
    pub fn start(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        transmission_class: SenderTransmissionClass,
        expectation: StartExpectation,
        schemas: Arc<PintSchemas>,
    ) -> Self {
        Self::new(
            previous,
            sender,
            receiver,
            PintActionType::StartTransfer,
            transmission_class,
            expectation,
            schemas,
        )
    }

    pub fn retry(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        expectation: StartExpectation,
        schemas: Arc<PintSchemas>,
    ) -> Self {
        Self::retry_as(
            previous,
            sender,
            receiver,
            SenderTransmissionClass::ValidTransfer,
            expectation,
            schemas,
        )
    }

    /// Send the envelope of an earlier transfer again, altered as
    /// `transmission_class` says.
    pub fn retry_as(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        transmission_class: SenderTransmissionClass,
        expectation: StartExpectation,
        schemas: Arc<PintSchemas>,
    ) -> Self {
        Self::new(
            previous,
            sender,
            receiver,
            PintActionType::RetryTransfer,
            transmission_class,
            expectation,
            schemas,
        )
    }

    fn new(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        kind: PintActionType,
        transmission_class: SenderTransmissionClass,
        expectation: StartExpectation,
        schemas: Arc<PintSchemas>,
    ) -> Self {
        let title = match transmission_class {
            SenderTransmissionClass::ValidTransfer => format!("{kind}({expectation})"),
            class => format!("{kind}({class}, {expectation})"),
        };
        Self {
            core: ActionCore::new(
                previous,
                title,
                sender,
                receiver,
                Capabilities::EXCHANGE,
            ),
            kind,
            transmission_class,
            expectation,
            schemas,
        }
    }
}

impl ConformanceAction<PintContext> for EnvelopeTransfer {
    fn core(&self) -> &ActionCore<PintContext> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore<PintContext> {
        &mut self.core
    }

    fn action_type(&self) -> &'static str {
        self.kind.name()
    }

    fn human_readable_prompt(&self, ctx: &PintContext) -> String {
        let reference = ctx.transport_document_reference().unwrap_or("?");
        match (self.kind, self.transmission_class) {
            (PintActionType::RetryTransfer, SenderTransmissionClass::ValidTransfer) => {
                format!("Send the transfer request for the transport document '{reference}' again")
            }
            (PintActionType::RetryTransfer, SenderTransmissionClass::ResignedLatestEntry) => {
                format!(
                    "Send the transfer request for the transport document '{reference}' again, \
                     with the latest transfer chain entry signed again"
                )
            }
            (PintActionType::RetryTransfer, class) => format!(
                "Send the transfer request for the transport document '{reference}' again ({class})"
            ),
            (_, SenderTransmissionClass::ManipulatedTransactions) => format!(
                "Send a transfer request for the transport document '{reference}' in which an \
                 earlier transfer chain entry was altered after the next entry linked to it"
            ),
            (_, class) => format!(
                "Send a transfer request for the transport document '{reference}' ({class})"
            ),
        }
    }

    fn prompt_details(&self, ctx: &PintContext) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("transmissionClass".into(), json!(self.transmission_class));
        details.insert("senderScenarioParameters".into(), json!(ctx.sender));
        details.insert("receiverScenarioParameters".into(), json!(ctx.receiver));
        details
    }

    fn matches_exchange(&self, exchange: &ConformanceExchange) -> bool {
        let message = &exchange.request.message;
        message.source_party_name == self.core.source_party_name()
            && message.target_party_name == self.core.target_party_name()
            && is_request(exchange, "POST", |path| path.ends_with("/envelopes"))
    }

    fn exchange_business_key(&self, exchange: &ConformanceExchange) -> Option<BusinessKey> {
        exchange
            .request
            .message
            .body
            .pointer("/transportDocument/transportDocumentReference")
            .and_then(Value::as_str)
            .map(|reference| BusinessKey {
                name: TRANSPORT_DOCUMENT_REFERENCE,
                value: reference.to_string(),
            })
    }

    fn apply_exchange(
        &mut self,
        exchange: &ConformanceExchange,
        ctx: &PintContext,
    ) -> Result<(), EngineError> {
        let mut dynamic = ctx.dynamic_or_default();
        if let Ok(view) = EnvelopeView::parse(&exchange.request.message.body) {
            dynamic.transport_document_checksum =
                Some(crate::crypto::json_checksum(view.transport_document));
            dynamic.document_checksums = view.manifest_document_checksums();
        }
        if exchange.response.status_code == 201 {
            let body = &exchange.response.message.body;
            if let Some(reference) = body.get("envelopeReference").and_then(Value::as_str) {
                dynamic.envelope_reference = Some(reference.to_string());
            }
            dynamic.missing_document_checksums = body
                .get(MISSING_DOCUMENTS_FIELD)
                .and_then(Value::as_array)
                .map(|missing| {
                    missing
                        .iter()
                        .filter_map(|c| c.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
        }
        self.core.layer_mut().dynamic = Some(dynamic);
        Ok(())
    }

    fn create_check(
        &self,
        expected_api_version: &str,
        ctx: &PintContext,
    ) -> Option<ConformanceCheck> {
        let uuid = self.core.matched_exchange_uuid();
        let version = expected_api_version.to_string();
        let senders_key = ctx.sender.as_ref().map(|s| s.senders_public_key.clone());
        let receivers_key = receiver_key(ctx);
        let reference = ctx.transport_document_reference().map(str::to_string);
        let class = self.transmission_class;
        let signed_properly = class != SenderTransmissionClass::SignatureIssue;
        let linked_properly = class != SenderTransmissionClass::ManipulatedTransactions;
        let expectation = self.expectation;
        let schemas = self.schemas.clone();
        let path = format!("{URL_PREFIX}/envelopes");

        Some(ConformanceCheck::lazy_group(self.core.title(), move || {
            let mut checks = vec![
                url_path_check(SENDING_PLATFORM, uuid, &[path.as_str()]),
                http_method_check(SENDING_PLATFORM, uuid, "POST"),
                api_version_header_check(
                    SENDING_PLATFORM,
                    uuid,
                    HttpMessageType::Request,
                    false,
                    &version,
                ),
                json_schema_check(
                    SENDING_PLATFORM,
                    uuid,
                    HttpMessageType::Request,
                    schemas.envelope_request.clone(),
                ),
                signed_content_schema_check(
                    uuid,
                    schemas.envelope_manifest.clone(),
                    schemas.transfer_chain_entry.clone(),
                ),
                manifest_commitment_check(uuid),
                transport_document_reference_check(uuid, reference.clone()),
                response_status_check(RECEIVING_PLATFORM, uuid, &[expectation.http_status()]),
                api_version_header_check(
                    RECEIVING_PLATFORM,
                    uuid,
                    HttpMessageType::Response,
                    false,
                    &version,
                ),
            ];
            if linked_properly {
                checks.push(transfer_chain_linkage_check(uuid));
            }
            if signed_properly {
                checks.push(request_signatures_check(uuid, senders_key.clone()));
            }
            checks.extend(expectation.response_checks(uuid, receivers_key.clone(), &schemas));
            checks
        }))
    }
}

// ── PUT /envelopes/{reference}/additional-documents/{checksum} ──────────────

pub struct TransferDocument {
    core: ActionCore<PintContext>,
    kind: PintActionType,
    transmission: DocumentTransmission,
    schemas: Arc<PintSchemas>,
}

impl TransferDocument {
    pub fn new(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        transmission: DocumentTransmission,
        schemas: Arc<PintSchemas>,
    ) -> Self {
        Self {
            core: ActionCore::new(
                previous,
                format!("TransferDocument({transmission})"),
                sender,
                receiver,
                Capabilities::EXCHANGE,
            ),
            kind: PintActionType::TransferDocument,
            transmission,
            schemas,
        }
    }

    /// A valid document sent while the receiving platform is failing.
    pub fn receiver_failure(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        schemas: Arc<PintSchemas>,
    ) -> Self {
        Self {
            core: ActionCore::new(
                previous,
                "TransferDocumentReceiverFailure",
                sender,
                receiver,
                Capabilities::EXCHANGE,
            ),
            kind: PintActionType::TransferDocumentReceiverFailure,
            transmission: DocumentTransmission::ValidDocument,
            schemas,
        }
    }

    fn expectation(&self) -> StartExpectation {
        match (self.kind, self.transmission) {
            (PintActionType::TransferDocumentReceiverFailure, _) => StartExpectation::Status(503),
            (
                _,
                DocumentTransmission::CorruptedDocument | DocumentTransmission::UnrelatedDocument,
            ) => StartExpectation::Signed(ResponseCode::InconsistentDocument),
            (_, DocumentTransmission::ValidDocument) => StartExpectation::Status(204),
        }
    }
}

impl ConformanceAction<PintContext> for TransferDocument {
    fn core(&self) -> &ActionCore<PintContext> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore<PintContext> {
        &mut self.core
    }

    fn action_type(&self) -> &'static str {
        self.kind.name()
    }

    fn human_readable_prompt(&self, ctx: &PintContext) -> String {
        let reference = ctx.transport_document_reference().unwrap_or("?");
        match self.transmission {
            DocumentTransmission::ValidDocument => {
                format!("Transfer the next missing additional document of '{reference}'")
            }
            DocumentTransmission::CorruptedDocument => format!(
                "Transfer a corrupted copy of the next missing additional document of '{reference}'"
            ),
            DocumentTransmission::UnrelatedDocument => format!(
                "Transfer a document that is not listed in the manifest of '{reference}'"
            ),
        }
    }

    fn prompt_details(&self, ctx: &PintContext) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("documentTransmission".into(), json!(self.transmission));
        details.insert("senderScenarioParameters".into(), json!(ctx.sender));
        details.insert("dynamicScenarioParameters".into(), json!(ctx.dynamic));
        details
    }

    fn matches_exchange(&self, exchange: &ConformanceExchange) -> bool {
        let message = &exchange.request.message;
        message.source_party_name == self.core.source_party_name()
            && message.target_party_name == self.core.target_party_name()
            && is_request(exchange, "PUT", |path| path.contains("/additional-documents/"))
    }

    fn exchange_business_key(&self, exchange: &ConformanceExchange) -> Option<BusinessKey> {
        envelope_reference_in(exchange)
    }

    fn apply_exchange(
        &mut self,
        exchange: &ConformanceExchange,
        ctx: &PintContext,
    ) -> Result<(), EngineError> {
        let mut dynamic = ctx.dynamic_or_default();
        if exchange.response.status_code == 204 {
            let checksum = exchange.request.path().rsplit('/').next().unwrap_or_default();
            dynamic.missing_document_checksums.retain(|c| c != checksum);
        }
        self.core.layer_mut().dynamic = Some(dynamic);
        Ok(())
    }

    fn create_check(
        &self,
        expected_api_version: &str,
        ctx: &PintContext,
    ) -> Option<ConformanceCheck> {
        let uuid = self.core.matched_exchange_uuid();
        let version = expected_api_version.to_string();
        let listed = ctx.dynamic_or_default().document_checksums;
        let receivers_key = receiver_key(ctx);
        let transmission = self.transmission;
        let expectation = self.expectation();
        let schemas = self.schemas.clone();

        Some(ConformanceCheck::lazy_group(self.core.title(), move || {
            let mut checks = vec![
                http_method_check(SENDING_PLATFORM, uuid, "PUT"),
                api_version_header_check(
                    SENDING_PLATFORM,
                    uuid,
                    HttpMessageType::Request,
                    false,
                    &version,
                ),
                additional_document_check(uuid, listed.clone(), transmission),
                response_status_check(RECEIVING_PLATFORM, uuid, &[expectation.http_status()]),
            ];
            if expectation != StartExpectation::Status(204) {
                checks.push(api_version_header_check(
                    RECEIVING_PLATFORM,
                    uuid,
                    HttpMessageType::Response,
                    false,
                    &version,
                ));
            }
            checks.extend(expectation.response_checks(uuid, receivers_key.clone(), &schemas));
            checks
        }))
    }
}

// ── PUT /envelopes/{reference}/finish-transfer ──────────────────────────────

pub struct FinishTransfer {
    core: ActionCore<PintContext>,
    expected: ResponseCode,
    schemas: Arc<PintSchemas>,
}

impl FinishTransfer {
    pub fn new(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        expected: ResponseCode,
        schemas: Arc<PintSchemas>,
    ) -> Self {
        Self {
            core: ActionCore::new(
                previous,
                format!("FinishTransfer({expected})"),
                sender,
                receiver,
                Capabilities::EXCHANGE,
            ),
            expected,
            schemas,
        }
    }
}

impl ConformanceAction<PintContext> for FinishTransfer {
    fn core(&self) -> &ActionCore<PintContext> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore<PintContext> {
        &mut self.core
    }

    fn action_type(&self) -> &'static str {
        PintActionType::FinishTransfer.name()
    }

    fn human_readable_prompt(&self, ctx: &PintContext) -> String {
        format!(
            "Finish the transfer of the transport document '{}'",
            ctx.transport_document_reference().unwrap_or("?")
        )
    }

    fn prompt_details(&self, ctx: &PintContext) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("senderScenarioParameters".into(), json!(ctx.sender));
        details.insert("dynamicScenarioParameters".into(), json!(ctx.dynamic));
        details
    }

    fn matches_exchange(&self, exchange: &ConformanceExchange) -> bool {
        let message = &exchange.request.message;
        message.source_party_name == self.core.source_party_name()
            && message.target_party_name == self.core.target_party_name()
            && is_request(exchange, "PUT", |path| path.ends_with("/finish-transfer"))
    }

    fn exchange_business_key(&self, exchange: &ConformanceExchange) -> Option<BusinessKey> {
        envelope_reference_in(exchange)
    }

    fn create_check(
        &self,
        expected_api_version: &str,
        ctx: &PintContext,
    ) -> Option<ConformanceCheck> {
        let uuid = self.core.matched_exchange_uuid();
        let version = expected_api_version.to_string();
        let suffix = match ctx.dynamic.as_ref().and_then(|d| d.envelope_reference.as_deref()) {
            Some(reference) => format!("{URL_PREFIX}/envelopes/{reference}/finish-transfer"),
            None => "/finish-transfer".to_string(),
        };
        let receivers_key = receiver_key(ctx);
        let expectation = StartExpectation::Signed(self.expected);
        let schemas = self.schemas.clone();

        Some(ConformanceCheck::lazy_group(self.core.title(), move || {
            let mut checks = vec![
                url_path_check(SENDING_PLATFORM, uuid, &[suffix.as_str()]),
                http_method_check(SENDING_PLATFORM, uuid, "PUT"),
                api_version_header_check(
                    SENDING_PLATFORM,
                    uuid,
                    HttpMessageType::Request,
                    false,
                    &version,
                ),
                response_status_check(RECEIVING_PLATFORM, uuid, &[expectation.http_status()]),
                api_version_header_check(
                    RECEIVING_PLATFORM,
                    uuid,
                    HttpMessageType::Response,
                    false,
                    &version,
                ),
            ];
            checks.extend(expectation.response_checks(uuid, receivers_key.clone(), &schemas));
            checks
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DynamicScenarioParameters;
    use quayside_core::check::SchemaCache;
    use quayside_core::ConformanceRequest;

    fn schemas() -> Arc<PintSchemas> {
        Arc::new(PintSchemas::load(&SchemaCache::new()).unwrap())
    }

    fn put(path: &str, status: u16) -> ConformanceExchange {
        let request = ConformanceRequest::new("PUT", path)
            .from_party("S1", SENDING_PLATFORM)
            .to_party("R1", RECEIVING_PLATFORM)
            .with_body(json!("AAEC"));
        let response = request.create_response(status);
        ConformanceExchange::new(request, response)
    }

    #[test]
    fn titles_name_the_expected_outcome() {
        let s = schemas();
        let start = EnvelopeTransfer::start(
            None,
            "S1",
            "R1",
            SenderTransmissionClass::ValidTransfer,
            StartExpectation::Started { missing_documents: 0 },
            s.clone(),
        );
        let conflict = StartExpectation::Status(409);
        let retry = EnvelopeTransfer::retry(Some(start.core()), "S1", "R1", conflict, s.clone());
        let finish = FinishTransfer::new(Some(retry.core()), "S1", "R1", ResponseCode::Received, s);
        assert_eq!(
            finish.core().action_path(),
            "StartTransfer(MD:0) - RetryTransfer(409) - FinishTransfer(RECE)"
        );
    }

    #[test]
    fn altered_transfers_name_their_transmission_class() {
        let s = schemas();
        let start = EnvelopeTransfer::start(
            None,
            "S1",
            "R1",
            SenderTransmissionClass::ManipulatedTransactions,
            StartExpectation::Signed(ResponseCode::BadEnvelope),
            s.clone(),
        );
        let retry = EnvelopeTransfer::retry_as(
            Some(start.core()),
            "S1",
            "R1",
            SenderTransmissionClass::ResignedLatestEntry,
            StartExpectation::Status(409),
            s.clone(),
        );
        let unrelated = TransferDocument::new(
            Some(retry.core()),
            "S1",
            "R1",
            DocumentTransmission::UnrelatedDocument,
            s,
        );
        assert_eq!(
            unrelated.core().action_path(),
            "StartTransfer(MANIPULATED_TRANSACTIONS, BENV) - \
             RetryTransfer(RESIGNED_LATEST_ENTRY, 409) - \
             TransferDocument(UNRELATED_DOCUMENT)"
        );
        assert_eq!(
            unrelated.expectation(),
            StartExpectation::Signed(ResponseCode::InconsistentDocument)
        );
        let details = retry.prompt_details(&PintContext::default());
        assert_eq!(details["transmissionClass"], "RESIGNED_LATEST_ENTRY");
    }

    #[test]
    fn document_transfer_matches_on_path_and_marks_document_received() {
        let valid = DocumentTransmission::ValidDocument;
        let mut action = TransferDocument::new(None, "S1", "R1", valid, schemas());
        action.core_mut().activate();
        let finish = put("/v3/envelopes/env-1/finish-transfer", 200);
        assert!(!action.matches_exchange(&finish));

        let exchange = put("/v3/envelopes/env-1/additional-documents/abc", 204);
        assert!(action.matches_exchange(&exchange));
        let ctx = PintContext {
            dynamic: Some(DynamicScenarioParameters {
                envelope_reference: Some("env-1".into()),
                document_checksums: vec!["abc".into(), "def".into()],
                missing_document_checksums: vec!["abc".into(), "def".into()],
                ..Default::default()
            }),
            ..Default::default()
        };
        action.handle_exchange(&exchange, &ctx).unwrap();
        assert_eq!(
            action.core().layer().dynamic.as_ref().unwrap().missing_document_checksums,
            vec!["def".to_string()]
        );
    }

    #[test]
    fn document_for_another_envelope_is_a_business_key_mismatch() {
        let valid = DocumentTransmission::ValidDocument;
        let mut action = TransferDocument::new(None, "S1", "R1", valid, schemas());
        action.core_mut().activate();
        let ctx = PintContext {
            dynamic: Some(DynamicScenarioParameters {
                envelope_reference: Some("env-1".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = action
            .handle_exchange(&put("/v3/envelopes/env-2/additional-documents/abc", 204), &ctx)
            .unwrap_err();
        assert!(matches!(err, EngineError::BusinessKeyMismatch { .. }));
    }
}
