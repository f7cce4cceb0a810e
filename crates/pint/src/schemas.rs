use std::sync::Arc;

use quayside_core::check::{JsonSchemaValidator, SchemaCache};
use quayside_core::EngineError;

/// Compiled validators for every PINT message.
pub struct PintSchemas {
    pub envelope_request: Arc<JsonSchemaValidator>,
    pub envelope_manifest: Arc<JsonSchemaValidator>,
    pub transfer_chain_entry: Arc<JsonSchemaValidator>,
    pub transfer_started_response: Arc<JsonSchemaValidator>,
    pub signed_response: Arc<JsonSchemaValidator>,
    pub signed_response_payload: Arc<JsonSchemaValidator>,
    pub receiver_validation_request: Arc<JsonSchemaValidator>,
    pub receiver_validation_response: Arc<JsonSchemaValidator>,
}

impl PintSchemas {
    pub fn load(cache: &SchemaCache) -> Result<Self, EngineError> {
        Ok(Self {
            envelope_request: cache.get_or_compile(
                "EnvelopeTransferRequest",
                include_str!("../schemas/envelope-request.json"),
            )?,
            envelope_manifest: cache.get_or_compile(
                "EnvelopeManifest",
                include_str!("../schemas/envelope-manifest.json"),
            )?,
            transfer_chain_entry: cache.get_or_compile(
                "EnvelopeTransferChainEntry",
                include_str!("../schemas/transfer-chain-entry.json"),
            )?,
            transfer_started_response: cache.get_or_compile(
                "EnvelopeTransferStartedResponse",
                include_str!("../schemas/transfer-started-response.json"),
            )?,
            signed_response: cache.get_or_compile(
                "EnvelopeTransferFinishedResponseSignedContent",
                include_str!("../schemas/signed-response.json"),
            )?,
            signed_response_payload: cache.get_or_compile(
                "EnvelopeTransferFinishedResponse",
                include_str!("../schemas/signed-response-payload.json"),
            )?,
            receiver_validation_request: cache.get_or_compile(
                "IdentifyingCode",
                include_str!("../schemas/receiver-validation-request.json"),
            )?,
            receiver_validation_response: cache.get_or_compile(
                "ReceiverValidationResponse",
                include_str!("../schemas/receiver-validation-response.json"),
            )?,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::crypto::{self, PayloadSigner};
    use crate::envelope::tests::signed_envelope;
    use crate::envelope::SupportingDocument;

    #[test]
    fn generated_envelope_matches_schemas() {
        let schemas = PintSchemas::load(&SchemaCache::new()).unwrap();
        let signer = PayloadSigner::generate();
        let body = signed_envelope(&signer, &[SupportingDocument::generate(0)]);

        assert!(schemas.envelope_request.validate(&body).is_empty());
        let signed_manifest = body["envelopeManifestSignedContent"].as_str().unwrap();
        let manifest = crypto::decode_payload(signed_manifest).unwrap();
        assert!(schemas.envelope_manifest.validate(&manifest).is_empty());
        for entry in body["envelopeTransferChain"].as_array().unwrap() {
            let payload = crypto::decode_payload(entry.as_str().unwrap()).unwrap();
            assert_eq!(schemas.transfer_chain_entry.validate(&payload), Default::default());
        }
    }

    #[test]
    fn signed_response_shapes() {
        let schemas = PintSchemas::load(&SchemaCache::new()).unwrap();
        let jws = PayloadSigner::generate().sign(&json!({"responseCode": "RECE"}));
        assert!(schemas.signed_response.validate(&json!(jws)).is_empty());
        assert!(!schemas.signed_response.validate(&json!({"responseCode": "RECE"})).is_empty());
        assert!(!schemas
            .signed_response_payload
            .validate(&json!({"responseCode": "NOPE"}))
            .is_empty());
    }
}
