//! PINT specific checks of envelopes and signed responses.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use quayside_core::check::JsonSchemaValidator;
use quayside_core::{ConformanceCheck, HttpMessageType, Violations};

use crate::crypto;
use crate::envelope::{EnvelopeView, CHAIN_FIELD, MANIFEST_FIELD, MISSING_DOCUMENTS_FIELD};
use crate::model::{DocumentTransmission, ResponseCode, RECEIVING_PLATFORM, SENDING_PLATFORM};

fn single(message: String) -> Violations {
    BTreeSet::from([message])
}

/// Run `validate` on the envelope of the request, or report why there is none.
fn with_envelope<F>(body: &Value, validate: F) -> Violations
where
    F: FnOnce(&EnvelopeView<'_>) -> Violations,
{
    match EnvelopeView::parse(body) {
        Ok(view) => validate(&view),
        Err(reason) => single(format!("The request body is not a valid envelope: {reason}")),
    }
}

// ── Request side ────────────────────────────────────────────────────────────

pub fn request_signatures_check(
    exchange_uuid: Option<Uuid>,
    senders_public_key: Option<String>,
) -> ConformanceCheck {
    ConformanceCheck::leaf(
        "The signatures of the signed content of the HTTP request can be validated",
        exchange_uuid,
        HttpMessageType::Request,
        move |exchange| {
            let Some(key) = senders_public_key.as_deref() else {
                return single("The public key of the sending platform is unknown".into());
            };
            with_envelope(&exchange.request.message.body, |view| {
                let signed = std::iter::once((MANIFEST_FIELD.to_string(), view.manifest)).chain(
                    view.chain
                        .iter()
                        .enumerate()
                        .map(|(i, entry)| (format!("{CHAIN_FIELD}[{i}]"), *entry)),
                );
                signed
                    .filter_map(|(path, content)| {
                        crypto::verify(content, key).err().map(|e| {
                            format!("The signature of '{path}' could not be validated: {e}")
                        })
                    })
                    .collect()
            })
        },
    )
    .for_role(SENDING_PLATFORM)
}

pub fn transfer_chain_linkage_check(exchange_uuid: Option<Uuid>) -> ConformanceCheck {
    ConformanceCheck::leaf(
        "The envelope transfer chain entries are linked by checksum",
        exchange_uuid,
        HttpMessageType::Request,
        |exchange| {
            with_envelope(&exchange.request.message.body, |view| {
                view.chain_linkage_violations().into_iter().collect()
            })
        },
    )
    .for_role(SENDING_PLATFORM)
}

pub fn manifest_commitment_check(exchange_uuid: Option<Uuid>) -> ConformanceCheck {
    ConformanceCheck::leaf(
        "The envelope manifest matches the transfer chain and the transport document",
        exchange_uuid,
        HttpMessageType::Request,
        |exchange| {
            with_envelope(&exchange.request.message.body, |view| {
                view.manifest_violations().into_iter().collect()
            })
        },
    )
    .for_role(SENDING_PLATFORM)
}

/// The signed payloads of the request must match their schemas.
pub fn signed_content_schema_check(
    exchange_uuid: Option<Uuid>,
    manifest_schema: Arc<JsonSchemaValidator>,
    chain_entry_schema: Arc<JsonSchemaValidator>,
) -> ConformanceCheck {
    ConformanceCheck::leaf(
        "The signed content of the HTTP request matches the standard JSON schema",
        exchange_uuid,
        HttpMessageType::Request,
        move |exchange| {
            with_envelope(&exchange.request.message.body, |view| {
                let mut violations = Violations::new();
                let mut validate = |path: String, content: &str, schema: &JsonSchemaValidator| {
                    match crypto::decode_payload(content) {
                        Ok(payload) => violations.extend(
                            schema
                                .validate(&payload)
                                .into_iter()
                                .map(|e| format!("{path}: {e}")),
                        ),
                        Err(e) => {
                            violations.insert(format!("{path}: {e}"));
                        }
                    }
                };
                validate(MANIFEST_FIELD.to_string(), view.manifest, manifest_schema.as_ref());
                for (i, entry) in view.chain.iter().enumerate() {
                    validate(format!("{CHAIN_FIELD}[{i}]"), *entry, chain_entry_schema.as_ref());
                }
                violations
            })
        },
    )
    .for_role(SENDING_PLATFORM)
}

pub fn transport_document_reference_check(
    exchange_uuid: Option<Uuid>,
    expected: Option<String>,
) -> ConformanceCheck {
    ConformanceCheck::leaf(
        "The transportDocumentReference of the request is correct",
        exchange_uuid,
        HttpMessageType::Request,
        move |exchange| {
            let actual = exchange
                .request
                .message
                .body
                .pointer("/transportDocument/transportDocumentReference")
                .and_then(Value::as_str);
            match (actual, expected.as_deref()) {
                (Some(actual), Some(expected)) if actual == expected => Violations::new(),
                (actual, expected) => single(format!(
                    "The transportDocumentReference was '{}' but it should have been '{}'",
                    actual.unwrap_or("null"),
                    expected.unwrap_or("null")
                )),
            }
        },
    )
    .for_role(SENDING_PLATFORM)
}

/// A transferred document must be one of the documents listed in the
/// manifest and, unless deliberately corrupted, hash to the checksum in its
/// URL.
/// A valid document must be listed and intact. A corrupted one need only be
/// listed; an unrelated one need only be intact.
pub fn additional_document_check(
    exchange_uuid: Option<Uuid>,
    listed: Vec<String>,
    transmission: DocumentTransmission,
) -> ConformanceCheck {
    let expect_listed = transmission != DocumentTransmission::UnrelatedDocument;
    let expect_intact = transmission != DocumentTransmission::CorruptedDocument;
    ConformanceCheck::leaf(
        "The transferred additional document matches its checksum",
        exchange_uuid,
        HttpMessageType::Request,
        move |exchange| {
            let url_checksum = exchange.request.path().rsplit('/').next().unwrap_or_default();
            let mut violations = Violations::new();
            let is_listed = listed.iter().any(|c| c == url_checksum);
            if expect_listed && !is_listed {
                violations.insert(format!(
                    "The checksum '{url_checksum}' in the request URL was not listed in the \
                     initial transfer request"
                ));
            }
            if !expect_listed && is_listed {
                violations.insert(format!(
                    "The checksum '{url_checksum}' in the request URL should not have been listed \
                     in the initial transfer request"
                ));
            }
            match exchange.request.message.body.as_str().and_then(crypto::document_checksum) {
                Some(actual) if actual == url_checksum || !expect_intact => {}
                Some(actual) => {
                    violations.insert(format!(
                        "The document content has checksum '{actual}' but it should have been \
                         '{url_checksum}'"
                    ));
                }
                None => {
                    violations.insert("The request body is not a base64 encoded document".into());
                }
            }
            violations
        },
    )
    .for_role(SENDING_PLATFORM)
}

// ── Response side ───────────────────────────────────────────────────────────

pub fn signed_response_check(
    exchange_uuid: Option<Uuid>,
    receivers_public_key: Option<String>,
    expected: ResponseCode,
) -> ConformanceCheck {
    ConformanceCheck::leaf(
        "The signed response is valid and has the expected response code",
        exchange_uuid,
        HttpMessageType::Response,
        move |exchange| {
            let Some(jws) = exchange.response.message.body.as_str() else {
                return single("The response body is not signed content".into());
            };
            let payload = match receivers_public_key.as_deref() {
                Some(key) => match crypto::verify(jws, key) {
                    Ok(payload) => payload,
                    Err(e) => {
                        return single(format!(
                            "The signature of the response could not be validated: {e}"
                        ))
                    }
                },
                None => return single("The public key of the receiving platform is unknown".into()),
            };
            match payload.get("responseCode").and_then(Value::as_str) {
                Some(code) if code == expected.code() => Violations::new(),
                actual => single(format!(
                    "The responseCode was '{}' but it should have been '{}'",
                    actual.unwrap_or("null"),
                    expected
                )),
            }
        },
    )
    .for_role(RECEIVING_PLATFORM)
}

pub fn signed_response_payload_schema_check(
    exchange_uuid: Option<Uuid>,
    schema: Arc<JsonSchemaValidator>,
) -> ConformanceCheck {
    ConformanceCheck::leaf(
        "The signed content of the HTTP response matches the standard JSON schema",
        exchange_uuid,
        HttpMessageType::Response,
        move |exchange| {
            match exchange
                .response
                .message
                .body
                .as_str()
                .map(crypto::decode_payload)
            {
                Some(Ok(payload)) => schema.validate(&payload),
                Some(Err(e)) => single(format!("The signed response cannot be decoded: {e}")),
                None => single("The response body is not signed content".into()),
            }
        },
    )
    .for_role(RECEIVING_PLATFORM)
}

fn missing_documents(exchange_body: &Value) -> Option<Vec<&str>> {
    exchange_body
        .get(MISSING_DOCUMENTS_FIELD)?
        .as_array()?
        .iter()
        .map(Value::as_str)
        .collect()
}

pub fn missing_documents_size_check(
    exchange_uuid: Option<Uuid>,
    expected: usize,
) -> ConformanceCheck {
    ConformanceCheck::leaf(
        format!("The response lists {expected} missing additional documents"),
        exchange_uuid,
        HttpMessageType::Response,
        move |exchange| match missing_documents(&exchange.response.message.body) {
            Some(missing) if missing.len() == expected => Violations::new(),
            Some(missing) => single(format!(
                "The size of the array at '{MISSING_DOCUMENTS_FIELD}' was {}, but it should have \
                 been {expected}",
                missing.len()
            )),
            None => single(format!(
                "The attribute '{MISSING_DOCUMENTS_FIELD}' should have been present, but was absent"
            )),
        },
    )
    .for_role(RECEIVING_PLATFORM)
}

/// Every checksum reported missing must be one the sender listed.
pub fn missing_documents_listed_check(exchange_uuid: Option<Uuid>) -> ConformanceCheck {
    ConformanceCheck::leaf(
        "The missing additional documents were listed in the transfer request",
        exchange_uuid,
        HttpMessageType::Response,
        |exchange| {
            let Some(missing) = missing_documents(&exchange.response.message.body) else {
                return Violations::new();
            };
            let listed = EnvelopeView::parse(&exchange.request.message.body)
                .map(|view| view.manifest_document_checksums())
                .unwrap_or_default();
            missing
                .into_iter()
                .filter(|checksum| !listed.iter().any(|l| l.as_str() == *checksum))
                .map(|checksum| {
                    format!(
                        "The checksum '{checksum}' at '{MISSING_DOCUMENTS_FIELD}' was not listed \
                         in the initial transfer request"
                    )
                })
                .collect()
        },
    )
    .for_role(RECEIVING_PLATFORM)
}
