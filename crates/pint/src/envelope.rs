//! Building and taking apart transfer envelopes.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::crypto::{self, PayloadSigner};
use crate::model::{IdentifyingCode, ReceiverScenarioParameters};

pub const MANIFEST_FIELD: &str = "envelopeManifestSignedContent";
pub const CHAIN_FIELD: &str = "envelopeTransferChain";
pub const PREVIOUS_ENTRY_FIELD: &str = "previousEnvelopeTransferChainEntrySignedContentChecksum";
pub const LAST_ENTRY_FIELD: &str = "lastEnvelopeTransferChainEntrySignedContentChecksum";
pub const MISSING_DOCUMENTS_FIELD: &str = "missingAdditionalDocumentChecksums";
pub const RECEIVED_DOCUMENTS_FIELD: &str = "receivedAdditionalDocumentChecksums";

/// A supporting document with its content kept as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportingDocument {
    pub name: String,
    pub content: String,
    pub checksum: String,
    pub size: usize,
}

impl SupportingDocument {
    /// 256 bytes counting up from zero, then 16 random bytes so every
    /// document has a distinct checksum.
    pub fn generate(index: usize) -> Self {
        let mut bytes: Vec<u8> = (0..=255u8).collect();
        bytes.extend_from_slice(Uuid::new_v4().as_bytes());
        Self {
            name: format!("supporting-document-{}.bin", index + 1),
            checksum: crypto::sha256_hex(&bytes),
            size: bytes.len(),
            content: BASE64.encode(&bytes),
        }
    }

    /// The content with its first byte flipped; the checksum no longer
    /// matches.
    pub fn corrupted_content(&self) -> String {
        let mut bytes = BASE64.decode(&self.content).unwrap_or_default();
        if let Some(first) = bytes.first_mut() {
            *first ^= 0xFF;
        } else {
            bytes.push(0xFF);
        }
        BASE64.encode(bytes)
    }

    fn manifest_entry(&self) -> Value {
        json!({
            "name": self.name,
            "size": self.size,
            "mediaType": "application/octet-stream",
            "documentChecksum": self.checksum,
        })
    }
}

/// An actor or recipient of a transaction in the transfer chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionParty {
    pub ebl_platform: String,
    pub party_name: String,
    pub identifying_codes: Vec<IdentifyingCode>,
}

impl TransactionParty {
    pub fn new(platform: &str, name: &str, code: &str) -> Self {
        Self {
            ebl_platform: platform.to_string(),
            party_name: name.to_string(),
            identifying_codes: vec![IdentifyingCode {
                code_list_provider: "EPUI".into(),
                party_code: code.to_string(),
            }],
        }
    }

    pub fn recipient_of(receiver: &ReceiverScenarioParameters) -> Self {
        let party = &receiver.receiver_party;
        Self {
            ebl_platform: receiver.ebl_platform.clone(),
            party_name: party.party_name.clone(),
            identifying_codes: vec![IdentifyingCode {
                code_list_provider: party.code_list_provider.clone(),
                party_code: party.party_code.clone(),
            }],
        }
    }
}

pub fn transport_document(reference: &str, platform: &str) -> Value {
    json!({
        "transportDocumentReference": reference,
        "transportDocumentTypeCode": "BOL",
        "isShippedOnBoardType": true,
        "isElectronic": true,
        "isToOrder": false,
        "issuingPlatform": platform,
        "shippingInstructionsReference": format!("SI-{}", trailing_chars(reference, 9)),
    })
}

/// The last `n` characters of `s`, or all of it when shorter.
fn trailing_chars(s: &str, n: usize) -> &str {
    match n.checked_sub(1) {
        Some(skip) => s.char_indices().rev().nth(skip).map_or(s, |(i, _)| &s[i..]),
        None => "",
    }
}

/// The parts needed to sign a transfer of one document.
pub struct EnvelopeParts<'a> {
    pub transport_document: &'a Value,
    pub platform: &'a str,
    pub issuer: TransactionParty,
    pub holder: TransactionParty,
    pub recipient: TransactionParty,
    pub documents: &'a [SupportingDocument],
    pub action_date_time: &'a str,
}

impl EnvelopeParts<'_> {
    /// A two-entry chain (issuance, then transfer to the recipient) signed by
    /// `chain_signer`, and a manifest signed by `manifest_signer`.
    pub fn sign(&self, chain_signer: &PayloadSigner, manifest_signer: &PayloadSigner) -> Value {
        self.sign_chain(chain_signer, manifest_signer, false)
    }

    /// Like [`EnvelopeParts::sign`], but the issuance entry is altered and
    /// signed again after the transfer entry committed to it. Every entry
    /// still carries a valid signature while the transfer entry's back-link
    /// no longer matches its predecessor.
    pub fn sign_with_manipulated_issuance(&self, signer: &PayloadSigner) -> Value {
        self.sign_chain(signer, signer, true)
    }

    fn sign_chain(
        &self,
        chain_signer: &PayloadSigner,
        manifest_signer: &PayloadSigner,
        manipulate_issuance: bool,
    ) -> Value {
        let document_checksum = crypto::json_checksum(self.transport_document);
        let mut issuance_payload = json!({
            "eblPlatform": self.platform,
            "transportDocumentChecksum": document_checksum,
            PREVIOUS_ENTRY_FIELD: null,
            "transactions": [{
                "action": "ISSU",
                "actor": self.issuer,
                "recipient": self.holder,
                "actionDateTime": self.action_date_time,
            }],
        });
        let mut issuance = chain_signer.sign(&issuance_payload);
        let transfer = chain_signer.sign(&json!({
            "eblPlatform": self.platform,
            "transportDocumentChecksum": document_checksum,
            PREVIOUS_ENTRY_FIELD: crypto::signed_content_checksum(&issuance),
            "transactions": [{
                "action": "TRNS",
                "actor": self.holder,
                "recipient": self.recipient,
                "actionDateTime": self.action_date_time,
            }],
        }));
        if manipulate_issuance {
            issuance_payload["transactions"][0]["recipient"]["partyName"] =
                json!(format!("{} (manipulated)", self.holder.party_name));
            issuance = chain_signer.sign(&issuance_payload);
        }
        let supporting_documents: Vec<Value> = self
            .documents
            .iter()
            .map(SupportingDocument::manifest_entry)
            .collect();
        let manifest = manifest_signer.sign(&json!({
            "transportDocumentChecksum": document_checksum,
            LAST_ENTRY_FIELD: crypto::signed_content_checksum(&transfer),
            "supportingDocuments": supporting_documents,
        }));
        json!({
            "transportDocument": self.transport_document,
            MANIFEST_FIELD: manifest,
            CHAIN_FIELD: [issuance, transfer],
        })
    }
}

/// A copy of `envelope` whose last chain entry is signed again with its
/// transactions dated `action_date_time`, and whose manifest is signed
/// again to commit to the new entry.
pub fn resign_latest_entry(
    envelope: &Value,
    signer: &PayloadSigner,
    action_date_time: &str,
) -> Result<Value, String> {
    let view = EnvelopeView::parse(envelope)?;
    let mut entry = crypto::decode_payload(view.last_entry()).map_err(|e| e.to_string())?;
    let mut manifest = crypto::decode_payload(view.manifest).map_err(|e| e.to_string())?;
    if let Some(transactions) = entry.get_mut("transactions").and_then(Value::as_array_mut) {
        for transaction in transactions {
            transaction["actionDateTime"] = json!(action_date_time);
        }
    }
    let resigned = signer.sign(&entry);
    manifest[LAST_ENTRY_FIELD] = json!(crypto::signed_content_checksum(&resigned));
    let last = view.chain.len() - 1;
    let mut result = envelope.clone();
    result[CHAIN_FIELD][last] = json!(resigned);
    result[MANIFEST_FIELD] = json!(signer.sign(&manifest));
    Ok(result)
}

/// Borrowed view of a `POST /envelopes` request body.
#[derive(Debug)]
pub struct EnvelopeView<'a> {
    pub transport_document: &'a Value,
    pub manifest: &'a str,
    pub chain: Vec<&'a str>,
}

impl<'a> EnvelopeView<'a> {
    pub fn parse(body: &'a Value) -> Result<Self, String> {
        let transport_document = body
            .get("transportDocument")
            .filter(|td| td.is_object())
            .ok_or("missing 'transportDocument'")?;
        let manifest = body
            .get(MANIFEST_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| format!("missing '{MANIFEST_FIELD}'"))?;
        let chain = body
            .get(CHAIN_FIELD)
            .and_then(Value::as_array)
            .filter(|entries| !entries.is_empty())
            .ok_or_else(|| format!("missing or empty '{CHAIN_FIELD}'"))?
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .ok_or_else(|| format!("'{CHAIN_FIELD}' must contain signed content strings"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            transport_document,
            manifest,
            chain,
        })
    }

    pub fn transport_document_reference(&self) -> Option<&'a str> {
        self.transport_document
            .get("transportDocumentReference")
            .and_then(Value::as_str)
    }

    pub fn last_entry(&self) -> &'a str {
        self.chain[self.chain.len() - 1]
    }

    /// Checksums of the supporting documents listed in the manifest.
    pub fn manifest_document_checksums(&self) -> Vec<String> {
        crypto::decode_payload(self.manifest)
            .ok()
            .and_then(|payload| payload.get("supportingDocuments").cloned())
            .and_then(|docs| docs.as_array().cloned())
            .unwrap_or_default()
            .iter()
            .filter_map(|doc| doc.get("documentChecksum")?.as_str().map(str::to_string))
            .collect()
    }

    /// One message per chain entry whose back-link does not hold the
    /// checksum of its predecessor. The first entry must have no back-link.
    pub fn chain_linkage_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        if let Some(seed) = self.chain.first().and_then(|first| previous_entry_checksum(first)) {
            violations.push(format!(
                "The checksum in '{CHAIN_FIELD}[0].{PREVIOUS_ENTRY_FIELD}' was '{seed}' but it \
                 should have been null (the first entry has no predecessor)"
            ));
        }
        for (i, pair) in self.chain.windows(2).enumerate() {
            let expected = crypto::signed_content_checksum(pair[0]);
            let actual = previous_entry_checksum(pair[1]).unwrap_or_else(|| "null".into());
            if actual != expected {
                violations.push(format!(
                    "The checksum in '{CHAIN_FIELD}[{}].{PREVIOUS_ENTRY_FIELD}' was '{actual}' \
                     but it should have been '{expected}' (which is the checksum of the preceding \
                     item)",
                    i + 1
                ));
            }
        }
        violations
    }

    /// One message per commitment of the manifest that does not match the
    /// chain or the transport document.
    pub fn manifest_violations(&self) -> Vec<String> {
        let manifest = match crypto::decode_payload(self.manifest) {
            Ok(manifest) => manifest,
            Err(e) => return vec![format!("The '{MANIFEST_FIELD}' cannot be decoded: {e}")],
        };
        let mut violations = Vec::new();
        let expected_entry = crypto::signed_content_checksum(self.last_entry());
        let actual_entry = manifest[LAST_ENTRY_FIELD].as_str().unwrap_or("null");
        if actual_entry != expected_entry {
            violations.push(format!(
                "The checksum in '{MANIFEST_FIELD}.{LAST_ENTRY_FIELD}' was '{actual_entry}' but \
                 it should have been '{expected_entry}' (which is the checksum of the last \
                 transfer chain entry)"
            ));
        }
        let expected_document = crypto::json_checksum(self.transport_document);
        let actual_document = manifest["transportDocumentChecksum"].as_str().unwrap_or("null");
        if actual_document != expected_document {
            violations.push(format!(
                "The checksum in '{MANIFEST_FIELD}.transportDocumentChecksum' was \
                 '{actual_document}' but it should have been '{expected_document}' (which is the \
                 checksum of the transport document)"
            ));
        }
        let last = crypto::decode_payload(self.last_entry()).unwrap_or(Value::Null);
        let entry_document = last["transportDocumentChecksum"].as_str().unwrap_or("null");
        if entry_document != expected_document {
            violations.push(format!(
                "The checksum in '{CHAIN_FIELD}[{}].transportDocumentChecksum' was \
                 '{entry_document}' but it should have been '{expected_document}' (which is the \
                 checksum of the transport document)",
                self.chain.len() - 1
            ));
        }
        violations
    }

    /// The recipient of the last transaction of the last chain entry.
    pub fn final_recipient(&self) -> Option<TransactionParty> {
        let last = crypto::decode_payload(self.last_entry()).ok()?;
        let transaction = last.get("transactions")?.as_array()?.last()?.clone();
        serde_json::from_value(transaction.get("recipient")?.clone()).ok()
    }
}

fn previous_entry_checksum(entry: &str) -> Option<String> {
    crypto::decode_payload(entry)
        .ok()?
        .get(PREVIOUS_ENTRY_FIELD)?
        .as_str()
        .map(str::to_string)
}
