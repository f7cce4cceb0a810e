//! Both PINT platforms wired back to back, driven by hand-written prompts.

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use quayside_core::{
    ConformanceParty, ConformanceRequest, ConformanceResponse, EngineError, PartyConfiguration,
    PartyOutbound,
};
use quayside_pint::crypto;
use quayside_pint::{
    PintReceivingPlatform, PintSendingPlatform, RECEIVING_PLATFORM, SENDING_PLATFORM,
};

/// Delivers requests straight to the receiving platform and keeps inputs.
struct Loopback {
    receiver: Option<tokio::sync::Mutex<PintReceivingPlatform>>,
    inputs: Mutex<Vec<Value>>,
    statuses: Mutex<Vec<u16>>,
    bodies: Mutex<Vec<Value>>,
    refuse_next: Mutex<bool>,
}

impl Loopback {
    fn new(receiver: Option<PintReceivingPlatform>) -> Self {
        Self {
            receiver: receiver.map(tokio::sync::Mutex::new),
            inputs: Mutex::new(Vec::new()),
            statuses: Mutex::new(Vec::new()),
            bodies: Mutex::new(Vec::new()),
            refuse_next: Mutex::new(false),
        }
    }

    fn last_input(&self) -> Value {
        self.inputs.lock().unwrap().last().cloned().unwrap()
    }

    fn last_status(&self) -> u16 {
        *self.statuses.lock().unwrap().last().unwrap()
    }

    fn last_body(&self) -> Value {
        self.bodies.lock().unwrap().last().cloned().unwrap()
    }
}

#[async_trait]
impl PartyOutbound for Loopback {
    async fn send_request(
        &self,
        request: ConformanceRequest,
    ) -> Result<ConformanceResponse, EngineError> {
        if std::mem::take(&mut *self.refuse_next.lock().unwrap()) {
            return Err(EngineError::Outbound("connection refused".into()));
        }
        let receiver = self.receiver.as_ref().expect("no receiver wired");
        let response = receiver.lock().await.handle_request(&request).await?;
        self.statuses.lock().unwrap().push(response.status_code);
        self.bodies.lock().unwrap().push(response.message.body.clone());
        Ok(response)
    }

    async fn post_input(&self, _action_id: Uuid, input: Value) -> Result<(), EngineError> {
        self.inputs.lock().unwrap().push(input);
        Ok(())
    }
}

fn configuration(name: &str, role: &str) -> PartyConfiguration {
    PartyConfiguration {
        name: name.into(),
        role: role.into(),
        in_sandbox: true,
    }
}

fn prompt(action_type: &str, target: &str, details: Value) -> Value {
    let mut prompt = json!({
        "actionId": Uuid::new_v4(),
        "actionType": action_type,
        "targetPartyName": target,
    });
    for (key, value) in details.as_object().cloned().unwrap_or_default() {
        prompt[key.as_str()] = value;
    }
    prompt
}

struct Platforms {
    sender: PintSendingPlatform,
    link: Loopback,
    sender_parameters: Value,
    receiver_parameters: Value,
}

async fn set_up(document_count: usize) -> Platforms {
    let mut sender = PintSendingPlatform::new(configuration("Sender1", SENDING_PLATFORM), None);
    let mut receiver =
        PintReceivingPlatform::new(configuration("Receiver1", RECEIVING_PLATFORM), None);

    let inputs = Loopback::new(None);
    let count = json!({ "documentCount": document_count });
    sender
        .handle_prompt(&prompt("SupplySenderParameters", "Receiver1", count), &inputs)
        .await
        .unwrap();
    let sender_parameters = inputs.last_input();
    assert_eq!(sender_parameters["documentCount"], json!(document_count));

    let setup = json!({
        "scenarioClass": "NO_ISSUES",
        "senderScenarioParameters": sender_parameters,
    });
    receiver
        .handle_prompt(&prompt("ReceiverStateSetup", "Sender1", setup), &inputs)
        .await
        .unwrap();
    let receiver_parameters = inputs.last_input();
    assert_eq!(receiver_parameters["eblPlatform"], "CARX");

    Platforms {
        sender,
        link: Loopback::new(Some(receiver)),
        sender_parameters,
        receiver_parameters,
    }
}

impl Platforms {
    fn prompt(&self, action_type: &str, extra: Value) -> Value {
        let mut details = json!({
            "senderScenarioParameters": self.sender_parameters,
            "receiverScenarioParameters": self.receiver_parameters,
        });
        for (key, value) in extra.as_object().cloned().unwrap_or_default() {
            details[key.as_str()] = value;
        }
        prompt(action_type, "Receiver1", details)
    }

    async fn run(&mut self, action_type: &str, extra: Value) -> u16 {
        let prompt = self.prompt(action_type, extra);
        self.sender.handle_prompt(&prompt, &self.link).await.unwrap();
        self.link.last_status()
    }

    async fn start(&mut self, transmission_class: &str) -> u16 {
        let class = json!({ "transmissionClass": transmission_class });
        self.run("StartTransfer", class).await
    }

    fn signed_payload(&self) -> Value {
        let key = self.receiver_parameters["receiversPublicKey"].as_str().unwrap();
        let jws = self.link.last_body();
        crypto::verify(jws.as_str().unwrap(), key).unwrap()
    }

    fn response_code(&self) -> String {
        self.signed_payload()["responseCode"].as_str().unwrap().to_string()
    }

    async fn receiver_log(&self) -> Vec<String> {
        self.link.receiver.as_ref().unwrap().lock().await.operator_log()
    }
}

#[tokio::test]
async fn identical_resend_after_start_is_a_conflict() {
    let mut platforms = set_up(0).await;
    let valid = json!({ "transmissionClass": "VALID_TRANSFER" });

    assert_eq!(platforms.run("StartTransfer", valid.clone()).await, 201);
    assert_eq!(platforms.link.last_body()["missingAdditionalDocumentChecksums"], json!([]));

    assert_eq!(platforms.run("RetryTransfer", json!({})).await, 409);
    let reference = platforms.sender_parameters["transportDocumentReference"]
        .as_str()
        .unwrap()
        .to_string();
    let message = platforms.link.last_body()["message"].as_str().unwrap().to_string();
    assert!(message.contains(&reference));
    assert!(message.contains("ISSUANCE_REQUESTED"));

    let log = platforms.receiver_log().await;
    assert!(log.iter().any(|line| {
        line.contains(&reference) && line.contains("now in state 'ISSUANCE_REQUESTED'")
    }));

    assert_eq!(platforms.run("FinishTransfer", json!({})).await, 200);
    assert_eq!(platforms.response_code(), "RECE");
}

#[tokio::test]
async fn documents_complete_a_transfer() {
    let mut platforms = set_up(2).await;

    assert_eq!(platforms.start("VALID_TRANSFER").await, 201);
    let missing = platforms.link.last_body()["missingAdditionalDocumentChecksums"].clone();
    assert_eq!(missing.as_array().unwrap().len(), 2);

    let valid = json!({ "documentTransmission": "VALID_DOCUMENT" });
    assert_eq!(platforms.run("TransferDocument", valid.clone()).await, 204);

    assert_eq!(platforms.run("RetryTransfer", json!({})).await, 201);
    assert_eq!(
        platforms.link.last_body()["missingAdditionalDocumentChecksums"]
            .as_array()
            .unwrap()
            .len(),
        1
    );

    assert_eq!(
        platforms
            .run("TransferDocument", json!({ "documentTransmission": "CORRUPTED_DOCUMENT" }))
            .await,
        409
    );
    assert_eq!(platforms.response_code(), "INCD");

    assert_eq!(platforms.run("FinishTransfer", json!({})).await, 409);
    assert_eq!(platforms.response_code(), "MDOC");

    assert_eq!(platforms.run("TransferDocument", valid).await, 204);
    assert_eq!(platforms.run("FinishTransfer", json!({})).await, 200);
    assert_eq!(platforms.response_code(), "RECE");
}

#[tokio::test]
async fn signature_and_recipient_problems_are_signed_refusals() {
    let mut platforms = set_up(0).await;
    assert_eq!(platforms.start("SIGNATURE_ISSUE").await, 422);
    assert_eq!(platforms.response_code(), "BSIG");

    assert_eq!(platforms.start("WRONG_RECIPIENT_PLATFORM").await, 422);
    assert_eq!(platforms.response_code(), "BENV");

    // Refused transfers cannot be restarted.
    assert_eq!(platforms.start("VALID_TRANSFER").await, 409);
}

#[tokio::test]
async fn tampered_earlier_chain_entry_is_a_bad_envelope() {
    let mut platforms = set_up(0).await;
    let manipulated = json!({ "transmissionClass": "MANIPULATED_TRANSACTIONS" });
    assert_eq!(platforms.run("StartTransfer", manipulated).await, 422);
    assert_eq!(platforms.response_code(), "BENV");
    let reason = platforms.signed_payload()["reason"].as_str().unwrap().to_string();
    assert!(reason.starts_with("The checksum in 'envelopeTransferChain[1]."), "{reason}");
}

#[tokio::test]
async fn bad_signature_can_be_corrected() {
    let mut platforms = set_up(0).await;
    assert_eq!(platforms.start("SIGNATURE_ISSUE").await, 422);
    assert_eq!(platforms.response_code(), "BSIG");

    assert_eq!(platforms.start("VALID_TRANSFER").await, 201);
    assert_eq!(platforms.run("FinishTransfer", json!({})).await, 200);
    assert_eq!(platforms.response_code(), "RECE");
}

#[tokio::test]
async fn unrelated_document_is_inconsistent() {
    let mut platforms = set_up(1).await;
    assert_eq!(platforms.start("VALID_TRANSFER").await, 201);

    let unrelated = json!({ "documentTransmission": "UNRELATED_DOCUMENT" });
    assert_eq!(platforms.run("TransferDocument", unrelated).await, 409);
    assert_eq!(platforms.response_code(), "INCD");
    let log = platforms.receiver_log().await;
    assert!(log.iter().any(|line| line.ends_with("not listed in the manifest")));

    let valid = json!({ "documentTransmission": "VALID_DOCUMENT" });
    assert_eq!(platforms.run("TransferDocument", valid).await, 204);
    assert_eq!(platforms.run("FinishTransfer", json!({})).await, 200);
    assert_eq!(platforms.response_code(), "RECE");
}

#[tokio::test]
async fn resend_after_the_last_document_completes_the_transfer() {
    let mut platforms = set_up(1).await;
    assert_eq!(platforms.start("VALID_TRANSFER").await, 201);
    let valid = json!({ "documentTransmission": "VALID_DOCUMENT" });
    assert_eq!(platforms.run("TransferDocument", valid).await, 204);

    assert_eq!(platforms.run("RetryTransfer", json!({})).await, 200);
    assert_eq!(platforms.response_code(), "RECE");
    assert_eq!(
        platforms.signed_payload()["receivedAdditionalDocumentChecksums"]
            .as_array()
            .map(Vec::len),
        Some(1)
    );

    assert_eq!(platforms.run("FinishTransfer", json!({})).await, 409);
}

#[tokio::test]
async fn altered_resends_after_acceptance_are_conflicts() {
    let mut platforms = set_up(0).await;
    assert_eq!(platforms.start("VALID_TRANSFER").await, 201);
    assert_eq!(platforms.run("FinishTransfer", json!({})).await, 200);

    for class in ["RESIGNED_LATEST_ENTRY", "MANIPULATED_TRANSACTIONS"] {
        let altered = json!({ "transmissionClass": class });
        assert_eq!(platforms.run("RetryTransfer", altered).await, 409);
        let message = platforms.link.last_body()["message"].as_str().unwrap().to_string();
        assert!(message.contains("ACCEPTED"), "{message}");
    }
}

#[tokio::test]
async fn failed_prompt_is_retried_when_delivered_again() {
    let mut platforms = set_up(0).await;
    let start = platforms.prompt("StartTransfer", json!({ "transmissionClass": "VALID_TRANSFER" }));

    *platforms.link.refuse_next.lock().unwrap() = true;
    let err = platforms.sender.handle_prompt(&start, &platforms.link).await.unwrap_err();
    assert!(err.to_string().contains("connection refused"));
    assert!(platforms.link.statuses.lock().unwrap().is_empty());
    assert!(platforms
        .sender
        .operator_log()
        .iter()
        .any(|line| line.starts_with("Failed to handle StartTransfer")));

    platforms.sender.handle_prompt(&start, &platforms.link).await.unwrap();
    assert_eq!(platforms.link.last_status(), 201);

    // Handled now, so a third delivery does nothing.
    platforms.sender.handle_prompt(&start, &platforms.link).await.unwrap();
    assert_eq!(platforms.link.statuses.lock().unwrap().len(), 1);
}
