//! The PINT scenario graphs.

use std::sync::Arc;

use quayside_core::{ActionCore, ConformanceAction, ScenarioListBuilder, ScenarioModule};

use crate::actions::{
    EnvelopeTransfer, FinishTransfer, ReceiverStateSetup, ReceiverValidation, ResetScenarioClass,
    StartExpectation, SupplySenderParameters, SupplyValidationParameters, TransferDocument,
};
use crate::model::{
    DocumentTransmission, PintContext, ResponseCode, ScenarioClass, SenderTransmissionClass,
};
use crate::schemas::PintSchemas;

type Builder = ScenarioListBuilder<PintContext>;

fn step<A, F>(make: F) -> Builder
where
    A: ConformanceAction<PintContext> + 'static,
    F: Fn(Option<&ActionCore<PintContext>>) -> A + Send + Sync + 'static,
{
    ScenarioListBuilder::new(move |previous| {
        Box::new(make(previous)) as Box<dyn ConformanceAction<PintContext>>
    })
}

/// Names and schemas every PINT action is built with.
#[derive(Clone)]
pub struct PintScenarioSettings {
    pub sender: String,
    pub receiver: String,
    pub schemas: Arc<PintSchemas>,
}

impl PintScenarioSettings {
    fn cloned(&self) -> (String, String, Arc<PintSchemas>) {
        (self.sender.clone(), self.receiver.clone(), self.schemas.clone())
    }

    fn supply_sender_parameters(&self, document_count: usize) -> Builder {
        let (sender, receiver) = (self.sender.clone(), self.receiver.clone());
        step(move |prev| SupplySenderParameters::new(prev, &sender, &receiver, document_count))
    }

    fn receiver_state_setup(&self, scenario_class: ScenarioClass) -> Builder {
        let (sender, receiver) = (self.sender.clone(), self.receiver.clone());
        step(move |prev| ReceiverStateSetup::new(prev, &receiver, &sender, scenario_class))
    }

    fn reset_scenario_class(&self, scenario_class: ScenarioClass) -> Builder {
        let (sender, receiver) = (self.sender.clone(), self.receiver.clone());
        step(move |prev| ResetScenarioClass::new(prev, &receiver, &sender, scenario_class))
    }

    fn start_transfer(
        &self,
        class: SenderTransmissionClass,
        expectation: StartExpectation,
    ) -> Builder {
        let (sender, receiver, schemas) = self.cloned();
        step(move |prev| {
            EnvelopeTransfer::start(prev, &sender, &receiver, class, expectation, schemas.clone())
        })
    }

    fn start_valid(&self, missing_documents: usize) -> Builder {
        self.start_transfer(
            SenderTransmissionClass::ValidTransfer,
            StartExpectation::Started { missing_documents },
        )
    }

    fn retry_transfer(&self, expectation: StartExpectation) -> Builder {
        let (sender, receiver, schemas) = self.cloned();
        step(move |prev| {
            EnvelopeTransfer::retry(prev, &sender, &receiver, expectation, schemas.clone())
        })
    }

    fn retry_altered(
        &self,
        class: SenderTransmissionClass,
        expectation: StartExpectation,
    ) -> Builder {
        let (sender, receiver, schemas) = self.cloned();
        step(move |prev| {
            let schemas = schemas.clone();
            EnvelopeTransfer::retry_as(prev, &sender, &receiver, class, expectation, schemas)
        })
    }

    fn transfer_document(&self, transmission: DocumentTransmission) -> Builder {
        let (sender, receiver, schemas) = self.cloned();
        step(move |prev| {
            TransferDocument::new(prev, &sender, &receiver, transmission, schemas.clone())
        })
    }

    fn valid_document(&self) -> Builder {
        self.transfer_document(DocumentTransmission::ValidDocument)
    }

    fn transfer_document_receiver_failure(&self) -> Builder {
        let (sender, receiver, schemas) = self.cloned();
        step(move |prev| {
            TransferDocument::receiver_failure(prev, &sender, &receiver, schemas.clone())
        })
    }

    fn finish_transfer(&self, expected: ResponseCode) -> Builder {
        let (sender, receiver, schemas) = self.cloned();
        step(move |prev| FinishTransfer::new(prev, &sender, &receiver, expected, schemas.clone()))
    }

    fn supply_validation_parameters(&self) -> Builder {
        let (sender, receiver) = (self.sender.clone(), self.receiver.clone());
        step(move |prev| SupplyValidationParameters::new(prev, &receiver, &sender))
    }

    fn receiver_validation(&self) -> Builder {
        let (sender, receiver, schemas) = self.cloned();
        step(move |prev| ReceiverValidation::new(prev, &sender, &receiver, schemas.clone()))
    }

    // ── Graphs ──────────────────────────────────────────────────────────

    fn transfers_without_documents(&self) -> Builder {
        let conflict = StartExpectation::Status(409);
        let unavailable = StartExpectation::Status(503);
        let received = || self.finish_transfer(ResponseCode::Received);
        let manipulated = SenderTransmissionClass::ManipulatedTransactions;
        self.supply_sender_parameters(0).then_either(vec![
            self.receiver_state_setup(ScenarioClass::NoIssues).then_either(vec![
                self.start_valid(0).then_either(vec![
                    received().then_either(vec![
                        Builder::no_action(),
                        self.retry_transfer(conflict),
                        self.retry_altered(SenderTransmissionClass::ResignedLatestEntry, conflict),
                        self.retry_altered(manipulated, conflict),
                    ]),
                    self.retry_transfer(conflict).then(received()),
                ]),
                self.start_transfer(
                    SenderTransmissionClass::SignatureIssue,
                    StartExpectation::Signed(ResponseCode::BadSignature),
                )
                .then(self.start_valid(0))
                .then(received()),
                self.start_transfer(
                    SenderTransmissionClass::WrongRecipientPlatform,
                    StartExpectation::Signed(ResponseCode::BadEnvelope),
                ),
                self.start_transfer(
                    SenderTransmissionClass::ManipulatedTransactions,
                    StartExpectation::Signed(ResponseCode::BadEnvelope),
                ),
            ]),
            self.receiver_state_setup(ScenarioClass::InvalidRecipient).then(self.start_transfer(
                SenderTransmissionClass::ValidTransfer,
                StartExpectation::Signed(ResponseCode::BadEnvelope),
            )),
            self.receiver_state_setup(ScenarioClass::FailW503)
                .then(self.start_transfer(SenderTransmissionClass::ValidTransfer, unavailable))
                .then_either(vec![
                    self.reset_scenario_class(ScenarioClass::NoIssues),
                    self.start_transfer(SenderTransmissionClass::ValidTransfer, unavailable)
                        .then(self.reset_scenario_class(ScenarioClass::NoIssues)),
                ])
                .then(self.start_valid(0))
                .then(received()),
        ])
    }

    fn transfers_with_documents(&self) -> Builder {
        let received = || self.finish_transfer(ResponseCode::Received);
        // Once every document is in, finishing or resending both complete
        // the transfer.
        let completed = || {
            vec![
                received(),
                self.retry_transfer(StartExpectation::Signed(ResponseCode::Received)),
            ]
        };
        self.supply_sender_parameters(2)
            .then(self.receiver_state_setup(ScenarioClass::NoIssues))
            .then(self.start_valid(2))
            .then_either(vec![
                self.valid_document().then_either(vec![
                    self.valid_document().then(received()),
                    self.retry_transfer(StartExpectation::Started { missing_documents: 1 })
                        .then(self.valid_document())
                        .then_either(completed()),
                    self.reset_scenario_class(ScenarioClass::FailW503)
                        .then(self.transfer_document_receiver_failure())
                        .then(self.reset_scenario_class(ScenarioClass::NoIssues))
                        .then(self.valid_document())
                        .then(received()),
                    self.transfer_document(DocumentTransmission::CorruptedDocument)
                        .then(self.valid_document())
                        .then(received()),
                    self.transfer_document(DocumentTransmission::UnrelatedDocument)
                        .then(self.valid_document())
                        .then(received()),
                ]),
                self.finish_transfer(ResponseCode::MissingDocuments)
                    .then(self.retry_transfer(StartExpectation::Started { missing_documents: 2 }))
                    .then(self.valid_document())
                    .then(self.valid_document())
                    .then_either(completed()),
            ])
    }
}

pub fn scenario_modules(settings: &PintScenarioSettings) -> Vec<ScenarioModule<PintContext>> {
    vec![
        ScenarioModule::new(
            "Transfer scenarios",
            Builder::no_action().then_either(vec![
                settings.transfers_without_documents(),
                settings.transfers_with_documents(),
            ]),
        ),
        ScenarioModule::new(
            "Receiver validation scenarios",
            settings
                .supply_validation_parameters()
                .then(settings.receiver_validation()),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use quayside_core::check::SchemaCache;

    fn path(steps: &[&str]) -> String {
        steps.join(" - ")
    }

    fn extended(prefix: &[&str], tail: &[&str]) -> String {
        path(&[prefix, tail].concat())
    }

    fn settings() -> PintScenarioSettings {
        PintScenarioSettings {
            sender: "Sender1".into(),
            receiver: "Receiver1".into(),
            schemas: Arc::new(PintSchemas::load(&SchemaCache::new()).unwrap()),
        }
    }

    #[test]
    fn modules_hold_every_transfer_path() {
        let modules = scenario_modules(&settings());
        assert_eq!(modules.len(), 2);
        assert_eq!(modules[0].builder.leaf_count(), 19);
        assert_eq!(modules[1].builder.leaf_count(), 1);
    }

    #[test]
    fn scenario_titles_read_as_action_paths() {
        let modules = scenario_modules(&settings());
        let titles: Vec<String> = modules[0]
            .builder
            .build_scenario_list(0)
            .iter()
            .map(|s| s.title())
            .collect();
        assert_eq!(
            titles[0],
            path(&[
                "SupplySenderParameters(0)",
                "ReceiverStateSetup(NO_ISSUES)",
                "StartTransfer(MD:0)",
                "FinishTransfer(RECE)",
            ])
        );
        assert!(titles.contains(&path(&[
            "SupplySenderParameters(0)",
            "ReceiverStateSetup(FAIL_W_503)",
            "StartTransfer(503)",
            "StartTransfer(503)",
            "ResetScenarioClass(NO_ISSUES)",
            "StartTransfer(MD:0)",
            "FinishTransfer(RECE)",
        ])));
        assert!(titles.contains(&path(&[
            "SupplySenderParameters(2)",
            "ReceiverStateSetup(NO_ISSUES)",
            "StartTransfer(MD:2)",
            "FinishTransfer(MDOC)",
            "RetryTransfer(MD:2)",
            "TransferDocument(VALID_DOCUMENT)",
            "TransferDocument(VALID_DOCUMENT)",
            "FinishTransfer(RECE)",
        ])));
    }

    #[test]
    fn altered_envelopes_and_unrelated_documents_have_scenarios() {
        let modules = scenario_modules(&settings());
        let titles: Vec<String> = modules[0]
            .builder
            .build_scenario_list(0)
            .iter()
            .map(|s| s.title())
            .collect();
        let without_documents = ["SupplySenderParameters(0)", "ReceiverStateSetup(NO_ISSUES)"];
        let (start, finish) = ("StartTransfer(MD:0)", "FinishTransfer(RECE)");
        for tail in [
            vec![start, finish, "RetryTransfer(RESIGNED_LATEST_ENTRY, 409)"],
            vec![start, finish, "RetryTransfer(MANIPULATED_TRANSACTIONS, 409)"],
            vec!["StartTransfer(SIGNATURE_ISSUE, BSIG)", start, finish],
            vec!["StartTransfer(MANIPULATED_TRANSACTIONS, BENV)"],
        ] {
            let expected = extended(&without_documents, &tail);
            assert!(titles.contains(&expected), "missing {expected}");
        }

        let with_documents = [
            "SupplySenderParameters(2)",
            "ReceiverStateSetup(NO_ISSUES)",
            "StartTransfer(MD:2)",
        ];
        let (valid, retried) = ("TransferDocument(VALID_DOCUMENT)", "RetryTransfer(RECE)");
        for tail in [
            vec![valid, "TransferDocument(UNRELATED_DOCUMENT)", valid, "FinishTransfer(RECE)"],
            vec![valid, "RetryTransfer(MD:1)", valid, retried],
            vec!["FinishTransfer(MDOC)", "RetryTransfer(MD:2)", valid, valid, retried],
        ] {
            let expected = extended(&with_documents, &tail);
            assert!(titles.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn validation_scenario_starts_with_receiver_input() {
        let modules = scenario_modules(&settings());
        let scenarios = modules[1].builder.build_scenario_list(1);
        assert_eq!(
            scenarios[0].title(),
            "SupplyValidationParameters - ReceiverValidation"
        );
        assert_eq!(scenarios[0].actions()[0].core().source_party_name(), "Receiver1");
    }
}
