//! Replaying a scenario after `reset()` must give the same check verdict.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use quayside_core::check::{http_method_check, response_status_check, url_path_check};
use quayside_core::scenario::overlay_field;
use quayside_core::{
    ActionCore, BusinessKey, Capabilities, ConformanceAction, ConformanceCheck,
    ConformanceExchange, ConformanceReport, ConformanceRequest, ConformanceScenario,
    ConformanceStatus, ContextLayer, EngineError, ScenarioListBuilder, TrafficRecorder,
};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct BookingContext {
    booking_reference: Option<String>,
}

impl ContextLayer for BookingContext {
    fn overlay(&mut self, newer: &Self) {
        overlay_field(&mut self.booking_reference, &newer.booking_reference);
    }

    fn business_key(&self, name: &str) -> Option<String> {
        match name {
            "bookingReference" => self.booking_reference.clone(),
            _ => None,
        }
    }
}

struct SupplyBooking {
    core: ActionCore<BookingContext>,
}

impl ConformanceAction<BookingContext> for SupplyBooking {
    fn core(&self) -> &ActionCore<BookingContext> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ActionCore<BookingContext> {
        &mut self.core
    }
    fn action_type(&self) -> &'static str {
        "SupplyBooking"
    }
    fn human_readable_prompt(&self, _ctx: &BookingContext) -> String {
        "Supply the booking reference".into()
    }
    fn apply_party_input(
        &mut self,
        input: &Value,
        _ctx: &BookingContext,
    ) -> Result<(), EngineError> {
        let reference = input["bookingReference"].as_str().ok_or_else(|| {
            EngineError::UnexpectedInput {
                action_path: self.core.action_path().to_string(),
                message: "bookingReference is required".into(),
            }
        })?;
        self.core.layer_mut().booking_reference = Some(reference.to_string());
        Ok(())
    }
}

struct ConfirmBooking {
    core: ActionCore<BookingContext>,
}

impl ConformanceAction<BookingContext> for ConfirmBooking {
    fn core(&self) -> &ActionCore<BookingContext> {
        &self.core
    }
    fn core_mut(&mut self) -> &mut ActionCore<BookingContext> {
        &mut self.core
    }
    fn action_type(&self) -> &'static str {
        "ConfirmBooking"
    }
    fn human_readable_prompt(&self, ctx: &BookingContext) -> String {
        format!("Confirm booking {:?}", ctx.booking_reference)
    }
    fn exchange_business_key(&self, exchange: &ConformanceExchange) -> Option<BusinessKey> {
        let path = exchange.request.path();
        path.rsplit('/').next().map(|value| BusinessKey {
            name: "bookingReference",
            value: value.to_string(),
        })
    }
    fn create_check(&self, _version: &str, ctx: &BookingContext) -> Option<ConformanceCheck> {
        let uuid = self.core.matched_exchange_uuid();
        let suffix = format!("/v2/bookings/{}", ctx.booking_reference.clone().unwrap_or_default());
        Some(ConformanceCheck::lazy_group(self.core.title().to_string(), move || {
            vec![
                url_path_check("Carrier", uuid, &[suffix.as_str()]),
                http_method_check("Carrier", uuid, "PUT"),
                response_status_check("Shipper", uuid, &[200]),
            ]
        }))
    }
}

fn scenario() -> ConformanceScenario<BookingContext> {
    ScenarioListBuilder::new(|prev| {
        Box::new(SupplyBooking {
            core: ActionCore::new(
                prev,
                "Supply booking",
                "Carrier1",
                "Shipper1",
                Capabilities::INPUT,
            ),
        }) as Box<dyn ConformanceAction<BookingContext>>
    })
    .then(ScenarioListBuilder::new(|prev| {
        Box::new(ConfirmBooking {
            core: ActionCore::new(prev, "Confirm", "Carrier1", "Shipper1", Capabilities::EXCHANGE),
        }) as Box<dyn ConformanceAction<BookingContext>>
    }))
    .build_scenario_list(0)
    .remove(0)
}

fn confirm_exchange(status: u16) -> ConformanceExchange {
    let request = ConformanceRequest::new("PUT", "https://shipper.example/v2/bookings/BKG-1")
        .from_party("Carrier1", "Carrier")
        .to_party("Shipper1", "Shipper");
    let response = request.create_response(status);
    ConformanceExchange::new(request, response)
}

fn play(
    scenario: &mut ConformanceScenario<BookingContext>,
    traffic: &mut TrafficRecorder,
) -> Vec<ConformanceReport> {
    let id = scenario.peek_next_action().unwrap().core().id();
    scenario
        .handle_party_input(id, &json!({"bookingReference": "BKG-1"}))
        .unwrap();
    let exchange = confirm_exchange(409);
    traffic.record(exchange.clone());
    assert!(scenario.handle_exchange(&exchange).unwrap());

    let check = scenario.create_check("2.0.0");
    ["Carrier", "Shipper"]
        .iter()
        .map(|role| ConformanceReport::from_outcome(&check.evaluate(role, traffic).unwrap()))
        .collect()
}

/// Exchange uuids differ between runs, so compare everything but those.
fn verdicts(reports: &[ConformanceReport]) -> Vec<(ConformanceStatus, Vec<String>)> {
    reports
        .iter()
        .map(|r| {
            (
                r.status,
                r.all_error_messages().into_iter().map(str::to_string).collect(),
            )
        })
        .collect()
}

#[test]
fn reset_then_replay_reproduces_the_verdict() {
    let mut scenario = scenario();
    let mut traffic = TrafficRecorder::new();
    let first = play(&mut scenario, &mut traffic);

    scenario.reset();
    let second = play(&mut scenario, &mut traffic);

    assert_eq!(verdicts(&first), verdicts(&second));
    assert_eq!(first[0].status, ConformanceStatus::Conformant);
    assert_eq!(first[1].status, ConformanceStatus::NonConformant);
    assert_eq!(
        first[1].all_error_messages(),
        vec!["Response status '409' does not match the expected value '200'"]
    );
}

#[test]
fn mismatched_reference_aborts_and_is_reported() {
    let mut scenario = scenario();
    let id = scenario.peek_next_action().unwrap().core().id();
    scenario
        .handle_party_input(id, &json!({"bookingReference": "BKG-2"}))
        .unwrap();
    let exchange = confirm_exchange(200);
    let traffic: TrafficRecorder = vec![exchange.clone()].into_iter().collect();
    assert!(scenario.handle_exchange(&exchange).unwrap());
    assert!(!scenario.has_next_action());

    let outcome = scenario.create_check("2.0.0").evaluate("Carrier", &traffic).unwrap();
    assert_eq!(outcome.status, ConformanceStatus::NonConformant);
    assert!(outcome
        .violations
        .iter()
        .any(|v| v.starts_with("Scenario aborted: ") && v.contains("BKG-1")));
}
