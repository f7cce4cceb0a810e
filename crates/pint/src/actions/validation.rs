use std::sync::Arc;

use serde_json::{json, Map, Value};

use quayside_core::check::{
    api_version_header_check, http_method_check, json_schema_check, response_status_check,
    url_path_check,
};
use quayside_core::{
    ActionCore, Capabilities, ConformanceAction, ConformanceCheck, ConformanceExchange,
    HttpMessageType,
};

use super::PintActionType;
use crate::model::{PintContext, RECEIVING_PLATFORM, SENDING_PLATFORM, URL_PREFIX};
use crate::schemas::PintSchemas;

/// The sending platform asks the receiving platform whether it knows a
/// party.
pub struct ReceiverValidation {
    core: ActionCore<PintContext>,
    schemas: Arc<PintSchemas>,
}

impl ReceiverValidation {
    pub fn new(
        previous: Option<&ActionCore<PintContext>>,
        sender: &str,
        receiver: &str,
        schemas: Arc<PintSchemas>,
    ) -> Self {
        Self {
            core: ActionCore::new(
                previous,
                "ReceiverValidation",
                sender,
                receiver,
                Capabilities::EXCHANGE,
            ),
            schemas,
        }
    }
}

impl ConformanceAction<PintContext> for ReceiverValidation {
    fn core(&self) -> &ActionCore<PintContext> {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ActionCore<PintContext> {
        &mut self.core
    }

    fn action_type(&self) -> &'static str {
        PintActionType::ReceiverValidation.name()
    }

    fn human_readable_prompt(&self, ctx: &PintContext) -> String {
        match &ctx.validation {
            Some(v) => format!(
                "Ask the receiving platform to validate the party '{}' of code list '{}'",
                v.party_code, v.code_list_provider
            ),
            None => "Ask the receiving platform to validate a party".into(),
        }
    }

    fn prompt_details(&self, ctx: &PintContext) -> Map<String, Value> {
        let mut details = Map::new();
        details.insert("validationParameters".into(), json!(ctx.validation));
        details
    }

    fn matches_exchange(&self, exchange: &ConformanceExchange) -> bool {
        let message = &exchange.request.message;
        message.source_party_name == self.core.source_party_name()
            && message.target_party_name == self.core.target_party_name()
            && exchange.request.path().ends_with("/receiver-validation")
    }

    fn create_check(
        &self,
        expected_api_version: &str,
        _ctx: &PintContext,
    ) -> Option<ConformanceCheck> {
        let uuid = self.core.matched_exchange_uuid();
        let version = expected_api_version.to_string();
        let path = format!("{URL_PREFIX}/receiver-validation");
        let schemas = self.schemas.clone();

        Some(ConformanceCheck::lazy_group(self.core.title(), move || {
            vec![
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
                    schemas.receiver_validation_request.clone(),
                ),
                response_status_check(RECEIVING_PLATFORM, uuid, &[200]),
                api_version_header_check(
                    RECEIVING_PLATFORM,
                    uuid,
                    HttpMessageType::Response,
                    false,
                    &version,
                ),
                json_schema_check(
                    RECEIVING_PLATFORM,
                    uuid,
                    HttpMessageType::Response,
                    schemas.receiver_validation_response.clone(),
                ),
            ]
        }))
    }
}
