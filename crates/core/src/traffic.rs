//! Captured HTTP traffic: messages, request/response pairs, and the
//! exchange log they are recorded in.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

pub const API_VERSION_HEADER: &str = "Api-Version";

/// Which half of an exchange a check looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HttpMessageType {
    Request,
    Response,
}

impl fmt::Display for HttpMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMessageType::Request => write!(f, "request"),
            HttpMessageType::Response => write!(f, "response"),
        }
    }
}

/// One HTTP message plus the parties on either end of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceMessage {
    pub source_party_name: String,
    pub source_party_role: String,
    pub target_party_name: String,
    pub target_party_role: String,
    pub headers: BTreeMap<String, Vec<String>>,
    pub body: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl ConformanceMessage {
    fn empty() -> Self {
        Self {
            source_party_name: String::new(),
            source_party_role: String::new(),
            target_party_name: String::new(),
            target_party_role: String::new(),
            headers: BTreeMap::new(),
            body: Value::Null,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// All values of a header, matched case-insensitively on the name.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .flat_map(|(_, values)| values.iter().map(String::as_str))
            .collect()
    }

    /// The first value of a header, if present.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.header_values(name).into_iter().next()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub query_params: BTreeMap<String, Vec<String>>,
    pub message: ConformanceMessage,
}

impl ConformanceRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            url: url.to_string(),
            query_params: BTreeMap::new(),
            message: ConformanceMessage::empty(),
        }
    }

    pub fn from_party(mut self, name: &str, role: &str) -> Self {
        self.message.source_party_name = name.to_string();
        self.message.source_party_role = role.to_string();
        self
    }

    pub fn to_party(mut self, name: &str, role: &str) -> Self {
        self.message.target_party_name = name.to_string();
        self.message.target_party_role = role.to_string();
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.message
            .headers
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.message.body = body;
        self
    }

    /// The URL path without scheme, host or query string.
    pub fn path(&self) -> &str {
        let without_scheme = match self.url.find("://") {
            Some(i) => {
                let rest = &self.url[i + 3..];
                rest.find('/').map(|j| &rest[j..]).unwrap_or("/")
            }
            None => self.url.as_str(),
        };
        without_scheme
            .split(['?', '#'])
            .next()
            .unwrap_or(without_scheme)
    }

    /// Start a response addressed back to the sender of this request.
    pub fn create_response(&self, status_code: u16) -> ConformanceResponse {
        let mut message = ConformanceMessage::empty();
        message.source_party_name = self.message.target_party_name.clone();
        message.source_party_role = self.message.target_party_role.clone();
        message.target_party_name = self.message.source_party_name.clone();
        message.target_party_role = self.message.source_party_role.clone();
        ConformanceResponse {
            status_code,
            message,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceResponse {
    pub status_code: u16,
    pub message: ConformanceMessage,
}

impl ConformanceResponse {
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.message
            .headers
            .entry(name.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.message.body = body;
        self
    }
}

/// One captured request/response pair. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConformanceExchange {
    pub uuid: Uuid,
    pub request: ConformanceRequest,
    pub response: ConformanceResponse,
}

impl ConformanceExchange {
    pub fn new(request: ConformanceRequest, response: ConformanceResponse) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            request,
            response,
        }
    }

    pub fn message(&self, message_type: HttpMessageType) -> &ConformanceMessage {
        match message_type {
            HttpMessageType::Request => &self.request.message,
            HttpMessageType::Response => &self.response.message,
        }
    }
}

/// Ordered log of exchanges, looked up by uuid during check evaluation.
#[derive(Debug, Clone, Default)]
pub struct TrafficRecorder {
    exchanges: Vec<ConformanceExchange>,
}

impl TrafficRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, exchange: ConformanceExchange) {
        self.exchanges.push(exchange);
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&ConformanceExchange> {
        self.exchanges.iter().find(|e| &e.uuid == uuid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConformanceExchange> {
        self.exchanges.iter()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

impl FromIterator<ConformanceExchange> for TrafficRecorder {
    fn from_iter<I: IntoIterator<Item = ConformanceExchange>>(iter: I) -> Self {
        Self {
            exchanges: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn path_strips_host_and_query() {
        let req = ConformanceRequest::new("post", "https://rx.example/v3/envelopes?x=1");
        assert_eq!(req.path(), "/v3/envelopes");
        assert_eq!(req.method, "POST");
        let local = ConformanceRequest::new("GET", "/v3/receiver-validation");
        assert_eq!(local.path(), "/v3/receiver-validation");
    }

    #[test]
    fn header_lookup_ignores_case() {
        let req = ConformanceRequest::new("GET", "/x")
            .with_header("api-version", "3.0.0")
            .with_header("API-VERSION", "3.0.1");
        assert_eq!(
            req.message.header_values(API_VERSION_HEADER),
            vec!["3.0.1", "3.0.0"]
        );
    }

    #[test]
    fn response_is_addressed_back_to_the_sender() {
        let req = ConformanceRequest::new("POST", "/v3/envelopes")
            .from_party("Sender1", "SendingPlatform")
            .to_party("Receiver1", "ReceivingPlatform");
        let resp = req.create_response(201).with_body(json!({"ok": true}));
        assert_eq!(resp.message.source_party_name, "Receiver1");
        assert_eq!(resp.message.target_party_role, "SendingPlatform");
        assert_eq!(resp.status_code, 201);
    }

    #[test]
    fn recorder_finds_exchanges_by_uuid() {
        let req = ConformanceRequest::new("GET", "/a");
        let exchange = ConformanceExchange::new(req.clone(), req.create_response(200));
        let uuid = exchange.uuid;
        let recorder: TrafficRecorder = vec![exchange].into_iter().collect();
        assert_eq!(recorder.len(), 1);
        assert!(recorder.get(&uuid).is_some());
        assert!(recorder.get(&Uuid::new_v4()).is_none());
    }
}
