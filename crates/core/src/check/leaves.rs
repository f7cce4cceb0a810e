//! Standard leaf checks shared by every API standard.

use std::collections::BTreeSet;
use std::sync::Arc;

use uuid::Uuid;

use super::schema::JsonSchemaValidator;
use super::{ConformanceCheck, Violations};
use crate::traffic::{HttpMessageType, API_VERSION_HEADER};

fn single(message: String) -> Violations {
    BTreeSet::from([message])
}

pub fn url_path_check(
    role: &str,
    exchange_uuid: Option<Uuid>,
    suffixes: &[&str],
) -> ConformanceCheck {
    let suffixes: Vec<String> = suffixes.iter().map(|s| s.to_string()).collect();
    ConformanceCheck::leaf(
        "The URL path of the HTTP request is correct",
        exchange_uuid,
        HttpMessageType::Request,
        move |exchange| {
            let url = &exchange.request.url;
            let path = exchange.request.path();
            if suffixes.iter().any(|s| path.ends_with(s.as_str())) {
                return Violations::new();
            }
            match suffixes.as_slice() {
                [only] => single(format!("Request URL '{url}' does not end with '{only}'")),
                many => {
                    let quoted: Vec<String> = many.iter().map(|s| format!("'{s}'")).collect();
                    single(format!(
                        "Request URL '{url}' does not end with any of {}",
                        quoted.join(", ")
                    ))
                }
            }
        },
    )
    .for_role(role)
}

pub fn http_method_check(
    role: &str,
    exchange_uuid: Option<Uuid>,
    expected: &str,
) -> ConformanceCheck {
    let expected = expected.to_ascii_uppercase();
    ConformanceCheck::leaf(
        "The HTTP method of the request is correct",
        exchange_uuid,
        HttpMessageType::Request,
        move |exchange| {
            let actual = &exchange.request.method;
            if actual.eq_ignore_ascii_case(&expected) {
                Violations::new()
            } else {
                single(format!(
                    "Request method '{actual}' does not match the expected method '{expected}'"
                ))
            }
        },
    )
    .for_role(role)
}

pub fn response_status_check(
    role: &str,
    exchange_uuid: Option<Uuid>,
    expected: &[u16],
) -> ConformanceCheck {
    let expected = expected.to_vec();
    ConformanceCheck::leaf(
        "The HTTP response status is correct",
        exchange_uuid,
        HttpMessageType::Response,
        move |exchange| {
            let actual = exchange.response.status_code;
            if expected.contains(&actual) {
                return Violations::new();
            }
            match expected.as_slice() {
                [only] => single(format!(
                    "Response status '{actual}' does not match the expected value '{only}'"
                )),
                many => {
                    let listed: Vec<String> = many.iter().map(u16::to_string).collect();
                    single(format!(
                        "Response status '{actual}' does not match one of the expected values: \
                         '{}'",
                        listed.join(", ")
                    ))
                }
            }
        },
    )
    .for_role(role)
}

fn strip_suffix(version: &str) -> &str {
    version.split('-').next().unwrap_or(version)
}

fn major(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Checks the `Api-Version` header of one direction of an exchange.
///
/// Plain requests only need the right major version. Responses and
/// notification requests must carry the full version, and a response
/// without the header is a violation.
pub fn api_version_header_check(
    role: &str,
    exchange_uuid: Option<Uuid>,
    message_type: HttpMessageType,
    notification: bool,
    expected_version: &str,
) -> ConformanceCheck {
    let expected_version = expected_version.to_string();
    ConformanceCheck::leaf(
        format!("The HTTP {message_type} has a correct Api-Version header"),
        exchange_uuid,
        message_type,
        move |exchange| {
            let values = exchange.message(message_type).header_values(API_VERSION_HEADER);
            let actual = match values.as_slice() {
                [] => {
                    return if message_type == HttpMessageType::Response && !notification {
                        single(format!("Missing Api-Version header in the HTTP {message_type}"))
                    } else {
                        Violations::new()
                    };
                }
                [one] => strip_suffix(one),
                _ => return single("Duplicate Api-Version headers".to_string()),
            };
            let expected = strip_suffix(&expected_version);
            let matches = if message_type == HttpMessageType::Request && !notification {
                major(actual) == major(expected)
            } else {
                actual == expected
            };
            if matches {
                Violations::new()
            } else {
                single(format!("Expected Api-Version '{expected}' but found '{actual}'"))
            }
        },
    )
    .for_role(role)
}

pub fn header_present_check(
    role: &str,
    exchange_uuid: Option<Uuid>,
    message_type: HttpMessageType,
    name: &str,
) -> ConformanceCheck {
    let name = name.to_string();
    ConformanceCheck::leaf(
        format!("The header '{name}' is present"),
        exchange_uuid,
        message_type,
        move |exchange| {
            if exchange.message(message_type).header(&name).is_some() {
                Violations::new()
            } else {
                single(format!("Missing header '{name}'"))
            }
        },
    )
    .for_role(role)
}

pub fn header_value_check(
    role: &str,
    exchange_uuid: Option<Uuid>,
    message_type: HttpMessageType,
    name: &str,
    expected: &str,
) -> ConformanceCheck {
    let name = name.to_string();
    let expected = expected.to_string();
    ConformanceCheck::leaf(
        format!("The value of header '{name}' is correct"),
        exchange_uuid,
        message_type,
        move |exchange| match exchange.message(message_type).header(&name) {
            Some(actual) if actual == expected => Violations::new(),
            Some(actual) => single(format!(
                "Header '{name}' has value '{actual}' but it should have been '{expected}'"
            )),
            None => single(format!("Missing header '{name}'")),
        },
    )
    .for_role(role)
}

pub fn json_schema_check(
    role: &str,
    exchange_uuid: Option<Uuid>,
    message_type: HttpMessageType,
    validator: Arc<JsonSchemaValidator>,
) -> ConformanceCheck {
    ConformanceCheck::leaf(
        format!("The HTTP {message_type} matches the standard JSON schema"),
        exchange_uuid,
        message_type,
        move |exchange| validator.validate(&exchange.message(message_type).body),
    )
    .for_role(role)
}

/// `pointer` is a JSON pointer into the message body, e.g. `/transportDocument`.
pub fn json_attribute_present_check(
    role: &str,
    exchange_uuid: Option<Uuid>,
    message_type: HttpMessageType,
    pointer: &str,
) -> ConformanceCheck {
    let pointer = pointer.to_string();
    ConformanceCheck::leaf(
        format!("The attribute '{pointer}' is present"),
        exchange_uuid,
        message_type,
        move |exchange| match exchange.message(message_type).body.pointer(&pointer) {
            Some(value) if !value.is_null() => Violations::new(),
            _ => single(format!(
                "The attribute '{pointer}' should have been present, but was absent"
            )),
        },
    )
    .for_role(role)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::report::ConformanceStatus;
    use crate::traffic::{ConformanceExchange, ConformanceRequest, TrafficRecorder};

    fn record(exchange: ConformanceExchange) -> (TrafficRecorder, Option<Uuid>) {
        let uuid = exchange.uuid;
        (vec![exchange].into_iter().collect(), Some(uuid))
    }

    fn envelope_exchange(response_version: Option<&str>) -> ConformanceExchange {
        let request = ConformanceRequest::new("POST", "https://rx.example/v3/envelopes")
            .from_party("S1", "SendingPlatform")
            .to_party("R1", "ReceivingPlatform")
            .with_header("Api-Version", "3.0.0")
            .with_body(json!({"transportDocument": {"x": 1}}));
        let mut response = request.create_response(201);
        if let Some(version) = response_version {
            response = response.with_header("Api-Version", version);
        }
        ConformanceExchange::new(request, response)
    }

    #[test]
    fn response_missing_api_version_gives_exactly_one_violation() {
        let (traffic, uuid) = record(envelope_exchange(None));
        let check = api_version_header_check(
            "ReceivingPlatform",
            uuid,
            HttpMessageType::Response,
            false,
            "3.0.0",
        );
        assert_eq!(check.title(), "The HTTP response has a correct Api-Version header");
        let outcome = check.evaluate("ReceivingPlatform", &traffic).unwrap();
        assert_eq!(outcome.status, ConformanceStatus::NonConformant);
        assert_eq!(outcome.violations.len(), 1);
        let message = outcome.violations.iter().next().unwrap();
        assert!(message.contains("Api-Version"));
        assert!(message.contains("response"));
    }

    #[test]
    fn request_api_version_compares_major_only() {
        let mut exchange = envelope_exchange(Some("3.0.0"));
        exchange.request.message.headers.clear();
        exchange
            .request
            .message
            .headers
            .insert("api-version".into(), vec!["3.1.0-beta".into()]);
        let (traffic, uuid) = record(exchange);
        let request_check = api_version_header_check(
            "SendingPlatform",
            uuid,
            HttpMessageType::Request,
            false,
            "3.0.0",
        );
        assert!(request_check
            .evaluate("SendingPlatform", &traffic)
            .unwrap()
            .violations
            .is_empty());

        let notification_check = api_version_header_check(
            "SendingPlatform",
            uuid,
            HttpMessageType::Request,
            true,
            "3.0.0",
        );
        assert_eq!(
            notification_check
                .evaluate("SendingPlatform", &traffic)
                .unwrap()
                .violations,
            BTreeSet::from(["Expected Api-Version '3.0.0' but found '3.1.0'".to_string()])
        );
    }

    #[test]
    fn url_method_and_status_messages() {
        let (traffic, uuid) = record(envelope_exchange(Some("3.0.0")));
        let url = url_path_check("SendingPlatform", uuid, &["/v3/receiver-validation"]);
        assert_eq!(
            url.evaluate("SendingPlatform", &traffic).unwrap().violations,
            BTreeSet::from([
                "Request URL 'https://rx.example/v3/envelopes' does not end with \
                 '/v3/receiver-validation'"
                    .to_string()
            ])
        );
        let method = http_method_check("SendingPlatform", uuid, "put");
        assert_eq!(
            method.evaluate("SendingPlatform", &traffic).unwrap().violations,
            BTreeSet::from([
                "Request method 'POST' does not match the expected method 'PUT'".to_string()
            ])
        );
        let status = response_status_check("ReceivingPlatform", uuid, &[200, 204]);
        assert_eq!(
            status.evaluate("ReceivingPlatform", &traffic).unwrap().violations,
            BTreeSet::from([
                "Response status '201' does not match one of the expected values: '200, 204'"
                    .to_string()
            ])
        );
        assert!(status.evaluate("SendingPlatform", &traffic).is_none());
    }

    #[test]
    fn attribute_presence_uses_json_pointer() {
        let (traffic, uuid) = record(envelope_exchange(Some("3.0.0")));
        let present = json_attribute_present_check(
            "SendingPlatform",
            uuid,
            HttpMessageType::Request,
            "/transportDocument",
        );
        let absent = json_attribute_present_check(
            "SendingPlatform",
            uuid,
            HttpMessageType::Request,
            "/envelopeTransferChain",
        );
        assert!(present.evaluate("SendingPlatform", &traffic).unwrap().violations.is_empty());
        assert_eq!(
            absent.evaluate("SendingPlatform", &traffic).unwrap().violations,
            BTreeSet::from([
                "The attribute '/envelopeTransferChain' should have been present, but was absent"
                    .to_string()
            ])
        );
    }
}
