//! Outbound HTTP to parties running outside the sandbox.

use async_trait::async_trait;
use serde_json::Value;

use quayside_core::{ConformanceRequest, ConformanceResponse, CounterpartConfiguration};

use crate::error::SandboxError;

#[async_trait]
pub trait ExchangeTransport: Send + Sync + 'static {
    /// Deliver `request` to the counterpart and return its response, with
    /// the response message addressed back to the requester.
    async fn send(
        &self,
        counterpart: &CounterpartConfiguration,
        request: ConformanceRequest,
    ) -> Result<ConformanceResponse, SandboxError>;
}

/// Blocking `ureq` client run on the blocking thread pool.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .into();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Full URL of a request path at the counterpart.
pub fn counterpart_url(
    counterpart: &CounterpartConfiguration,
    request: &ConformanceRequest,
) -> String {
    let mut url = format!("{}{}", counterpart.url.trim_end_matches('/'), request.url);
    let query: Vec<String> = request
        .query_params
        .iter()
        .flat_map(|(name, values)| values.iter().map(move |value| format!("{name}={value}")))
        .collect();
    if !query.is_empty() {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query.join("&"));
    }
    url
}

fn call(
    agent: &ureq::Agent,
    counterpart: &CounterpartConfiguration,
    request: &ConformanceRequest,
    url: &str,
) -> Result<(u16, Vec<(String, String)>, String), ureq::Error> {
    let headers = request
        .message
        .headers
        .iter()
        .flat_map(|(name, values)| values.iter().map(move |value| (name.as_str(), value.as_str())));
    let auth = match (&counterpart.auth_header_name, &counterpart.auth_header_value) {
        (Some(name), Some(value)) => Some((name.as_str(), value.as_str())),
        _ => None,
    };

    let mut response = match request.method.to_ascii_uppercase().as_str() {
        method @ ("POST" | "PUT" | "PATCH") => {
            let mut builder = match method {
                "POST" => agent.post(url),
                "PUT" => agent.put(url),
                _ => agent.patch(url),
            };
            for (name, value) in headers.chain(auth) {
                builder = builder.header(name, value);
            }
            if request.message.body.is_null() {
                builder.send_empty()?
            } else {
                builder.send_json(&request.message.body)?
            }
        }
        method => {
            let mut builder = match method {
                "DELETE" => agent.delete(url),
                _ => agent.get(url),
            };
            for (name, value) in headers.chain(auth) {
                builder = builder.header(name, value);
            }
            builder.call()?
        }
    };

    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response.body_mut().read_to_string()?;
    Ok((status, headers, body))
}

#[async_trait]
impl ExchangeTransport for UreqTransport {
    async fn send(
        &self,
        counterpart: &CounterpartConfiguration,
        request: ConformanceRequest,
    ) -> Result<ConformanceResponse, SandboxError> {
        let url = counterpart_url(counterpart, &request);
        tracing::info!(
            method = %request.method,
            %url,
            party = %counterpart.name,
            "calling counterpart"
        );

        // ureq is synchronous, so wrap in spawn_blocking
        let agent = self.agent.clone();
        let counterpart_config = counterpart.clone();
        let outgoing = request.clone();
        let target = url.clone();
        let (status, headers, body) = tokio::task::spawn_blocking(move || {
            call(&agent, &counterpart_config, &outgoing, &target)
        })
        .await
        .map_err(|e| SandboxError::Internal(format!("task join error: {e}")))?
        .map_err(|e| SandboxError::Transport {
            url: url.clone(),
            message: e.to_string(),
        })?;

        let body = if body.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&body).unwrap_or(Value::String(body))
        };
        let mut response = request.create_response(status).with_body(body);
        for (name, value) in headers {
            response = response.with_header(&name, &value);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counterpart(url: &str) -> CounterpartConfiguration {
        CounterpartConfiguration {
            name: "Receiver1".into(),
            role: "ReceivingPlatform".into(),
            url: url.into(),
            auth_header_name: None,
            auth_header_value: None,
        }
    }

    #[test]
    fn url_joins_base_path_and_query() {
        let mut request = ConformanceRequest::new("GET", "/v3/receiver-validation");
        request
            .query_params
            .insert("codeListProvider".into(), vec!["EPUI".into()]);
        assert_eq!(
            counterpart_url(&counterpart("http://localhost:9000/"), &request),
            "http://localhost:9000/v3/receiver-validation?codeListProvider=EPUI"
        );
    }
}
