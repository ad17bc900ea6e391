use super::{CommandInvoker, CommandRejection};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Invoker that forwards commands to `POST {base_url}/invoke/{command}`.
pub struct HttpInvoker {
    client: reqwest::Client,
    base_url: String,
}

impl HttpInvoker {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn command_url(&self, command: &str) -> String {
        format!("{}/invoke/{}", self.base_url, command)
    }
}

/// Parse a response body: JSON when it parses, otherwise the raw text.
fn parse_body(body: String) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    match serde_json::from_str::<Value>(&body) {
        Ok(v) => v,
        Err(_) => Value::String(body),
    }
}

#[async_trait]
impl CommandInvoker for HttpInvoker {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, CommandRejection> {
        let url = self.command_url(command);
        tracing::debug!(%url, "invoking remote command");
        let resp = self
            .client
            .post(&url)
            .json(&args)
            .send()
            .await
            .map_err(|e| CommandRejection::message(format!("HTTP Request Error: {e}")))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| CommandRejection::message(format!("HTTP Request Error: {e}")))?;
        let payload = parse_body(body);
        if status.is_success() {
            Ok(payload)
        } else {
            tracing::debug!(%status, "remote command rejected");
            Err(CommandRejection(payload))
        }
    }
}
