use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::warn;

use crate::config::{Config, DISPATCH_TIMEOUT_SECS};
use crate::error::Result;
use crate::types::{PushMessage, SendOutcome};

/// Concurrent sends inside one multicast.
const MULTICAST_CONCURRENCY: usize = 8;

/// Opaque push-delivery transport. The engine never inspects transport
/// error causes — any non-success counts as a failure and never aborts
/// remaining recipients.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send_one(&self, token: &str, msg: &PushMessage) -> bool;

    async fn send_many(&self, tokens: &[String], msg: &PushMessage) -> SendOutcome;
}

/// FCM HTTP v1 implementation. The v1 API has no multicast endpoint, so
/// `send_many` fans out per-token sends with bounded concurrency.
pub struct FcmGateway {
    client: reqwest::Client,
    api_url: String,
    project_id: String,
    auth_token: String,
}

impl FcmGateway {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DISPATCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_url: cfg.fcm_api_url.clone(),
            project_id: cfg.fcm_project_id.clone(),
            auth_token: cfg.fcm_auth_token.clone(),
        })
    }

    fn message_json(&self, token: &str, msg: &PushMessage) -> serde_json::Value {
        serde_json::json!({
            "message": {
                "token": token,
                "notification": {
                    "title": msg.title,
                    "body": msg.body,
                },
                "data": stringify_data(&msg.data),
                "android": { "priority": "high" },
            }
        })
    }
}

/// FCM data payloads must be flat string maps.
fn stringify_data(data: &serde_json::Value) -> HashMap<String, String> {
    let Some(obj) = data.as_object() else {
        return HashMap::new();
    };
    obj.iter()
        .map(|(k, v)| {
            let s = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), s)
        })
        .collect()
}

#[async_trait]
impl NotificationGateway for FcmGateway {
    async fn send_one(&self, token: &str, msg: &PushMessage) -> bool {
        let url = format!("{}/projects/{}/messages:send", self.api_url, self.project_id);
        let body = self.message_json(token, msg);

        let result = self
            .client
            .post(&url)
            .bearer_auth(&self.auth_token)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                warn!(status = %resp.status(), "FCM send rejected");
                false
            }
            // reqwest's client timeout covers the stalled-send case
            Err(e) => {
                warn!("FCM send failed: {e}");
                false
            }
        }
    }

    async fn send_many(&self, tokens: &[String], msg: &PushMessage) -> SendOutcome {
        // Build every send future up front; streaming the token slice and
        // mapping through the boxed trait future trips rustc's
        // higher-ranked lifetime inference.
        let sends: Vec<_> = tokens.iter().map(|token| self.send_one(token, msg)).collect();
        let results: Vec<bool> = stream::iter(sends)
            .buffer_unordered(MULTICAST_CONCURRENCY)
            .collect()
            .await;

        let success_count = results.iter().filter(|ok| **ok).count() as u32;
        SendOutcome {
            success_count,
            failure_count: results.len() as u32 - success_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn data_payload_flattens_to_strings() {
        let data = json!({
            "kind": "weather_alert",
            "market_id": 7,
            "value": 34.5,
        });
        let flat = stringify_data(&data);
        assert_eq!(flat["kind"], "weather_alert");
        assert_eq!(flat["market_id"], "7");
        assert_eq!(flat["value"], "34.5");
    }

    #[test]
    fn non_object_payload_is_empty() {
        assert!(stringify_data(&json!(null)).is_empty());
        assert!(stringify_data(&json!([1, 2])).is_empty());
    }

    #[tokio::test]
    async fn multicast_fans_out_and_counts_unreachable_sends_as_failures() {
        // port 9 (discard) refuses connections, so every send fails fast
        let cfg = Config {
            log_level: "info".into(),
            db_path: ":memory:".into(),
            api_port: 0,
            kma_api_url: "http://127.0.0.1:9".into(),
            kma_service_key: "key".into(),
            fcm_api_url: "http://127.0.0.1:9".into(),
            fcm_project_id: "project".into(),
            fcm_auth_token: "token".into(),
            cycle_interval_secs: 3600,
            lookahead_hours: 24,
        };
        let gateway = FcmGateway::new(&cfg).unwrap();
        let msg = PushMessage {
            title: "t".into(),
            body: "b".into(),
            data: json!({ "kind": "weather_alert" }),
        };

        let tokens: Vec<String> = (0..3).map(|i| format!("token-{i}")).collect();
        let outcome = gateway.send_many(&tokens, &msg).await;
        assert_eq!(outcome.success_count, 0);
        assert_eq!(outcome.failure_count, 3);
    }
}
