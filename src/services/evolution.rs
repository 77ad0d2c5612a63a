use async_trait::async_trait;
use serde_json::{Value, json};

use crate::schema::InstanceStatus;
use crate::services::media::{MediaDownload, MediaSource};

const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Thin client for the messaging provider's management API. Webhook media
/// downloads use per-event credentials instead of the configured ones, since
/// the provider includes them in each delivery.
pub struct EvolutionClient {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
}

impl EvolutionClient {
    pub fn new(base_url: Option<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url,
            api_key,
        }
    }

    fn credentials(&self) -> anyhow::Result<(&str, &str)> {
        match (self.base_url.as_deref(), self.api_key.as_deref()) {
            (Some(url), Some(key)) => Ok((url, key)),
            _ => anyhow::bail!("EVOLUTION_API_URL o EVOLUTION_API_KEY no están configuradas."),
        }
    }

    /// The provider wraps each entry as `{instance: {...}}`; unwrap it when
    /// present.
    pub async fn fetch_instances(&self) -> anyhow::Result<Vec<Value>> {
        let (base_url, api_key) = self.credentials()?;
        let response = self
            .client
            .get(format!("{base_url}/instance/fetchInstances"))
            .header("apikey", api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("fetchInstances returned {status}: {body}");
        }

        let data: Value = response.json().await?;
        match data {
            Value::Array(items) => Ok(items
                .into_iter()
                .map(|item| item.get("instance").cloned().unwrap_or(item))
                .collect()),
            other => Ok(vec![other]),
        }
    }

    /// Any failure maps to `Unknown` rather than an error; status polling is
    /// best-effort.
    pub async fn connection_state(&self, instance_name: &str) -> InstanceStatus {
        let (base_url, api_key) = match self.credentials() {
            Ok(creds) => creds,
            Err(e) => {
                tracing::debug!(error = %e, "provider not configured, reporting unknown state");
                return InstanceStatus::Unknown;
            }
        };

        let response = self
            .client
            .get(format!("{base_url}/instance/connectionState/{instance_name}"))
            .header("apikey", api_key)
            .send()
            .await;

        let data: Value = match response {
            Ok(resp) => match resp.json().await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(instance = instance_name, error = %e, "bad connectionState response");
                    return InstanceStatus::Unknown;
                }
            },
            Err(e) => {
                tracing::warn!(instance = instance_name, error = %e, "connectionState request failed");
                return InstanceStatus::Unknown;
            }
        };

        data.pointer("/instance/state")
            .or_else(|| data.get("state"))
            .and_then(Value::as_str)
            .map(InstanceStatus::from_provider)
            .unwrap_or(InstanceStatus::Unknown)
    }

    pub async fn create_instance(&self, instance_name: &str) -> anyhow::Result<Value> {
        let (base_url, api_key) = self.credentials()?;
        let response = self
            .client
            .post(format!("{base_url}/instance/create"))
            .header("apikey", api_key)
            .json(&json!({
                "instanceName": instance_name,
                "qrcode": true,
                "integration": "WHATSAPP-BAILEYS",
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("instance create returned {status}: {body}");
        }
        Ok(response.json().await?)
    }

    pub async fn delete_instance(&self, instance_name: &str) -> anyhow::Result<()> {
        let (base_url, api_key) = self.credentials()?;
        let response = self
            .client
            .delete(format!("{base_url}/instance/{instance_name}"))
            .header("apikey", api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("instance delete returned {status}: {body}");
        }
        Ok(())
    }

    /// Pairing data (`code` / `pairingCode`) relayed as-is to the dashboard.
    pub async fn connect_qr(&self, instance_name: &str) -> anyhow::Result<Value> {
        let (base_url, api_key) = self.credentials()?;
        let response = self
            .client
            .get(format!("{base_url}/instance/connect/{instance_name}"))
            .header("apikey", api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("instance connect returned {status}: {body}");
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl MediaSource for EvolutionClient {
    async fn fetch_base64(
        &self,
        server_url: &str,
        api_key: &str,
        message_id: &str,
    ) -> anyhow::Result<MediaDownload> {
        let response = self
            .client
            .get(format!(
                "{server_url}/chat/getBase64FromMediaMessage/{message_id}"
            ))
            .header("apikey", api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("media download returned {status}: {body}");
        }

        let data: Value = response.json().await?;
        let Some(base64) = data.get("base64").and_then(Value::as_str) else {
            anyhow::bail!("no base64 content in media response");
        };

        Ok(MediaDownload {
            base64: base64.to_string(),
            mime_type: data
                .get("mimetype")
                .and_then(Value::as_str)
                .unwrap_or("application/octet-stream")
                .to_string(),
            file_name: data
                .get("fileName")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}
