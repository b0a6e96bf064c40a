//! Fleet inventory HTTP client

use std::time::Duration;

use async_trait::async_trait;
use fleetdb_client::{Asset, ComponentFirmwareSet, ListResponse, RecordResponse};
use reqwest::{header, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use crate::inventory::{Inventory, InventoryError};
use crate::models::firmware::Firmware;

/// Client for the fleet inventory API
pub struct FleetDbClient {
    client: Client,
    base_url: Url,
    token: Option<SecretString>,
}

impl FleetDbClient {
    pub fn new(base_url: &str, token: Option<SecretString>) -> Result<Self, InventoryError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        // A trailing slash keeps the last path segment when joining
        let mut base = base_url.trim_end_matches('/').to_string();
        base.push('/');

        Ok(Self {
            client,
            base_url: Url::parse(&base)?,
            token,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        kind: &'static str,
        id: &str,
    ) -> Result<T, InventoryError> {
        let url = self.base_url.join(path)?;
        debug!("GET {}", url);

        let mut request = self.client.get(url).query(query);
        if let Some(token) = &self.token {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(InventoryError::NotFound {
                kind,
                id: id.to_string(),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Inventory GET {} failed: {} - {}", path, status, body);
            return Err(InventoryError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl Inventory for FleetDbClient {
    async fn asset_by_id(&self, id: Uuid) -> Result<Asset, InventoryError> {
        let id = id.to_string();
        let response: RecordResponse<Asset> = self
            .get(&format!("api/v1/servers/{}", id), &[], "asset", &id)
            .await?;
        Ok(response.record)
    }

    async fn firmware_by_device_vendor_model(
        &self,
        vendor: &str,
        model: &str,
    ) -> Result<Vec<Firmware>, InventoryError> {
        let response: ListResponse<Firmware> = self
            .get(
                "api/v1/server-component-firmwares",
                &[("vendor", vendor), ("model", model)],
                "firmware",
                &format!("{}/{}", vendor, model),
            )
            .await?;

        Ok(response
            .records
            .into_iter()
            .filter(|fw| fw.applies_to(vendor, model))
            .collect())
    }

    async fn firmware_set_by_id(&self, id: Uuid) -> Result<ComponentFirmwareSet, InventoryError> {
        let id = id.to_string();
        let response: RecordResponse<ComponentFirmwareSet> = self
            .get(
                &format!("api/v1/server-component-firmware-sets/{}", id),
                &[],
                "firmware set",
                &id,
            )
            .await?;
        Ok(response.record)
    }
}
