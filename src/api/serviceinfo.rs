//! Service-info endpoints: categories and per-category parameter readings

use std::sync::Arc;

use crate::auth::CredentialStore;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::models::{Category, RawParameter, Reading};
use crate::normalize::normalize;

use super::transport::{JsonResponse, Transport};

/// Bearer-authenticated client for the telemetry endpoints.
pub struct ServiceInfo {
    options: Arc<Options>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
}

impl ServiceInfo {
    pub fn new(
        options: Arc<Options>,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            options,
            transport,
            store,
        }
    }

    fn access_token(&self) -> Result<String> {
        self.store
            .get()
            .map(|c| c.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::Auth {
                status: 401,
                message: "no access token stored".to_string(),
            })
    }

    /// GET with bearer auth; non-200 maps to `Error::Api`, and a 401
    /// clears stored credentials so the next cycle re-authorizes.
    async fn get(&self, path_and_query: &str) -> Result<JsonResponse> {
        let token = self.access_token()?;
        let resp = self.transport.get_json(path_and_query, Some(&token)).await?;

        if !resp.is_ok() {
            if resp.status == 401 {
                tracing::warn!("data endpoint returned 401, clearing stored credentials");
                if let Err(e) = self.store.clear() {
                    tracing::warn!("failed to clear credentials: {}", e);
                }
            }
            return Err(Error::Api {
                status: resp.status,
                message: resp.error_message(),
            });
        }
        Ok(resp)
    }

    /// Telemetry categories for the configured system.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        let path = format!(
            "/api/v1/systems/{}/serviceinfo/categories",
            self.options.system_id
        );
        let resp = self.get(&path).await?;
        serde_json::from_value(resp.body).map_err(|e| Error::Api {
            status: 200,
            message: format!("malformed categories response: {}", e),
        })
    }

    /// Raw parameter rows for one category.
    pub async fn category_parameters(&self, category_id: &str) -> Result<Vec<RawParameter>> {
        let path = format!(
            "/api/v1/systems/{}/serviceinfo/categories/status?categoryId={}",
            self.options.system_id, category_id
        );
        let resp = self.get(&path).await?;
        serde_json::from_value(resp.body).map_err(|e| Error::Api {
            status: 200,
            message: format!("malformed parameters response: {}", e),
        })
    }

    /// Fetch every category sequentially, normalize and flatten in category
    /// order. The first per-category error aborts the whole fetch; partial
    /// results are discarded.
    pub async fn fetch_all(&self, categories: &[Category]) -> Result<Vec<Reading>> {
        let mut readings = Vec::new();
        for category in categories {
            let raw = self.category_parameters(&category.category_id).await?;
            readings.extend(
                raw.into_iter()
                    .map(|r| normalize(r, &category.category_id, &self.options.parameters)),
            );
        }
        Ok(readings)
    }
}
