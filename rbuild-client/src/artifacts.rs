//! Result retrieval endpoints

use tracing::debug;

use crate::BuildServiceClient;
use crate::error::{ClientError, Result};
use rbuild_core::dto::response::RawResponse;

impl BuildServiceClient {
    // =============================================================================
    // Results
    // =============================================================================

    /// Fetch a location's body as text
    ///
    /// # Arguments
    /// * `location` - Location of the result manifest
    pub async fn get(&self, location: &str) -> Result<RawResponse> {
        let url = self.url_for(location);
        let response = self.client.get(&url).send().await?;

        Self::into_raw(response).await
    }

    /// Download an artifact
    ///
    /// # Arguments
    /// * `location` - Artifact location from the result manifest
    ///
    /// # Returns
    /// The artifact bytes; any status other than 200 is an error
    pub async fn download(&self, location: &str) -> Result<Vec<u8>> {
        let url = self.url_for(location);
        let response = self.client.get(&url).send().await?;

        let status = response.status().as_u16();
        if status != 200 {
            return Err(ClientError::Artifact {
                location: location.to_string(),
                status,
            });
        }

        let bytes = response.bytes().await?;
        debug!("Downloaded {} byte(s) from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}
