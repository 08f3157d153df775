//! Build submission and polling endpoints

use rbuild_core::domain::request::{BuildRequest, Payload, fields};
use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::BuildServiceClient;
use crate::error::Result;
use rbuild_core::dto::response::RawResponse;

impl BuildServiceClient {
    // =============================================================================
    // Service
    // =============================================================================

    /// Fetch the service root
    ///
    /// # Returns
    /// The raw response; any status is returned, not treated as an error
    pub async fn ping(&self) -> Result<RawResponse> {
        let url = format!("{}/", self.base_url);
        let response = self.client.get(&url).send().await?;

        Self::into_raw(response).await
    }

    // =============================================================================
    // Build Lifecycle
    // =============================================================================

    /// Submit a build request
    ///
    /// Sends a plain form body, or a multi-part body when the request has an
    /// attachment. Repeated fields such as `cmd_args` are sent once per value,
    /// in order.
    ///
    /// # Arguments
    /// * `request` - The build request
    ///
    /// # Returns
    /// The raw submission response, to be decoded with
    /// `rbuild_core::status::decode_submission`
    pub async fn submit(&self, request: &BuildRequest) -> Result<RawResponse> {
        let url = format!("{}/builds", self.base_url);

        let builder = match request.payload() {
            Payload::Form(form_fields) => {
                debug!("Submitting build with {} form field(s)", form_fields.len());
                self.client.post(&url).form(&form_fields)
            }
            Payload::Multipart {
                fields: form_fields,
                file,
            } => {
                debug!(
                    "Submitting build with {} form field(s) and file {}",
                    form_fields.len(),
                    file.name
                );
                let form = form_fields
                    .into_iter()
                    .fold(Form::new(), |form, (name, value)| form.text(name, value));
                let part = Part::bytes(file.content).file_name(file.name);
                self.client
                    .post(&url)
                    .multipart(form.part(fields::FILES, part))
            }
        };

        let response = builder.send().await?;

        Self::into_raw(response).await
    }

    /// Poll a follow-up location
    ///
    /// # Arguments
    /// * `location` - Location from the submission or a previous poll
    ///
    /// # Returns
    /// The raw poll response; a 303 is returned as-is, never followed
    pub async fn poll(&self, location: &str) -> Result<RawResponse> {
        let url = self.url_for(location);
        debug!("Polling {}", url);
        let response = self.client.get(&url).send().await?;

        Self::into_raw(response).await
    }
}
