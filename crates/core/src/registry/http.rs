//! REST implementation of the registry client.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::submission::{SubmissionFolders, SubmissionId, SubmissionRecord, SubmissionStatus};

use super::{OutgoingMessage, RegistryClient, RegistryConfig, RegistryError};

/// Registry client speaking the platform's JSON API.
pub struct HttpRegistryClient {
    client: Client,
    config: RegistryConfig,
}

#[derive(Deserialize)]
struct SubmissionPage {
    results: Vec<SubmissionRecord>,
}

#[derive(Serialize, Deserialize)]
struct StatusBody {
    status: SubmissionStatus,
}

#[derive(Serialize)]
struct AnnotationsBody<'a> {
    annotations: &'a BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct EntityMetadata {
    name: String,
}

impl HttpRegistryClient {
    /// Create a new registry client.
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| RegistryError::Unreachable(e.to_string()))?;

        Ok(Self { client, config })
    }

    /// Get the base URL without trailing slash.
    fn base_url(&self) -> &str {
        self.config.url.trim_end_matches('/')
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.api_token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.config.api_token)
        }
    }

    /// Send a request, mapping transport and HTTP failures.
    async fn send(&self, request: RequestBuilder) -> Result<Response, RegistryError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = body.chars().take(200).collect::<String>();
        Err(match status.as_u16() {
            404 => RegistryError::NotFound(message),
            400 | 422 => RegistryError::InvalidQuery(message),
            code => RegistryError::Http {
                status: code,
                message,
            },
        })
    }

    async fn json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T, RegistryError> {
        response
            .json::<T>()
            .await
            .map_err(|e| RegistryError::InvalidResponse(e.to_string()))
    }
}

fn map_transport_error(e: reqwest::Error) -> RegistryError {
    if e.is_timeout() {
        RegistryError::Timeout
    } else if e.is_connect() {
        RegistryError::Unreachable(e.to_string())
    } else {
        RegistryError::Http {
            status: e.status().map(|s| s.as_u16()).unwrap_or(0),
            message: e.to_string(),
        }
    }
}

fn encode(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch_submissions(
        &self,
        view_id: &str,
        status: SubmissionStatus,
    ) -> Result<Vec<SubmissionRecord>, RegistryError> {
        let url = self.url(&format!("/views/{}/submissions", encode(view_id)));
        let response = self
            .send(self.client.get(&url).query(&[("status", status.as_str())]))
            .await?;
        let page: SubmissionPage = Self::json(response).await?;
        debug!(
            "Registry view {} returned {} submissions with status {}",
            view_id,
            page.results.len(),
            status
        );
        Ok(page.results)
    }

    async fn get_submission_status(
        &self,
        id: &SubmissionId,
    ) -> Result<SubmissionStatus, RegistryError> {
        let url = self.url(&format!("/submissions/{}/status", encode(id.as_str())));
        let response = self.send(self.client.get(&url)).await?;
        let body: StatusBody = Self::json(response).await?;
        Ok(body.status)
    }

    async fn update_status(
        &self,
        id: &SubmissionId,
        status: SubmissionStatus,
    ) -> Result<(), RegistryError> {
        let url = self.url(&format!("/submissions/{}/status", encode(id.as_str())));
        self.send(self.client.put(&url).json(&StatusBody { status }))
            .await?;
        Ok(())
    }

    async fn annotate(
        &self,
        id: &SubmissionId,
        annotations: &BTreeMap<String, String>,
    ) -> Result<(), RegistryError> {
        let url = self.url(&format!("/submissions/{}/annotations", encode(id.as_str())));
        self.send(self.client.patch(&url).json(&AnnotationsBody { annotations }))
            .await?;
        Ok(())
    }

    async fn download(&self, reference: &str, dest_dir: &Path) -> Result<PathBuf, RegistryError> {
        let meta_url = self.url(&format!("/entities/{}", encode(reference)));
        let metadata: EntityMetadata = Self::json(self.send(self.client.get(&meta_url)).await?).await?;

        // Entity names come from participants; keep only the final path component.
        let file_name = Path::new(&metadata.name)
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| {
                RegistryError::InvalidResponse(format!("entity {} has no file name", reference))
            })?;

        let file_url = self.url(&format!("/entities/{}/file", encode(reference)));
        let bytes = self
            .send(self.client.get(&file_url))
            .await?
            .bytes()
            .await
            .map_err(map_transport_error)?;

        tokio::fs::create_dir_all(dest_dir).await?;
        let path = dest_dir.join(file_name);
        tokio::fs::write(&path, &bytes).await?;
        debug!("Downloaded {} ({} bytes) to {:?}", reference, bytes.len(), path);
        Ok(path)
    }

    async fn create_folders(&self, id: &SubmissionId) -> Result<SubmissionFolders, RegistryError> {
        let url = self.url(&format!("/submissions/{}/folders", encode(id.as_str())));
        let response = self.send(self.client.post(&url)).await?;
        Self::json(response).await
    }

    async fn upload_folder(&self, folder_id: &str, source: &Path) -> Result<usize, RegistryError> {
        let mut uploaded = 0;
        let mut pending = vec![source.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let relative = path
                    .strip_prefix(source)
                    .unwrap_or(&path)
                    .to_string_lossy()
                    .to_string();
                let bytes = tokio::fs::read(&path).await?;
                let url = self.url(&format!("/folders/{}/files", encode(folder_id)));
                self.send(
                    self.client
                        .post(&url)
                        .query(&[("name", relative.as_str())])
                        .body(bytes),
                )
                .await?;
                uploaded += 1;
            }
        }

        if uploaded == 0 {
            warn!("No files to upload from {:?}", source);
        }
        Ok(uploaded)
    }

    async fn send_message(&self, message: &OutgoingMessage) -> Result<(), RegistryError> {
        let url = self.url("/messages");
        self.send(self.client.post(&url).json(message)).await?;
        Ok(())
    }
}
