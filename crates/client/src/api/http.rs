//! reqwest implementation of [`FileApi`].

use async_trait::async_trait;
use protocol::{
    encode_object_path, DeleteResponse, DownloadUrlResponse, FileListResponse, Identity,
    QuerySpec, UploadFile, UploadResponse,
};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::{render_error_body, ApiError, ApiResult, FileApi};

/// Multipart field name the backend reads uploads from.
pub const UPLOAD_FIELD: &str = "files";

/// HTTP client for the file-storage backend.
#[derive(Debug, Clone)]
pub struct HttpFileApi {
    client: Client,
    base_url: String,
}

impl HttpFileApi {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Create a client reusing an existing reqwest client.
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// The backend base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Build the `GET /files` request without sending it.
    pub fn list_request(&self, token: &str, query: &QuerySpec) -> RequestBuilder {
        self.client
            .get(self.url("files"))
            .query(&query.to_params())
            .bearer_auth(token)
    }

    /// Build the signed-URL request for an object without sending it.
    pub fn download_url_request(&self, token: &str, object_name: &str) -> ApiResult<RequestBuilder> {
        let path = encode_object_path(object_name)?;
        Ok(self
            .client
            .get(self.url(&format!("files/{}/download", path)))
            .bearer_auth(token))
    }

    /// Build the delete request for an object without sending it.
    pub fn delete_request(&self, token: &str, object_name: &str) -> ApiResult<RequestBuilder> {
        let path = encode_object_path(object_name)?;
        Ok(self
            .client
            .delete(self.url(&format!("files/{}", path)))
            .bearer_auth(token))
    }

    /// Send a request and decode its JSON body.
    ///
    /// An empty 2xx body decodes as `{}`.
    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        if !status.is_success() {
            tracing::debug!("Backend returned {}: {}", status, body);
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: render_error_body(status.as_u16(), &body),
            });
        }

        let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl FileApi for HttpFileApi {
    async fn list_files(&self, token: &str, query: &QuerySpec) -> ApiResult<FileListResponse> {
        tracing::debug!("GET /files ({})", query);
        self.send_json(self.list_request(token, query)).await
    }

    async fn me(&self, token: &str) -> ApiResult<Identity> {
        tracing::debug!("GET /me");
        self.send_json(self.client.get(self.url("me")).bearer_auth(token))
            .await
    }

    async fn upload(&self, token: &str, files: Vec<UploadFile>) -> ApiResult<UploadResponse> {
        tracing::debug!("POST /upload ({} files)", files.len());

        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.content)
                .file_name(file.filename)
                .mime_str(&file.mime_type)
                .map_err(|e| ApiError::Transport(e.to_string()))?;
            form = form.part(UPLOAD_FIELD, part);
        }

        let request = self
            .client
            .post(self.url("upload"))
            .bearer_auth(token)
            .multipart(form);
        self.send_json(request).await
    }

    async fn download_url(
        &self,
        token: &str,
        object_name: &str,
    ) -> ApiResult<DownloadUrlResponse> {
        tracing::debug!("GET /files/{}/download", object_name);
        let request = self.download_url_request(token, object_name)?;
        self.send_json(request).await
    }

    async fn delete(&self, token: &str, object_name: &str) -> ApiResult<DeleteResponse> {
        tracing::debug!("DELETE /files/{}", object_name);
        let request = self.delete_request(token, object_name)?;
        self.send_json(request).await
    }

    async fn fetch_signed(&self, url: &str) -> ApiResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                body: render_error_body(status.as_u16(), &body),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
