use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use url::Url;

use crate::settings::ClientSettings;
use crate::{ClientError, FailureKind, JobId, JobStatus, RunRequest, StatusReport};

/// The poller's only view of the server.
#[async_trait::async_trait]
pub trait StatusClient: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, ClientError>;
}

#[derive(Debug, Deserialize)]
struct RawStatus {
    status: Option<String>,
    output: Option<String>,
    progress: Option<serde_json::Value>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRunResponse {
    job_id: Option<serde_json::Value>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReqwestJobClient {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl ReqwestJobClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ClientError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Starts a playbook run and returns the server's job id.
    pub async fn submit(&self, request: &RunRequest) -> Result<JobId, ClientError> {
        let url = self.endpoint("run")?;
        let body = serde_json::to_vec(request)
            .map_err(|err| ClientError::new(FailureKind::Protocol, err.to_string()))?;
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        let bytes = self.read_body(response).await?;
        let parsed: Option<RawRunResponse> = serde_json::from_slice(&bytes).ok();

        if let Some(message) = parsed.as_ref().and_then(|raw| raw.error.clone()) {
            return Err(ClientError::new(FailureKind::Rejected, message));
        }
        if !status.is_success() {
            return Err(ClientError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let raw = parsed.ok_or_else(|| {
            ClientError::new(FailureKind::Protocol, "run response is not a JSON object")
        })?;
        match raw.job_id {
            Some(serde_json::Value::String(id)) if !id.trim().is_empty() => Ok(id),
            Some(serde_json::Value::Number(id)) => Ok(id.to_string()),
            _ => Err(ClientError::new(
                FailureKind::Protocol,
                "run response has no job_id",
            )),
        }
    }

    /// Asks the server to stop a job. The job's final status still arrives
    /// through the status endpoint.
    pub async fn cancel(&self, job_id: &str) -> Result<(), ClientError> {
        let url = self.endpoint("cancel")?;
        let body = serde_json::json!({ "job_id": job_id }).to_string();
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.settings
            .base_url
            .join(path)
            .map_err(|err| ClientError::new(FailureKind::InvalidUrl, err.to_string()))
    }

    fn status_url(&self, job_id: &str) -> Result<Url, ClientError> {
        if is_dot_segment(job_id) {
            return Err(ClientError::new(
                FailureKind::InvalidUrl,
                format!("job id {job_id:?} is not a usable path segment"),
            ));
        }
        let mut url = self.endpoint("status/")?;
        url.path_segments_mut()
            .map_err(|_| ClientError::new(FailureKind::InvalidUrl, "base url cannot be a base"))?
            .pop_if_empty()
            .push(job_id);
        Ok(url)
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>, ClientError> {
        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(ClientError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(content_len),
                    },
                    "response too large",
                ));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(ClientError::new(
                    FailureKind::TooLarge {
                        max_bytes,
                        actual: Some(next_len),
                    },
                    "response too large",
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl StatusClient for ReqwestJobClient {
    async fn fetch_status(&self, job_id: &str) -> Result<StatusReport, ClientError> {
        let url = self.status_url(job_id)?;
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::new(
                FailureKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        let bytes = self.read_body(response).await?;
        parse_status_body(&bytes)
    }
}

/// Decodes a status endpoint body into a [`StatusReport`].
pub fn parse_status_body(bytes: &[u8]) -> Result<StatusReport, ClientError> {
    let raw: RawStatus = serde_json::from_slice(bytes)
        .map_err(|err| ClientError::new(FailureKind::Protocol, err.to_string()))?;

    let status_text = match (raw.status, raw.error) {
        (Some(status), _) => status,
        (None, Some(error)) => return Err(ClientError::new(FailureKind::Protocol, error)),
        (None, None) => {
            return Err(ClientError::new(
                FailureKind::Protocol,
                "status response has no status field",
            ))
        }
    };
    let status: JobStatus = status_text.parse().map_err(|err: crate::UnknownStatus| {
        ClientError::new(FailureKind::Protocol, err.to_string())
    })?;

    Ok(StatusReport {
        status,
        output: raw.output,
        progress: raw.progress.as_ref().and_then(parse_progress),
    })
}

fn parse_progress(value: &serde_json::Value) -> Option<u8> {
    let number = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if !number.is_finite() {
        return None;
    }
    Some(number.round().clamp(0.0, 100.0) as u8)
}

/// `.` and `..` would be dropped by URL path normalisation instead of
/// being sent as the job id.
pub(crate) fn is_dot_segment(job_id: &str) -> bool {
    matches!(job_id, "." | "..")
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::new(FailureKind::Timeout, err.to_string());
    }
    ClientError::new(FailureKind::Network, err.to_string())
}
