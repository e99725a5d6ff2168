//! HTTP adapter for [`AudioQueryPort`].
//!
//! `POST {api_url}/api/v1/audio` with `{"text": ...}` answers
//! `{"audio": "<base64>", "mimeType": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use recall_core::{AudioPayload, AudioQueryPort, TransportError};

use crate::error::CliError;

const AUDIO_PATH: &str = "/api/v1/audio";

#[derive(Debug, Serialize)]
struct AudioRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioResponse {
    audio: String,
    mime_type: String,
}

impl From<AudioResponse> for AudioPayload {
    fn from(response: AudioResponse) -> Self {
        Self::base64(response.audio, response.mime_type)
    }
}

/// Speech backend client.
#[derive(Debug, Clone)]
pub struct HttpAudioClient {
    client: Client,
    endpoint: String,
}

impl HttpAudioClient {
    pub fn new(api_url: &str, timeout: Duration) -> Result<Self, CliError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CliError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}{AUDIO_PATH}", api_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AudioQueryPort for HttpAudioClient {
    async fn fetch_audio(&self, key: &str) -> Result<AudioPayload, TransportError> {
        tracing::debug!(endpoint = %self.endpoint, chars = key.chars().count(), "Requesting audio");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&AudioRequest { text: key })
            .send()
            .await
            .map_err(|e| request_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Speech backend returned an error");
            return Err(status_error(status, body));
        }

        let body: AudioResponse = response.json().await.map_err(|e| request_error(&e))?;
        tracing::debug!(mime_type = %body.mime_type, encoded = body.audio.len(), "Audio received");
        Ok(body.into())
    }
}

fn request_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Unavailable(err.to_string())
    } else if err.is_decode() {
        TransportError::Other(format!("malformed audio response: {err}"))
    } else {
        TransportError::Other(err.to_string())
    }
}

fn status_error(status: StatusCode, body: String) -> TransportError {
    let message = if body.trim().is_empty() {
        status.canonical_reason().unwrap_or("unknown error").to_string()
    } else {
        body
    };
    match status {
        StatusCode::BAD_REQUEST => TransportError::InvalidArgument(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => TransportError::Timeout,
        StatusCode::SERVICE_UNAVAILABLE => TransportError::Unavailable(message),
        _ => TransportError::Status {
            code: status.as_u16(),
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use recall_core::TransportEncoding;

    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let client = HttpAudioClient::new("http://tts.local:8000/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.endpoint(), "http://tts.local:8000/api/v1/audio");
    }

    #[test]
    fn response_becomes_base64_payload() {
        let body: AudioResponse =
            serde_json::from_str(r#"{"audio":"SUQz","mimeType":"audio/mpeg"}"#).unwrap();
        let payload = AudioPayload::from(body);
        assert_eq!(payload.encoding, TransportEncoding::Base64);
        assert_eq!(payload.mime_type, "audio/mpeg");
        assert_eq!(&payload.data[..], b"SUQz");
    }

    #[test]
    fn status_codes_map_to_transport_errors() {
        assert_eq!(
            status_error(StatusCode::BAD_REQUEST, "empty text".into()),
            TransportError::InvalidArgument("empty text".into())
        );
        assert_eq!(
            status_error(StatusCode::GATEWAY_TIMEOUT, String::new()),
            TransportError::Timeout
        );
        assert_eq!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, String::new()),
            TransportError::Unavailable("Service Unavailable".into())
        );
        assert_eq!(
            status_error(StatusCode::INTERNAL_SERVER_ERROR, "boom".into()),
            TransportError::Status {
                code: 500,
                message: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let client = HttpAudioClient::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap();
        let err = client.fetch_audio("hallo").await.unwrap_err();
        assert!(matches!(err, TransportError::Unavailable(_)), "got {err:?}");
    }
}
