use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;

use crate::models::error::AnalysisError;
use crate::models::settings::Settings;
use crate::traits::analysis_transport::{AnalysisTransport, TransportResponse};

/// Multipart field carrying the frame.
pub const FILE_FIELD: &str = "file";
/// File name sent with the frame.
pub const FILE_NAME: &str = "capture.jpg";

#[derive(Debug, Clone, PartialEq)]
pub struct HttpTransportConfig {
    /// API root, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    /// Whole-request timeout (default: 30 s).
    pub timeout: Duration,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            base_url: Settings::default().api_base_url,
            api_key: None,
            model: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl HttpTransportConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let non_blank = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            base_url: settings.api_base_url.clone(),
            api_key: non_blank(&settings.api_key),
            model: non_blank(&settings.model),
            ..Self::default()
        }
    }

    /// `{base_url}/analyze`, tolerating a trailing slash on the base.
    pub fn endpoint(&self) -> String {
        format!("{}/analyze", self.base_url.trim_end_matches('/'))
    }
}

/// Posts frames as `multipart/form-data` to `{base_url}/analyze`.
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self, AnalysisError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalysisError::Transport(format!("failed to create HTTP client: {e}")))?;
        let endpoint = config.endpoint();
        log::info!("Analysis endpoint: {endpoint}");
        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key,
            model: config.model,
        })
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, AnalysisError> {
        Self::new(HttpTransportConfig::from_settings(settings))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl AnalysisTransport for HttpTransport {
    fn submit(&self, jpeg: Vec<u8>) -> Result<TransportResponse, AnalysisError> {
        let part = Part::bytes(jpeg)
            .file_name(FILE_NAME)
            .mime_str("image/jpeg")
            .map_err(|e| AnalysisError::Transport(e.to_string()))?;
        let mut form = Form::new().part(FILE_FIELD, part);
        if let Some(model) = &self.model {
            form = form.text("model", model.clone());
        }

        let mut request = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                AnalysisError::Transport(format!("request timed out: {e}"))
            } else {
                AnalysisError::Transport(e.to_string())
            }
        })?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|e| AnalysisError::Transport(format!("failed to read response body: {e}")))?;

        if !(200..300).contains(&status) {
            log::warn!("Analysis endpoint answered HTTP {status}");
        }
        Ok(TransportResponse { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_base_url() {
        let config = HttpTransportConfig {
            base_url: "http://localhost:8000/api/".into(),
            ..Default::default()
        };
        assert_eq!(config.endpoint(), "http://localhost:8000/api/analyze");
        assert_eq!(
            HttpTransportConfig::default().endpoint(),
            "http://localhost:8000/api/analyze"
        );
    }

    #[test]
    fn settings_supply_credentials() {
        let settings = Settings {
            api_key: Some("key-123".into()),
            model: Some("  ".into()),
            api_base_url: "https://analysis.example/api".into(),
            ..Default::default()
        };
        let config = HttpTransportConfig::from_settings(&settings);
        assert_eq!(config.api_key.as_deref(), Some("key-123"));
        assert_eq!(config.model, None);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.endpoint(), "https://analysis.example/api/analyze");
    }

    #[test]
    fn unreachable_endpoint_is_transport_error() {
        let transport = HttpTransport::new(HttpTransportConfig {
            base_url: "http://127.0.0.1:9".into(),
            timeout: Duration::from_secs(2),
            ..Default::default()
        })
        .unwrap();
        assert!(matches!(
            transport.submit(vec![0xFF, 0xD8, 0xFF, 0xD9]),
            Err(AnalysisError::Transport(_))
        ));
    }
}
