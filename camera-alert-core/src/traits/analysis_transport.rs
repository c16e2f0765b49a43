use crate::models::error::AnalysisError;

/// Raw reply from the analysis endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Delivers an encoded frame to the analysis endpoint.
///
/// Implemented by `HttpTransport` (multipart POST) and by test doubles.
pub trait AnalysisTransport: Send + Sync {
    /// Submit one JPEG image and wait for the reply.
    ///
    /// Only transport-level failures are errors; HTTP error statuses come
    /// back as a response.
    fn submit(&self, jpeg: Vec<u8>) -> Result<TransportResponse, AnalysisError>;
}
