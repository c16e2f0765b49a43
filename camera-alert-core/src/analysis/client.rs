use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::wire;
use crate::models::analysis::AnalysisResult;
use crate::models::error::AnalysisError;
use crate::sampler::image_buffer::{ImageBuffer, DEFAULT_JPEG_QUALITY};
use crate::traits::analysis_transport::AnalysisTransport;

/// Clears the in-flight flag however the request ends.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Submits frames to the analysis endpoint, one at a time.
///
/// A call made while another is pending fails with
/// [`AnalysisError::Busy`] and leaves the pending call alone.
pub struct AnalysisClient {
    transport: Arc<dyn AnalysisTransport>,
    in_flight: AtomicBool,
    sequence: AtomicU64,
    jpeg_quality: u8,
}

impl AnalysisClient {
    pub fn new(transport: Arc<dyn AnalysisTransport>) -> Self {
        Self::with_quality(transport, DEFAULT_JPEG_QUALITY)
    }

    pub fn with_quality(transport: Arc<dyn AnalysisTransport>, jpeg_quality: u8) -> Self {
        Self {
            transport,
            in_flight: AtomicBool::new(false),
            sequence: AtomicU64::new(0),
            jpeg_quality,
        }
    }

    /// Whether a request is pending.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Sequence number of the most recent submission (0 = none yet).
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// Encode `buffer`, submit it and parse the reply. Blocks until done.
    pub fn analyze(&self, buffer: &ImageBuffer) -> Result<AnalysisResult, AnalysisError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Analysis request rejected, another is in flight");
            return Err(AnalysisError::Busy);
        }
        let _in_flight = InFlight(&self.in_flight);

        let jpeg = buffer
            .encode_jpeg(self.jpeg_quality)
            .map_err(|e| AnalysisError::Encode(e.to_string()))?;
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel) + 1;
        log::debug!(
            "Submitting frame #{sequence} ({}x{}, {} bytes)",
            buffer.width(),
            buffer.height(),
            jpeg.len()
        );

        let response = self.transport.submit(jpeg).inspect_err(|e| {
            log::warn!("Analysis request #{sequence} failed: {e}");
        })?;
        let result = wire::parse_response(&response, sequence).inspect_err(|e| {
            log::warn!("Analysis reply #{sequence} rejected: {e}");
        })?;

        log::info!(
            "Analysis #{sequence}: {} ({:.1}%), {} object(s)",
            result.state,
            result.confidence * 100.0,
            result.objects.len()
        );
        Ok(result)
    }
}
