pub mod client;
pub mod continuous;
pub mod http_transport;
pub mod wire;

pub use client::AnalysisClient;
pub use continuous::ContinuousAnalyzer;
pub use http_transport::{HttpTransport, HttpTransportConfig};
