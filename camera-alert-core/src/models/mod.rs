pub mod analysis;
pub mod config;
pub mod device;
pub mod error;
pub mod settings;
pub mod state;
