pub mod classifier;
pub mod device_catalog;

pub use classifier::{default_device, KeywordClassifier};
pub use device_catalog::{DeviceCatalog, DeviceListener, DeviceRefresh};
