pub mod frame_sampler;
pub mod image_buffer;

pub use frame_sampler::FrameSampler;
pub use image_buffer::ImageBuffer;
