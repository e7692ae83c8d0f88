//! Model loading infrastructure
//!
//! Everything needed to get a checkpoint from a Hub ID or local directory
//! into memory: file resolution and download, device selection, and the
//! tokenizer wrapper.

pub mod device;
pub mod hub;
pub mod tokenizer;

pub use device::{
    is_cuda_available, is_metal_available, print_available_devices, select_device,
    DevicePreference,
};
pub use hub::{HubModelConfig, ModelLoader, ModelPath};
pub use tokenizer::TokenizerWrapper;
