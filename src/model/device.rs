//! Device selection for inference
//!
//! CUDA and Metal are compile-time features. A requested accelerator that
//! cannot initialize falls back to CPU with a warning instead of failing
//! the run.

use anyhow::Result;
use candle_core::Device;
use serde::{Deserialize, Serialize};

/// Where the model weights should live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DevicePreference {
    Cuda,
    Metal,
    Cpu,
    #[default]
    Auto,
}

impl std::str::FromStr for DevicePreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cuda" | "gpu" => Ok(Self::Cuda),
            "metal" => Ok(Self::Metal),
            "cpu" => Ok(Self::Cpu),
            "auto" => Ok(Self::Auto),
            other => Err(anyhow::anyhow!(
                "unknown device '{}' (expected cuda, metal, cpu, or auto)",
                other
            )),
        }
    }
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cuda => write!(f, "cuda"),
            Self::Metal => write!(f, "metal"),
            Self::Cpu => write!(f, "cpu"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

fn try_cuda() -> Option<Device> {
    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => return Some(device),
            Err(e) => tracing::debug!("CUDA probe failed: {}", e),
        }
    }
    None
}

fn try_metal() -> Option<Device> {
    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => return Some(device),
            Err(e) => tracing::debug!("Metal probe failed: {}", e),
        }
    }
    None
}

/// Turn a preference into a concrete device.
///
/// Placement is fixed for the process lifetime once the model lands on the
/// returned device.
pub fn select_device(preference: DevicePreference) -> Result<Device> {
    let device = match preference {
        DevicePreference::Cuda => match try_cuda() {
            Some(device) => {
                tracing::info!("Running on CUDA");
                device
            }
            None => {
                tracing::warn!(
                    "CUDA requested but unavailable (init failed or built without \
                     the 'cuda' feature), running on CPU"
                );
                Device::Cpu
            }
        },
        DevicePreference::Metal => match try_metal() {
            Some(device) => {
                tracing::info!("Running on Metal");
                device
            }
            None => {
                tracing::warn!(
                    "Metal requested but unavailable (init failed or built without \
                     the 'metal' feature), running on CPU"
                );
                Device::Cpu
            }
        },
        DevicePreference::Cpu => Device::Cpu,
        DevicePreference::Auto => {
            if let Some(device) = try_cuda() {
                tracing::info!("Auto-selected CUDA");
                device
            } else if let Some(device) = try_metal() {
                tracing::info!("Auto-selected Metal");
                device
            } else {
                tracing::info!("Auto-selected CPU");
                Device::Cpu
            }
        }
    };
    Ok(device)
}

pub fn is_cuda_available() -> bool {
    try_cuda().is_some()
}

pub fn is_metal_available() -> bool {
    try_metal().is_some()
}

/// Print the device support matrix for this build.
pub fn print_available_devices() {
    println!("Device support:");
    println!("  cpu    ✓ always available");

    if cfg!(feature = "cuda") {
        if is_cuda_available() {
            println!("  cuda   ✓ ready");
        } else {
            println!("  cuda   ✗ no usable device");
        }
    } else {
        println!("  cuda   ✗ not built (enable with --features cuda)");
    }

    if cfg!(feature = "metal") {
        if is_metal_available() {
            println!("  metal  ✓ ready");
        } else {
            println!("  metal  ✗ no usable device");
        }
    } else {
        println!("  metal  ✗ not built (enable with --features metal)");
    }
}
