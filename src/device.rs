// SPDX-License-Identifier: MIT

//! CUDA-first device selection with environment variable overrides.
//!
//! Arrays are GPU-resident by design; the CPU backend exists so the binding
//! and the bridge can be exercised without a GPU, and selecting it emits a
//! warning rather than staying silent.
//!
//! ## Environment Variables
//!
//! - `GPU_ARRAY_FORCE_CPU` - set to `1` or `true` to force CPU execution
//! - `GPU_ARRAY_CUDA_DEVICE` - CUDA device ordinal (e.g. `0`, `1`)
//!
//! ## Example
//!
//! ```rust
//! use gpu_array_bridge::{get_device, DeviceConfig};
//!
//! // Default: CUDA device 0 with auto-fallback
//! let device = get_device(&DeviceConfig::default())?;
//!
//! // Force CPU (for testing)
//! let device = get_device(&DeviceConfig::new().with_force_cpu(true))?;
//! # Ok::<(), gpu_array_bridge::BridgeError>(())
//! ```

use crate::error::Result;
use candle_core::Device;
use std::sync::{Once, OnceLock};

/// Configuration for device selection.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Preferred CUDA device ordinal.
    pub cuda_device: usize,
    /// Force CPU execution (disables GPU).
    pub force_cpu: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            cuda_device: 0,
            force_cpu: false,
        }
    }
}

impl DeviceConfig {
    /// Create a new device configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the preferred CUDA device ordinal.
    #[must_use]
    pub fn with_cuda_device(mut self, ordinal: usize) -> Self {
        self.cuda_device = ordinal;
        self
    }

    /// Force CPU execution.
    #[must_use]
    pub fn with_force_cpu(mut self, force: bool) -> Self {
        self.force_cpu = force;
        self
    }

    /// Build configuration from `GPU_ARRAY_FORCE_CPU` and
    /// `GPU_ARRAY_CUDA_DEVICE`.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("GPU_ARRAY_FORCE_CPU") {
            if val == "1" || val.eq_ignore_ascii_case("true") {
                config.force_cpu = true;
            }
        }
        if let Ok(val) = std::env::var("GPU_ARRAY_CUDA_DEVICE") {
            if let Ok(ordinal) = val.parse::<usize>() {
                config.cuda_device = ordinal;
            }
        }

        config
    }
}

/// Get a device according to configuration, preferring CUDA.
///
/// 1. If `force_cpu` is set, returns the CPU device with a warning
/// 2. Otherwise attempts the CUDA device at the configured ordinal
/// 3. Falls back to CPU with a warning if CUDA is unavailable
///
/// # Errors
///
/// Returns an error only if device creation fails entirely.
pub fn get_device(config: &DeviceConfig) -> Result<Device> {
    if config.force_cpu {
        tracing::warn!("CPU device forced via configuration; arrays will not be GPU-resident");
        return Ok(Device::Cpu);
    }

    match Device::cuda_if_available(config.cuda_device) {
        Ok(Device::Cuda(cuda)) => {
            tracing::info!(ordinal = config.cuda_device, "using CUDA device");
            Ok(Device::Cuda(cuda))
        }
        Ok(_) | Err(_) => {
            warn_if_cpu(&Device::Cpu);
            Ok(Device::Cpu)
        }
    }
}

/// The process-wide device arrays are created on, resolved once from the
/// environment.
pub fn default_device() -> &'static Device {
    static DEVICE: OnceLock<Device> = OnceLock::new();
    DEVICE.get_or_init(|| {
        get_device(&DeviceConfig::from_env()).unwrap_or(Device::Cpu)
    })
}

/// Emit a one-time warning if running on CPU.
///
/// Called when entering GPU-intended code paths; the warning is emitted only
/// once per process to avoid log spam.
pub fn warn_if_cpu(device: &Device) {
    static WARN_ONCE: Once = Once::new();

    if matches!(device, Device::Cpu) {
        WARN_ONCE.call_once(|| {
            tracing::warn!(
                "CPU device in use. CUDA is the intended default; CPU mode exists \
                 only as a compatibility fallback. Set GPU_ARRAY_FORCE_CPU=1 to \
                 silence this warning."
            );
        });
    }
}

/// Whether a CUDA device can actually be constructed in this process.
#[must_use]
pub fn cuda_available() -> bool {
    Device::new_cuda(0).is_ok()
}
