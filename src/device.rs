//! Inference device selection.
//!
//! The requested device is a preference, not a guarantee: `Auto` probes
//! hardware in order CUDA, MPS, CPU, and an explicit request for an
//! accelerator that is not present falls back to CPU rather than failing
//! the whole conversion.

use tch::Device;
use tracing::{debug, warn};

/// Requested inference device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePreference {
    /// Probe hardware: CUDA, then MPS (Apple Silicon), then CPU.
    #[default]
    Auto,
    Cpu,
    Cuda,
    Mps,
}

impl DevicePreference {
    /// Parse a device name leniently.
    ///
    /// Unrecognized names fall back to CPU with a warning so a typo on the
    /// command line degrades performance instead of aborting a long run.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "auto" => DevicePreference::Auto,
            "cpu" => DevicePreference::Cpu,
            "cuda" | "gpu" => DevicePreference::Cuda,
            "mps" => DevicePreference::Mps,
            other => {
                warn!("Unknown device '{other}', falling back to CPU");
                DevicePreference::Cpu
            }
        }
    }

    /// Resolve the preference against available hardware.
    pub fn resolve(self) -> Device {
        match self {
            DevicePreference::Auto => detect_best_device(),
            DevicePreference::Cpu => Device::Cpu,
            DevicePreference::Cuda => {
                if tch::Cuda::is_available() {
                    Device::Cuda(0)
                } else {
                    warn!("CUDA requested but not available, using CPU");
                    Device::Cpu
                }
            }
            DevicePreference::Mps => {
                if tch::utils::has_mps() {
                    Device::Mps
                } else {
                    warn!("MPS requested but not available, using CPU");
                    Device::Cpu
                }
            }
        }
    }
}

impl std::fmt::Display for DevicePreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DevicePreference::Auto => write!(f, "auto"),
            DevicePreference::Cpu => write!(f, "cpu"),
            DevicePreference::Cuda => write!(f, "cuda"),
            DevicePreference::Mps => write!(f, "mps"),
        }
    }
}

/// Detect the fastest available inference device.
fn detect_best_device() -> Device {
    if tch::Cuda::is_available() {
        debug!("CUDA available ({} device(s))", tch::Cuda::device_count());
        return Device::Cuda(0);
    }
    if tch::utils::has_mps() {
        debug!("MPS available");
        return Device::Mps;
    }
    debug!("No accelerator found, using CPU");
    Device::Cpu
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_devices() {
        assert_eq!(DevicePreference::parse("auto"), DevicePreference::Auto);
        assert_eq!(DevicePreference::parse("cpu"), DevicePreference::Cpu);
        assert_eq!(DevicePreference::parse("CUDA"), DevicePreference::Cuda);
        assert_eq!(DevicePreference::parse(" mps "), DevicePreference::Mps);
    }

    #[test]
    fn test_parse_unknown_falls_back_to_cpu() {
        assert_eq!(DevicePreference::parse("tpu"), DevicePreference::Cpu);
        assert_eq!(DevicePreference::parse(""), DevicePreference::Cpu);
    }

    #[test]
    fn test_cpu_resolves_to_cpu() {
        assert_eq!(DevicePreference::Cpu.resolve(), Device::Cpu);
    }
}
