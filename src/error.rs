//! Error types.

use thiserror::Error;

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the update pipeline and its vendor backends.
#[derive(Error, Debug)]
pub enum Error {
    /// Vendor handshake failed or the vendor backend is incompatible.
    #[error("initialization failed: {0}")]
    Initialization(String),

    /// A single device could not be enumerated or opened.
    #[error("unable to open device {device}: {reason}")]
    DeviceDiscovery { device: String, reason: String },

    /// A vendor write failed or panicked.
    #[error("flush failed for {device}: {reason}")]
    Flush { device: String, reason: String },

    /// One or more resources failed to release.
    #[error("{} resource(s) failed to release: {}", .0.len(), join(.0))]
    Disposal(Vec<Error>),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// LED key is not part of the device.
    #[error("unknown LED {led} on {device}")]
    UnknownLed { device: String, led: String },

    /// Update queue no longer accepts data.
    #[error("update queue for {0} is disposed")]
    Disposed(String),

    /// A provider for this vendor is already registered.
    #[error("a provider for {0} is already registered")]
    DuplicateProvider(String),

    /// Feature not supported by the device.
    #[error("unsupported {0}")]
    Unsupported(String),

    /// HID bus errors.
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),
}

impl Error {
    /// Collapse a list of release failures into a single result.
    pub(crate) fn from_disposal(errors: Vec<Error>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Disposal(errors))
        }
    }
}

fn join(errors: &[Error]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_disposal_is_ok() {
        assert!(Error::from_disposal(Vec::new()).is_ok());
    }

    #[test]
    fn disposal_lists_every_failure() {
        let errors = vec![Error::Disposed("a".into()), Error::Unsupported("zone: Cpu".into())];
        let err = Error::from_disposal(errors).unwrap_err();
        assert_eq!(
            err.to_string(),
            "2 resource(s) failed to release: update queue for a is disposed; unsupported zone: Cpu"
        );
    }
}
