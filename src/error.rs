// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors raised while configuring the ray bender or reading/writing its files.
///
/// Per-ray failures (geometrically inadmissible rays, non-convergence) are not
/// errors; they are reported through [`crate::ray::RayOutcome`] and
/// [`crate::ray_info::RayType`].
#[derive(Debug)]
pub enum BenderError {
    /// One or more interface names have no layer in the model.
    UnknownInterface {
        /// The names that could not be resolved.
        names: Vec<String>,
    },
    /// An attribute name (e.g. `PSLOWNESS`) is not defined by the model.
    UnknownAttribute(String),
    /// A wave-type specification string could not be parsed.
    MalformedWaveTypeSpec {
        /// The offending specification.
        spec: String,
        /// Explanation of the problem.
        reason: String,
    },
    /// The phase name is not supported.
    UnknownPhase(String),
    /// The Earth model is inconsistent.
    InvalidModel(String),
    /// A configuration value is out of range.
    InvalidConfig(String),
    /// A source or receiver location is unusable.
    InvalidLocation {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
        /// Depth in km.
        depth: f64,
        /// Explanation of why it's invalid.
        reason: String,
    },
    /// A binary record could not be decoded.
    Format(String),
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl fmt::Display for BenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BenderError::UnknownInterface { names } => {
                write!(
                    f,
                    "interface name(s) not defined by the model: {}",
                    names.join(", ")
                )
            }
            BenderError::UnknownAttribute(name) => {
                write!(f, "attribute '{}' not defined by the model", name)
            }
            BenderError::MalformedWaveTypeSpec { spec, reason } => {
                write!(f, "malformed wave type specification '{}': {}", spec, reason)
            }
            BenderError::UnknownPhase(name) => write!(f, "unsupported phase: {}", name),
            BenderError::InvalidModel(reason) => write!(f, "invalid model: {}", reason),
            BenderError::InvalidConfig(reason) => write!(f, "invalid configuration: {}", reason),
            BenderError::InvalidLocation {
                lat,
                lon,
                depth,
                reason,
            } => {
                write!(
                    f,
                    "invalid location (lat {}, lon {}, depth {} km): {}",
                    lat, lon, depth, reason
                )
            }
            BenderError::Format(reason) => write!(f, "format error: {}", reason),
            BenderError::IoError(e) => write!(f, "I/O error: {}", e),
            BenderError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BenderError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BenderError {
    fn from(e: std::io::Error) -> Self {
        BenderError::IoError(e)
    }
}

/// Convenience type alias for Results with BenderError.
pub type Result<T> = std::result::Result<T, BenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_unknown_interface_lists_all_names() {
        let e = BenderError::UnknownInterface {
            names: vec!["M410".to_string(), "M660".to_string()],
        };
        assert_eq!(
            e.to_string(),
            "interface name(s) not defined by the model: M410, M660"
        );
    }

    #[test]
    fn display_unknown_attribute() {
        let e = BenderError::UnknownAttribute("QSLOWNESS".to_string());
        assert_eq!(e.to_string(), "attribute 'QSLOWNESS' not defined by the model");
    }

    #[test]
    fn display_malformed_spec() {
        let e = BenderError::MalformedWaveTypeSpec {
            spec: "PSLOWNESS, CMB".to_string(),
            reason: "interface without wave type".to_string(),
        };
        assert!(e.to_string().contains("PSLOWNESS, CMB"));
        assert!(e.to_string().contains("interface without wave type"));
    }

    #[test]
    fn display_unknown_phase() {
        let e = BenderError::UnknownPhase("PKIKP".to_string());
        assert_eq!(e.to_string(), "unsupported phase: PKIKP");
    }

    #[test]
    fn display_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let e = BenderError::IoError(io_err);
        assert!(e.to_string().contains("file not found"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let e: BenderError = io_err.into();
        assert!(matches!(e, BenderError::IoError(_)));
    }
}
