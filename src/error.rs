//! Error types and result definitions for the fritzlink crate.
//! Includes conversion from IO, HTTP, XML and JSON errors.

use thiserror::Error;

/// Represents all possible errors that can occur when talking to a FRITZ!Box.
///
/// An unsupported service or action is not an error: those calls resolve to
/// `Ok(None)` because feature availability legitimately varies by model and
/// firmware.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FritzError {
    /// Socket-level failure while searching the network
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// No usable gateway, or more than one, was found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Connection, TLS or HTTP status failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Malformed or incomplete description document or response
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Digest or session login failed
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// A declared input argument was not supplied
    #[error("Missing argument '{argument}' for action '{action}'")]
    MissingArgument { action: String, argument: String },

    /// A supplied value cannot be represented in its declared type
    #[error("Invalid value for argument '{argument}': {reason}")]
    InvalidArgument { argument: String, reason: String },

    /// The appliance answered with a SOAP fault
    #[error("Action failed with UPnP error {code}: {description}")]
    ActionFailed { code: u32, description: String },

    /// Standard IO error
    #[error("IO error: {0}")]
    Io(String),

    /// JSON serialization or deserialization error
    #[error("JSON error: {0}")]
    Json(String),
}

/// A specialized Result type for fritzlink operations.
pub type Result<T> = std::result::Result<T, FritzError>;

impl From<std::io::Error> for FritzError {
    fn from(err: std::io::Error) -> Self {
        FritzError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for FritzError {
    fn from(err: serde_json::Error) -> Self {
        FritzError::Json(err.to_string())
    }
}

impl From<reqwest::Error> for FritzError {
    fn from(err: reqwest::Error) -> Self {
        FritzError::Transport(err.to_string())
    }
}

impl From<quick_xml::Error> for FritzError {
    fn from(err: quick_xml::Error) -> Self {
        FritzError::Protocol(format!("XML: {}", err))
    }
}

impl From<quick_xml::events::attributes::AttrError> for FritzError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        FritzError::Protocol(format!("XML attribute: {}", err))
    }
}

impl FritzError {
    /// Returns true for failures caused by credentials rather than the network.
    pub fn is_auth(&self) -> bool {
        matches!(self, FritzError::Authentication(_))
    }
}
