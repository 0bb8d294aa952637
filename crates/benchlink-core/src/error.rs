/*!
 * Error types shared across the BenchLink crates.
 *
 * The registry, adapters, driver loader, and remote proxy all surface
 * the same small set of failure conditions, so the taxonomy lives here
 * rather than per crate. An ambiguous driver match is deliberately not
 * an error; it is an ordinary `LoadOutcome` value.
 */
use thiserror::Error;

/// Error type for BenchLink operations
#[derive(Error, Debug)]
pub enum Error {
    /// An interface adapter failed system-level initialization and
    /// will never be scanned
    #[error("Interface unavailable: {0}")]
    InterfaceUnavailable(String),

    /// A native resource id vanished between an operation's start and
    /// its completion
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Driver instantiation or its open hook failed; the resource is
    /// left without a driver
    #[error("Driver load failure: {0}")]
    DriverLoadFailure(String),

    /// An RPC call failed or timed out; the remote cache is left at
    /// its last-known-good state
    #[error("Remote peer unreachable: {0}")]
    RemoteUnreachable(String),

    /// An operation required an attached driver and none was present
    #[error("No driver attached to resource {0}")]
    NoDriverAttached(String),

    /// A command was invoked that the attached driver does not declare
    #[error("Unknown command {0} for driver {1}")]
    UnknownCommand(String, String),

    /// Communication error with an instrument
    #[error("Communication error: {0}")]
    Communication(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Event bus error
    #[error("Event error: {0}")]
    Event(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for BenchLink operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new interface-unavailable error
    pub fn interface_unavailable<S: AsRef<str>>(msg: S) -> Self {
        Error::InterfaceUnavailable(msg.as_ref().to_string())
    }

    /// Create a new resource-unavailable error
    pub fn resource_unavailable<S: AsRef<str>>(msg: S) -> Self {
        Error::ResourceUnavailable(msg.as_ref().to_string())
    }

    /// Create a new driver-load-failure error
    pub fn driver_load<S: AsRef<str>>(msg: S) -> Self {
        Error::DriverLoadFailure(msg.as_ref().to_string())
    }

    /// Create a new remote-unreachable error
    pub fn remote_unreachable<S: AsRef<str>>(msg: S) -> Self {
        Error::RemoteUnreachable(msg.as_ref().to_string())
    }

    /// Create a new communication error
    pub fn communication<S: AsRef<str>>(msg: S) -> Self {
        Error::Communication(msg.as_ref().to_string())
    }

    /// Create a new not-found error
    pub fn not_found<S: AsRef<str>>(msg: S) -> Self {
        Error::NotFound(msg.as_ref().to_string())
    }

    /// Create a new timeout error
    pub fn timeout<S: AsRef<str>>(msg: S) -> Self {
        Error::Timeout(msg.as_ref().to_string())
    }

    /// Create a new event error
    pub fn event<S: AsRef<str>>(msg: S) -> Self {
        Error::Event(msg.as_ref().to_string())
    }

    /// Create a new configuration error
    pub fn config<S: AsRef<str>>(msg: S) -> Self {
        Error::Config(msg.as_ref().to_string())
    }

    /// Create a new other error
    pub fn other<S: AsRef<str>>(msg: S) -> Self {
        Error::Other(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
