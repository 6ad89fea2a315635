use std::fmt;

/// Transport-level errors raised while talking to an identity server
#[derive(Debug, Clone)]
pub enum ClientError {
    /// Network error
    NetworkError {
        message: String,
    },
    /// Descriptor carries no usable server URL
    NoServers {
        entity: String,
    },
    /// A server base URL could not be parsed
    InvalidUrl {
        url: String,
        message: String,
    },
    /// Serialization error
    SerializationError {
        message: String,
    },
    /// Request could not be signed
    Signing {
        message: String,
    },
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::NetworkError { message } => {
                write!(f, "Network error: {}", message)
            }
            ClientError::NoServers { entity } => {
                write!(f, "No servers configured for {}", entity)
            }
            ClientError::InvalidUrl { url, message } => {
                write!(f, "Invalid server URL '{}': {}", url, message)
            }
            ClientError::SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            ClientError::Signing { message } => {
                write!(f, "Request signing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for ClientError {}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::SerializationError {
            message: err.to_string(),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
