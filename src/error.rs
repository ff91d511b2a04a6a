use thiserror::Error;

pub type Result<T> = std::result::Result<T, AutofillError>;

/// Malformed payloads received from the page script.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON decoding failed for an inbound message or command result
    #[error("JSON parse error ({context}): {source}")]
    JsonParse {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// JSON encoding failed for an outbound command
    #[error("JSON serialize error ({context}): {source}")]
    JsonSerialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// Payload decoded but did not have the expected shape
    #[error("Unexpected payload ({context}): {detail}")]
    UnexpectedShape { context: String, detail: String },
}

/// Failures of a round trip to the page.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The message channel to the page is gone (tab closed, frame detached)
    #[error("Bridge transport closed: {0}")]
    Closed(String),

    /// The page script reported an error while running a command
    #[error("Page script failed running {command}: {error}")]
    Script { command: String, error: String },

    /// The command result could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Credential / card store failures. Each variant is a category shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Decryption error: {0}")]
    Decryption(String),

    #[error("Encryption error: {0}")]
    Encryption(String),
}

impl StoreError {
    pub fn category(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "database",
            StoreError::Decryption(_) => "decryption",
            StoreError::Encryption(_) => "encryption",
        }
    }

    /// Title of the blocking alert raised for this failure.
    pub fn alert_title(&self) -> &'static str {
        match self {
            StoreError::Database(_) => "Could not read password from database.",
            StoreError::Decryption(_) => "Could not decrypt password.",
            StoreError::Encryption(_) => "Could not encrypt password.",
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            StoreError::Database(msg) | StoreError::Decryption(msg) | StoreError::Encryption(msg) => {
                msg
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AutofillError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A scenario step could not be executed
    #[error("Scenario error: {0}")]
    Scenario(String),
}
