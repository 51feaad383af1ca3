use thiserror::Error;

#[derive(Error, Debug)]
pub enum LogalError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{file}:{line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    #[error("Unknown catalog: {0}")]
    UnknownCatalog(String),

    #[error("Unknown quantity: {0}")]
    UnknownQuantity(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Corrupt record store: {0}")]
    Corrupt(String),

    #[error("Cosmology error: {0}")]
    Cosmology(String),

    #[error("Redshift lookup for '{name}' failed: {message}")]
    Lookup { name: String, message: String },
}

impl LogalError {
    pub fn parse(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        LogalError::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LogalError>;
