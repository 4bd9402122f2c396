use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngdbError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Time parse error: {0}")]
    TimeParse(#[from] chrono::ParseError),

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("No encoding metadata for {mnemonic}; supply one explicitly")]
    MissingEncoding { mnemonic: String },

    #[error("Query did not complete.\nquery status: {status}\nmessage: {message}")]
    Retrieval { status: String, message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl EngdbError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngdbError::Validation { message: message.into() }
    }
}

pub type EngdbResult<T> = Result<T, EngdbError>;
