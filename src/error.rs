use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArgsError {
    #[error("Unknown configuration field: {0}.")]
    UnknownField(String),

    #[error("Cannot set internal field: {0}.")]
    InternalField(String),

    #[error("Unable to tokenize command (unbalanced quotes?): {0}")]
    Tokenize(String),

    #[error(transparent)]
    InvalidCommand(#[from] clap::Error),

    #[error("Invalid value for '{name}': {source}")]
    Field {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
