use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpicesError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),

    #[error("ron parse error: {0}")]
    RonParse(#[from] ron::error::SpannedError),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// A button or async button handler returned an error.
    #[error("action `{name}` failed: {source}")]
    Action {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid: {0}")]
    Invalid(&'static str),
}
