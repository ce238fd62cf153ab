use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("machine {0} already exists")]
    AlreadyExists(String),

    #[error("machine {0} does not exist")]
    NotFound(String),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid machine record {path}: {source}")]
    Record {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Driver(#[from] osm_driver::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
