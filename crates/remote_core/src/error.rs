use remote_model::ModelError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("endpoint name already in use: {name}")]
    NameInUse { name: String },
    #[error("invalid endpoint: {0}")]
    Model(#[from] ModelError),
    #[error("exporter '{exporter}' failed: {message}")]
    Backend { exporter: String, message: String },
}

pub type Result<T> = std::result::Result<T, ExportError>;
