use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("export endpoint UID is empty")]
    EmptyUid,
    #[error("endpoint {uid} exports no specification")]
    NoSpecification { uid: String },
}

pub type Result<T> = std::result::Result<T, ModelError>;
