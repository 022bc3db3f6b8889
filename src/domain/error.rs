use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid design document: {message}")]
    InvalidDesign { message: String },
}

impl DomainError {
    pub fn invalid_design(message: impl Into<String>) -> Self {
        Self::InvalidDesign {
            message: message.into(),
        }
    }
}
