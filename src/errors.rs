use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serde JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Collection not found: {0}")]
    NoSuchCollection(String),

    #[error("Document not found: {0}")]
    NoSuchDocument(String),

    #[error("Invalid document ID: {0}")]
    InvalidDocumentId(String),

    #[error("Validation failed for `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("Cast to {expected} failed for value {value} at path `{field}`")]
    Cast { field: String, expected: String, value: String },

    #[error("Duplicate key on {index}: {key}")]
    DuplicateKey { index: String, key: String },

    #[error("Field `{0}` cannot be written by clients")]
    ProtectedField(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Aggregation error: {0}")]
    Aggregation(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl DbError {
    /// Whether the error stems from caller input rather than from the store itself.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NoSuchDocument(_)
                | Self::InvalidDocumentId(_)
                | Self::Validation { .. }
                | Self::Cast { .. }
                | Self::DuplicateKey { .. }
                | Self::ProtectedField(_)
        )
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_and_server_errors_are_classified() {
        let cast = DbError::Cast { field: "price".into(), expected: "Number".into(), value: "\"abc\"".into() };
        assert!(cast.is_client_error());
        assert!(DbError::ProtectedField("ratingsAverage".into()).is_client_error());
        assert!(!DbError::Aggregation("boom".into()).is_client_error());
        assert!(!DbError::Io("disk".into()).is_client_error());
    }

    #[test]
    fn messages_name_the_field() {
        let e = DbError::Validation { field: "rating".into(), message: "must be <= 5".into() };
        assert_eq!(e.to_string(), "Validation failed for `rating`: must be <= 5");
    }
}
