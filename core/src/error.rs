use thiserror::Error;

/// Errors raised while building or querying an index.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Dictionary table full: no free slot within {capacity} slots")]
    TableFull { capacity: u64 },

    #[error("Malformed index data: {0}")]
    Malformed(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index already finalized; inserts are no longer accepted")]
    Finalized,
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Whether the failure came from the underlying storage rather than the data.
    pub fn is_io(&self) -> bool {
        matches!(self, IndexError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_full_display() {
        let err = IndexError::TableFull { capacity: 7 };
        assert_eq!(err.to_string(), "Dictionary table full: no free slot within 7 slots");
    }

    #[test]
    fn io_errors_are_flagged() {
        let err = IndexError::from(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert!(err.is_io());
        assert!(!IndexError::Finalized.is_io());
    }
}
