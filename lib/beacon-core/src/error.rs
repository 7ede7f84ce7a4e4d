use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("nothing found")]
    NothingFound,

    #[error("conflict")]
    Conflict,

    #[error("not modified")]
    NotModified,

    #[error("invalid parameter: {0}")]
    InvalidParam(String),
}

impl CoreError {
    /// Numeric code carried in the wire envelope for this error kind.
    pub fn code(&self) -> i64 {
        match self {
            CoreError::NothingFound => -404,
            CoreError::Conflict => -409,
            CoreError::NotModified => -304,
            CoreError::InvalidParam(_) => -400,
        }
    }

    /// Reverse mapping used by the replication client when decoding a
    /// peer's response envelope.
    pub fn from_code(code: i64) -> Option<CoreError> {
        match code {
            -404 => Some(CoreError::NothingFound),
            -409 => Some(CoreError::Conflict),
            -304 => Some(CoreError::NotModified),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for err in [CoreError::NothingFound, CoreError::Conflict, CoreError::NotModified] {
            assert_eq!(CoreError::from_code(err.code()), Some(err));
        }
        assert_eq!(CoreError::from_code(0), None);
    }
}
