use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RLPDecodeError {
    #[error("Unexpected list, expected a string")]
    UnexpectedList,
    #[error("Unexpected string, expected a list")]
    UnexpectedString,
    #[error("Invalid length encountered while decoding")]
    InvalidLength,
    #[error("Malformed RLP data")]
    MalformedData,
    #[error("Unexpected end of RLP input")]
    InvalidCompression,
    #[error("Failed decoding field '{0}': {1}")]
    Field(String, Box<RLPDecodeError>),
    #[error("{0}")]
    Custom(String),
}

pub fn field_decode_error<T>(name: &str, err: RLPDecodeError) -> RLPDecodeError {
    RLPDecodeError::Field(format!("{name} ({})", std::any::type_name::<T>()), Box::new(err))
}
