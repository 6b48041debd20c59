use types::Hash256;

#[derive(Debug)]
pub enum Error {
    /// The backing engine reported a failure.
    DBError { message: String },
    SszDecodeError(ssz::DecodeError),
    BlockNotFound(Hash256),
    /// A stored value was shorter than its fixed header.
    TruncatedValue { key: Vec<u8>, len: usize },
    CompressionError(String),
    InvalidEraFile(String),
}

impl From<ssz::DecodeError> for Error {
    fn from(e: ssz::DecodeError) -> Self {
        Error::SszDecodeError(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::CompressionError(e.to_string())
    }
}
