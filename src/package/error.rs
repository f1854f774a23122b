use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackageError {
    /// One metadata byte must describe every 4-byte data or stack slot.
    #[error(
        "package error: {metadata} metadata elements do not cover {data} data bytes and {stack} stack bytes"
    )]
    MetadataMismatch { metadata: u32, data: u32, stack: u32 },

    #[error("package error: variable '{variable}' has no data offset")]
    MissingOffset { variable: String },

    /// The variable table and the packaged data disagree on where a variable lives.
    #[error("package error: variable '{variable}' expected at slot {expected}, found at {found}")]
    OffsetMismatch {
        variable: String,
        expected: usize,
        found: usize,
    },

    #[error("package error: {what} of {size} bytes does not fit the package")]
    TooLarge { what: &'static str, size: usize },

    /// Lane records only exist in the SSMD layout.
    #[error("package error: package is not batched")]
    NotBatched,

    #[error("package error: corrupt package: {0}")]
    Corrupt(String),

    #[error("package error: serialization failed: {0}")]
    Serialization(String),
}

impl From<postcard::Error> for PackageError {
    fn from(err: postcard::Error) -> Self {
        PackageError::Serialization(err.to_string())
    }
}
