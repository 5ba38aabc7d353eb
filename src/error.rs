use thiserror::Error;

/// Errors an image read or transform operation can produce.
///
/// `NotHandled` is a control-flow value for decoder dispatch rather than a
/// failure: it tells the orchestrator to try the next decoder in the list.
#[derive(Debug, Error)]
pub enum ImageError {
    /// This decoder does not claim the file; dispatch moves on.
    #[error("image not handled by this decoder")]
    NotHandled,

    /// The source file is absent.
    #[error("image file does not exist")]
    DoesNotExist,

    /// No decoder claims the filename suffix.
    #[error("invalid or unknown file type")]
    InvalidFiletype,

    /// The requested output is larger than the server allows.
    #[error("requested image size exceeds server maximums")]
    DimensionsExceedLimits,

    /// Codec setup, header read, decode-area, or bitstream failure.
    #[error("unable to decode image: {0}")]
    Decode(String),

    /// The output encoder rejected the pixel buffer.
    #[error("unable to encode image: {0}")]
    Encode(String),
}

/// Error produced when a request path does not match the IIIF URL grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid IIIF request: {0}")]
pub struct InvalidSyntax(pub String);

impl InvalidSyntax {
    pub fn new(message: impl Into<String>) -> Self {
        InvalidSyntax(message.into())
    }
}
