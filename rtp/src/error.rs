use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum Error {
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header version must be 2")]
    ErrBadVersion,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("extension payload must be in 32-bit words")]
    ErrHeaderExtensionPayloadNotAligned,
    #[error("padding size must be non-zero")]
    ErrZeroPadding,
    #[error("padding size exceeds payload size")]
    ErrPaddingSizeExceedsPayload,
    #[error("buffer too small")]
    ErrShortBuffer,
}

impl From<Error> for util::Error {
    fn from(e: Error) -> Self {
        util::Error::Other(e.to_string())
    }
}
