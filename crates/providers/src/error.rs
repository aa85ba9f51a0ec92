use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider returned status {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("provider response missing field: {0}")]
    MalformedResponse(&'static str),

    #[error("provider reported failure (code {code:?}): {message}")]
    Failed { code: Option<i32>, message: String },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
