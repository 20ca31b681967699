use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Couldn't parse selector: {0}")]
    Selector(String),

    #[error("Network Error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("Timed out after {0} sec waiting for the page to render")]
    RenderTimeout(u64),
    #[error("Browser Error: {0}")]
    Browser(String),
    #[error("Rendering requested but the crate was built without the `browser` feature")]
    BrowserUnavailable,

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Tokio Join Error, couldn't await a task! {0}")]
    RuntimeJoin(#[from] tokio::task::JoinError),
}
