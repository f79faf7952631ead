use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("invalid ts packet")]
    InvalidTsPacket,

    #[error("invalid pes header")]
    InvalidPesHeader,

    #[error("not a live m3u8 file")]
    NotLiveM3u8,

    #[error("invalid flv data: {0}")]
    InvalidFlvData(&'static str),

    #[error("invalid m3u8 file: {0}")]
    M3u8ParseError(String),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    TaskJoinError(#[from] tokio::task::JoinError),
}

pub type ProbeResult<T> = Result<T, ProbeError>;
