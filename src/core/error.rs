use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("无法打开媒体源: {0}")]
    OpenSource(String),

    #[error("无法找到视频流")]
    NoVideoStream,

    #[error("时钟初始化失败")]
    ClockInit,

    #[error("视频接收端打开失败")]
    VideoSinkOpen,

    #[error("音频错误: {0}")]
    AudioError(String),

    #[error("IO 错误: {0}")]
    IoError(#[from] std::io::Error),

    #[error("其他错误: {0}")]
    Other(String),

    #[error("Anyhow 错误: {0}")]
    AnyhowError(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
