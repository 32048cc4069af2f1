//! 播放引擎核心库
//!
//! 单个后台泵线程从解封装源读包，路由到各自独立消费的
//! 音/视频接收端；共享时钟统一暂停、变速与逐帧步进。
//! 解码与呈现通过 trait 注入，库本身不绑定具体实现。

pub mod core;
pub mod engine;

pub use crate::core::{
    AudioRoute, AudioStreamInfo, EngineError, EngineEvent, EngineEventKind, EngineSettings,
    MediaPacket, PlaybackClock, Result, StreamKind, VideoOutputMode, VideoStreamInfo, NO_PTS,
    NORMAL_PLAY_SPEED, TIME_BASE,
};
pub use crate::engine::{
    AudioSink, EngineListener, PacketSource, PlayerEngine, SinkProvider, VideoSink,
};
