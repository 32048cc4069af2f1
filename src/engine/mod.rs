// 播放引擎 - 聚合根、泵循环与协作方窄接口

pub mod engine;
pub mod traits;

pub(crate) mod pump;

pub use engine::PlayerEngine;
pub use traits::{AudioSink, EngineListener, PacketSource, SinkProvider, VideoSink};
