use serde::{Deserialize, Serialize};

/// 时间基准（微秒），所有 pts/dts 均以此为单位
pub const TIME_BASE: i64 = 1_000_000;

/// 无效时间戳哨兵值
pub const NO_PTS: i64 = i64::MIN;

/// 正常播放速率（时钟和解封装器共用的基准单位，1000 = 1x）
pub const NORMAL_PLAY_SPEED: i32 = 1000;

/// 音频输出路由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioRoute {
    /// 主输出设备（如 HDMI）
    Primary,
    /// 备用输出设备（如本地模拟口）
    Alternate,
}

/// 视频输出模式 - 决定 open 时构造哪种视频接收端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoOutputMode {
    /// 直接输出（不经过纹理）
    Direct,
    /// 纹理输出（供上层渲染采样）
    Textured,
}

/// 引擎配置
///
/// setup 成功后 video_width / video_height 会被回写为探测到的实际分辨率，
/// 依赖分辨率的后续初始化（如渲染）可以直接读取。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSettings {
    pub video_path: String,
    pub enable_audio: bool,
    pub enable_looping: bool,
    pub enable_texture: bool,
    pub audio_route: AudioRoute,
    pub initial_volume: f32,    // 归一化音量 0.0 - 1.0
    pub start_time: f64,        // 默认起始偏移（秒），open 的参数为 0 时生效
    pub video_width: u32,       // setup 回写
    pub video_height: u32,      // setup 回写
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            video_path: String::new(),
            enable_audio: true,
            enable_looping: false,
            enable_texture: false,
            audio_route: AudioRoute::Primary,
            initial_volume: 1.0,
            start_time: 0.0,
            video_width: 0,
            video_height: 0,
        }
    }
}

/// 视频流信息 - 来自解封装器的只读快照
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub nb_frames: i64,     // 部分源报 0，此时总时长不可推算
}

/// 音频流信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// 数据包所属流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Video,
    Audio,
    Other,
}

/// 媒体包 - 解封装器产出的一个编码数据单元
///
/// 引擎同一时刻最多持有一个在途包，路由成功即转移所有权给接收端，
/// drop 即释放（对应原生接口的 freePacket）。
#[derive(Debug, Clone)]
pub struct MediaPacket {
    pub stream_index: usize,
    pub kind: StreamKind,
    pub pts: i64,           // 显示时间戳（微秒），未知时为 NO_PTS
    pub dts: i64,           // 解码时间戳（微秒）
    pub data: Vec<u8>,
}

/// 引擎事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventKind {
    /// 循环播放回绕了一次
    Loop,
    /// 播放到达终点（非循环模式）
    PlaybackEnded,
}

/// 引擎异步通知 - 仅循环与终点两种
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub kind: EngineEventKind,
    pub loop_count: u64,
    pub media_time: f64,    // 事件发生时的媒体时间（微秒）
}
