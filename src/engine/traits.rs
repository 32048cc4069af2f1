use crate::core::{
    AudioRoute, AudioStreamInfo, EngineEvent, EngineSettings, MediaPacket, PlaybackClock,
    VideoOutputMode, VideoStreamInfo,
};

/// 解封装器数据源抽象接口
///
/// 引擎只通过这个窄接口消费解封装能力，内部解析不在引擎职责内。
/// 不同的媒体源（本地文件、网络流、管道等）各自实现。
pub trait PacketSource: Send {
    /// 打开媒体源
    ///
    /// fast_probe 为 true 时走快速探测路径；部分源（尤其网络流）
    /// 快速探测会失败，引擎会用 fast_probe=false 再试一次。
    fn open(&mut self, path: &str, fast_probe: bool) -> bool;

    /// 视频流信息，无视频流时为 None
    fn video_stream_info(&self) -> Option<VideoStreamInfo>;

    /// 音频流信息，无音频流时为 None
    fn audio_stream_info(&self) -> Option<AudioStreamInfo>;

    /// 读取下一个媒体包
    ///
    /// 返回：
    /// - Some(packet): 成功读取一个包
    /// - None: 暂无数据或已到末尾（结合 is_eof 判断）
    fn read(&mut self) -> Option<MediaPacket>;

    /// Seek 到指定位置（毫秒），成功时返回落点 pts（微秒）
    fn seek_to_time(&mut self, time_ms: f64, backward: bool) -> Option<f64>;

    /// 设置读取速率（NORMAL_PLAY_SPEED 单位），与时钟保持一致
    fn set_rate(&mut self, speed: i32);

    /// 是否已到文件末尾
    fn is_eof(&self) -> bool;

    /// 是否为直播流（不可按帧数判断循环）
    fn is_live_stream(&self) -> bool;

    /// 流模式下是否持有可回绕的文件句柄
    ///
    /// 没有句柄的流无法原地重启，循环时只能标记 need_restart
    /// 由外部重建会话。
    fn has_file_handle(&self) -> bool;

    /// 是否支持 seek
    fn can_seek(&self) -> bool;

    /// 关闭媒体源
    fn close(&mut self);
}

/// 视频接收端 - 异步消费视频包并自行解码/呈现
pub trait VideoSink: Send {
    fn open(
        &mut self,
        info: &VideoStreamInfo,
        clock: PlaybackClock,
        settings: &EngineSettings,
    ) -> bool;

    /// 提交一个包；内部缓冲不足时原样退回（背压，不是错误）
    fn add_packet(&mut self, packet: MediaPacket) -> Result<(), MediaPacket>;

    /// 是否还有未消费完的缓冲
    fn has_cached_work(&self) -> bool;

    /// 提交流结束信号（幂等，重复调用必须无害）
    fn submit_eos(&mut self);

    /// 流结束信号是否已被完全消化
    fn is_eos(&self) -> bool;

    /// 解码帧率
    fn fps(&self) -> f64;

    /// 当前呈现时间戳（微秒）
    fn current_pts(&self) -> i64;
}

/// 音频接收端
pub trait AudioSink: Send {
    fn open(&mut self, info: &AudioStreamInfo, clock: PlaybackClock, route: AudioRoute) -> bool;

    /// 提交一个包；缓冲不足时原样退回
    fn add_packet(&mut self, packet: MediaPacket) -> Result<(), MediaPacket>;

    fn has_cached_work(&self) -> bool;

    /// 运行期错误探针；为 true 后引擎将在本会话内关闭音频
    fn has_error(&self) -> bool;

    /// 当前呈现时间戳（微秒）
    fn current_pts(&self) -> i64;

    /// 设备增益（原始单位，引擎负责与归一化音量互转）
    fn set_gain(&mut self, gain: f32);
    fn gain(&self) -> f32;
}

/// 接收端工厂 - open 时按配置选择构造哪种实现
pub trait SinkProvider: Send {
    fn create_video(&mut self, mode: VideoOutputMode) -> Box<dyn VideoSink>;
    fn create_audio(&mut self, route: AudioRoute) -> Box<dyn AudioSink>;
}

/// 引擎事件监听器
///
/// 最多注册一个；重复注册会替换旧的。引擎不持有监听器的
/// 所有权义务，清除只是一次赋值。
pub trait EngineListener: Send + Sync {
    /// 循环播放回绕了一次
    fn on_loop(&self, event: &EngineEvent);

    /// 播放到达终点（循环模式下不会触发）
    fn on_playback_end(&self, event: &EngineEvent);
}
