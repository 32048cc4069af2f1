use crate::core::{
    AudioStreamInfo, EngineError, EngineEvent, EngineSettings, PlaybackClock, Result,
    VideoOutputMode, VideoStreamInfo, NORMAL_PLAY_SPEED,
};
use crate::engine::pump;
use crate::engine::traits::{AudioSink, EngineListener, PacketSource, SinkProvider, VideoSink};
use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

pub(crate) fn log_ctx() -> String {
    format!("[pid:{}-tid:{:?}]", process::id(), thread::current().id())
}

/// 设备增益范围（引擎内部单位，外部只见归一化音量）
const GAIN_MIN: f32 = -6000.0;
const GAIN_MAX: f32 = 6000.0;

/// 归一化音量步进
const VOLUME_STEP: f32 = 0.1;

/// 倍速上限 / 倒放回绕阈值
const MAX_SPEED_MULTIPLIER: i32 = 4;
const MIN_REWIND_MULTIPLIER: i32 = -8;

fn map_clamped(v: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    let t = ((v - in_min) / (in_max - in_min)).clamp(0.0, 1.0);
    out_min + t * (out_max - out_min)
}

/// 引擎共享状态 - 泵线程与任意控制线程之间的唯一可变状态
///
/// 状态互斥量只做短促的非阻塞变更，绝不跨协作方调用持锁。
pub(crate) struct EngineState {
    pub(crate) settings: EngineSettings,
    pub(crate) video_info: Option<VideoStreamInfo>,
    pub(crate) audio_info: Option<AudioStreamInfo>,
    pub(crate) has_video: bool,
    pub(crate) has_audio: bool,
    pub(crate) did_video_open: bool,
    pub(crate) did_audio_open: bool,
    pub(crate) playing: bool,
    pub(crate) looping: bool,
    pub(crate) n_frames: i64,
    pub(crate) duration: f64,       // 秒；无法推算时保持 0
    pub(crate) fps: f64,
    pub(crate) start_pts: f64,      // 微秒
    pub(crate) loop_offset: i64,    // 微秒
    pub(crate) previous_loop_offset: i64,
    pub(crate) loop_counter: u64,
    pub(crate) frame_counter: i64,  // 时钟帧计数快照
    pub(crate) loop_frame: i64,     // 循环帧基线
    pub(crate) speed_multiplier: i32,
    pub(crate) pending_seek: bool,  // 变速后等待调用方补一次 seek 重对齐
    pub(crate) need_restart: bool,  // 不可 seek 的流循环时需要外部重建会话
}

impl EngineState {
    fn new() -> Self {
        Self {
            settings: EngineSettings::default(),
            video_info: None,
            audio_info: None,
            has_video: false,
            has_audio: false,
            did_video_open: false,
            did_audio_open: false,
            playing: false,
            looping: false,
            n_frames: 0,
            duration: 0.0,
            fps: 0.0,
            start_pts: 0.0,
            loop_offset: 0,
            previous_loop_offset: -1,
            loop_counter: 0,
            frame_counter: 0,
            loop_frame: 0,
            speed_multiplier: 1,
            pending_seek: false,
            need_restart: false,
        }
    }
}

pub(crate) struct Shared {
    pub(crate) state: Mutex<EngineState>,
    pub(crate) running: AtomicBool,
    pub(crate) clock: Mutex<PlaybackClock>,
    pub(crate) reader: Mutex<Box<dyn PacketSource>>,
    pub(crate) video: Mutex<Option<Box<dyn VideoSink>>>,
    pub(crate) audio: Mutex<Option<Box<dyn AudioSink>>>,
    pub(crate) listener: Mutex<Option<Arc<dyn EngineListener>>>,
    pub(crate) event_tx: Sender<EngineEvent>,
}

/// 播放引擎 - 泵循环与状态机的聚合根
///
/// 惰性三段式生命周期：new 构造惰性实例，setup 解析流信息并建时钟，
/// open 构造接收端、启动时钟与泵线程；Drop 先停泵再按序释放资源。
pub struct PlayerEngine {
    shared: Arc<Shared>,
    sinks: Box<dyn SinkProvider>,
    pump_thread: Option<thread::JoinHandle<()>>,
    event_rx: Receiver<EngineEvent>,
}

impl PlayerEngine {
    pub fn new(reader: Box<dyn PacketSource>, sinks: Box<dyn SinkProvider>) -> Self {
        let (event_tx, event_rx) = unbounded();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(EngineState::new()),
                running: AtomicBool::new(false),
                clock: Mutex::new(PlaybackClock::new()),
                reader: Mutex::new(reader),
                video: Mutex::new(None),
                audio: Mutex::new(None),
                listener: Mutex::new(None),
                event_tx,
            }),
            sinks,
            pump_thread: None,
            event_rx,
        }
    }

    // ==================== 会话建立 ====================

    /// 解析媒体源并初始化时钟
    ///
    /// 先走快速探测；部分源（尤其网络流）快速探测会失败，
    /// 此时回退一次完整探测。视频流是会话成立的必要条件，
    /// 音频可缺失或被配置强制关闭。成功后把探测到的分辨率
    /// 回写进配置。支持在同一引擎实例上重复 setup。
    pub fn setup(&mut self, mut settings: EngineSettings) -> Result<()> {
        info!("{} 📂 建立会话: {}", log_ctx(), settings.video_path);
        self.stop_pump();

        let path = settings.video_path.clone();
        let (opened, video_info) = {
            let mut reader = self.shared.reader.lock();
            let mut opened = reader.open(&path, true);
            let mut info = if opened { reader.video_stream_info() } else { None };
            let fast_ok = opened
                && info
                    .as_ref()
                    .map(|i| i.width > 0 || i.height > 0)
                    .unwrap_or(false);
            if !fast_ok {
                warn!("{} ⚠️ 快速探测失败（可能是网络流），改用完整探测", log_ctx());
                opened = reader.open(&path, false);
                info = if opened { reader.video_stream_info() } else { None };
            }
            (opened, info)
        };

        if !opened {
            error!("{} ❌ 两条探测路径都无法打开: {}", log_ctx(), path);
            return Err(EngineError::OpenSource(path));
        }

        let video_info = video_info
            .filter(|i| i.width > 0 || i.height > 0)
            .ok_or_else(|| {
                error!("{} ❌ 未检测到视频流", log_ctx());
                EngineError::NoVideoStream
            })?;

        let audio_info = self.shared.reader.lock().audio_stream_info();
        let has_audio = audio_info.is_some() && settings.enable_audio;

        // 分辨率回写，依赖方（如渲染初始化）直接读取
        settings.video_width = video_info.width;
        settings.video_height = video_info.height;

        // 旧时钟随赋值销毁，支持同实例重建会话
        let clock = PlaybackClock::new();
        if !clock.init(true, has_audio) {
            error!("{} ❌ 时钟初始化失败", log_ctx());
            return Err(EngineError::ClockInit);
        }
        *self.shared.clock.lock() = clock;

        {
            let mut st = self.shared.state.lock();
            *st = EngineState::new();
            st.looping = settings.enable_looping;
            st.settings = settings;
            st.video_info = Some(video_info);
            st.audio_info = audio_info;
            st.has_video = true;
            st.has_audio = has_audio;
        }

        info!("{} ✅ 会话建立完成 (audio: {})", log_ctx(), has_audio);
        Ok(())
    }

    /// 构造接收端、启动时钟与泵线程
    ///
    /// 视频接收端按输出模式（直出/纹理）惰性选型；音频打开失败
    /// 降级为无声继续播放（非致命）。起始偏移只在源可 seek 时
    /// 尝试，失败同样非致命；参数为 0 时退回配置里的 start_time。
    pub fn open(&mut self, start_time_seconds: f64) -> Result<()> {
        // 同一会话重复 open 前必须先停旧泵，否则两个泵并发读包
        self.stop_pump();

        let (settings, has_audio, video_info, audio_info) = {
            let st = self.shared.state.lock();
            (
                st.settings.clone(),
                st.has_audio,
                st.video_info.clone(),
                st.audio_info.clone(),
            )
        };
        let video_info =
            video_info.ok_or_else(|| EngineError::Other("未执行 setup".to_string()))?;

        let clock = self.clock();

        // ========== 视频接收端 ==========
        let mode = if settings.enable_texture {
            VideoOutputMode::Textured
        } else {
            VideoOutputMode::Direct
        };
        let mut video = self.sinks.create_video(mode);
        let did_video_open = video.open(&video_info, clock.clone(), &settings);
        let video_fps = if did_video_open { video.fps() } else { 0.0 };
        *self.shared.video.lock() = Some(video);
        {
            let mut st = self.shared.state.lock();
            st.did_video_open = did_video_open;
            st.playing = did_video_open;
        }

        // ========== 音频接收端（失败非致命） ==========
        if has_audio {
            let mut audio = self.sinks.create_audio(settings.audio_route);
            let audio_info = audio_info.unwrap_or_default();
            if audio.open(&audio_info, clock.clone(), settings.audio_route) {
                *self.shared.audio.lock() = Some(audio);
                self.shared.state.lock().did_audio_open = true;
                self.set_volume(settings.initial_volume);
            } else {
                error!("{} ❌ 音频接收端打开失败，继续无声播放", log_ctx());
                self.shared.state.lock().has_audio = false;
            }
        }

        if !did_video_open {
            error!("{} ❌ 视频接收端打开失败", log_ctx());
            return Err(EngineError::VideoSinkOpen);
        }

        // ========== 时长推算 ==========
        // 帧数和帧率都为正才可信；有些源（如裸 h264）报 0 帧
        // 却能正常播放，此时时长保持未知而不是给个无意义的值
        {
            let mut st = self.shared.state.lock();
            st.fps = video_fps;
            if video_info.nb_frames > 0 && video_fps > 0.0 {
                st.n_frames = video_info.nb_frames;
                st.duration = video_info.nb_frames as f64 / video_fps;
                info!("{} 时长: {:.2}s ({} 帧)", log_ctx(), st.duration, st.n_frames);
            }
        }

        // ========== 起始偏移 ==========
        let start_seconds = if start_time_seconds > 0.0 {
            start_time_seconds
        } else {
            settings.start_time
        };
        let mut start_pts = 0.0;
        if start_seconds > 0.0 {
            let mut reader = self.shared.reader.lock();
            if reader.can_seek() {
                match reader.seek_to_time(start_seconds * 1000.0, false) {
                    Some(pts) => start_pts = pts,
                    None => error!("{} ❌ 无法 seek 到 {}s，从头播放", log_ctx(), start_seconds),
                }
            }
        }
        self.shared.state.lock().start_pts = start_pts;

        clock.start(start_pts, video_fps);

        // ========== 泵线程 ==========
        self.shared.running.store(true, Ordering::SeqCst);
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("engine-pump".to_string())
            .spawn(move || pump::run(shared))?;
        self.pump_thread = Some(handle);

        info!("{} 🎬 开始播放", log_ctx());
        Ok(())
    }

    fn stop_pump(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump_thread.take() {
            let _ = handle.join();
        }
    }

    fn clock(&self) -> PlaybackClock {
        self.shared.clock.lock().clone()
    }

    // ==================== 播放控制 ====================

    /// 恢复 1x：时钟和解封装器必须同速，读包节奏才能匹配呈现节奏
    pub fn set_normal_speed(&self) {
        {
            let mut st = self.shared.state.lock();
            st.speed_multiplier = 1;
        }
        self.clock().set_rate(NORMAL_PLAY_SPEED);
        self.shared.reader.lock().set_rate(NORMAL_PLAY_SPEED);
    }

    /// 加速一档，4x 封顶；返回生效后的倍速
    ///
    /// 同时置 pending_seek，由调用方择机补一次 seek 重新对齐。
    pub fn increase_speed(&self) -> i32 {
        let (speed, multiplier) = {
            let mut st = self.shared.state.lock();
            st.pending_seek = true;
            if st.speed_multiplier + 1 <= MAX_SPEED_MULTIPLIER {
                st.speed_multiplier += 1;
                (Some(NORMAL_PLAY_SPEED * st.speed_multiplier), st.speed_multiplier)
            } else {
                (None, st.speed_multiplier)
            }
        };
        if let Some(speed) = speed {
            self.clock().set_rate(speed);
            self.shared.reader.lock().set_rate(speed);
        }
        multiplier
    }

    /// 减速一档进入倒放；跳过 0，幅度超过 8x 回绕到 1x
    pub fn rewind(&self) {
        let speed = {
            let mut st = self.shared.state.lock();
            if st.speed_multiplier - 1 == 0 {
                st.speed_multiplier = -1;
            } else {
                st.speed_multiplier -= 1;
            }
            if st.speed_multiplier < MIN_REWIND_MULTIPLIER {
                st.speed_multiplier = 1;
            }
            NORMAL_PLAY_SPEED * st.speed_multiplier
        };
        self.clock().set_rate(speed);
        self.shared.reader.lock().set_rate(speed);
    }

    /// 步进 n 帧后恢复播放（拖拽预览用）
    pub fn scrub_forward(&self, steps: u32) {
        if !self.is_paused() {
            self.set_paused(true);
        }
        let clock = self.clock();
        if steps > 1 {
            let mut count = steps;
            while count > 0 {
                clock.step(1);
                count -= 1;
            }
            self.set_paused(false);
        } else {
            clock.step(1);
            self.set_paused(false);
        }
    }

    /// 步进 n 帧并保持暂停（逐帧检查用）
    pub fn step_frame(&self, steps: u32) {
        if !self.is_paused() {
            self.set_paused(true);
        }
        let clock = self.clock();
        if steps > 1 {
            let mut count = steps;
            while count > 0 {
                clock.step(1);
                count -= 1;
            }
        } else {
            clock.step(1);
        }
    }

    pub fn step_frame_forward(&self) {
        self.step_frame(1);
    }

    /// 暂停/恢复；返回转换是否成功
    pub fn set_paused(&self, pause: bool) -> bool {
        let clock = self.clock();
        let result = if pause { clock.pause() } else { clock.resume() };
        debug!("{} set_paused({}) -> {}", log_ctx(), pause, result);
        result
    }

    pub fn stop(&self) {
        self.set_paused(true);
    }

    pub fn enable_looping(&self) {
        self.shared.state.lock().looping = true;
    }

    pub fn disable_looping(&self) {
        self.shared.state.lock().looping = false;
    }

    // ==================== 音量 ====================
    // 对外归一化 0.0 - 1.0，对内设备增益；无音频（或打开失败/
    // 运行期降级）时全部空操作，读取返回 0

    fn audio_enabled(&self) -> bool {
        let st = self.shared.state.lock();
        st.has_audio && st.did_audio_open
    }

    pub fn set_volume(&self, volume: f32) {
        if !self.audio_enabled() {
            return;
        }
        let gain = map_clamped(volume, 0.0, 1.0, GAIN_MIN, GAIN_MAX);
        if let Some(audio) = self.shared.audio.lock().as_mut() {
            audio.set_gain(gain);
        }
    }

    pub fn volume(&self) -> f32 {
        if !self.audio_enabled() {
            return 0.0;
        }
        match self.shared.audio.lock().as_ref().map(|a| a.gain()) {
            Some(gain) => {
                let v = map_clamped(gain, GAIN_MIN, GAIN_MAX, 0.0, 1.0);
                // 两位小数截断，避免重复读取时的浮点抖动
                (v * 100.0).round() / 100.0
            }
            None => 0.0,
        }
    }

    pub fn increase_volume(&self) {
        if !self.audio_enabled() {
            return;
        }
        self.set_volume(self.volume() + VOLUME_STEP);
    }

    pub fn decrease_volume(&self) {
        if !self.audio_enabled() {
            return;
        }
        self.set_volume(self.volume() - VOLUME_STEP);
    }

    // ==================== 只读访问 ====================

    pub fn width(&self) -> u32 {
        self.shared.state.lock().video_info.as_ref().map(|i| i.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.shared.state.lock().video_info.as_ref().map(|i| i.height).unwrap_or(0)
    }

    pub fn fps(&self) -> f64 {
        self.shared.state.lock().fps
    }

    pub fn total_frames(&self) -> i64 {
        self.shared.state.lock().n_frames
    }

    pub fn duration_seconds(&self) -> f64 {
        self.shared.state.lock().duration
    }

    /// 当前媒体时间（微秒）
    pub fn media_time(&self) -> f64 {
        self.clock().media_time()
    }

    /// 相对当前循环迭代的帧号（原始帧计数 - 循环基线，不小于 0）
    pub fn current_frame(&self) -> i64 {
        let st = self.shared.state.lock();
        (st.frame_counter - st.loop_frame).max(0)
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state.lock().playing
    }

    pub fn is_paused(&self) -> bool {
        self.clock().is_paused()
    }

    pub fn is_looping(&self) -> bool {
        self.shared.state.lock().looping
    }

    pub fn loop_count(&self) -> u64 {
        self.shared.state.lock().loop_counter
    }

    pub fn speed_multiplier(&self) -> i32 {
        self.shared.state.lock().speed_multiplier
    }

    pub fn pending_seek(&self) -> bool {
        self.shared.state.lock().pending_seek
    }

    pub fn clear_pending_seek(&self) {
        self.shared.state.lock().pending_seek = false;
    }

    /// 不可 seek 的流在循环时只能由外部重建会话；调用方轮询此标记
    pub fn needs_restart(&self) -> bool {
        self.shared.state.lock().need_restart
    }

    /// 解析后的配置快照（含回写的分辨率）
    pub fn settings(&self) -> EngineSettings {
        self.shared.state.lock().settings.clone()
    }

    // ==================== 事件 ====================

    /// 注册监听器；重复注册替换旧的
    pub fn set_listener(&self, listener: Arc<dyn EngineListener>) {
        *self.shared.listener.lock() = Some(listener);
    }

    pub fn clear_listener(&self) {
        *self.shared.listener.lock() = None;
    }

    /// 事件通道接收端，适合不想注册回调的轮询式调用方
    pub fn events(&self) -> Receiver<EngineEvent> {
        self.event_rx.clone()
    }
}

impl Drop for PlayerEngine {
    fn drop(&mut self) {
        // 先停泵再释放资源，避免接收端或时钟操作已释放的状态
        self.stop_pump();
        self.shared.state.lock().playing = false;
        *self.shared.listener.lock() = None;
        *self.shared.video.lock() = None;
        *self.shared.audio.lock() = None;
        self.shared.reader.lock().close();
    }
}
