use crate::core::{NORMAL_PLAY_SPEED, TIME_BASE};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

/// 播放时钟 - 媒体时间的唯一权威
///
/// 支持暂停/恢复、变速（含倒放）、单帧步进与帧计数上报。
/// Clone 得到的是同一时钟的共享句柄。
#[derive(Clone)]
pub struct PlaybackClock {
    inner: Arc<Mutex<ClockInner>>,
}

struct ClockInner {
    initialized: bool,
    started: bool,
    base_pts: f64,          // 基准媒体时间（微秒）
    base_instant: Instant,  // 基准时刻
    rate: f64,              // 播放速率（1.0 = 正常，负值 = 倒放）
    paused: bool,
    paused_at: f64,         // 暂停时的媒体时间
    fps: f64,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(ClockInner {
                initialized: false,
                started: false,
                base_pts: 0.0,
                base_instant: Instant::now(),
                rate: 1.0,
                paused: true,
                paused_at: 0.0,
                fps: 0.0,
            })),
        }
    }

    /// 按检测到的流组合初始化时钟；一路流都没有则失败
    pub fn init(&self, has_video: bool, has_audio: bool) -> bool {
        if !has_video && !has_audio {
            return false;
        }
        let mut inner = self.inner.lock();
        inner.initialized = true;
        inner.started = false;
        inner.base_pts = 0.0;
        inner.base_instant = Instant::now();
        inner.rate = 1.0;
        inner.paused = true;
        inner.paused_at = 0.0;
        inner.fps = 0.0;
        true
    }

    /// 以解析出的起始 pts（微秒）和流帧率启动时钟
    pub fn start(&self, pts: f64, fps: f64) {
        let mut inner = self.inner.lock();
        inner.base_pts = pts;
        inner.base_instant = Instant::now();
        inner.paused_at = pts;
        inner.paused = false;
        inner.started = true;
        inner.fps = fps;
    }

    /// 暂停；返回是否处于（或进入了）暂停态，未启动时为 false
    pub fn pause(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.started {
            return false;
        }
        if !inner.paused {
            inner.paused_at = Self::now_unlocked(&inner);
            inner.paused = true;
        }
        true
    }

    /// 恢复；未启动时为 false
    pub fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if !inner.started {
            return false;
        }
        if inner.paused {
            inner.base_pts = inner.paused_at;
            inner.base_instant = Instant::now();
            inner.paused = false;
        }
        true
    }

    pub fn is_paused(&self) -> bool {
        self.inner.lock().paused
    }

    /// 设置播放速率（NORMAL_PLAY_SPEED 单位，负值倒放）
    ///
    /// 变速前先把当前媒体时间固化为新基准，避免时间跳变。
    pub fn set_rate(&self, speed: i32) {
        let mut inner = self.inner.lock();
        if !inner.paused {
            inner.base_pts = Self::now_unlocked(&inner);
            inner.base_instant = Instant::now();
        }
        inner.rate = speed as f64 / NORMAL_PLAY_SPEED as f64;
    }

    /// 步进 n 个离散帧（逐帧检查用）
    pub fn step(&self, n: u32) {
        let mut inner = self.inner.lock();
        if inner.fps <= 0.0 {
            return;
        }
        let delta = n as f64 * TIME_BASE as f64 / inner.fps;
        if inner.paused {
            inner.paused_at += delta;
        } else {
            inner.base_pts += delta;
        }
    }

    /// 当前媒体时间（微秒）
    pub fn media_time(&self) -> f64 {
        let inner = self.inner.lock();
        Self::now_unlocked(&inner)
    }

    /// 原始帧计数（媒体时间 × 帧率）
    pub fn frame_count(&self) -> i64 {
        let inner = self.inner.lock();
        if inner.fps <= 0.0 {
            return 0;
        }
        (Self::now_unlocked(&inner) * inner.fps / TIME_BASE as f64) as i64
    }

    fn now_unlocked(inner: &ClockInner) -> f64 {
        if inner.paused {
            inner.paused_at
        } else {
            let elapsed = inner.base_instant.elapsed().as_micros() as f64;
            inner.base_pts + elapsed * inner.rate
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}
