use crate::core::{EngineEvent, EngineEventKind, MediaPacket, PlaybackClock, StreamKind, NO_PTS};
use crate::engine::engine::{log_ctx, Shared};
use log::{debug, error, info};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// 无法推进时的固定退避间隔（轮询设计，不做阻塞等待）
const PUMP_SLEEP: Duration = Duration::from_millis(10);

/// 泵循环 - 单工作线程，持续读包、路由、重试，直到外部停止或自然播完
///
/// 职责（每轮迭代）：
/// 1. 刷新时钟帧计数快照
/// 2. 按帧数检测循环回绕
/// 3. 读包，循环模式下把时间戳重定位到已流逝的时间线上
/// 4. EOF + 缓冲排空后的循环重启 / 终点判定
/// 5. 音频错误降级
/// 6. 单包在途路由，背压保留重试
pub(crate) fn run(shared: Arc<Shared>) {
    info!("{} 🚚 泵线程启动", log_ctx());

    let clock = shared.clock.lock().clone();
    // 在途包：同一时刻最多一个，路由成功前归泵线程独占
    let mut packet: Option<MediaPacket> = None;

    while shared.running.load(Ordering::SeqCst) {
        // ========== 1. 帧计数快照 ==========
        {
            let mut st = shared.state.lock();
            st.frame_counter = clock.frame_count();
        }

        let is_live = shared.reader.lock().is_live_stream();

        // ========== 2. 按帧数触发循环事件 ==========
        // 可 seek 文件的循环计数只走这一条路径（时钟驱动，
        // 每物理循环恰好一次）；直播流没有可靠帧数，不做此判定
        let mut fire_loop = false;
        {
            let st = shared.state.lock();
            if st.looping && !is_live && st.n_frames > 0 {
                let current = (st.frame_counter - st.loop_frame).max(0);
                if current > 0 && current >= st.n_frames {
                    fire_loop = true;
                }
            }
        }
        if fire_loop {
            send_on_loop(&shared, &clock);
        }

        // ========== 3. 读包 ==========
        if packet.is_none() {
            let (looping, loop_offset) = {
                let st = shared.state.lock();
                (st.looping, st.loop_offset)
            };
            packet = shared.reader.lock().read();
            if let Some(p) = packet.as_mut() {
                // 循环重读的内容要叠加偏移，时钟才不会倒退
                if looping && p.pts != NO_PTS {
                    p.pts += loop_offset;
                    p.dts += loop_offset;
                }
            }
        }

        // ========== 4. EOF / 循环 / 终点 ==========
        if packet.is_none() {
            let (looping, has_audio) = {
                let st = shared.state.lock();
                (st.looping, st.has_audio)
            };

            // 缓冲判空：所有在场接收端都没有待消费数据才算空
            let video_cached = shared
                .video
                .lock()
                .as_ref()
                .map(|v| v.has_cached_work())
                .unwrap_or(false);
            let audio_cached = if has_audio {
                shared
                    .audio
                    .lock()
                    .as_ref()
                    .map(|a| a.has_cached_work())
                    .unwrap_or(false)
            } else {
                false
            };
            let cache_empty = !video_cached && !audio_cached;

            let eof = shared.reader.lock().is_eof();

            if eof && cache_empty {
                // 幂等信号，接收端必须容忍重复提交
                if let Some(v) = shared.video.lock().as_mut() {
                    v.submit_eos();
                }
            }

            if looping && eof {
                if cache_empty {
                    if is_live {
                        let has_handle = shared.reader.lock().has_file_handle();
                        if has_handle {
                            // 有活动句柄的流可以原地回绕
                            packet = seek_to_start(&shared);
                        } else {
                            // 管道/无句柄流无法 seek，只能标记由外部重建会话
                            debug!("{} 流模式无文件句柄，标记需要重启", log_ctx());
                            shared.state.lock().need_restart = true;
                        }
                        // 流的循环只能在这里感知；文件回绕不发事件，
                        // 否则和步骤 2 的帧检测重复计数
                        send_on_loop(&shared, &clock);
                    } else {
                        packet = seek_to_start(&shared);
                    }
                } else {
                    // 先把接收端积压消化完再重启
                    thread::sleep(PUMP_SLEEP);
                    continue;
                }
            } else if !looping && eof && cache_empty {
                let drained = shared
                    .video
                    .lock()
                    .as_ref()
                    .map(|v| v.is_eos())
                    .unwrap_or(true);
                if drained {
                    send_on_end(&shared, &clock);
                    break;
                }
            }
        }

        // ========== 5. 音频错误探测 ==========
        {
            let has_audio = shared.state.lock().has_audio;
            if has_audio {
                let errored = shared
                    .audio
                    .lock()
                    .as_ref()
                    .map(|a| a.has_error())
                    .unwrap_or(false);
                if errored {
                    error!("{} ❌ 音频接收端错误，本次会话关闭音频", log_ctx());
                    shared.state.lock().has_audio = false;
                }
            }
        }

        // ========== 6. 路由 ==========
        if let Some(p) = packet.take() {
            let (has_video, has_audio) = {
                let st = shared.state.lock();
                (st.has_video, st.has_audio)
            };

            if has_video && p.kind == StreamKind::Video {
                let declined = {
                    let mut video = shared.video.lock();
                    match video.as_mut() {
                        Some(v) => v.add_packet(p).err(),
                        None => None, // 接收端缺位，丢弃
                    }
                };
                if let Some(back) = declined {
                    // 背压：保留在途包，下一轮重试
                    packet = Some(back);
                    thread::sleep(PUMP_SLEEP);
                }
            } else if has_audio && p.kind == StreamKind::Audio {
                let declined = {
                    let mut audio = shared.audio.lock();
                    match audio.as_mut() {
                        Some(a) => a.add_packet(p).err(),
                        None => None,
                    }
                };
                if let Some(back) = declined {
                    packet = Some(back);
                    thread::sleep(PUMP_SLEEP);
                }
            } else {
                // 不属于任何活动流，立即丢弃
                debug!("{} 丢弃无归属数据包 (stream {})", log_ctx(), p.stream_index);
            }
        } else {
            thread::sleep(PUMP_SLEEP);
        }
    }

    info!("{} 🛑 泵线程退出", log_ctx());
}

/// 回到起点：seek 0、预读一个包、以接收端当前呈现时间刷新循环偏移
///
/// 音频在场时以音频 pts 为准，否则取视频 pts。
/// seek 失败只记日志，播放从当前位置继续（非致命）。
fn seek_to_start(shared: &Arc<Shared>) -> Option<MediaPacket> {
    let (start_pts, mut primed) = {
        let mut reader = shared.reader.lock();
        let pts = reader.seek_to_time(0.0, true);
        if pts.is_none() {
            error!("{} ❌ 循环 seek 回起点失败", log_ctx());
        }
        let p = reader.read();
        (pts, p)
    };

    let has_audio = shared.state.lock().has_audio;
    let new_offset = if has_audio {
        shared.audio.lock().as_ref().map(|a| a.current_pts())
    } else {
        shared.video.lock().as_ref().map(|v| v.current_pts())
    };

    let loop_offset = {
        let mut st = shared.state.lock();
        if let Some(pts) = start_pts {
            st.start_pts = pts;
        }
        if let Some(offset) = new_offset {
            st.previous_loop_offset = st.loop_offset;
            st.loop_offset = offset;
        }
        st.loop_offset
    };

    // 预读包同样要落在已流逝的时间线上
    if let Some(p) = primed.as_mut() {
        if p.pts != NO_PTS {
            p.pts += loop_offset;
            p.dts += loop_offset;
        }
    }
    primed
}

/// 循环事件：计数、帧基线复位到时钟最新帧计数、通知监听器
///
/// 状态变更在锁内完成，回调在锁释放后触发，
/// 监听器里再调引擎接口不会自锁。
fn send_on_loop(shared: &Arc<Shared>, clock: &PlaybackClock) {
    let event = {
        let mut st = shared.state.lock();
        st.loop_counter += 1;
        st.frame_counter = clock.frame_count();
        st.loop_frame = st.frame_counter;
        EngineEvent {
            kind: EngineEventKind::Loop,
            loop_count: st.loop_counter,
            media_time: clock.media_time(),
        }
    };
    info!("{} 🔁 循环回绕 #{}", log_ctx(), event.loop_count);

    let _ = shared.event_tx.send(event.clone());
    let listener = shared.listener.lock().clone();
    if let Some(listener) = listener {
        listener.on_loop(&event);
    }
}

/// 终点事件：仅非循环模式下到达（循环模式按设计不会走到终态）
fn send_on_end(shared: &Arc<Shared>, clock: &PlaybackClock) {
    let event = {
        let st = shared.state.lock();
        EngineEvent {
            kind: EngineEventKind::PlaybackEnded,
            loop_count: st.loop_counter,
            media_time: clock.media_time(),
        }
    };
    info!("{} 🏁 播放到达终点", log_ctx());

    let _ = shared.event_tx.send(event.clone());
    let listener = shared.listener.lock().clone();
    if let Some(listener) = listener {
        listener.on_playback_end(&event);
    }
}
