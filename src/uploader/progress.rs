// 上传进度聚合
//
// 维护每个上传单元的进度记录以及所有活跃单元的全局进度。
// 全局已上传字节数只按差值累加，不做全量重算。
// 活跃/发送中计数与进度共用同一把锁，由协调器持有。

use crate::uploader::file::{total_size, FileDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 当前毫秒时间戳
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// 进度记录
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// 已上传字节数
    pub loaded: u64,
    /// 总字节数
    pub total: u64,
    /// 速率 (bit/s)
    pub bitrate: u64,
}

impl Progress {
    /// 完成百分比 (0.0 - 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.loaded as f64 / self.total as f64 * 100.0).min(100.0)
    }
}

/// 传输层上报的进度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTick {
    /// 总长度是否已知
    pub length_computable: bool,
    pub loaded: u64,
    pub total: u64,
}

impl ProgressTick {
    pub fn new(loaded: u64, total: u64) -> Self {
        Self {
            length_computable: true,
            loaded,
            total,
        }
    }

    /// 长度未知的进度
    pub fn unknown(loaded: u64) -> Self {
        Self {
            length_computable: false,
            loaded,
            total: 0,
        }
    }
}

/// 速率计时器
///
/// 距上次计算不足 interval 时返回上一次的值，只有重新计算时才更新基准
#[derive(Debug, Clone)]
pub struct BitrateTimer {
    timestamp: u64,
    loaded: u64,
    bitrate: u64,
}

impl BitrateTimer {
    pub fn new(now: u64) -> Self {
        Self {
            timestamp: now,
            loaded: 0,
            bitrate: 0,
        }
    }

    /// 计算速率，interval 为 0 表示每次都重新计算
    pub fn bitrate(&mut self, now: u64, loaded: u64, interval_ms: u64) -> u64 {
        let time_diff = now.saturating_sub(self.timestamp);

        if self.bitrate == 0 || interval_ms == 0 || time_diff > interval_ms {
            if time_diff == 0 {
                return self.bitrate;
            }
            let delta = loaded.saturating_sub(self.loaded) as u128;
            self.bitrate = (delta * 1000 / time_diff as u128 * 8) as u64;
            self.loaded = loaded;
            self.timestamp = now;
        }

        self.bitrate
    }
}

/// 单元的进度换算窗口
///
/// 分片上传时每个请求只覆盖一个分片，传输层进度需要换算到整个文件
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressWindow {
    /// 当前请求的字节数，None 表示整个单元
    pub chunk_size: Option<u64>,
    /// 当前请求之前已上传的字节数
    pub offset: u64,
}

/// 单元进度的节流与速率参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSettings {
    pub progress_interval_ms: u64,
    pub bitrate_interval_ms: u64,
}

#[derive(Debug)]
struct UnitTracker {
    progress: Progress,
    timer: BitrateTimer,
    last_tick: Option<u64>,
    window: ProgressWindow,
    settings: ProgressSettings,
    sending: bool,
}

/// 一次进度更新的结果，用于发布 Progress / ProgressAll 事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub unit: Progress,
    pub global: Progress,
}

/// 单元开始时的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginOutcome {
    /// 活跃数从 0 变为 1
    pub started: bool,
    pub unit: Progress,
}

/// 进度聚合器
#[derive(Debug)]
pub struct ProgressAggregator {
    global: Progress,
    global_timer: BitrateTimer,
    units: HashMap<String, UnitTracker>,
    active: usize,
    sending: usize,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    pub fn new() -> Self {
        Self {
            global: Progress::default(),
            global_timer: BitrateTimer::new(now_millis()),
            units: HashMap::new(),
            active: 0,
            sending: 0,
        }
    }

    /// 全局进度快照
    pub fn global(&self) -> Progress {
        self.global
    }

    /// 单元进度快照
    pub fn unit(&self, id: &str) -> Option<Progress> {
        self.units.get(id).map(|t| t.progress)
    }

    /// 已提交（含排队等待）的单元数
    pub fn active(&self) -> usize {
        self.active
    }

    /// 正在发送请求的单元数
    pub fn sending(&self) -> usize {
        self.sending
    }

    /// 单元开始上传
    ///
    /// 活跃数从 0 变为 1 时重置全局进度与全局速率计时器
    pub fn begin(
        &mut self,
        id: &str,
        files: &[FileDescriptor],
        uploaded_bytes: u64,
        settings: ProgressSettings,
        now: u64,
    ) -> BeginOutcome {
        let started = self.active == 0;
        if started {
            self.global_timer = BitrateTimer::new(now);
            self.global = Progress::default();
        }

        let progress = Progress {
            loaded: uploaded_bytes,
            total: total_size(files).max(1),
            bitrate: 0,
        };

        self.units.insert(
            id.to_string(),
            UnitTracker {
                progress,
                timer: BitrateTimer::new(now),
                last_tick: None,
                window: ProgressWindow {
                    chunk_size: None,
                    offset: uploaded_bytes,
                },
                settings,
                sending: false,
            },
        );

        self.active += 1;
        self.global.loaded += progress.loaded;
        self.global.total += progress.total;

        BeginOutcome {
            started,
            unit: progress,
        }
    }

    /// 单元获得并发槽位，开始发送请求
    pub fn mark_sending(&mut self, id: &str) {
        if let Some(tracker) = self.units.get_mut(id) {
            if !tracker.sending {
                tracker.sending = true;
                self.sending += 1;
            }
        }
    }

    /// 设置进度换算窗口（分片请求开始时调用）
    pub fn set_window(&mut self, id: &str, window: ProgressWindow) {
        if let Some(tracker) = self.units.get_mut(id) {
            tracker.window = window;
            tracker.last_tick = None;
        }
    }

    /// 处理传输层进度
    ///
    /// 长度未知的进度被忽略；间隔内的进度被抑制，但完成进度（loaded == total）总会处理
    pub fn on_tick(&mut self, id: &str, tick: ProgressTick, now: u64) -> Option<ProgressUpdate> {
        if !tick.length_computable || tick.total == 0 {
            return None;
        }

        let tracker = self.units.get_mut(id)?;
        let interval = tracker.settings.progress_interval_ms;
        if let Some(last) = tracker.last_tick {
            if interval > 0 && now.saturating_sub(last) < interval && tick.loaded != tick.total {
                return None;
            }
        }
        tracker.last_tick = Some(now);

        let scale = tracker
            .window
            .chunk_size
            .unwrap_or(tracker.progress.total) as u128;
        let ratio = tick.loaded.min(tick.total) as u128 * scale / tick.total as u128;
        let loaded = ratio as u64 + tracker.window.offset;

        self.apply_loaded(id, loaded, now)
    }

    /// 直接把单元进度推进到指定字节数（分片确认后调用）
    pub fn advance_to(&mut self, id: &str, loaded: u64, now: u64) -> Option<ProgressUpdate> {
        let tracker = self.units.get(id)?;
        if tracker.progress.loaded == loaded {
            return None;
        }
        self.apply_loaded(id, loaded, now)
    }

    /// 单元上传成功
    ///
    /// 最后一次进度未达到总量时补发一次 100% 进度
    pub fn complete(&mut self, id: &str, now: u64) -> Option<ProgressUpdate> {
        let tracker = self.units.get(id)?;
        let total = tracker.progress.total;
        if tracker.progress.loaded < total {
            self.apply_loaded(id, total, now)
        } else {
            None
        }
    }

    /// 单元失败或中止
    ///
    /// recalculate 为 true 时把该单元的进度从全局进度中整体扣除
    pub fn fail(&mut self, id: &str, recalculate: bool) -> Progress {
        if recalculate {
            if let Some(tracker) = self.units.get(id) {
                self.global.loaded = self.global.loaded.saturating_sub(tracker.progress.loaded);
                self.global.total = self.global.total.saturating_sub(tracker.progress.total);
            }
        }
        self.global
    }

    /// 单元结束（成功、失败或中止之后），返回活跃数是否归零
    pub fn finish(&mut self, id: &str) -> bool {
        if let Some(tracker) = self.units.remove(id) {
            if tracker.sending {
                self.sending = self.sending.saturating_sub(1);
            }
            self.active = self.active.saturating_sub(1);
        }
        self.active == 0
    }

    fn apply_loaded(&mut self, id: &str, loaded: u64, now: u64) -> Option<ProgressUpdate> {
        let tracker = self.units.get_mut(id)?;
        let bitrate_interval = tracker.settings.bitrate_interval_ms;

        let previous = tracker.progress.loaded;
        if loaded >= previous {
            self.global.loaded += loaded - previous;
        } else {
            self.global.loaded = self.global.loaded.saturating_sub(previous - loaded);
        }
        self.global.bitrate = self
            .global_timer
            .bitrate(now, self.global.loaded, bitrate_interval);

        tracker.progress.loaded = loaded;
        tracker.progress.bitrate = tracker.timer.bitrate(now, loaded, bitrate_interval);

        Some(ProgressUpdate {
            unit: tracker.progress,
            global: self.global,
        })
    }
}
