// 上传协调器
//
// 负责：
// - 按选项把文件划分为上传单元
// - 单元的提交、中止、处理钩子
// - 活跃/发送中计数与全局进度
// - 生命周期事件发布
//
// 事件发布时不持有任何内部锁，观察者可以直接回读协调器状态。

use crate::config::{UploadOptions, UploadOverrides};
use crate::error::UploadError;
use crate::events::{EventBus, EventOutcome, UploadEvent, UploadObserver};
use crate::transport::UploadTransport;
use crate::uploader::engine::UploadEngine;
use crate::uploader::file::FileDescriptor;
use crate::uploader::partition::partition;
use crate::uploader::progress::{now_millis, Progress, ProgressAggregator, ProgressSettings};
use crate::uploader::scheduler::UploadSlots;
use crate::uploader::task::{ResponseRecord, WorkUnitState};
use crate::uploader::unit::{UploadProcessor, WorkUnit};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// 协调器内部状态，由协调器与各单元的上传任务共享
pub(crate) struct CoordinatorInner {
    options: UploadOptions,
    pub(crate) transport: Arc<dyn UploadTransport>,
    units: DashMap<String, WorkUnit>,
    /// 进度与活跃计数共用一把锁
    pub(crate) aggregator: Mutex<ProgressAggregator>,
    events: EventBus,
    processors: RwLock<Vec<Arc<dyn UploadProcessor>>>,
    /// 并发上限 -> 槽位池
    slots: Mutex<HashMap<usize, UploadSlots>>,
    next_seq: AtomicU64,
}

impl CoordinatorInner {
    pub(crate) fn emit(&self, event: UploadEvent) -> EventOutcome {
        self.events.emit(event)
    }

    pub(crate) fn processors(&self) -> Vec<Arc<dyn UploadProcessor>> {
        self.processors.read().clone()
    }

    /// 按并发上限获取共享的槽位池
    pub(crate) fn slots_for(&self, limit: Option<usize>) -> UploadSlots {
        match limit {
            None => UploadSlots::unlimited(),
            Some(limit) => self
                .slots
                .lock()
                .entry(limit)
                .or_insert_with(|| UploadSlots::new(Some(limit)))
                .clone(),
        }
    }

    /// 开始发送一个单元
    ///
    /// 活跃数从 0 变为 1 时发布 Start；初始化单元进度后交给上传引擎
    pub(crate) fn dispatch(self: &Arc<Self>, unit: &WorkUnit) -> bool {
        if !unit.transition(WorkUnitState::Sending) {
            return false;
        }

        let options = unit.options();
        let settings = ProgressSettings {
            progress_interval_ms: options.progress_interval_ms,
            bitrate_interval_ms: options.bitrate_interval_ms,
        };

        let outcome = self.aggregator.lock().begin(
            unit.id(),
            unit.files(),
            options.uploaded_bytes,
            settings,
            now_millis(),
        );
        unit.set_progress(outcome.unit);
        unit.set_response(ResponseRecord::default());

        if outcome.started {
            info!("上传开始");
            self.emit(UploadEvent::Start);
        }

        info!(
            "提交上传单元: id={}, 文件数={}, 总大小={}",
            unit.id(),
            unit.files().len(),
            outcome.unit.total
        );

        // 在派发时同步排队，槽位按提交顺序分配
        let ticket = self.slots_for(options.concurrency_limit()).enqueue();
        let engine = UploadEngine::new(self.clone(), unit.clone());
        tokio::spawn(engine.run(ticket));
        true
    }

    /// 未发送的单元失败或中止：发布 Fail / Always
    pub(crate) fn settle_unsent(&self, unit: &WorkUnit, error: UploadError) {
        let response = ResponseRecord::failure(error, unit.files().len());
        unit.set_response(response.clone());

        self.emit(UploadEvent::Fail {
            unit_id: unit.id().to_string(),
            response,
        });
        self.emit(UploadEvent::Always {
            unit_id: unit.id().to_string(),
            state: unit.state(),
        });
        unit.settle();
    }
}

/// 上传协调器
///
/// 可克隆，所有克隆共享同一组单元、计数和全局进度
#[derive(Clone)]
pub struct UploadCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl std::fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("units", &self.inner.units.len())
            .field("active", &self.active())
            .field("progress", &self.progress())
            .finish()
    }
}

impl UploadCoordinator {
    /// 创建协调器
    pub fn new(options: UploadOptions, transport: Arc<dyn UploadTransport>) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                options,
                transport,
                units: DashMap::new(),
                aggregator: Mutex::new(ProgressAggregator::new()),
                events: EventBus::new(),
                processors: RwLock::new(Vec::new()),
                slots: Mutex::new(HashMap::new()),
                next_seq: AtomicU64::new(0),
            }),
        }
    }

    /// 默认选项
    pub fn options(&self) -> &UploadOptions {
        &self.inner.options
    }

    /// 添加文件
    ///
    /// 按选项划分上传单元，每个单元发布一次 Add 事件。开启 auto_upload 且
    /// 观察者未阻止时，单元依次执行处理钩子并提交。
    pub fn add(
        &self,
        files: Vec<FileDescriptor>,
        overrides: &UploadOverrides,
    ) -> Result<Vec<WorkUnit>, UploadError> {
        let options = self.resolve_options(overrides)?;
        let units = self.create_units(&files, &options);
        let mut queued = Vec::new();

        for unit in &units {
            let outcome = self.inner.emit(UploadEvent::Add {
                unit_id: unit.id().to_string(),
                files: unit.file_names(),
                param_names: unit.param_names().to_vec(),
            });

            if outcome == EventOutcome::PreventDefault {
                debug!("单元 {} 的自动提交被观察者阻止", unit.id());
                continue;
            }
            queued.push(unit.clone());
        }

        // 同一批单元在一个任务里依次处理并提交，保持添加顺序
        if options.auto_upload && !queued.is_empty() {
            tokio::spawn(async move {
                for unit in queued {
                    if unit.process().await.is_ok() {
                        unit.submit();
                    }
                }
            });
        }

        Ok(units)
    }

    /// 直接发送文件（不发布 Add / Submit 事件）
    pub fn send(
        &self,
        files: Vec<FileDescriptor>,
        overrides: &UploadOverrides,
    ) -> Result<Vec<WorkUnit>, UploadError> {
        let options = self.resolve_options(overrides)?;
        let units = self.create_units(&files, &options);

        for unit in &units {
            self.inner.dispatch(unit);
        }

        Ok(units)
    }

    /// 提交所有待提交的单元（按创建顺序），返回提交数量
    pub fn submit_all(&self) -> usize {
        let submitted = self
            .units()
            .iter()
            .filter(|unit| unit.state() == WorkUnitState::Pending)
            .filter(|unit| unit.submit())
            .count();
        if submitted > 0 {
            info!("提交全部上传单元: {} 个", submitted);
        }
        submitted
    }

    /// 中止所有未结束的单元，返回中止数量
    pub fn abort_all(&self) -> usize {
        let aborted = self
            .units()
            .iter()
            .filter(|unit| !unit.state().is_terminal())
            .filter(|unit| unit.abort())
            .count();
        if aborted > 0 {
            info!("中止全部上传单元: {} 个", aborted);
        }
        aborted
    }

    /// 已提交（含排队等待槽位）的单元数
    pub fn active(&self) -> usize {
        self.inner.aggregator.lock().active()
    }

    /// 正在发送请求的单元数
    pub fn sending(&self) -> usize {
        self.inner.aggregator.lock().sending()
    }

    /// 全局进度快照
    pub fn progress(&self) -> Progress {
        self.inner.aggregator.lock().global()
    }

    /// 所有单元（按创建顺序）
    pub fn units(&self) -> Vec<WorkUnit> {
        let mut units: Vec<WorkUnit> = self
            .inner
            .units
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        units.sort_by_key(|u| u.seq());
        units
    }

    pub fn unit(&self, id: &str) -> Option<WorkUnit> {
        self.inner.units.get(id).map(|entry| entry.value().clone())
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.inner.events.subscribe()
    }

    /// 注册观察者
    pub fn add_observer(&self, observer: Arc<dyn UploadObserver>) {
        self.inner.events.add_observer(observer);
    }

    /// 注册处理钩子
    pub fn add_processor(&self, processor: Arc<dyn UploadProcessor>) {
        self.inner.processors.write().push(processor);
    }

    /// 移除已结束的单元，返回移除数量
    pub fn clear_finished(&self) -> usize {
        let before = self.inner.units.len();
        self.inner
            .units
            .retain(|_, unit| !(unit.state().is_terminal() && unit.is_settled()));
        let removed = before - self.inner.units.len();
        if removed > 0 {
            info!("清理已结束的上传单元: {} 个", removed);
        }
        removed
    }

    fn resolve_options(&self, overrides: &UploadOverrides) -> Result<UploadOptions, UploadError> {
        if self.inner.options.disabled {
            return Err(UploadError::Disabled);
        }
        let options = self.inner.options.merged(overrides);
        options
            .validate()
            .map_err(|reason| UploadError::Rejected { reason })?;
        Ok(options)
    }

    fn create_units(&self, files: &[FileDescriptor], options: &UploadOptions) -> Vec<WorkUnit> {
        let weak: Weak<CoordinatorInner> = Arc::downgrade(&self.inner);

        let units: Vec<WorkUnit> = partition(files, options)
            .into_iter()
            .map(|group| {
                let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);
                WorkUnit::new(
                    seq,
                    group.files,
                    group.param_names,
                    options.clone(),
                    weak.clone(),
                )
            })
            .collect();

        for unit in &units {
            self.inner.units.insert(unit.id().to_string(), unit.clone());
        }

        info!(
            "添加文件: 文件数={}, 上传单元数={}",
            files.len(),
            units.len()
        );
        units
    }
}
