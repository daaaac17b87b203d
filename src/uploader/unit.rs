// 上传单元
//
// 一个上传单元对应一次规划好的 HTTP 请求（或一个分片序列）。
// 单元由协调器持有，调用方拿到的是可克隆的句柄。

use crate::config::UploadOptions;
use crate::error::UploadError;
use crate::events::UploadEvent;
use crate::uploader::file::FileDescriptor;
use crate::uploader::manager::CoordinatorInner;
use crate::uploader::progress::Progress;
use crate::uploader::task::{ResponseRecord, WorkUnitState};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 发送前的处理钩子（校验、转换等）
///
/// 返回 Err 时单元失败，错误为 `UploadError::Rejected`
#[async_trait]
pub trait UploadProcessor: Send + Sync {
    async fn process(&self, unit: &WorkUnit) -> Result<(), String>;
}

struct UnitInner {
    id: String,
    seq: u64,
    files: Vec<FileDescriptor>,
    param_names: Vec<String>,
    options: UploadOptions,
    coordinator: Weak<CoordinatorInner>,
    state: Mutex<WorkUnitState>,
    progress: Mutex<Progress>,
    response: Mutex<ResponseRecord>,
    /// 分片游标：服务器已确认的字节数
    uploaded_bytes: AtomicU64,
    cancel: CancellationToken,
    settled: watch::Sender<bool>,
}

/// 上传单元句柄
#[derive(Clone)]
pub struct WorkUnit {
    inner: Arc<UnitInner>,
}

impl std::fmt::Debug for WorkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("id", &self.inner.id)
            .field("files", &self.file_names())
            .field("state", &self.state())
            .field("uploaded_bytes", &self.uploaded_bytes())
            .finish()
    }
}

impl WorkUnit {
    pub(crate) fn new(
        seq: u64,
        files: Vec<FileDescriptor>,
        param_names: Vec<String>,
        options: UploadOptions,
        coordinator: Weak<CoordinatorInner>,
    ) -> Self {
        let (settled, _) = watch::channel(false);
        let uploaded_bytes = options.uploaded_bytes;

        Self {
            inner: Arc::new(UnitInner {
                id: uuid::Uuid::new_v4().to_string(),
                seq,
                files,
                param_names,
                options,
                coordinator,
                state: Mutex::new(WorkUnitState::Pending),
                progress: Mutex::new(Progress::default()),
                response: Mutex::new(ResponseRecord::default()),
                uploaded_bytes: AtomicU64::new(uploaded_bytes),
                cancel: CancellationToken::new(),
                settled,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub(crate) fn seq(&self) -> u64 {
        self.inner.seq
    }

    pub fn files(&self) -> &[FileDescriptor] {
        &self.inner.files
    }

    pub fn file_names(&self) -> Vec<String> {
        self.inner.files.iter().map(|f| f.name.clone()).collect()
    }

    /// 各文件对应的表单字段名
    pub fn param_names(&self) -> &[String] {
        &self.inner.param_names
    }

    /// 该单元合并后的选项
    pub fn options(&self) -> &UploadOptions {
        &self.inner.options
    }

    pub fn state(&self) -> WorkUnitState {
        *self.inner.state.lock()
    }

    /// 进度快照
    pub fn progress(&self) -> Progress {
        *self.inner.progress.lock()
    }

    /// 响应记录快照
    pub fn response(&self) -> ResponseRecord {
        self.inner.response.lock().clone()
    }

    /// 服务器已确认的字节数，中止后可作为续传偏移
    pub fn uploaded_bytes(&self) -> u64 {
        self.inner.uploaded_bytes.load(Ordering::SeqCst)
    }

    /// 是否已处理完毕（终止状态且所有事件已发布）
    pub fn is_settled(&self) -> bool {
        *self.inner.settled.borrow()
    }

    /// 提交上传
    ///
    /// 只有 Pending 状态的单元可以提交；观察者阻止 Submit 事件时单元保持 Pending。
    /// 返回是否真正开始发送。需要在 tokio 运行时中调用。
    pub fn submit(&self) -> bool {
        if self.state() != WorkUnitState::Pending {
            debug!("单元 {} 当前状态 {}，忽略提交", self.id(), self.state());
            return false;
        }
        let Some(coordinator) = self.inner.coordinator.upgrade() else {
            warn!("单元 {} 的协调器已释放，无法提交", self.id());
            return false;
        };

        let event = UploadEvent::Submit {
            unit_id: self.id().to_string(),
        };
        if coordinator.emit(event) == crate::events::EventOutcome::PreventDefault {
            info!("单元 {} 的提交被观察者阻止", self.id());
            return false;
        }

        coordinator.dispatch(self)
    }

    /// 中止上传
    ///
    /// 发送中或排队中：取消当前请求；尚未提交：直接标记为中止并发布 Fail / Always
    pub fn abort(&self) -> bool {
        let previous = {
            let mut state = self.inner.state.lock();
            let previous = *state;
            if matches!(previous, WorkUnitState::Pending | WorkUnitState::Processing) {
                *state = WorkUnitState::Aborted;
            }
            previous
        };

        match previous {
            WorkUnitState::Sending => {
                info!("中止上传单元: {}", self.id());
                self.inner.cancel.cancel();
                true
            }
            WorkUnitState::Pending | WorkUnitState::Processing => {
                info!("中止未发送的上传单元: {}", self.id());
                self.inner.cancel.cancel();
                if let Some(coordinator) = self.inner.coordinator.upgrade() {
                    coordinator.settle_unsent(self, UploadError::Aborted);
                } else {
                    self.set_response(ResponseRecord::failure(UploadError::Aborted, self.files().len()));
                    self.settle();
                }
                true
            }
            _ => false,
        }
    }

    /// 执行处理钩子
    ///
    /// Pending → Processing → Pending；任一钩子拒绝时单元失败
    pub async fn process(&self) -> Result<(), UploadError> {
        let Some(coordinator) = self.inner.coordinator.upgrade() else {
            return Ok(());
        };
        let processors = coordinator.processors();
        if processors.is_empty() {
            return Ok(());
        }

        if !self.transition(WorkUnitState::Processing) {
            return Err(UploadError::Rejected {
                reason: format!("单元状态为 {}，无法处理", self.state()),
            });
        }

        for processor in processors {
            let result = processor.process(self).await;

            if self.inner.cancel.is_cancelled() {
                return Err(UploadError::Aborted);
            }
            if let Err(reason) = result {
                warn!("单元 {} 被处理钩子拒绝: {}", self.id(), reason);
                let error = UploadError::Rejected { reason };
                if self.transition(WorkUnitState::Failed) {
                    coordinator.settle_unsent(self, error.clone());
                }
                return Err(error);
            }
        }

        if self.transition(WorkUnitState::Pending) {
            Ok(())
        } else {
            Err(UploadError::Aborted)
        }
    }

    /// 等待单元结束，返回最终状态
    pub async fn wait(&self) -> WorkUnitState {
        let mut rx = self.inner.settled.subscribe();
        // 发送端与句柄同生命周期，不会提前关闭
        let _ = rx.wait_for(|settled| *settled).await;
        self.state()
    }

    pub(crate) fn transition(&self, next: WorkUnitState) -> bool {
        let mut state = self.inner.state.lock();
        if state.can_transition_to(next) {
            debug!("单元 {} 状态: {} -> {}", self.inner.id, *state, next);
            *state = next;
            true
        } else {
            false
        }
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    pub(crate) fn set_progress(&self, progress: Progress) {
        *self.inner.progress.lock() = progress;
    }

    pub(crate) fn set_response(&self, response: ResponseRecord) {
        *self.inner.response.lock() = response;
    }

    pub(crate) fn set_uploaded_bytes(&self, uploaded: u64) {
        self.inner.uploaded_bytes.fetch_max(uploaded, Ordering::SeqCst);
    }

    pub(crate) fn settle(&self) {
        self.inner.settled.send_replace(true);
    }
}
