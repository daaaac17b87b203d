// 上传引擎
//
// 负责驱动单个上传单元：
// 1. 等待并发槽位
// 2. 整体上传，或按分片顺序上传（前一个分片成功后才发下一个）
// 3. 把传输层进度交给进度聚合器
// 4. 发布 Done / Fail / Always / Stop
//
// 失败立即结束，不做任何重试；中止只取消当前请求，
// 已确认的字节数保留在单元的 uploaded_bytes 中。

use crate::error::UploadError;
use crate::events::UploadEvent;
use crate::transport::{TransportResponse, UploadRequest};
use crate::uploader::chunk::{ChunkCursor, ChunkPlan, ChunkStep};
use crate::uploader::manager::CoordinatorInner;
use crate::uploader::progress::{now_millis, ProgressTick, ProgressUpdate, ProgressWindow};
use crate::uploader::request::RequestBuilder;
use crate::uploader::scheduler::SlotTicket;
use crate::uploader::task::{ResponseRecord, WorkUnitState};
use crate::uploader::unit::WorkUnit;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// 上传引擎
pub(crate) struct UploadEngine {
    coordinator: Arc<CoordinatorInner>,
    unit: WorkUnit,
}

impl UploadEngine {
    pub(crate) fn new(coordinator: Arc<CoordinatorInner>, unit: WorkUnit) -> Self {
        Self { coordinator, unit }
    }

    /// 执行上传直到单元结束
    pub(crate) async fn run(self, ticket: SlotTicket) {
        let result = match ticket.acquire(self.unit.cancel_token()).await {
            Some(permit) => {
                self.coordinator.aggregator.lock().mark_sending(self.unit.id());
                let result = self.upload().await;
                drop(permit);
                result
            }
            // 排队期间被中止，不发出任何请求
            None => Err(UploadError::Aborted),
        };

        self.finish(result);
    }

    async fn upload(&self) -> Result<TransportResponse, UploadError> {
        match ChunkPlan::for_unit(self.unit.files(), self.unit.options()) {
            Some(plan) => self.upload_chunks(plan).await,
            None => {
                let request = RequestBuilder::new(self.unit.options()).build(
                    self.unit.files(),
                    self.unit.param_names(),
                    None,
                );
                self.send_request(request).await
            }
        }
    }

    /// 分片上传
    async fn upload_chunks(&self, plan: ChunkPlan) -> Result<TransportResponse, UploadError> {
        let options = self.unit.options();
        let unit_id = self.unit.id().to_string();
        let builder = RequestBuilder::new(options);
        let mut cursor = ChunkCursor::new(plan);

        info!(
            "开始分片上传: id={}, 文件大小={}, 分片大小={}, 起始偏移={}",
            unit_id, plan.file_size, plan.chunk_size, plan.uploaded_bytes
        );

        loop {
            let chunk = cursor.next_chunk(&options.messages.uploaded_bytes)?;
            let content_range = chunk.content_range();

            self.coordinator.aggregator.lock().set_window(
                &unit_id,
                ProgressWindow {
                    chunk_size: Some(chunk.size()),
                    offset: chunk.range.start,
                },
            );
            self.coordinator.emit(UploadEvent::ChunkSend {
                unit_id: unit_id.clone(),
                index: chunk.index,
                content_range: content_range.clone(),
            });
            debug!("发送分片 #{}: {}", chunk.index, content_range);

            let request = builder.build(self.unit.files(), self.unit.param_names(), Some(&chunk));
            let step = self
                .send_request(request)
                .await
                .and_then(|response| {
                    let step = cursor.advance(&chunk, response.uploaded_bytes())?;
                    Ok((response, step))
                });

            let (response, step) = match step {
                Ok(v) => v,
                Err(e) => {
                    warn!("分片 #{} 失败: {}, 错误: {}", chunk.index, content_range, e);
                    self.coordinator.emit(UploadEvent::ChunkFail {
                        unit_id: unit_id.clone(),
                        index: chunk.index,
                        content_range,
                        error: e.clone(),
                    });
                    return Err(e);
                }
            };

            self.unit.set_uploaded_bytes(cursor.uploaded());
            self.coordinator.emit(UploadEvent::ChunkDone {
                unit_id: unit_id.clone(),
                index: chunk.index,
                content_range,
                uploaded_bytes: cursor.uploaded(),
            });

            match step {
                ChunkStep::Complete => return Ok(response),
                ChunkStep::Continue => {
                    let update = self.coordinator.aggregator.lock().advance_to(
                        &unit_id,
                        cursor.uploaded(),
                        now_millis(),
                    );
                    self.publish(update);
                }
            }
        }
    }

    /// 发出一个请求，期间转发传输层进度；单元被中止时丢弃请求
    async fn send_request(&self, request: UploadRequest) -> Result<TransportResponse, UploadError> {
        let cancel = self.unit.cancel_token().clone();
        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<ProgressTick>();
        let transport = self.coordinator.transport.clone();

        let send = transport.send(request, progress_tx);
        tokio::pin!(send);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("请求已取消: id={}", self.unit.id());
                    return Err(UploadError::Aborted);
                }
                result = &mut send => {
                    while let Ok(tick) = progress_rx.try_recv() {
                        self.on_tick(tick);
                    }
                    return result;
                }
                Some(tick) = progress_rx.recv() => {
                    self.on_tick(tick);
                }
            }
        }
    }

    fn on_tick(&self, tick: ProgressTick) {
        let update = self
            .coordinator
            .aggregator
            .lock()
            .on_tick(self.unit.id(), tick, now_millis());
        self.publish(update);
    }

    /// 更新单元进度并发布 Progress / ProgressAll
    fn publish(&self, update: Option<ProgressUpdate>) {
        let Some(update) = update else {
            return;
        };
        self.unit.set_progress(update.unit);
        self.coordinator.emit(UploadEvent::Progress {
            unit_id: self.unit.id().to_string(),
            progress: update.unit,
        });
        self.coordinator.emit(UploadEvent::ProgressAll {
            progress: update.global,
        });
    }

    fn finish(&self, result: Result<TransportResponse, UploadError>) {
        let unit_id = self.unit.id().to_string();

        match result {
            Ok(response) => {
                let update = self
                    .coordinator
                    .aggregator
                    .lock()
                    .complete(&unit_id, now_millis());
                self.publish(update);

                let record = ResponseRecord::success(
                    response.json(),
                    response.status,
                    response.status_text.clone(),
                );
                self.unit.set_response(record.clone());
                self.unit.transition(WorkUnitState::Done);
                info!("上传完成: id={}, status={}", unit_id, response.status);

                self.coordinator.emit(UploadEvent::Done {
                    unit_id: unit_id.clone(),
                    response: record,
                });
            }
            Err(e) => {
                let recalculate = self.unit.options().recalculate_progress;
                self.coordinator.aggregator.lock().fail(&unit_id, recalculate);

                let next = if e.is_abort() {
                    info!("上传已中止: id={}, 已确认 {} 字节", unit_id, self.unit.uploaded_bytes());
                    WorkUnitState::Aborted
                } else {
                    error!("上传失败: id={}, 错误: {}", unit_id, e);
                    WorkUnitState::Failed
                };

                let record = ResponseRecord::failure(e, self.unit.files().len());
                self.unit.set_response(record.clone());
                self.unit.transition(next);

                self.coordinator.emit(UploadEvent::Fail {
                    unit_id: unit_id.clone(),
                    response: record,
                });
            }
        }

        self.coordinator.emit(UploadEvent::Always {
            unit_id: unit_id.clone(),
            state: self.unit.state(),
        });

        let stopped = self.coordinator.aggregator.lock().finish(&unit_id);
        if stopped {
            info!("所有上传已结束");
            self.coordinator.emit(UploadEvent::Stop);
        }

        self.unit.settle();
    }
}
