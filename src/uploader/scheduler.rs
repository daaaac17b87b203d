// 上传并发槽位
//
// sequential_uploads 时同一时刻只发送一个单元，limit_concurrent_uploads 时最多 N 个。
// 排队在 enqueue 时同步完成，与任务何时被运行时调度无关，
// 排队单元严格按 enqueue 顺序获得槽位。

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 并发槽位
#[derive(Debug, Clone)]
pub struct UploadSlots {
    pool: Option<Arc<SlotPool>>,
}

#[derive(Debug)]
struct SlotPool {
    limit: usize,
    state: Mutex<PoolState>,
}

#[derive(Debug, Default)]
struct PoolState {
    in_use: usize,
    waiters: VecDeque<oneshot::Sender<SlotPermit>>,
}

/// 已获得的槽位，drop 时交给下一个排队者或归还
#[derive(Debug)]
pub struct SlotPermit {
    pool: Option<Arc<SlotPool>>,
}

/// 排队凭证
#[derive(Debug)]
pub enum SlotTicket {
    Ready(SlotPermit),
    Waiting(oneshot::Receiver<SlotPermit>),
}

impl SlotPool {
    /// 槽位直接移交给队首等待者；等待者已放弃时继续向后找
    fn release(self: &Arc<Self>) {
        loop {
            let waiter = {
                let mut state = self.state.lock();
                match state.waiters.pop_front() {
                    Some(waiter) => waiter,
                    None => {
                        state.in_use = state.in_use.saturating_sub(1);
                        return;
                    }
                }
            };

            let permit = SlotPermit {
                pool: Some(self.clone()),
            };
            match waiter.send(permit) {
                Ok(()) => return,
                Err(mut permit) => {
                    // 接收端已关闭，槽位仍由本次释放持有
                    permit.pool = None;
                }
            }
        }
    }
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release();
        }
    }
}

impl UploadSlots {
    /// 创建槽位池，None 表示不限制
    pub fn new(limit: Option<usize>) -> Self {
        Self {
            pool: limit.filter(|n| *n > 0).map(|limit| {
                Arc::new(SlotPool {
                    limit,
                    state: Mutex::new(PoolState::default()),
                })
            }),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn limit(&self) -> Option<usize> {
        self.pool.as_ref().map(|p| p.limit)
    }

    /// 当前可用槽位数（不限制时为 None）
    pub fn available(&self) -> Option<usize> {
        self.pool
            .as_ref()
            .map(|p| p.limit.saturating_sub(p.state.lock().in_use))
    }

    /// 进入等待队列
    ///
    /// 有空闲槽位且无人排队时立即获得，否则排到队尾
    pub fn enqueue(&self) -> SlotTicket {
        let Some(pool) = &self.pool else {
            return SlotTicket::Ready(SlotPermit { pool: None });
        };

        let mut state = pool.state.lock();
        if state.in_use < pool.limit && state.waiters.is_empty() {
            state.in_use += 1;
            return SlotTicket::Ready(SlotPermit {
                pool: Some(pool.clone()),
            });
        }

        let (tx, rx) = oneshot::channel();
        state.waiters.push_back(tx);
        SlotTicket::Waiting(rx)
    }

    /// 排队并等待槽位
    pub async fn acquire(&self, cancel: &CancellationToken) -> Option<SlotPermit> {
        self.enqueue().acquire(cancel).await
    }
}

impl SlotTicket {
    /// 等待槽位
    ///
    /// 等待期间取消时返回 None，排队中的单元不会再发送
    pub async fn acquire(self, cancel: &CancellationToken) -> Option<SlotPermit> {
        let rx = match self {
            SlotTicket::Ready(permit) => {
                if cancel.is_cancelled() {
                    return None;
                }
                return Some(permit);
            }
            SlotTicket::Waiting(rx) => rx,
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("等待上传槽位时被取消");
                None
            }
            permit = rx => permit.ok(),
        }
    }
}
