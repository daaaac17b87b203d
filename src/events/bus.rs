//! 事件总线
//!
//! 观察者同步接收事件，返回值用于阻止默认行为；
//! 订阅者通过 broadcast 通道被动接收事件副本。

use super::UploadEvent;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// 广播通道容量
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// 观察者处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventOutcome {
    /// 继续默认行为
    #[default]
    Continue,
    /// 阻止默认行为（仅对 add / submit 有效）
    PreventDefault,
}

/// 上传事件观察者
pub trait UploadObserver: Send + Sync {
    fn on_event(&self, event: &UploadEvent) -> EventOutcome;
}

impl<F> UploadObserver for F
where
    F: Fn(&UploadEvent) -> EventOutcome + Send + Sync,
{
    fn on_event(&self, event: &UploadEvent) -> EventOutcome {
        self(event)
    }
}

/// 事件总线
pub struct EventBus {
    observers: RwLock<Vec<Arc<dyn UploadObserver>>>,
    sender: broadcast::Sender<UploadEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.read().len())
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            observers: RwLock::new(Vec::new()),
            sender,
        }
    }

    /// 注册观察者
    pub fn add_observer(&self, observer: Arc<dyn UploadObserver>) {
        self.observers.write().push(observer);
    }

    /// 订阅事件
    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.sender.subscribe()
    }

    /// 发布事件
    ///
    /// 调用方不得持有协调器内部锁，观察者可能回读协调器状态
    pub fn emit(&self, event: UploadEvent) -> EventOutcome {
        let observers: Vec<_> = self.observers.read().iter().cloned().collect();

        let mut outcome = EventOutcome::Continue;
        for observer in observers {
            if observer.on_event(&event) == EventOutcome::PreventDefault && event.is_vetoable() {
                outcome = EventOutcome::PreventDefault;
            }
        }

        trace!("发布事件: {}", event.name());
        // 没有订阅者时发送失败，忽略
        let _ = self.sender.send(event);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_emit_to_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        assert_eq!(bus.emit(UploadEvent::Start), EventOutcome::Continue);
        assert_eq!(rx.recv().await.unwrap(), UploadEvent::Start);
    }

    #[test]
    fn test_observer_veto() {
        let bus = EventBus::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = seen.clone();
        bus.add_observer(Arc::new(move |_: &UploadEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            EventOutcome::Continue
        }));
        bus.add_observer(Arc::new(|event: &UploadEvent| match event {
            UploadEvent::Add { .. } | UploadEvent::Start => EventOutcome::PreventDefault,
            _ => EventOutcome::Continue,
        }));

        let add = UploadEvent::Add {
            unit_id: "u1".to_string(),
            files: vec!["a.txt".to_string()],
            param_names: vec!["files[]".to_string()],
        };
        assert_eq!(bus.emit(add), EventOutcome::PreventDefault);

        // 不可阻止的事件忽略观察者的返回值
        assert_eq!(bus.emit(UploadEvent::Start), EventOutcome::Continue);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
