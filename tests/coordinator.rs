use async_trait::async_trait;
use batch_uploader::config::UploadOverrides;
use batch_uploader::transport::{ProgressSender, RequestBody, TransportResponse, UploadRequest};
use batch_uploader::uploader::ProgressTick;
use batch_uploader::{
    ErrorKind, EventOutcome, FileDescriptor, UploadCoordinator, UploadError, UploadEvent,
    UploadOptions, UploadProcessor, UploadTransport, WorkUnit, WorkUnitState,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Clone)]
struct Recorded {
    url: String,
    content_range: Option<String>,
    parts: usize,
    body_len: u64,
}

/// 记录请求的模拟传输层
///
/// - url 以 `/fail` 结尾时返回 500
/// - url 以 `/reject` 结尾时返回 422，响应体为逐文件错误的 JSON
/// - Content-Range（无分片时为 url）等于 `block_on` 时挂起，直到请求被取消
/// - 分片请求成功后通过 Range 头确认到分片末尾
#[derive(Default)]
struct MockTransport {
    requests: Mutex<Vec<Recorded>>,
    block_on: Mutex<Option<String>>,
    blocked: Notify,
    cancelled: AtomicBool,
    delay_ms: u64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    fn with_delay(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            ..Default::default()
        }
    }

    fn block_on(&self, key: &str) {
        *self.block_on.lock() = Some(key.to_string());
    }

    fn unblock(&self) {
        *self.block_on.lock() = None;
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().clone()
    }

    fn content_ranges(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter_map(|r| r.content_range)
            .collect()
    }
}

struct DropFlag<'a>(&'a AtomicBool);

impl Drop for DropFlag<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(current: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(current)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// "bytes 0-299/1000" -> 299
fn range_end(content_range: &str) -> Option<u64> {
    content_range
        .strip_prefix("bytes ")?
        .split('/')
        .next()?
        .split('-')
        .nth(1)?
        .parse()
        .ok()
}

#[async_trait]
impl UploadTransport for MockTransport {
    async fn send(
        &self,
        request: UploadRequest,
        progress: ProgressSender,
    ) -> Result<TransportResponse, UploadError> {
        let (parts, body_len) = match &request.body {
            RequestBody::Raw { slice, .. } => (1, slice.read().await?.len() as u64),
            RequestBody::Multipart { parts, .. } => {
                let mut len = 0;
                for part in parts {
                    len += part.slice.read().await?.len() as u64;
                }
                (parts.len(), len)
            }
        };
        let content_range = request.header("content-range").map(str::to_string);
        self.requests.lock().push(Recorded {
            url: request.url.clone(),
            content_range: content_range.clone(),
            parts,
            body_len,
        });

        let _in_flight = InFlight::enter(&self.in_flight, &self.max_in_flight);

        let key = content_range.clone().unwrap_or_else(|| request.url.clone());
        let block = self.block_on.lock().as_deref() == Some(key.as_str());
        if block {
            let _flag = DropFlag(&self.cancelled);
            self.blocked.notify_one();
            std::future::pending::<()>().await;
        }

        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        let _ = progress.send(ProgressTick::new(body_len, body_len));

        if request.url.ends_with("/fail") {
            return Err(UploadError::transport(
                Some(500),
                "Internal Server Error",
                "boom",
            ));
        }

        if request.url.ends_with("/reject") {
            return Err(UploadError::transport(
                Some(422),
                "Unprocessable Entity",
                r#"{"files":[{"name":"a","error":"too big"},{"name":"b"}]}"#,
            ));
        }

        let mut response = TransportResponse::new(200, "OK", r#"{"ok":true}"#);
        if let Some(end) = content_range.as_deref().and_then(range_end) {
            response = response.with_header("Range", format!("bytes=0-{}", end));
        }
        Ok(response)
    }
}

fn coordinator(transport: &Arc<MockTransport>) -> UploadCoordinator {
    let options = UploadOptions {
        url: "http://uploads.test/ok".to_string(),
        progress_interval_ms: 0,
        ..Default::default()
    };
    UploadCoordinator::new(options, transport.clone())
}

fn file(name: &str, size: usize) -> FileDescriptor {
    FileDescriptor::from_bytes(name, vec![b'x'; size])
}

async fn settle(unit: &WorkUnit) -> WorkUnitState {
    tokio::time::timeout(Duration::from_secs(5), unit.wait())
        .await
        .expect("上传单元未在限定时间内结束")
}

fn drain(rx: &mut tokio::sync::broadcast::Receiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_chunked_upload_sends_sequential_ranges() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);
    let mut rx = coordinator.subscribe();

    let overrides = UploadOverrides {
        max_chunk_size: Some(300),
        ..Default::default()
    };
    let units = coordinator
        .send(vec![file("data.bin", 1000)], &overrides)
        .unwrap();
    assert_eq!(units.len(), 1);

    assert_eq!(settle(&units[0]).await, WorkUnitState::Done);
    assert_eq!(
        transport.content_ranges(),
        vec![
            "bytes 0-299/1000",
            "bytes 300-599/1000",
            "bytes 600-899/1000",
            "bytes 900-999/1000",
        ]
    );
    assert!(transport.requests().iter().all(|r| r.parts == 1));
    assert_eq!(
        transport.requests().iter().map(|r| r.body_len).sum::<u64>(),
        1000
    );
    assert_eq!(units[0].uploaded_bytes(), 1000);
    assert_eq!(units[0].response().status, Some(200));
    assert_eq!(units[0].progress().loaded, 1000);

    let progress = coordinator.progress();
    assert_eq!((progress.loaded, progress.total), (1000, 1000));
    assert_eq!(coordinator.active(), 0);

    let events = drain(&mut rx);
    let chunk_done: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            UploadEvent::ChunkDone { uploaded_bytes, .. } => Some(*uploaded_bytes),
            _ => None,
        })
        .collect();
    assert_eq!(chunk_done, vec![300, 600, 900, 1000]);
}

#[tokio::test]
async fn test_size_limit_splits_into_two_requests() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        single_file_uploads: Some(false),
        limit_multi_file_upload_size: Some(250),
        limit_multi_file_upload_size_overhead: Some(10),
        ..Default::default()
    };
    let units = coordinator
        .add(
            vec![file("a", 100), file("b", 100), file("c", 100)],
            &overrides,
        )
        .unwrap();

    assert_eq!(units.len(), 2);
    assert_eq!(units[0].file_names(), vec!["a", "b"]);
    assert_eq!(units[1].file_names(), vec!["c"]);

    for unit in &units {
        assert!(unit.submit());
    }
    for unit in &units {
        assert_eq!(settle(unit).await, WorkUnitState::Done);
    }

    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let mut parts: Vec<usize> = requests.iter().map(|r| r.parts).collect();
    parts.sort();
    assert_eq!(parts, vec![1, 2]);
}

#[tokio::test]
async fn test_batch_without_limits_sends_one_request() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        single_file_uploads: Some(false),
        ..Default::default()
    };
    let files = (0..5).map(|i| file(&format!("f{}", i), 10)).collect();
    let units = coordinator.send(files, &overrides).unwrap();

    assert_eq!(units.len(), 1);
    assert_eq!(units[0].files().len(), 5);
    assert_eq!(settle(&units[0]).await, WorkUnitState::Done);

    let requests = transport.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].parts, 5);
    assert_eq!(requests[0].body_len, 50);
}

#[tokio::test]
async fn test_abort_mid_chunk_then_resume() {
    let transport = Arc::new(MockTransport::default());
    transport.block_on("bytes 600-899/1000");
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        max_chunk_size: Some(300),
        ..Default::default()
    };
    let data = file("video.mp4", 1000);
    let units = coordinator.send(vec![data.clone()], &overrides).unwrap();
    let unit = &units[0];

    tokio::time::timeout(Duration::from_secs(5), transport.blocked.notified())
        .await
        .expect("第三个分片未发出");
    assert_eq!(unit.uploaded_bytes(), 600);
    assert!(!transport.cancelled.load(Ordering::SeqCst));

    assert!(unit.abort());
    assert_eq!(settle(unit).await, WorkUnitState::Aborted);
    assert!(transport.cancelled.load(Ordering::SeqCst));

    let response = unit.response();
    assert_eq!(response.status_text, "abort");
    assert_eq!(response.error, Some(UploadError::Aborted));
    assert_eq!(unit.uploaded_bytes(), 600);
    assert_eq!(transport.requests().len(), 3);

    // 从已确认的偏移续传
    transport.unblock();
    let resume = UploadOverrides {
        max_chunk_size: Some(300),
        uploaded_bytes: Some(unit.uploaded_bytes()),
        ..Default::default()
    };
    let units = coordinator.send(vec![data], &resume).unwrap();
    assert_eq!(settle(&units[0]).await, WorkUnitState::Done);

    assert_eq!(
        transport.content_ranges()[3..],
        ["bytes 600-899/1000", "bytes 900-999/1000"]
    );
    assert_eq!(units[0].uploaded_bytes(), 1000);
}

#[tokio::test]
async fn test_resume_guard_issues_no_request() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);
    let mut rx = coordinator.subscribe();

    let overrides = UploadOverrides {
        max_chunk_size: Some(300),
        uploaded_bytes: Some(1000),
        ..Default::default()
    };
    let units = coordinator
        .send(vec![file("data.bin", 1000)], &overrides)
        .unwrap();

    assert_eq!(settle(&units[0]).await, WorkUnitState::Failed);
    assert!(transport.requests().is_empty());

    let error = units[0].response().error.unwrap();
    assert_eq!(error.kind(), ErrorKind::Configuration);
    assert!(matches!(
        error,
        UploadError::UploadedBytesExceedsFileSize {
            uploaded: 1000,
            size: 1000,
            ..
        }
    ));

    let names: Vec<&str> = drain(&mut rx).iter().map(|e| e.name()).collect();
    let fail = names.iter().filter(|n| **n == "fail").count();
    let always = names.iter().filter(|n| **n == "always").count();
    assert_eq!((fail, always), (1, 1));
    assert!(!names.contains(&"done"));
}

#[tokio::test]
async fn test_failed_unit_removed_from_global_progress() {
    for (recalculate, expected) in [(true, (100, 100)), (false, (300, 300))] {
        let transport = Arc::new(MockTransport::default());
        let coordinator = coordinator(&transport);

        let good = coordinator
            .add(
                vec![file("good", 100)],
                &UploadOverrides {
                    recalculate_progress: Some(recalculate),
                    ..Default::default()
                },
            )
            .unwrap();
        let bad = coordinator
            .add(
                vec![file("bad", 200)],
                &UploadOverrides {
                    url: Some("http://uploads.test/fail".to_string()),
                    recalculate_progress: Some(recalculate),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(good[0].submit());
        assert!(bad[0].submit());
        assert_eq!(coordinator.progress().total, 300);

        assert_eq!(settle(&good[0]).await, WorkUnitState::Done);
        assert_eq!(settle(&bad[0]).await, WorkUnitState::Failed);

        assert!(transport
            .requests()
            .iter()
            .any(|r| r.url == "http://uploads.test/fail"));
        let response = bad[0].response();
        assert_eq!(response.status, Some(500));
        assert_eq!(response.status_text, "Internal Server Error");
        assert_eq!(response.error.map(|e| e.kind()), Some(ErrorKind::Transport));

        let progress = coordinator.progress();
        assert_eq!((progress.loaded, progress.total), expected);
    }
}

#[tokio::test]
async fn test_add_veto_prevents_auto_submit() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);
    coordinator.add_observer(Arc::new(|event: &UploadEvent| match event {
        UploadEvent::Add { .. } => EventOutcome::PreventDefault,
        _ => EventOutcome::Continue,
    }));

    let overrides = UploadOverrides {
        auto_upload: Some(true),
        ..Default::default()
    };
    let units = coordinator.add(vec![file("a", 10)], &overrides).unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(units[0].state(), WorkUnitState::Pending);
    assert!(transport.requests().is_empty());

    // 阻止的只是自动提交，手动提交仍然有效
    assert!(units[0].submit());
    assert_eq!(settle(&units[0]).await, WorkUnitState::Done);
}

#[tokio::test]
async fn test_submit_veto_keeps_unit_pending() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);
    coordinator.add_observer(Arc::new(|event: &UploadEvent| match event {
        UploadEvent::Submit { .. } => EventOutcome::PreventDefault,
        _ => EventOutcome::Continue,
    }));

    let units = coordinator
        .add(vec![file("a", 10)], &UploadOverrides::default())
        .unwrap();
    assert!(!units[0].submit());
    assert_eq!(units[0].state(), WorkUnitState::Pending);
    assert_eq!(coordinator.active(), 0);
    assert!(transport.requests().is_empty());
}

struct RejectLarge(u64);

#[async_trait]
impl UploadProcessor for RejectLarge {
    async fn process(&self, unit: &WorkUnit) -> Result<(), String> {
        for file in unit.files() {
            if file.size.unwrap_or(0) > self.0 {
                return Err(format!("{} 超过大小限制", file.name));
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_processor_rejection_fails_unit() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);
    coordinator.add_processor(Arc::new(RejectLarge(50)));

    let overrides = UploadOverrides {
        auto_upload: Some(true),
        ..Default::default()
    };
    let units = coordinator
        .add(vec![file("small", 10), file("large", 100)], &overrides)
        .unwrap();
    assert_eq!(units.len(), 2);

    assert_eq!(settle(&units[0]).await, WorkUnitState::Done);
    assert_eq!(settle(&units[1]).await, WorkUnitState::Failed);

    let error = units[1].response().error.unwrap();
    assert_eq!(error.kind(), ErrorKind::Validation);
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(transport.requests()[0].body_len, 10);
}

#[tokio::test]
async fn test_sequential_uploads_one_at_a_time() {
    let transport = Arc::new(MockTransport::with_delay(20));
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        sequential_uploads: Some(true),
        ..Default::default()
    };
    let files = vec![file("first", 1), file("second", 2), file("third", 3)];
    let units = coordinator.send(files, &overrides).unwrap();
    assert_eq!(coordinator.active(), 3);

    for unit in &units {
        assert_eq!(settle(unit).await, WorkUnitState::Done);
    }

    assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    let lens: Vec<u64> = transport.requests().iter().map(|r| r.body_len).collect();
    assert_eq!(lens, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_concurrency_limit_respected() {
    let transport = Arc::new(MockTransport::with_delay(20));
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        limit_concurrent_uploads: Some(2),
        ..Default::default()
    };
    let files = (0..5).map(|i| file(&format!("f{}", i), 10)).collect();
    let units = coordinator.send(files, &overrides).unwrap();

    for unit in &units {
        assert_eq!(settle(unit).await, WorkUnitState::Done);
    }
    assert_eq!(transport.requests().len(), 5);
    assert!(transport.max_in_flight.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_abort_while_queued_sends_nothing() {
    let transport = Arc::new(MockTransport::default());
    transport.block_on("http://uploads.test/ok");
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        sequential_uploads: Some(true),
        ..Default::default()
    };
    let units = coordinator
        .send(vec![file("first", 10), file("second", 10)], &overrides)
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), transport.blocked.notified())
        .await
        .expect("第一个请求未发出");
    assert_eq!(coordinator.sending(), 1);
    assert_eq!(coordinator.active(), 2);

    assert!(units[1].abort());
    assert_eq!(settle(&units[1]).await, WorkUnitState::Aborted);
    assert_eq!(transport.requests().len(), 1);

    assert!(units[0].abort());
    assert_eq!(settle(&units[0]).await, WorkUnitState::Aborted);
    assert_eq!(coordinator.active(), 0);
    assert_eq!(coordinator.sending(), 0);
}

#[tokio::test]
async fn test_lifecycle_event_order() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);
    let mut rx = coordinator.subscribe();

    let units = coordinator
        .add(vec![file("a", 10)], &UploadOverrides::default())
        .unwrap();
    assert!(units[0].submit());
    assert_eq!(settle(&units[0]).await, WorkUnitState::Done);

    let names: Vec<&str> = drain(&mut rx).iter().map(|e| e.name()).collect();
    assert_eq!(&names[..3], ["add", "submit", "start"]);
    assert_eq!(&names[names.len() - 3..], ["done", "always", "stop"]);
    assert!(names.contains(&"progress"));
    assert!(names.contains(&"progressall"));
    assert_eq!(names.iter().filter(|n| **n == "start").count(), 1);
    assert_eq!(names.iter().filter(|n| **n == "stop").count(), 1);
}

#[tokio::test]
async fn test_abort_pending_unit() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);
    let mut rx = coordinator.subscribe();

    let units = coordinator
        .add(vec![file("a", 10)], &UploadOverrides::default())
        .unwrap();
    assert!(units[0].abort());
    assert_eq!(settle(&units[0]).await, WorkUnitState::Aborted);
    assert!(!units[0].submit());
    assert!(!units[0].abort());

    let events = drain(&mut rx);
    let fail = events.iter().find_map(|e| match e {
        UploadEvent::Fail { response, .. } => Some(response.status_text.clone()),
        _ => None,
    });
    assert_eq!(fail.as_deref(), Some("abort"));
    assert_eq!(events.last().map(|e| e.name()), Some("always"));
    assert!(transport.requests().is_empty());

    assert_eq!(coordinator.units().len(), 1);
    assert_eq!(coordinator.clear_finished(), 1);
    assert!(coordinator.units().is_empty());
}

#[tokio::test]
async fn test_disabled_coordinator_rejects_add() {
    let transport = Arc::new(MockTransport::default());
    let options = UploadOptions {
        disabled: true,
        ..Default::default()
    };
    let coordinator = UploadCoordinator::new(options, transport);

    let result = coordinator.add(vec![file("a", 10)], &UploadOverrides::default());
    assert_eq!(result.unwrap_err(), UploadError::Disabled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sequential_order_kept_on_multi_thread_runtime() {
    for _ in 0..20 {
        let transport = Arc::new(MockTransport::default());
        let coordinator = coordinator(&transport);

        let overrides = UploadOverrides {
            sequential_uploads: Some(true),
            ..Default::default()
        };
        // 从另一个任务中派发，派发任务与引擎任务竞争同一工作线程
        let units = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                let files = vec![file("a", 1), file("b", 2), file("c", 3), file("d", 4)];
                coordinator.send(files, &overrides).unwrap()
            })
            .await
            .unwrap()
        };

        for unit in &units {
            assert_eq!(settle(unit).await, WorkUnitState::Done);
        }
        let lens: Vec<u64> = transport.requests().iter().map(|r| r.body_len).collect();
        assert_eq!(lens, vec![1, 2, 3, 4]);
        assert_eq!(transport.max_in_flight.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_auto_upload_keeps_add_order() {
    for _ in 0..20 {
        let transport = Arc::new(MockTransport::default());
        let coordinator = coordinator(&transport);

        let overrides = UploadOverrides {
            auto_upload: Some(true),
            limit_concurrent_uploads: Some(1),
            ..Default::default()
        };
        let files = vec![file("a", 1), file("b", 2), file("c", 3), file("d", 4)];
        let units = coordinator.add(files, &overrides).unwrap();

        for unit in &units {
            assert_eq!(settle(unit).await, WorkUnitState::Done);
        }
        let lens: Vec<u64> = transport.requests().iter().map(|r| r.body_len).collect();
        assert_eq!(lens, vec![1, 2, 3, 4]);
    }
}

#[tokio::test]
async fn test_huge_chunk_size_resumes_in_one_request() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        max_chunk_size: Some(u64::MAX),
        uploaded_bytes: Some(600),
        ..Default::default()
    };
    let units = coordinator.send(vec![file("big", 1000)], &overrides).unwrap();

    assert_eq!(settle(&units[0]).await, WorkUnitState::Done);
    assert_eq!(transport.content_ranges(), vec!["bytes 600-999/1000"]);
    assert_eq!(units[0].uploaded_bytes(), 1000);
}

#[tokio::test]
async fn test_submit_all_and_abort_all() {
    let transport = Arc::new(MockTransport::default());
    transport.block_on("http://uploads.test/ok");
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        sequential_uploads: Some(true),
        ..Default::default()
    };
    let units = coordinator
        .add(vec![file("a", 1), file("b", 2), file("c", 3)], &overrides)
        .unwrap();
    assert!(units[2].abort());
    assert_eq!(settle(&units[2]).await, WorkUnitState::Aborted);

    // 已结束的单元不会再提交
    assert_eq!(coordinator.submit_all(), 2);
    assert_eq!(coordinator.submit_all(), 0);
    assert_eq!(coordinator.active(), 2);

    tokio::time::timeout(Duration::from_secs(5), transport.blocked.notified())
        .await
        .expect("第一个请求未发出");
    assert_eq!(transport.requests()[0].body_len, 1);

    assert_eq!(coordinator.abort_all(), 2);
    assert_eq!(settle(&units[0]).await, WorkUnitState::Aborted);
    assert_eq!(settle(&units[1]).await, WorkUnitState::Aborted);
    assert!(transport.cancelled.load(Ordering::SeqCst));
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(coordinator.active(), 0);
    assert_eq!(coordinator.abort_all(), 0);
}

#[tokio::test]
async fn test_failure_messages_per_file() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        url: Some("http://uploads.test/reject".to_string()),
        single_file_uploads: Some(false),
        ..Default::default()
    };
    let units = coordinator
        .send(vec![file("a", 1), file("b", 2)], &overrides)
        .unwrap();
    assert_eq!(settle(&units[0]).await, WorkUnitState::Failed);

    let response = units[0].response();
    assert_eq!(response.status, Some(422));
    assert_eq!(response.messages, vec!["too big", "Unprocessable Entity"]);
    assert!(response.result.unwrap()["files"].is_array());
}

#[tokio::test]
async fn test_raw_body_sends_every_file() {
    let transport = Arc::new(MockTransport::default());
    let coordinator = coordinator(&transport);

    let overrides = UploadOverrides {
        multipart: Some(false),
        single_file_uploads: Some(false),
        ..Default::default()
    };
    let units = coordinator
        .send(vec![file("a", 1), file("b", 2), file("c", 3)], &overrides)
        .unwrap();
    assert_eq!(units.len(), 3);

    for unit in &units {
        assert_eq!(settle(unit).await, WorkUnitState::Done);
    }
    let mut lens: Vec<u64> = transport.requests().iter().map(|r| r.body_len).collect();
    lens.sort();
    assert_eq!(lens, vec![1, 2, 3]);
}
