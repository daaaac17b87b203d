//! 上传事件类型定义

use crate::error::UploadError;
use crate::uploader::progress::Progress;
use crate::uploader::task::{ResponseRecord, WorkUnitState};
use serde::{Deserialize, Serialize};

/// 上传事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 上传单元创建（可阻止自动提交）
    Add {
        unit_id: String,
        files: Vec<String>,
        param_names: Vec<String>,
    },
    /// 上传单元提交（可阻止发送）
    Submit { unit_id: String },
    /// 活跃单元数从 0 变为 1
    Start,
    /// 活跃单元数回到 0
    Stop,
    /// 单元进度
    Progress { unit_id: String, progress: Progress },
    /// 全局进度
    ProgressAll { progress: Progress },
    /// 分片请求发出
    ChunkSend {
        unit_id: String,
        index: usize,
        content_range: String,
    },
    /// 分片请求成功
    ChunkDone {
        unit_id: String,
        index: usize,
        content_range: String,
        uploaded_bytes: u64,
    },
    /// 分片请求失败
    ChunkFail {
        unit_id: String,
        index: usize,
        content_range: String,
        error: UploadError,
    },
    /// 单元上传成功
    Done {
        unit_id: String,
        response: ResponseRecord,
    },
    /// 单元失败或中止
    Fail {
        unit_id: String,
        response: ResponseRecord,
    },
    /// 单元结束（成功或失败之后）
    Always {
        unit_id: String,
        state: WorkUnitState,
    },
}

impl UploadEvent {
    /// 事件名称
    pub fn name(&self) -> &'static str {
        match self {
            UploadEvent::Add { .. } => "add",
            UploadEvent::Submit { .. } => "submit",
            UploadEvent::Start => "start",
            UploadEvent::Stop => "stop",
            UploadEvent::Progress { .. } => "progress",
            UploadEvent::ProgressAll { .. } => "progressall",
            UploadEvent::ChunkSend { .. } => "chunksend",
            UploadEvent::ChunkDone { .. } => "chunkdone",
            UploadEvent::ChunkFail { .. } => "chunkfail",
            UploadEvent::Done { .. } => "done",
            UploadEvent::Fail { .. } => "fail",
            UploadEvent::Always { .. } => "always",
        }
    }

    /// 关联的上传单元 ID
    pub fn unit_id(&self) -> Option<&str> {
        match self {
            UploadEvent::Add { unit_id, .. }
            | UploadEvent::Submit { unit_id }
            | UploadEvent::Progress { unit_id, .. }
            | UploadEvent::ChunkSend { unit_id, .. }
            | UploadEvent::ChunkDone { unit_id, .. }
            | UploadEvent::ChunkFail { unit_id, .. }
            | UploadEvent::Done { unit_id, .. }
            | UploadEvent::Fail { unit_id, .. }
            | UploadEvent::Always { unit_id, .. } => Some(unit_id),
            UploadEvent::Start | UploadEvent::Stop | UploadEvent::ProgressAll { .. } => None,
        }
    }

    /// 观察者是否可以阻止默认行为
    pub fn is_vetoable(&self) -> bool {
        matches!(self, UploadEvent::Add { .. } | UploadEvent::Submit { .. })
    }
}
