//! 上传错误类型
//!
//! 核心层的所有失败都通过 `UploadError` 交付给 fail 事件和响应记录，
//! 不在传输边界之外抛出；应用层（配置、CLI、日志）使用 anyhow。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 中止原因字符串（与传输错误区分）
pub const ABORT_REASON: &str = "abort";

/// 普通错误的状态文本
pub const ERROR_REASON: &str = "error";

/// 错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// 配置错误（如续传偏移超过文件大小），不发出任何请求
    Configuration,
    /// 传输层错误，原样透传
    Transport,
    /// 用户或程序主动中止
    Abort,
    /// 处理钩子拒绝
    Validation,
}

/// 上传错误
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadError {
    /// 续传偏移已达到或超过文件大小
    #[error("{message} (uploaded={uploaded}, size={size})")]
    UploadedBytesExceedsFileSize {
        uploaded: u64,
        size: u64,
        /// 可本地化的提示文本（来自 messages.uploaded_bytes）
        message: String,
    },

    /// 服务器返回的 Range 没有推进游标
    #[error("服务器未确认分片: bytes {start}-{end}, 服务器报告已上传 {reported}")]
    ChunkNotAcknowledged { start: u64, end: u64, reported: u64 },

    /// 传输失败
    #[error("{status_text}: {detail}")]
    Transport {
        status: Option<u16>,
        status_text: String,
        detail: String,
    },

    /// 已中止
    #[error("abort")]
    Aborted,

    /// 处理钩子拒绝了该上传单元
    #[error("上传被拒绝: {reason}")]
    Rejected { reason: String },

    /// 上传器已禁用
    #[error("上传器已禁用")]
    Disabled,

    /// 读取文件内容失败
    #[error("读取文件失败: {message}")]
    Io { message: String },
}

impl UploadError {
    /// 构造传输错误
    pub fn transport(
        status: Option<u16>,
        status_text: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        UploadError::Transport {
            status,
            status_text: status_text.into(),
            detail: detail.into(),
        }
    }

    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            UploadError::UploadedBytesExceedsFileSize { .. } | UploadError::Disabled => {
                ErrorKind::Configuration
            }
            UploadError::ChunkNotAcknowledged { .. }
            | UploadError::Transport { .. }
            | UploadError::Io { .. } => ErrorKind::Transport,
            UploadError::Aborted => ErrorKind::Abort,
            UploadError::Rejected { .. } => ErrorKind::Validation,
        }
    }

    /// 是否为中止
    pub fn is_abort(&self) -> bool {
        matches!(self, UploadError::Aborted)
    }

    /// 状态文本（`"abort"` 或传输层给出的状态文本）
    pub fn reason(&self) -> &str {
        match self {
            UploadError::Aborted => ABORT_REASON,
            UploadError::Transport { status_text, .. } if !status_text.is_empty() => status_text.as_str(),
            _ => ERROR_REASON,
        }
    }

    /// HTTP 状态码（如果有）
    pub fn status(&self) -> Option<u16> {
        match self {
            UploadError::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io {
            message: e.to_string(),
        }
    }
}
