//! 传输层
//!
//! 协调器只依赖 `UploadTransport` trait；取消即丢弃 `send` 返回的 future。
//! 默认实现 `HttpTransport` 基于 reqwest。

mod client;

pub use client::HttpTransport;

use crate::config::FormField;
use crate::error::UploadError;
use crate::uploader::chunk::parse_range_header;
use crate::uploader::file::FileSlice;
use crate::uploader::progress::ProgressTick;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// 进度上报通道
pub type ProgressSender = mpsc::UnboundedSender<ProgressTick>;

/// 上传请求
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub method: String,
    pub url: String,
    /// 请求头（保持插入顺序）
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl UploadRequest {
    /// 按名称查找请求头（不区分大小写）
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 请求体
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// 原始请求体：单个文件或分片的字节
    Raw {
        slice: FileSlice,
        content_type: String,
    },
    /// multipart/form-data
    Multipart {
        fields: Vec<FormField>,
        parts: Vec<FilePart>,
    },
}

/// multipart 中的文件部分
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub content_type: String,
    pub slice: FileSlice,
}

/// 传输层响应
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub status_text: String,
    /// 响应头（名称统一为小写）
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, status_text: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// 添加响应头
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// 服务器通过 Range 头报告的已上传字节数
    pub fn uploaded_bytes(&self) -> Option<u64> {
        self.header("range").and_then(parse_range_header)
    }

    /// 响应体按 JSON 解析，失败时作为字符串返回
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body)
            .unwrap_or_else(|_| serde_json::Value::String(self.body.clone()))
    }
}

/// 上传传输层
///
/// 实现需在发送过程中通过 `progress` 上报进度，失败时返回
/// `UploadError::Transport`（携带状态码、状态文本、错误详情）
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send(
        &self,
        request: UploadRequest,
        progress: ProgressSender,
    ) -> Result<TransportResponse, UploadError>;
}
