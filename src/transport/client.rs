// reqwest 传输实现
//
// 请求体按 64KB 分块流式发送，每发出一块上报一次进度。
// 非 2xx 状态码视为失败，响应体作为错误详情。

use super::{ProgressSender, RequestBody, TransportResponse, UploadRequest, UploadTransport};
use crate::config::HttpConfig;
use crate::error::UploadError;
use crate::uploader::progress::ProgressTick;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::Stream;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Method};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 流式发送的块大小
pub const STREAM_BLOCK_SIZE: usize = 64 * 1024;

/// 基于 reqwest 的上传传输层
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// 按 [http] 配置创建
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));

        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }

        let client = builder.build().context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    /// 使用已有的 reqwest 客户端
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// 请求体发送进度计数
#[derive(Clone)]
struct ProgressCounter {
    sent: Arc<AtomicU64>,
    total: u64,
    sender: ProgressSender,
}

impl ProgressCounter {
    fn new(total: u64, sender: ProgressSender) -> Self {
        Self {
            sent: Arc::new(AtomicU64::new(0)),
            total,
            sender,
        }
    }

    /// 分块数据流，每产出一块上报一次进度
    fn stream(
        &self,
        data: Vec<u8>,
    ) -> impl Stream<Item = std::io::Result<Vec<u8>>> + Send + Sync + 'static {
        let counter = self.clone();
        let blocks: Vec<Vec<u8>> = data
            .chunks(STREAM_BLOCK_SIZE)
            .map(|block| block.to_vec())
            .collect();

        futures::stream::iter(blocks.into_iter().map(move |block| {
            let len = block.len() as u64;
            let loaded = counter.sent.fetch_add(len, Ordering::SeqCst) + len;
            // 接收端已关闭（请求被取消）时忽略
            let _ = counter.sender.send(ProgressTick::new(loaded, counter.total));
            Ok(block)
        }))
    }

    fn body(&self, data: Vec<u8>) -> Body {
        Body::wrap_stream(self.stream(data))
    }
}

fn to_transport_error(e: reqwest::Error) -> UploadError {
    let status_text = if e.is_timeout() { "timeout" } else { "error" };
    UploadError::transport(e.status().map(|s| s.as_u16()), status_text, e.to_string())
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send(
        &self,
        request: UploadRequest,
        progress: ProgressSender,
    ) -> Result<TransportResponse, UploadError> {
        let method = Method::from_bytes(request.method.as_bytes()).map_err(|e| {
            UploadError::transport(None, "error", format!("无效的请求方法 {}: {}", request.method, e))
        })?;

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        builder = match request.body {
            RequestBody::Raw {
                slice,
                content_type,
            } => {
                let data = slice.read().await?;
                let len = data.len() as u64;
                let counter = ProgressCounter::new(len, progress);
                builder
                    .header(reqwest::header::CONTENT_TYPE, content_type)
                    .header(reqwest::header::CONTENT_LENGTH, len)
                    .body(counter.body(data))
            }
            RequestBody::Multipart { fields, parts } => {
                let mut contents = Vec::with_capacity(parts.len());
                for part in parts {
                    let data = part.slice.read().await?;
                    contents.push((part, data));
                }
                let total: u64 = contents.iter().map(|(_, data)| data.len() as u64).sum();
                let counter = ProgressCounter::new(total, progress);

                let mut form = Form::new();
                for field in fields {
                    form = form.text(field.name, field.value);
                }
                for (part, data) in contents {
                    let len = data.len() as u64;
                    let file_part = Part::stream_with_length(counter.body(data), len)
                        .file_name(part.file_name)
                        .mime_str(&part.content_type)
                        .map_err(|e| {
                            UploadError::transport(None, "error", format!("无效的 MIME 类型: {}", e))
                        })?;
                    form = form.part(part.field, file_part);
                }
                builder.multipart(form)
            }
        };

        debug!("发送上传请求: {} {}", request.method, request.url);
        let response = builder.send().await.map_err(to_transport_error)?;

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or("").to_string();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(to_transport_error)?;

        if !status.is_success() {
            warn!("上传请求失败: status={}, body={}", status.as_u16(), body);
            return Err(UploadError::transport(Some(status.as_u16()), status_text, body));
        }

        Ok(TransportResponse {
            status: status.as_u16(),
            status_text,
            headers,
            body,
        })
    }
}
