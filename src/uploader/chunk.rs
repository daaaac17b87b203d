// 上传分片管理
//
// 分片规则：
// - 只有单文件、大小已知的上传单元才会分片
// - 分片大小小于文件大小，或存在续传偏移时启用分片
// - 分片严格按顺序上传，前一个分片成功后才发出下一个
// - 服务器可通过 Range 响应头报告实际已持久化的偏移

use crate::config::UploadOptions;
use crate::error::UploadError;
use crate::uploader::file::FileDescriptor;
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;
use tracing::debug;

static RANGE_HEADER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^\s*(?:bytes\s*[= ]\s*)?\d*\s*-\s*(\d+)").ok());

/// 上传分片信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadChunk {
    /// 分片索引（从本次上传的第一个分片开始计数）
    pub index: usize,
    /// 字节范围
    pub range: Range<u64>,
    /// 文件总大小
    pub total: u64,
}

impl UploadChunk {
    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }

    /// Content-Range 请求头的值
    pub fn content_range(&self) -> String {
        format!(
            "bytes {}-{}/{}",
            self.range.start,
            self.range.end.saturating_sub(1),
            self.total
        )
    }
}

/// 分片计划
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub file_size: u64,
    pub chunk_size: u64,
    pub uploaded_bytes: u64,
}

impl ChunkPlan {
    /// 判断上传单元是否需要分片
    ///
    /// 单文件、大小已知，并且分片大小小于文件大小或存在续传偏移
    pub fn for_unit(files: &[FileDescriptor], options: &UploadOptions) -> Option<Self> {
        let [file] = files else {
            return None;
        };
        let file_size = file.size?;
        let uploaded_bytes = options.uploaded_bytes;
        let chunk_size = options.chunk_size().unwrap_or(file_size);

        if uploaded_bytes > 0 || chunk_size < file_size {
            Some(Self {
                file_size,
                chunk_size: chunk_size.max(1),
                uploaded_bytes,
            })
        } else {
            None
        }
    }

    /// 从续传偏移开始的所有分片范围
    pub fn ranges(&self) -> Vec<Range<u64>> {
        let mut ranges = Vec::new();
        let mut offset = self.uploaded_bytes;

        while offset < self.file_size {
            let end = std::cmp::min(offset.saturating_add(self.chunk_size), self.file_size);
            ranges.push(offset..end);
            offset = end;
        }

        ranges
    }
}

/// 分片游标
///
/// 记录已被服务器确认的字节数，只增不减，且不超过文件大小
#[derive(Debug, Clone)]
pub struct ChunkCursor {
    plan: ChunkPlan,
    uploaded: u64,
    next_index: usize,
}

/// 分片完成后的下一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStep {
    /// 还有剩余分片
    Continue,
    /// 文件已全部上传
    Complete,
}

impl ChunkCursor {
    pub fn new(plan: ChunkPlan) -> Self {
        Self {
            plan,
            uploaded: plan.uploaded_bytes,
            next_index: 0,
        }
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// 已确认的字节数
    pub fn uploaded(&self) -> u64 {
        self.uploaded
    }

    /// 切出下一个分片
    ///
    /// 游标已达到文件大小时返回错误（续传状态损坏），调用方不得发出请求
    pub fn next_chunk(&mut self, message: &str) -> Result<UploadChunk, UploadError> {
        if self.uploaded >= self.plan.file_size {
            return Err(UploadError::UploadedBytesExceedsFileSize {
                uploaded: self.uploaded,
                size: self.plan.file_size,
                message: message.to_string(),
            });
        }

        let start = self.uploaded;
        let end = std::cmp::min(start.saturating_add(self.plan.chunk_size), self.plan.file_size);
        let chunk = UploadChunk {
            index: self.next_index,
            range: start..end,
            total: self.plan.file_size,
        };
        self.next_index += 1;
        Ok(chunk)
    }

    /// 分片上传成功后推进游标
    ///
    /// `reported` 为服务器 Range 头给出的已上传字节数，缺省时按分片大小推进
    pub fn advance(
        &mut self,
        chunk: &UploadChunk,
        reported: Option<u64>,
    ) -> Result<ChunkStep, UploadError> {
        let next = match reported {
            Some(reported) => {
                if reported <= chunk.range.start {
                    return Err(UploadError::ChunkNotAcknowledged {
                        start: chunk.range.start,
                        end: chunk.range.end.saturating_sub(1),
                        reported,
                    });
                }
                reported.min(self.plan.file_size)
            }
            None => chunk.range.end,
        };

        debug!(
            "分片 #{} 完成: bytes {}, 游标 {} -> {}",
            chunk.index,
            chunk.content_range(),
            self.uploaded,
            next
        );

        self.uploaded = self.uploaded.max(next);

        if self.uploaded < self.plan.file_size {
            Ok(ChunkStep::Continue)
        } else {
            Ok(ChunkStep::Complete)
        }
    }
}

/// 解析 Range 响应头，返回已上传字节数（上界 + 1）
///
/// 支持 `bytes=0-599`、`bytes 0-599/1000`、`0-599` 等形式
pub fn parse_range_header(value: &str) -> Option<u64> {
    RANGE_HEADER
        .as_ref()?
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|upper| upper.saturating_add(1))
}
