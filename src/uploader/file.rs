// 待上传文件描述
//
// 文件一经选中即不可变；内容来源可以是内存缓冲区或本地文件，
// 分片上传时按字节范围读取。

use crate::error::UploadError;
use serde::Serialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 默认 MIME 类型
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 文件内容来源
#[derive(Debug, Clone)]
pub enum FileSource {
    /// 内存数据
    Memory(Arc<Vec<u8>>),
    /// 本地文件
    Path(PathBuf),
}

/// 文件描述
#[derive(Debug, Clone, Serialize)]
pub struct FileDescriptor {
    /// 文件名
    pub name: String,
    /// 文件大小（未知时为 None）
    pub size: Option<u64>,
    /// MIME 类型（空字符串表示未知）
    pub content_type: String,
    /// 上传时使用的文件名（覆盖 name）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_name: Option<String>,
    /// 内容来源
    #[serde(skip)]
    pub source: FileSource,
}

impl FileDescriptor {
    /// 从内存数据创建
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: Some(data.len() as u64),
            content_type: String::new(),
            upload_name: None,
            source: FileSource::Memory(Arc::new(data)),
        }
    }

    /// 从本地文件创建（读取元数据获取大小）
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        Ok(Self {
            name,
            size: Some(metadata.len()),
            content_type: String::new(),
            upload_name: None,
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// 设置 MIME 类型
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// 设置上传文件名
    pub fn with_upload_name(mut self, upload_name: impl Into<String>) -> Self {
        self.upload_name = Some(upload_name.into());
        self
    }

    /// 将大小标记为未知（来源是流式输入时）
    pub fn with_unknown_size(mut self) -> Self {
        self.size = None;
        self
    }

    /// 表单中使用的文件名
    pub fn form_file_name(&self) -> &str {
        self.upload_name.as_deref().unwrap_or(&self.name)
    }

    /// 请求使用的 MIME 类型
    pub fn content_type_or_default(&self) -> &str {
        if self.content_type.is_empty() {
            DEFAULT_CONTENT_TYPE
        } else {
            &self.content_type
        }
    }

    /// 整个文件的切片
    pub fn whole(&self) -> FileSlice {
        FileSlice {
            source: self.source.clone(),
            range: None,
        }
    }

    /// 指定字节范围的切片
    pub fn slice(&self, range: Range<u64>) -> FileSlice {
        FileSlice {
            source: self.source.clone(),
            range: Some(range),
        }
    }
}

/// 计算一组文件的总字节数（未知大小按 1 字节计）
pub fn total_size(files: &[FileDescriptor]) -> u64 {
    files.iter().map(|f| f.size.unwrap_or(1).max(1)).sum()
}

/// 文件内容切片，请求体在发送时才读取
#[derive(Debug, Clone)]
pub struct FileSlice {
    source: FileSource,
    range: Option<Range<u64>>,
}

impl FileSlice {
    /// 字节范围（整个文件时为 None）
    pub fn range(&self) -> Option<&Range<u64>> {
        self.range.as_ref()
    }

    /// 读取切片数据
    pub async fn read(&self) -> Result<Vec<u8>, UploadError> {
        match &self.source {
            FileSource::Memory(data) => {
                let len = data.len() as u64;
                let (start, end) = match &self.range {
                    Some(r) => (r.start.min(len), r.end.min(len)),
                    None => (0, len),
                };
                Ok(data[start as usize..end as usize].to_vec())
            }
            FileSource::Path(path) => {
                let mut file = File::open(path).await?;
                match &self.range {
                    Some(range) => {
                        // 定位到切片起始位置
                        file.seek(std::io::SeekFrom::Start(range.start)).await?;
                        let mut buffer = vec![0u8; (range.end - range.start) as usize];
                        file.read_exact(&mut buffer).await?;
                        debug!(
                            "读取切片: {:?}, bytes={}-{}, 大小={} bytes",
                            path,
                            range.start,
                            range.end.saturating_sub(1),
                            buffer.len()
                        );
                        Ok(buffer)
                    }
                    None => {
                        let mut buffer = Vec::new();
                        file.read_to_end(&mut buffer).await?;
                        Ok(buffer)
                    }
                }
            }
        }
    }
}
