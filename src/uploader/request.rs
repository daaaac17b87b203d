// 请求构建
//
// multipart 模式下每个文件作为一个文件字段；原始模式下请求体就是单个文件
// （或分片）的字节，文件名放在 Content-Disposition 头里。

use crate::config::UploadOptions;
use crate::transport::{FilePart, RequestBody, UploadRequest};
use crate::uploader::chunk::UploadChunk;
use crate::uploader::file::FileDescriptor;
use tracing::warn;

/// 请求构建器
#[derive(Debug, Clone, Copy)]
pub struct RequestBuilder<'a> {
    options: &'a UploadOptions,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(options: &'a UploadOptions) -> Self {
        Self { options }
    }

    /// 构建一个请求
    ///
    /// `chunk` 不为空时只发送第一个文件的对应字节范围
    pub fn build(
        &self,
        files: &[FileDescriptor],
        param_names: &[String],
        chunk: Option<&UploadChunk>,
    ) -> UploadRequest {
        let mut headers: Vec<(String, String)> = self
            .options
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.sort();

        if let Some(chunk) = chunk {
            headers.push(("Content-Range".to_string(), chunk.content_range()));
        }

        let body = if self.options.multipart {
            self.multipart_body(files, param_names, chunk)
        } else {
            self.raw_body(files, chunk, &mut headers)
        };

        UploadRequest {
            method: self.options.method.clone(),
            url: self.options.url.clone(),
            headers,
            body,
        }
    }

    fn multipart_body(
        &self,
        files: &[FileDescriptor],
        param_names: &[String],
        chunk: Option<&UploadChunk>,
    ) -> RequestBody {
        let field_for = |index: usize| -> String {
            param_names
                .get(index)
                .or_else(|| param_names.first())
                .cloned()
                .unwrap_or_else(|| "files[]".to_string())
        };

        match (chunk, files.first()) {
            (Some(chunk), Some(file)) => RequestBody::Multipart {
                // 分片请求不附加表单字段
                fields: Vec::new(),
                parts: vec![FilePart {
                    field: field_for(0),
                    file_name: file.form_file_name().to_string(),
                    content_type: file.content_type_or_default().to_string(),
                    slice: file.slice(chunk.range.clone()),
                }],
            },
            _ => RequestBody::Multipart {
                fields: self.options.form_data.clone(),
                parts: files
                    .iter()
                    .enumerate()
                    .map(|(i, file)| FilePart {
                        field: field_for(i),
                        file_name: file.form_file_name().to_string(),
                        content_type: file.content_type_or_default().to_string(),
                        slice: file.whole(),
                    })
                    .collect(),
            },
        }
    }

    fn raw_body(
        &self,
        files: &[FileDescriptor],
        chunk: Option<&UploadChunk>,
        headers: &mut Vec<(String, String)>,
    ) -> RequestBody {
        if files.len() > 1 {
            warn!(
                "原始请求体只能携带一个文件，忽略其余 {} 个文件",
                files.len() - 1
            );
        }

        let Some(file) = files.first() else {
            return RequestBody::Multipart {
                fields: self.options.form_data.clone(),
                parts: Vec::new(),
            };
        };

        headers.push((
            "Content-Disposition".to_string(),
            format!(
                "attachment; filename=\"{}\"",
                urlencoding::encode(file.form_file_name())
            ),
        ));

        let slice = match chunk {
            Some(chunk) => file.slice(chunk.range.clone()),
            None => file.whole(),
        };

        RequestBody::Raw {
            slice,
            content_type: file.content_type_or_default().to_string(),
        }
    }
}
