// 上传选项
//
// 每次 add 调用时以默认选项为基础，按字段合并调用方覆盖项（覆盖项优先，
// 未设置的字段回退到默认值），合并结果再为每个上传单元各克隆一份。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 表单文件字段名：单个或与文件一一对应的数组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamName {
    Single(String),
    Multiple(Vec<String>),
}

impl ParamName {
    /// 统一为数组形式
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            ParamName::Single(name) => vec![name.clone()],
            ParamName::Multiple(names) if names.is_empty() => vec![default_param_name()],
            ParamName::Multiple(names) => names.clone(),
        }
    }
}

impl Default for ParamName {
    fn default() -> Self {
        ParamName::Single(default_param_name())
    }
}

fn default_param_name() -> String {
    "files[]".to_string()
}

/// 附加表单字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub name: String,
    pub value: String,
}

impl FormField {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// 提示文本（本地化出口）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadMessages {
    /// 续传偏移超过文件大小
    #[serde(default = "default_uploaded_bytes_message")]
    pub uploaded_bytes: String,
}

fn default_uploaded_bytes_message() -> String {
    "Uploaded bytes exceed file size".to_string()
}

impl Default for UploadMessages {
    fn default() -> Self {
        Self {
            uploaded_bytes: default_uploaded_bytes_message(),
        }
    }
}

/// 上传选项
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptions {
    /// 上传地址
    pub url: String,
    /// 请求方法
    pub method: String,
    /// 附加请求头
    pub headers: HashMap<String, String>,
    /// 文件字段名
    pub param_name: ParamName,
    /// 每个文件单独一个请求
    pub single_file_uploads: bool,
    /// 单个请求最多文件数
    pub limit_multi_file_uploads: Option<usize>,
    /// 单个请求最大字节数
    pub limit_multi_file_upload_size: Option<u64>,
    /// 每个文件在 multipart 中的额外开销（字节）
    pub limit_multi_file_upload_size_overhead: u64,
    /// 顺序上传（同一时刻只有一个请求）
    pub sequential_uploads: bool,
    /// 最大并发请求数
    pub limit_concurrent_uploads: Option<usize>,
    /// multipart/form-data 还是原始请求体
    pub multipart: bool,
    /// 分片大小，设置后大文件按字节范围分片上传
    pub max_chunk_size: Option<u64>,
    /// 续传偏移（已上传字节数）
    pub uploaded_bytes: u64,
    /// 失败的上传是否从全局进度中扣除
    pub recalculate_progress: bool,
    /// 进度事件最小间隔（毫秒）
    pub progress_interval_ms: u64,
    /// 速率计算最小间隔（毫秒）
    pub bitrate_interval_ms: u64,
    /// add 后自动提交
    pub auto_upload: bool,
    /// 附加表单字段（仅非分片 multipart 请求）
    pub form_data: Vec<FormField>,
    /// 禁用上传器
    pub disabled: bool,
    /// 提示文本
    pub messages: UploadMessages,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/upload".to_string(),
            method: "POST".to_string(),
            headers: HashMap::new(),
            param_name: ParamName::default(),
            single_file_uploads: true,
            limit_multi_file_uploads: None,
            limit_multi_file_upload_size: None,
            limit_multi_file_upload_size_overhead: 512,
            sequential_uploads: false,
            limit_concurrent_uploads: None,
            multipart: true,
            max_chunk_size: None,
            uploaded_bytes: 0,
            recalculate_progress: true,
            progress_interval_ms: 100,
            bitrate_interval_ms: 500,
            auto_upload: false,
            form_data: Vec::new(),
            disabled: false,
            messages: UploadMessages::default(),
        }
    }
}

impl UploadOptions {
    /// 合并覆盖项，返回新的选项
    pub fn merged(&self, overrides: &UploadOverrides) -> UploadOptions {
        let mut merged = self.clone();
        overrides.apply_to(&mut merged);
        merged
    }

    /// 有效的单请求文件数上限（0 视为未设置）
    pub fn file_count_limit(&self) -> Option<usize> {
        self.limit_multi_file_uploads.filter(|n| *n > 0)
    }

    /// 有效的单请求字节上限（0 视为未设置）
    pub fn file_size_limit(&self) -> Option<u64> {
        self.limit_multi_file_upload_size.filter(|n| *n > 0)
    }

    /// 有效的分片大小（0 视为未设置）
    pub fn chunk_size(&self) -> Option<u64> {
        self.max_chunk_size.filter(|n| *n > 0)
    }

    /// 并发请求上限：顺序上传为 1，未限制为 None
    pub fn concurrency_limit(&self) -> Option<usize> {
        if self.sequential_uploads {
            Some(1)
        } else {
            self.limit_concurrent_uploads.filter(|n| *n > 0)
        }
    }

    /// 校验选项
    pub fn validate(&self) -> Result<(), String> {
        if self.url.trim().is_empty() {
            return Err("上传地址不能为空".to_string());
        }
        if self.method.trim().is_empty() {
            return Err("请求方法不能为空".to_string());
        }
        if self.max_chunk_size == Some(0) {
            return Err("分片大小必须大于 0".to_string());
        }
        if self.limit_concurrent_uploads == Some(0) {
            return Err("最大并发上传数必须大于 0".to_string());
        }
        Ok(())
    }
}

/// 单次调用的选项覆盖项
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOverrides {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub param_name: Option<ParamName>,
    pub single_file_uploads: Option<bool>,
    pub limit_multi_file_uploads: Option<usize>,
    pub limit_multi_file_upload_size: Option<u64>,
    pub limit_multi_file_upload_size_overhead: Option<u64>,
    pub sequential_uploads: Option<bool>,
    pub limit_concurrent_uploads: Option<usize>,
    pub multipart: Option<bool>,
    pub max_chunk_size: Option<u64>,
    pub uploaded_bytes: Option<u64>,
    pub recalculate_progress: Option<bool>,
    pub progress_interval_ms: Option<u64>,
    pub bitrate_interval_ms: Option<u64>,
    pub auto_upload: Option<bool>,
    pub form_data: Option<Vec<FormField>>,
    pub messages: Option<UploadMessages>,
}

impl UploadOverrides {
    fn apply_to(&self, o: &mut UploadOptions) {
        if let Some(v) = &self.url {
            o.url = v.clone();
        }
        if let Some(v) = &self.method {
            o.method = v.clone();
        }
        if let Some(v) = &self.headers {
            o.headers = v.clone();
        }
        if let Some(v) = &self.param_name {
            o.param_name = v.clone();
        }
        if let Some(v) = self.single_file_uploads {
            o.single_file_uploads = v;
        }
        if let Some(v) = self.limit_multi_file_uploads {
            o.limit_multi_file_uploads = Some(v);
        }
        if let Some(v) = self.limit_multi_file_upload_size {
            o.limit_multi_file_upload_size = Some(v);
        }
        if let Some(v) = self.limit_multi_file_upload_size_overhead {
            o.limit_multi_file_upload_size_overhead = v;
        }
        if let Some(v) = self.sequential_uploads {
            o.sequential_uploads = v;
        }
        if let Some(v) = self.limit_concurrent_uploads {
            o.limit_concurrent_uploads = Some(v);
        }
        if let Some(v) = self.multipart {
            o.multipart = v;
        }
        if let Some(v) = self.max_chunk_size {
            o.max_chunk_size = Some(v);
        }
        if let Some(v) = self.uploaded_bytes {
            o.uploaded_bytes = v;
        }
        if let Some(v) = self.recalculate_progress {
            o.recalculate_progress = v;
        }
        if let Some(v) = self.progress_interval_ms {
            o.progress_interval_ms = v;
        }
        if let Some(v) = self.bitrate_interval_ms {
            o.bitrate_interval_ms = v;
        }
        if let Some(v) = self.auto_upload {
            o.auto_upload = v;
        }
        if let Some(v) = &self.form_data {
            o.form_data = v.clone();
        }
        if let Some(v) = &self.messages {
            o.messages = v.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = UploadOptions::default();
        assert!(options.single_file_uploads);
        assert!(options.multipart);
        assert!(options.recalculate_progress);
        assert!(!options.auto_upload);
        assert_eq!(options.limit_multi_file_upload_size_overhead, 512);
        assert_eq!(options.progress_interval_ms, 100);
        assert_eq!(options.bitrate_interval_ms, 500);
        assert_eq!(options.param_name.to_vec(), vec!["files[]".to_string()]);
        assert_eq!(options.concurrency_limit(), None);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_merge_override_wins() {
        let base = UploadOptions::default();
        let overrides = UploadOverrides {
            single_file_uploads: Some(false),
            max_chunk_size: Some(300),
            uploaded_bytes: Some(600),
            ..Default::default()
        };

        let merged = base.merged(&overrides);
        assert!(!merged.single_file_uploads);
        assert_eq!(merged.chunk_size(), Some(300));
        assert_eq!(merged.uploaded_bytes, 600);
        // 未设置的字段回退到默认值
        assert_eq!(merged.url, base.url);
        assert!(merged.multipart);
        // 原选项不受影响
        assert_eq!(base.uploaded_bytes, 0);
    }

    #[test]
    fn test_zero_limits_count_as_unset() {
        let options = UploadOptions {
            limit_multi_file_uploads: Some(0),
            limit_multi_file_upload_size: Some(0),
            max_chunk_size: None,
            ..Default::default()
        };
        assert_eq!(options.file_count_limit(), None);
        assert_eq!(options.file_size_limit(), None);
        assert_eq!(options.chunk_size(), None);
    }

    #[test]
    fn test_concurrency_limit() {
        let options = UploadOptions {
            sequential_uploads: true,
            limit_concurrent_uploads: Some(4),
            ..Default::default()
        };
        assert_eq!(options.concurrency_limit(), Some(1));

        let options = UploadOptions {
            limit_concurrent_uploads: Some(4),
            ..Default::default()
        };
        assert_eq!(options.concurrency_limit(), Some(4));
    }

    #[test]
    fn test_validate() {
        let options = UploadOptions {
            max_chunk_size: Some(0),
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = UploadOptions {
            url: " ".to_string(),
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_param_name_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            upload: UploadOptions,
        }

        let w: Wrapper = toml::from_str(
            r#"
            [upload]
            param_name = ["first", "second"]
            single_file_uploads = false
            "#,
        )
        .unwrap();
        assert_eq!(
            w.upload.param_name,
            ParamName::Multiple(vec!["first".to_string(), "second".to_string()])
        );
        assert!(!w.upload.single_file_uploads);
        assert_eq!(w.upload.method, "POST");
    }
}
