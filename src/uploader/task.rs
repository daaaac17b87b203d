// 上传单元状态与响应记录

use crate::error::UploadError;
use serde::{Deserialize, Serialize};

/// 上传单元状态
///
/// Pending → Processing（可选）→ Sending → Done | Failed | Aborted
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum WorkUnitState {
    /// 等待提交
    Pending,
    /// 处理钩子执行中
    Processing,
    /// 已提交，排队或发送中
    Sending,
    /// 已完成
    Done,
    /// 失败
    Failed,
    /// 已中止
    Aborted,
}

impl WorkUnitState {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkUnitState::Done | WorkUnitState::Failed | WorkUnitState::Aborted
        )
    }

    /// 检查状态转换是否合法
    pub fn can_transition_to(&self, next: WorkUnitState) -> bool {
        use WorkUnitState::*;

        match (self, next) {
            (Pending, Processing) | (Processing, Pending) => true,
            (Pending, Sending) => true,
            // 未发送前也可以失败或被中止
            (Pending | Processing, Failed | Aborted) => true,
            (Sending, Done | Failed | Aborted) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkUnitState::Pending => "pending",
            WorkUnitState::Processing => "processing",
            WorkUnitState::Sending => "sending",
            WorkUnitState::Done => "done",
            WorkUnitState::Failed => "failed",
            WorkUnitState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for WorkUnitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 响应记录
///
/// 成功时保存服务器结果，失败时保留最后一次错误，供事后查看
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    /// 服务器返回的结果（JSON 解析失败时为字符串）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// HTTP 状态码
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// 状态文本（"success" / "error" / "abort" 或服务器原因短语）
    pub status_text: String,
    /// 错误详情
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<UploadError>,
    /// 每个文件的失败提示
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

/// 提取某个文件的失败提示
///
/// 服务器返回 JSON 时依次取 `error`、`files[index].error`，
/// 其次是状态文本，最后回退到通用提示
pub fn failure_message(error: &UploadError, index: usize) -> String {
    let UploadError::Transport {
        status_text, detail, ..
    } = error
    else {
        return error.to_string();
    };

    let status_text = status_text.trim();
    match serde_json::from_str::<serde_json::Value>(detail) {
        Ok(body) if body.is_object() => remote_error(&body, index)
            .or_else(|| (!status_text.is_empty()).then(|| status_text.to_string()))
            .unwrap_or_else(|| "Unknown remote error".to_string()),
        _ if !status_text.is_empty() => status_text.to_string(),
        _ if !detail.trim().is_empty() => detail.trim().to_string(),
        _ => "Unknown error".to_string(),
    }
}

fn remote_error(body: &serde_json::Value, index: usize) -> Option<String> {
    let text = |value: &serde_json::Value| match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Object(map) => map
            .get("message")
            .and_then(|m| m.as_str())
            .filter(|m| !m.is_empty())
            .map(str::to_string),
        _ => None,
    };

    body.get("error").and_then(text).or_else(|| {
        body.get("files")
            .and_then(|files| files.get(index))
            .and_then(|file| file.get("error"))
            .and_then(text)
    })
}

impl ResponseRecord {
    pub fn success(result: serde_json::Value, status: u16, status_text: impl Into<String>) -> Self {
        Self {
            result: Some(result),
            status: Some(status),
            status_text: status_text.into(),
            error: None,
            messages: Vec::new(),
        }
    }

    /// 失败记录，`files` 为单元内文件数
    pub fn failure(error: UploadError, files: usize) -> Self {
        let messages = (0..files).map(|i| failure_message(&error, i)).collect();
        let result = match &error {
            UploadError::Transport { detail, .. } => serde_json::from_str(detail).ok(),
            _ => None,
        };
        Self {
            result,
            status: error.status(),
            status_text: error.reason().to_string(),
            error: Some(error),
            messages,
        }
    }
}
