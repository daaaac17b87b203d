use crate::config::{UploadOverrides, DEFAULT_CONFIG_PATH};
use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

/// 解析支持单位 (kb, mb, gb) 的字符串为字节数 (u64)
pub fn parse_size(s: &str) -> Result<u64> {
    let s_lower = s.to_lowercase();

    let (num_str, multiplier): (&str, u64) = if let Some(stripped) = s_lower.strip_suffix("gb") {
        (stripped.trim(), 1024 * 1024 * 1024)
    } else if let Some(stripped) = s_lower.strip_suffix("mb") {
        (stripped.trim(), 1024 * 1024)
    } else if let Some(stripped) = s_lower.strip_suffix("kb") {
        (stripped.trim(), 1024)
    } else {
        (s_lower.as_str(), 1)
    };

    let num = num_str
        .trim()
        .parse::<u64>()
        .map_err(|_| anyhow!("无效的数字部分: '{}'", num_str))?;

    num.checked_mul(multiplier)
        .ok_or_else(|| anyhow!("计算出的数值太大，导致溢出 (超过 u64::MAX)"))
}

#[derive(Parser, Debug)]
#[command(author, version, about = "批量分片上传文件", long_about = None)]
pub struct Cli {
    /// 配置文件路径
    #[arg(long, short = 'c', default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,

    /// 上传地址（覆盖配置）
    #[arg(long, short = 'u')]
    pub url: Option<String>,

    /// 分片大小，如 512kb、8mb
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub chunk_size: Option<u64>,

    /// 续传偏移（已上传字节数）
    #[arg(long, value_name = "BYTES")]
    pub uploaded_bytes: Option<u64>,

    /// 多个文件合并到一个请求
    #[arg(long)]
    pub batch: bool,

    /// 顺序上传
    #[arg(long)]
    pub sequential: bool,

    /// 使用原始请求体而不是 multipart
    #[arg(long)]
    pub raw: bool,

    /// 待上传的文件
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

impl Cli {
    /// 命令行参数转换为选项覆盖项
    pub fn overrides(&self) -> UploadOverrides {
        UploadOverrides {
            url: self.url.clone(),
            max_chunk_size: self.chunk_size,
            uploaded_bytes: self.uploaded_bytes,
            single_file_uploads: self.batch.then_some(false),
            sequential_uploads: self.sequential.then_some(true),
            multipart: self.raw.then_some(false),
            // 添加后由 submit_all 统一提交
            auto_upload: Some(false),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("300").unwrap(), 300);
        assert_eq!(parse_size("512kb").unwrap(), 512 * 1024);
        assert_eq!(parse_size("8MB").unwrap(), 8 * 1024 * 1024);
        assert_eq!(parse_size("1 gb").unwrap(), 1024 * 1024 * 1024);
        assert!(parse_size("abc").is_err());
        assert!(parse_size("99999999999gb").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "batch-uploader",
            "--url",
            "http://localhost:9000/up",
            "--chunk-size",
            "1mb",
            "--batch",
            "a.bin",
            "b.bin",
        ]);
        assert_eq!(cli.config, DEFAULT_CONFIG_PATH);
        assert_eq!(cli.files.len(), 2);

        let overrides = cli.overrides();
        assert_eq!(overrides.url.as_deref(), Some("http://localhost:9000/up"));
        assert_eq!(overrides.max_chunk_size, Some(1024 * 1024));
        assert_eq!(overrides.single_file_uploads, Some(false));
        assert_eq!(overrides.sequential_uploads, None);
        assert_eq!(overrides.multipart, None);
        assert_eq!(overrides.auto_upload, Some(false));
    }

    #[test]
    fn test_files_required() {
        assert!(Cli::try_parse_from(["batch-uploader"]).is_err());
    }
}
