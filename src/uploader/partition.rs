// 请求分组
//
// 把一次选择的文件划分为若干请求组，每组对应一个上传单元。
// 规则按优先级依次匹配，第一个适用的规则生效：
// 1. 不限单文件、不限数量、不限大小：所有文件一个请求
// 2. 只限数量：每组最多 limit 个文件
// 3. 限大小（可同时限数量）：贪心累加，文件大小加开销不超过上限
// 4. 其他情况（默认单文件上传）：每个文件一个请求
// 非 multipart 上传总是按单文件处理。

use crate::config::UploadOptions;
use crate::uploader::file::FileDescriptor;
use tracing::debug;

/// 一个请求组：文件及其对应的表单字段名
#[derive(Debug, Clone)]
pub struct FileGroup {
    pub files: Vec<FileDescriptor>,
    pub param_names: Vec<String>,
}

impl FileGroup {
    /// 第 index 个文件的字段名（数组不够长时使用第一个）
    pub fn param_name_for(&self, index: usize) -> &str {
        self.param_names
            .get(index)
            .or_else(|| self.param_names.first())
            .map(String::as_str)
            .unwrap_or("files[]")
    }
}

/// 按选项划分请求组
pub fn partition(files: &[FileDescriptor], options: &UploadOptions) -> Vec<FileGroup> {
    if files.is_empty() {
        return Vec::new();
    }

    // 原始请求体只能携带一个文件
    let single = options.single_file_uploads || !options.multipart;
    let limit = options.file_count_limit();
    let overhead = options.limit_multi_file_upload_size_overhead;
    let param_names = options.param_name.to_vec();

    // 文件大小未知时无法按大小分组，退回按数量或逐个文件上传
    let size_requested = options.file_size_limit().is_some();
    let limit_size = options
        .file_size_limit()
        .filter(|_| files.iter().all(|f| f.size.is_some()));

    let groups = if !(single || limit.is_some() || size_requested) {
        vec![FileGroup {
            files: files.to_vec(),
            param_names,
        }]
    } else if let (false, None, Some(limit)) = (single, limit_size, limit) {
        group_by_count(files, &param_names, limit)
    } else if let (false, Some(limit_size)) = (single, limit_size) {
        group_by_size(files, &param_names, limit_size, overhead, limit)
    } else {
        files
            .iter()
            .enumerate()
            .map(|(i, file)| FileGroup {
                files: vec![file.clone()],
                param_names: vec![param_names
                    .get(i)
                    .or_else(|| param_names.first())
                    .cloned()
                    .unwrap_or_default()],
            })
            .collect()
    };

    debug!(
        "文件分组完成: 文件数={}, 请求数={}",
        files.len(),
        groups.len()
    );
    groups
}

/// 按 [start, end) 截取字段名，为空时使用整个数组
fn slice_param_names(param_names: &[String], start: usize, end: usize) -> Vec<String> {
    let end = end.min(param_names.len());
    if start < end {
        param_names[start..end].to_vec()
    } else {
        param_names.to_vec()
    }
}

fn group_by_count(files: &[FileDescriptor], param_names: &[String], limit: usize) -> Vec<FileGroup> {
    files
        .chunks(limit)
        .enumerate()
        .map(|(n, chunk)| {
            let start = n * limit;
            FileGroup {
                files: chunk.to_vec(),
                param_names: slice_param_names(param_names, start, start + chunk.len()),
            }
        })
        .collect()
}

fn group_by_size(
    files: &[FileDescriptor],
    param_names: &[String],
    limit_size: u64,
    overhead: u64,
    limit: Option<usize>,
) -> Vec<FileGroup> {
    let size_of = |f: &FileDescriptor| f.size.unwrap_or(0);
    let mut groups = Vec::new();
    let mut batch_size = 0u64;
    let mut start = 0usize;

    for i in 0..files.len() {
        batch_size += size_of(&files[i]) + overhead;

        let is_last = i + 1 == files.len();
        let next_overflows =
            !is_last && batch_size + size_of(&files[i + 1]) + overhead > limit_size;
        let count_reached = limit.is_some_and(|limit| i + 1 - start >= limit);

        if is_last || next_overflows || count_reached {
            groups.push(FileGroup {
                files: files[start..=i].to_vec(),
                param_names: slice_param_names(param_names, start, i + 1),
            });
            start = i + 1;
            batch_size = 0;
        }
    }

    groups
}
