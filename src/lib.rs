// 批量分片上传库
// 文件分组、分片续传、进度聚合与上传协调

// 命令行参数
pub mod args;

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 上传事件
pub mod events;

// 日志系统
pub mod logging;

// 传输层
pub mod transport;

// 上传核心模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, UploadOptions, UploadOverrides};
pub use error::{ErrorKind, UploadError};
pub use events::{EventOutcome, UploadEvent, UploadObserver};
pub use transport::{HttpTransport, UploadTransport};
pub use uploader::{
    FileDescriptor, Progress, UploadCoordinator, UploadProcessor, WorkUnit, WorkUnitState,
};
