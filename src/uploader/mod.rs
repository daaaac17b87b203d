// 上传模块
//
// - partition: 文件分组（每组一个上传单元）
// - chunk: 分片游标与 Content-Range / Range 约定
// - request: 请求构建（multipart / 原始请求体）
// - progress: 单元与全局进度、速率计算
// - manager / unit / engine: 协调器、单元句柄、单元上传驱动

pub mod chunk;
mod engine;
pub mod file;
pub mod manager;
pub mod partition;
pub mod progress;
pub mod request;
pub mod scheduler;
pub mod task;
pub mod unit;

pub use chunk::{parse_range_header, ChunkCursor, ChunkPlan, ChunkStep, UploadChunk};
pub use file::{total_size, FileDescriptor, FileSlice, FileSource, DEFAULT_CONTENT_TYPE};
pub use manager::UploadCoordinator;
pub use partition::{partition, FileGroup};
pub use progress::{
    BitrateTimer, Progress, ProgressAggregator, ProgressSettings, ProgressTick, ProgressUpdate,
    ProgressWindow,
};
pub use request::RequestBuilder;
pub use scheduler::{SlotPermit, SlotTicket, UploadSlots};
pub use task::{failure_message, ResponseRecord, WorkUnitState};
pub use unit::{UploadProcessor, WorkUnit};
