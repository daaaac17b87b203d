use anyhow::{Context, Result};
use batch_uploader::{
    args::Cli, logging, AppConfig, FileDescriptor, HttpTransport, UploadCoordinator, UploadEvent,
    WorkUnitState,
};
use clap::Parser;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_or_default(&cli.config).await;
    let _log_guard = logging::init_logging(&config.log);

    info!("batch-uploader v{} 启动", env!("CARGO_PKG_VERSION"));

    let mut files = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        let file = FileDescriptor::from_path(path)
            .await
            .with_context(|| format!("无法读取文件: {:?}", path))?;
        files.push(file);
    }

    let transport = Arc::new(HttpTransport::new(&config.http)?);
    let coordinator = UploadCoordinator::new(config.upload.clone(), transport);

    // 进度输出
    let mut events = coordinator.subscribe();
    let reporter = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(UploadEvent::ProgressAll { progress }) => {
                    info!(
                        "总进度: {:.1}% ({}/{} bytes, {:.2} MB/s)",
                        progress.percentage(),
                        progress.loaded,
                        progress.total,
                        progress.bitrate as f64 / 8.0 / 1024.0 / 1024.0
                    );
                }
                Ok(UploadEvent::ChunkDone {
                    content_range,
                    uploaded_bytes,
                    ..
                }) => {
                    info!("分片完成: {}, 已确认 {} bytes", content_range, uploaded_bytes);
                }
                Ok(UploadEvent::Fail { unit_id, response }) => {
                    error!("上传失败: {} ({})", unit_id, response.status_text);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!("进度事件积压，跳过 {} 条", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let units = coordinator.add(files, &cli.overrides())?;
    coordinator.submit_all();

    // Ctrl+C 中止所有上传
    let interrupt = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，中止所有上传");
                let aborted = coordinator.abort_all();
                info!("已中止 {} 个上传单元", aborted);
            }
        })
    };

    let mut failed = 0;
    for unit in &units {
        match unit.wait().await {
            WorkUnitState::Done => {
                info!("✓ {:?} 上传完成", unit.file_names());
            }
            WorkUnitState::Aborted => {
                failed += 1;
                warn!(
                    "{:?} 已中止，可使用 --uploaded-bytes {} 续传",
                    unit.file_names(),
                    unit.uploaded_bytes()
                );
            }
            state => {
                failed += 1;
                error!(
                    "{:?} 上传失败: state={}, error={:?}",
                    unit.file_names(),
                    state,
                    unit.response().error
                );
            }
        }
    }

    interrupt.abort();
    reporter.abort();

    if failed > 0 {
        anyhow::bail!("{} 个上传单元未完成", failed);
    }

    info!("全部上传完成");
    Ok(())
}
