use crate::error::{MirrorError, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::fs;
use tracing::info;

/// 进度条 (stderr 不是终端时自动隐藏)
pub fn progress_bar(len: u64, msg: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("[{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("|| "),
    );
    pb.set_message(msg);
    pb
}

/// 读取配置文本; 非 UTF-8 内容报告为 Encoding 错误
pub async fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).await?;
    String::from_utf8(bytes).map_err(|_| MirrorError::Encoding(path.to_path_buf()))
}

/// 备份文件 (如果存在)
/// 文件名格式: sources.list -> sources.list.bak.TIMESTAMP_MS
pub async fn backup_file(path: &Path) -> Result<Option<PathBuf>> {
    if !fs::try_exists(path).await.unwrap_or(false) {
        return Ok(None);
    }
    let timestamp = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis();
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let backup_path = path.with_file_name(format!("{}.bak.{}", file_name, timestamp));

    fs::copy(path, &backup_path).await?;
    info!(backup = ?backup_path, "backup created");
    Ok(Some(backup_path))
}

/// 恢复到最近的备份, 返回所用的备份路径
pub async fn restore_latest_backup(path: &Path) -> Result<PathBuf> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path.file_name().unwrap_or_default().to_string_lossy();
    let prefix = format!("{}.bak.", file_name);

    if !fs::try_exists(parent).await.unwrap_or(false) {
        return Err(MirrorError::Custom(format!(
            "Directory not found: {:?}",
            parent
        )));
    }

    let mut entries = fs::read_dir(parent).await?;
    let mut latest: Option<(u128, PathBuf)> = None;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(stamp) = name.strip_prefix(&prefix).and_then(|s| s.parse::<u128>().ok()) else {
            continue;
        };
        if latest.as_ref().map_or(true, |(best, _)| stamp >= *best) {
            latest = Some((stamp, entry.path()));
        }
    }

    let (_, backup) = latest
        .ok_or_else(|| MirrorError::Custom(format!("No backup files found for {:?}", path)))?;

    fs::copy(&backup, path).await?;
    info!(from = ?backup, to = ?path, "configuration restored");
    Ok(backup)
}
