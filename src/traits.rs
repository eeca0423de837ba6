use async_trait::async_trait;
use crate::error::Result;
use crate::types::{MetadataRow, Mirror, Status};
use std::time::Duration;
use url::Url;

/// UrlFeed: 候选镜像 URL 列表的来源 (每行一个 URL)
#[async_trait]
pub trait UrlFeed: Sync + Send {
    /// 来源名称 (用于日志显示)
    fn name(&self) -> &str;

    /// 获取原始行, 由 catalog 负责清洗
    async fn mirror_lines(&self) -> Result<Vec<String>>;
}

/// MetadataFeed: 镜像元数据表 (组织, 状态, 带宽) 的来源
#[async_trait]
pub trait MetadataFeed: Sync + Send {
    fn name(&self) -> &str;

    async fn metadata(&self) -> Result<Vec<MetadataRow>>;
}

/// Prober: 单个镜像的延迟探测
#[async_trait]
pub trait Prober: Sync + Send {
    /// 返回最佳延迟; 不可达时返回 None (不是错误)
    async fn probe(&self, url: &Url) -> Option<Duration>;
}

/// ReleaseStatus: 按发行版代号与架构查询单个镜像的状态
#[async_trait]
pub trait ReleaseStatus: Sync + Send {
    /// Ok(None): 页面中没有对应的发行版/架构行
    async fn release_status(&self, mirror: &Mirror) -> Result<Option<Status>>;
}
