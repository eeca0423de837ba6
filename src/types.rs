use clap::ValueEnum;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use url::Url;

/// 镜像新鲜度, 从最新到最旧排序 (Unknown 视为最旧)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    UpToDate,
    OneDayBehind,
    TwoDaysBehind,
    OneWeekBehind,
    Unknown,
}

/// Keyword table for free-text statuses. First match wins.
const STATUS_KEYWORDS: &[(&[&str], Status)] = &[
    (&["up to date", "up-to-date"], Status::UpToDate),
    (&["one day", "one-day"], Status::OneDayBehind),
    (&["two days", "two-days"], Status::TwoDaysBehind),
    (&["one week", "one-week"], Status::OneWeekBehind),
];

impl Status {
    #[cfg(test)]
    pub const ALL: [Status; 5] = [
        Status::UpToDate,
        Status::OneDayBehind,
        Status::TwoDaysBehind,
        Status::OneWeekBehind,
        Status::Unknown,
    ];

    /// Map a raw status label (e.g. Launchpad's "One day behind") to a Status.
    /// Anything unrecognised becomes `Unknown`.
    pub fn from_label(raw: &str) -> Self {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        STATUS_KEYWORDS
            .iter()
            .find(|(keys, _)| keys.iter().any(|k| normalized.contains(k)))
            .map(|(_, status)| *status)
            .unwrap_or(Status::Unknown)
    }

    /// True if `self` is at least as current as `min`.
    pub fn meets(self, min: Status) -> bool {
        self <= min
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::UpToDate => "Up to date",
            Status::OneDayBehind => "One day behind",
            Status::TwoDaysBehind => "Two days behind",
            Status::OneWeekBehind => "One week behind",
            Status::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// 镜像源定义
#[derive(Debug, Clone, PartialEq)]
pub struct Mirror {
    pub url: Url,
    pub organization: String,
    pub status: Status,
    pub bandwidth: String,
    pub launchpad: Option<String>,
    pub latency: Option<Duration>, // None: 所有尝试均失败
}

impl Mirror {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            organization: String::new(),
            status: Status::Unknown,
            bandwidth: String::new(),
            launchpad: None,
            latency: None,
        }
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency.map(|d| d.as_millis() as u64)
    }
}

/// One row of the mirror metadata table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRow {
    /// Mirror URL, or a bare host name
    pub location: String,
    pub organization: String,
    pub status: String,
    pub bandwidth: String,
    pub launchpad: Option<String>,
}

/// 用于 `test --json` 输出
#[derive(Debug, Serialize)]
pub struct MirrorReport<'a> {
    pub rank: usize,
    pub url: &'a str,
    pub organization: &'a str,
    pub status: Status,
    pub bandwidth: &'a str,
    pub latency_ms: Option<u64>,
    pub launchpad: Option<&'a str>,
}

impl<'a> MirrorReport<'a> {
    pub fn new(rank: usize, mirror: &'a Mirror) -> Self {
        Self {
            rank,
            url: mirror.url.as_str(),
            organization: &mirror.organization,
            status: mirror.status,
            bandwidth: &mirror.bandwidth,
            latency_ms: mirror.latency_ms(),
            launchpad: mirror.launchpad.as_deref(),
        }
    }
}
