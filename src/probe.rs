use crate::traits::Prober;
use crate::types::Mirror;
use crate::utils;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};
use url::Url;

/// 每个镜像的连接尝试次数
pub const ATTEMPTS: usize = 3;

/// 连通性检测固定使用 80 端口 (http 与 ftp 镜像相同)
const PROBE_PORT: u16 = 80;

/// 建立一次连接; 成功后立即关闭
#[async_trait]
pub trait Connector: Sync + Send {
    async fn connect(&self, addr: SocketAddr) -> io::Result<()>;
}

pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        let stream = TcpStream::connect(addr).await?;
        drop(stream);
        Ok(())
    }
}

/// TCP 建连测速: 只建立连接, 不发送任何数据
pub struct TcpProber<C: Connector = TcpConnector> {
    attempts: usize,
    timeout: Duration,
    port: u16,
    connector: C,
}

impl TcpProber {
    pub fn new(timeout: Duration) -> Self {
        Self {
            attempts: ATTEMPTS,
            timeout,
            port: PROBE_PORT,
            connector: TcpConnector,
        }
    }

    #[cfg(test)]
    pub fn with_port(timeout: Duration, port: u16) -> Self {
        Self {
            port,
            ..Self::new(timeout)
        }
    }
}

impl<C: Connector> TcpProber<C> {
    #[cfg(test)]
    pub fn with_connector(timeout: Duration, connector: C) -> Self {
        Self {
            attempts: ATTEMPTS,
            timeout,
            port: PROBE_PORT,
            connector,
        }
    }

    /// Prefer an IPv4 address; many mirrors have no working IPv6 route.
    async fn resolve(&self, host: &str) -> Option<SocketAddr> {
        match timeout(self.timeout, tokio::net::lookup_host((host, self.port))).await {
            Ok(Ok(addrs)) => pick_address(addrs),
            Ok(Err(e)) => {
                debug!(host, error = %e, "resolution failed");
                None
            }
            Err(_) => {
                debug!(host, "resolution timed out");
                None
            }
        }
    }

    async fn connect_once(&self, addr: SocketAddr) -> Option<Duration> {
        let start = Instant::now();
        match timeout(self.timeout, self.connector.connect(addr)).await {
            Ok(Ok(())) => Some(start.elapsed()),
            Ok(Err(e)) => {
                debug!(%addr, error = %e, "connection failed");
                None
            }
            Err(_) => {
                debug!(%addr, "connection timed out");
                None
            }
        }
    }
}

fn pick_address(addrs: impl IntoIterator<Item = SocketAddr>) -> Option<SocketAddr> {
    let addrs: Vec<SocketAddr> = addrs.into_iter().collect();
    addrs
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
}

#[async_trait]
impl<C: Connector> Prober for TcpProber<C> {
    async fn probe(&self, url: &Url) -> Option<Duration> {
        // IPv6 literals come back bracketed
        let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']');
        let mut addr = None;
        let mut best: Option<Duration> = None;

        // 所有尝试都会执行, 单次失败不提前退出
        for _ in 0..self.attempts {
            if addr.is_none() {
                addr = self.resolve(host).await;
            }
            let Some(target) = addr else {
                continue;
            };
            if let Some(rtt) = self.connect_once(target).await {
                best = Some(best.map_or(rtt, |b| b.min(rtt)));
            }
        }

        if best.is_none() {
            debug!(host, "unreachable after {} attempts", self.attempts);
        }
        best
    }
}

/// 并发测试所有镜像的延迟
///
/// 逻辑:
/// 1. 每个镜像生成一个探测 Future, 最多 `concurrency` 个同时进行
/// 2. 每个 Future 返回 (下标, 延迟), 不共享可变状态
/// 3. 全部完成后按下标写回各自的 `latency`
pub async fn probe_all(
    prober: &dyn Prober,
    mut mirrors: Vec<Mirror>,
    concurrency: usize,
) -> Vec<Mirror> {
    let total = mirrors.len();
    info!(total, concurrency, "probing mirrors");

    let pb = utils::progress_bar(total as u64, "Testing...");

    let results: Vec<(usize, Option<Duration>)> = stream::iter(mirrors.iter().enumerate())
        .map(|(i, mirror)| {
            let pb = pb.clone();
            async move {
                let latency = prober.probe(&mirror.url).await;
                pb.inc(1);
                (i, latency)
            }
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    pb.finish_with_message("Testing completed.");

    for (i, latency) in results {
        mirrors[i].latency = latency;
    }

    let reachable = mirrors.iter().filter(|m| m.latency.is_some()).count();
    info!(reachable, unreachable = total - reachable, "probing finished");
    mirrors
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_probe_reachable_host() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepts = tokio::spawn(async move {
            for _ in 0..ATTEMPTS {
                let _ = listener.accept().await;
            }
        });

        let prober = TcpProber::with_port(Duration::from_secs(2), port);
        let url = Url::parse("http://127.0.0.1/ubuntu/").unwrap();
        let latency = prober.probe(&url).await;
        assert!(latency.is_some());
        assert!(latency.unwrap() < Duration::from_secs(2));

        // all three attempts connected
        accepts.await.unwrap();
    }

    #[tokio::test]
    async fn test_probe_refused_is_none() {
        // bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let prober = TcpProber::with_port(Duration::from_millis(500), port);
        let url = Url::parse("ftp://127.0.0.1/pub/ubuntu/").unwrap();
        assert_eq!(prober.probe(&url).await, None);
    }

    #[tokio::test]
    async fn test_probe_unresolvable_is_none() {
        let prober = TcpProber::new(Duration::from_millis(500));
        let url = Url::parse("http://mirror.invalid/ubuntu/").unwrap();
        assert_eq!(prober.probe(&url).await, None);
    }

    /// Replays scripted connect outcomes; `None` never completes.
    struct ScriptedConnector {
        outcomes: Mutex<Vec<Option<bool>>>,
        calls: AtomicUsize,
    }

    impl ScriptedConnector {
        fn new(outcomes: &[Option<bool>]) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.iter().rev().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, _addr: SocketAddr) -> io::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = self.outcomes.lock().unwrap().pop().unwrap_or(Some(false));
            match outcome {
                Some(true) => Ok(()),
                Some(false) => Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused")),
                None => futures::future::pending().await,
            }
        }
    }

    #[tokio::test]
    async fn test_failed_attempt_does_not_stop_the_rest() {
        let prober = TcpProber::with_connector(
            Duration::from_secs(1),
            ScriptedConnector::new(&[Some(false), Some(true), Some(false)]),
        );
        let url = Url::parse("http://127.0.0.1/ubuntu/").unwrap();
        assert!(prober.probe(&url).await.is_some());
        assert_eq!(prober.connector.calls.load(Ordering::SeqCst), ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_past_timeout_counts_as_failed() {
        let per_attempt = Duration::from_millis(500);
        let prober = TcpProber::with_connector(
            per_attempt,
            ScriptedConnector::new(&[None, None, None]),
        );
        let url = Url::parse("ftp://127.0.0.1/pub/ubuntu/").unwrap();

        let started = tokio::time::Instant::now();
        assert_eq!(prober.probe(&url).await, None);
        let waited = started.elapsed();

        assert_eq!(prober.connector.calls.load(Ordering::SeqCst), ATTEMPTS);
        assert!(waited >= per_attempt * ATTEMPTS as u32);
        assert!(waited < per_attempt * (ATTEMPTS as u32 + 1));
    }

    #[test]
    fn test_pick_address_prefers_ipv4() {
        let v6: SocketAddr = "[2001:db8::1]:80".parse().unwrap();
        let v4: SocketAddr = "192.0.2.1:80".parse().unwrap();
        assert_eq!(pick_address(vec![v6, v4]), Some(v4));
        assert_eq!(pick_address(vec![v6]), Some(v6));
        assert_eq!(pick_address(Vec::new()), None);
    }

    /// Answers from a fixed table after a delay, tracking peak concurrency.
    struct FakeProber {
        table: HashMap<String, Option<Duration>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl FakeProber {
        fn new(entries: &[(&str, Option<u64>)]) -> Self {
            Self {
                table: entries
                    .iter()
                    .map(|(u, ms)| (u.to_string(), ms.map(Duration::from_millis)))
                    .collect(),
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Prober for FakeProber {
        async fn probe(&self, url: &Url) -> Option<Duration> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push(url.to_string());

            let latency = self.table.get(url.as_str()).copied().flatten();
            // slower mirrors finish later, so completion order differs from input order
            let delay = latency.unwrap_or(Duration::from_millis(30));
            tokio::time::sleep(delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            latency
        }
    }

    fn mirror(url: &str) -> Mirror {
        Mirror::new(Url::parse(url).unwrap())
    }

    #[tokio::test]
    async fn test_probe_all_fills_each_slot() {
        let prober = FakeProber::new(&[
            ("http://a.example.com/", Some(40)),
            ("http://b.example.com/", None),
            ("http://c.example.com/", Some(5)),
            ("http://d.example.com/", Some(20)),
        ]);
        let mirrors = vec![
            mirror("http://a.example.com/"),
            mirror("http://b.example.com/"),
            mirror("http://c.example.com/"),
            mirror("http://d.example.com/"),
        ];

        let probed = probe_all(&prober, mirrors, 8).await;

        // catalog order is kept regardless of completion order
        let got: Vec<_> = probed
            .iter()
            .map(|m| (m.url.as_str(), m.latency_ms()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("http://a.example.com/", Some(40)),
                ("http://b.example.com/", None),
                ("http://c.example.com/", Some(5)),
                ("http://d.example.com/", Some(20)),
            ]
        );
        assert_eq!(prober.calls.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_probe_all_respects_concurrency_limit() {
        let urls: Vec<String> = (0..12).map(|i| format!("http://m{}.example.com/", i)).collect();
        let entries: Vec<(&str, Option<u64>)> = urls.iter().map(|u| (u.as_str(), Some(10))).collect();
        let prober = FakeProber::new(&entries);
        let mirrors = urls.iter().map(|u| mirror(u)).collect();

        let probed = probe_all(&prober, mirrors, 3).await;

        assert_eq!(probed.len(), 12);
        assert!(probed.iter().all(|m| m.latency.is_some()));
        let peak = prober.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency was {}", peak);
        assert!(peak > 1, "probes never overlapped");
    }

    #[tokio::test]
    async fn test_probe_all_zero_concurrency_still_runs() {
        let prober = FakeProber::new(&[("http://a.example.com/", Some(1))]);
        let probed = probe_all(&prober, vec![mirror("http://a.example.com/")], 0).await;
        assert_eq!(probed[0].latency_ms(), Some(1));
    }

    #[tokio::test]
    async fn test_probe_all_empty() {
        let prober = FakeProber::new(&[]);
        assert!(probe_all(&prober, Vec::new(), 4).await.is_empty());
    }
}
