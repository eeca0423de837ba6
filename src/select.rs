use crate::catalog;
use crate::error::{MirrorError, Result};
use crate::probe;
use crate::rank::{self, Filter};
use crate::traits::{MetadataFeed, Prober, ReleaseStatus, UrlFeed};
use crate::types::{Mirror, Status};
use tracing::{debug, info, warn};

/// Selection parameters gathered by the CLI
#[derive(Debug, Clone, Copy)]
pub struct Selection {
    pub filter: Filter,
    pub top: usize,
    pub concurrency: usize,
}

/// Result of one selection run
#[derive(Debug)]
pub struct Outcome {
    /// Ranked mirrors; empty means nothing matched the filter
    pub ranked: Vec<Mirror>,
    /// Filter actually applied (ping-only when metadata was unavailable)
    pub filter: Filter,
    pub tested: usize,
    pub reachable: usize,
}

/// feed A + feed B -> catalog -> probe -> rank
///
/// With a `release` lookup, status filtering uses each candidate's
/// per-release status instead of the overview one.
pub async fn run(
    urls: &dyn UrlFeed,
    metadata: &dyn MetadataFeed,
    prober: &dyn Prober,
    release: Option<&dyn ReleaseStatus>,
    selection: Selection,
) -> Result<Outcome> {
    let lines = urls.mirror_lines().await?;
    info!(feed = urls.name(), lines = lines.len(), "mirror list fetched");

    let mut filter = selection.filter;
    let rows = match metadata.metadata().await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(feed = metadata.name(), error = %e, "metadata unavailable, reverting to latency only");
            filter = Filter::PingOnly;
            Vec::new()
        }
    };

    let mirrors = catalog::build(&lines, &rows);
    if mirrors.is_empty() {
        return Err(MirrorError::EmptyCatalog);
    }

    let tested = mirrors.len();
    let probed = probe::probe_all(prober, mirrors, selection.concurrency).await;
    let reachable = probed.iter().filter(|m| m.latency.is_some()).count();
    let ranked = match (release, filter) {
        (Some(lookup), Filter::MinStatus(min)) => {
            rank_by_release(&probed, lookup, min, selection.top).await
        }
        _ => rank::rank(&probed, filter, selection.top),
    };

    Ok(Outcome {
        ranked,
        filter,
        tested,
        reachable,
    })
}

/// Walk reachable mirrors fastest first, looking up each one's release
/// status until `top` of them qualify. Mirrors whose page cannot be read
/// are dropped; without a release row the overview status stands.
async fn rank_by_release(
    probed: &[Mirror],
    lookup: &dyn ReleaseStatus,
    min: Status,
    top: usize,
) -> Vec<Mirror> {
    let candidates = rank::rank(probed, Filter::PingOnly, probed.len());
    let mut ranked = Vec::new();

    for mut mirror in candidates {
        if ranked.len() >= top {
            break;
        }
        if mirror.launchpad.is_some() {
            match lookup.release_status(&mirror).await {
                Ok(Some(status)) => mirror.status = status,
                Ok(None) => debug!(url = %mirror.url, "no release row, keeping overview status"),
                Err(e) => {
                    warn!(url = %mirror.url, error = %e, "mirror page unavailable, skipped");
                    continue;
                }
            }
        }
        if mirror.status.meets(min) {
            ranked.push(mirror);
        }
    }
    ranked
}
