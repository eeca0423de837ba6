use crate::types::{MetadataRow, Mirror, Status};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use url::Url;

/// Build the mirror set from the raw URL list and the metadata table.
///
/// Malformed lines are skipped, duplicate URLs keep their first occurrence,
/// and mirrors without a metadata row stay `Unknown`.
pub fn build<S: AsRef<str>>(url_lines: &[S], metadata: &[MetadataRow]) -> Vec<Mirror> {
    let index = MetadataIndex::new(metadata);
    let mut seen = HashSet::new();
    let mut mirrors = Vec::new();

    for line in url_lines {
        let Some(url) = parse_mirror_url(line.as_ref()) else {
            continue;
        };
        if !seen.insert(url.as_str().to_string()) {
            debug!(url = %url, "duplicate mirror ignored");
            continue;
        }

        let mut mirror = Mirror::new(url);
        if let Some(row) = index.lookup(&mirror.url) {
            mirror.organization = row.organization.trim().to_string();
            mirror.status = Status::from_label(&row.status);
            mirror.bandwidth = row.bandwidth.trim().to_string();
            mirror.launchpad = row.launchpad.clone();
        }
        mirrors.push(mirror);
    }

    debug!(count = mirrors.len(), "catalog built");
    mirrors
}

fn parse_mirror_url(line: &str) -> Option<Url> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match Url::parse(line) {
        Ok(url) if matches!(url.scheme(), "http" | "ftp") && url.host_str().is_some() => Some(url),
        Ok(url) => {
            debug!(url = %url, "unsupported scheme dropped");
            None
        }
        Err(e) => {
            debug!(line, error = %e, "malformed mirror URL dropped");
            None
        }
    }
}

/// host + path key, scheme and trailing slash ignored
fn mirror_key(host: &str, path: &str) -> String {
    format!("{}{}", host.to_lowercase(), path.trim_end_matches('/'))
}

struct MetadataIndex<'a> {
    by_location: HashMap<String, &'a MetadataRow>,
    by_host: HashMap<String, &'a MetadataRow>,
}

impl<'a> MetadataIndex<'a> {
    fn new(rows: &'a [MetadataRow]) -> Self {
        let mut by_location = HashMap::new();
        let mut by_host = HashMap::new();

        for row in rows {
            let location = row.location.trim();
            if location.is_empty() {
                continue;
            }
            match Url::parse(location) {
                Ok(url) => match url.host_str() {
                    Some(host) => {
                        by_location.entry(mirror_key(host, url.path())).or_insert(row);
                    }
                    None => debug!(location, "metadata row without host ignored"),
                },
                // Not a URL: treat it as a bare host name
                Err(_) => {
                    let host = location.trim_end_matches('/').to_lowercase();
                    by_host.entry(host).or_insert(row);
                }
            }
        }

        Self {
            by_location,
            by_host,
        }
    }

    fn lookup(&self, url: &Url) -> Option<&'a MetadataRow> {
        let host = url.host_str()?;
        self.by_location
            .get(&mirror_key(host, url.path()))
            .or_else(|| self.by_host.get(&host.to_lowercase()))
            .copied()
    }
}
