use crate::error::Result;
use crate::sources::fetch_text;
use crate::traits::{MetadataFeed, ReleaseStatus};
use crate::types::{MetadataRow, Mirror, Status};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::debug;
use url::Url;

/// Launchpad archive-mirror overview table
pub struct LaunchpadFeed {
    client: Client,
    url: String,
}

impl LaunchpadFeed {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl MetadataFeed for LaunchpadFeed {
    fn name(&self) -> &str {
        "launchpad"
    }

    async fn metadata(&self) -> Result<Vec<MetadataRow>> {
        let html = fetch_text(&self.client, &self.url).await?;
        parse_mirror_table(&html, &self.url)
    }
}

/// Per-mirror Launchpad page, read for one release codename and architecture
pub struct MirrorPageLookup {
    client: Client,
    release: String,
    arch: String,
}

impl MirrorPageLookup {
    pub fn new(client: Client, release: &str, arch: &str) -> Self {
        Self {
            client,
            release: release.to_string(),
            arch: arch.to_string(),
        }
    }
}

#[async_trait]
impl ReleaseStatus for MirrorPageLookup {
    async fn release_status(&self, mirror: &Mirror) -> Result<Option<Status>> {
        let Some(ref page) = mirror.launchpad else {
            return Ok(None);
        };
        let html = fetch_text(&self.client, page).await?;
        let status = parse_release_status(&html, &self.release, &self.arch)?;
        Ok(status.map(|s| Status::from_label(&s)))
    }
}

fn unescape(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

/// Parse the overview table into one row per http/https/ftp link.
///
/// Each mirror row looks like:
/// name link (`/+mirror/...`) | protocol links | speed | status
pub fn parse_mirror_table(html: &str, page_url: &str) -> Result<Vec<MetadataRow>> {
    let row_re = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>")?;
    let cell_re = Regex::new(r"(?is)<td[^>]*>(.*?)</td>")?;
    let link_re = Regex::new(r#"(?is)<a[^>]*\bhref\s*=\s*"([^"]+)"[^>]*>(.*?)</a>"#)?;
    let tag_re = Regex::new(r"(?s)<[^>]+>")?;
    let speed_re = Regex::new(r"(?i)^\d+(\.\d+)?\s*[kmgt]bps$")?;

    let base = Url::parse(page_url).ok();
    let text_of = |fragment: &str| -> String {
        let stripped = tag_re.replace_all(fragment, " ");
        unescape(&stripped)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };

    let mut rows = Vec::new();
    for row in row_re.captures_iter(html) {
        let cells: Vec<&str> = cell_re
            .captures_iter(&row[1])
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect();
        if cells.len() < 2 {
            continue; // country headings and table headers
        }

        let mut organization = String::new();
        let mut launchpad = None;
        let mut locations = Vec::new();
        for link in link_re.captures_iter(&row[1]) {
            let href = unescape(link[1].trim());
            if href.contains("/+mirror/") {
                organization = text_of(&link[2]);
                launchpad = match &base {
                    Some(base) => base.join(&href).ok().map(|u| u.to_string()),
                    None => Some(href),
                };
            } else if ["http://", "https://", "ftp://"]
                .iter()
                .any(|p| href.starts_with(p))
            {
                locations.push(href);
            }
        }
        if locations.is_empty() {
            debug!("table row without mirror links skipped");
            continue;
        }

        let bandwidth = cells
            .iter()
            .map(|c| text_of(*c))
            .find(|t| speed_re.is_match(t))
            .unwrap_or_default();
        let status = cells.last().map(|c| text_of(*c)).unwrap_or_default();

        for location in locations {
            rows.push(MetadataRow {
                location,
                organization: organization.clone(),
                status: status.clone(),
                bandwidth: bandwidth.clone(),
                launchpad: launchpad.clone(),
            });
        }
    }

    debug!(rows = rows.len(), "parsed launchpad mirror table");
    Ok(rows)
}

/// Find the status text for `release` on `arch` in a mirror page's
/// `arches` table (version | architecture | status).
pub fn parse_release_status(html: &str, release: &str, arch: &str) -> Result<Option<String>> {
    let table_re = Regex::new(r#"(?is)<table[^>]*\bid\s*=\s*"arches"[^>]*>(.*?)</table>"#)?;
    let row_re = Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>")?;
    let cell_re = Regex::new(r"(?is)<td[^>]*>(.*?)</td>")?;
    let tag_re = Regex::new(r"(?s)<[^>]+>")?;

    let Some(table) = table_re.captures(html) else {
        debug!("mirror page has no arches table");
        return Ok(None);
    };
    let release = release.to_lowercase();

    for row in row_re.captures_iter(&table[1]) {
        let cells: Vec<String> = cell_re
            .captures_iter(&row[1])
            .map(|c| {
                unescape(&tag_re.replace_all(&c[1], " "))
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        if cells.len() < 3 {
            continue;
        }
        if cells[0].to_lowercase().contains(&release) && cells[1] == arch {
            return Ok(Some(cells[2].clone()));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "https://launchpad.net/ubuntu/+archivemirrors";

    const SAMPLE: &str = r#"
<table id="mirrors_list" class="listing">
  <tbody>
    <tr class="head">
      <th colspan="2">Germany</th>
      <th>10 Gbps</th>
      <th>2 mirrors</th>
    </tr>
    <tr>
      <td><a href="/ubuntu/+mirror/ftp.example.de-archive">Example &amp; Co</a></td>
      <td>
        <a href="https://ftp.example.de/ubuntu/">https</a>
        <a href="http://ftp.example.de/ubuntu/">http</a>
        <a href="ftp://ftp.example.de/pub/ubuntu/">ftp</a>
        <a href="rsync://ftp.example.de/ubuntu/">rsync</a>
      </td>
      <td>1 Gbps</td>
      <td><span class="distromirrorstatusUP">Up to date</span></td>
    </tr>
    <tr>
      <td><a href="/ubuntu/+mirror/slow.example.de">Slow Uni</a></td>
      <td><a href="http://slow.example.de/ubuntu/">http</a></td>
      <td>100 Mbps</td>
      <td><span class="distromirrorstatusTWODAYSBEHIND">Two days
        behind</span></td>
    </tr>
    <tr>
      <td><a href="/ubuntu/+mirror/broken">Broken</a></td>
      <td>no links here</td>
    </tr>
  </tbody>
</table>
"#;

    #[test]
    fn test_parse_mirror_table() -> Result<()> {
        let rows = parse_mirror_table(SAMPLE, PAGE)?;
        let locations: Vec<_> = rows.iter().map(|r| r.location.as_str()).collect();
        assert_eq!(
            locations,
            vec![
                "https://ftp.example.de/ubuntu/",
                "http://ftp.example.de/ubuntu/",
                "ftp://ftp.example.de/pub/ubuntu/",
                "http://slow.example.de/ubuntu/",
            ]
        );

        let first = &rows[1];
        assert_eq!(first.organization, "Example & Co");
        assert_eq!(first.bandwidth, "1 Gbps");
        assert_eq!(first.status, "Up to date");
        assert_eq!(
            first.launchpad.as_deref(),
            Some("https://launchpad.net/ubuntu/+mirror/ftp.example.de-archive")
        );

        let slow = &rows[3];
        assert_eq!(slow.organization, "Slow Uni");
        assert_eq!(slow.bandwidth, "100 Mbps");
        assert_eq!(slow.status, "Two days behind");
        Ok(())
    }

    const MIRROR_PAGE: &str = r#"
<dl id="speed"><dt>Speed:</dt><dd>1 Gbps</dd></dl>
<table class="listing" id="arches">
  <thead><tr><th>Version</th><th>Architecture</th><th>Status</th></tr></thead>
  <tbody>
    <tr><td>Noble (24.04)</td><td>amd64</td><td><span>Up to date</span></td></tr>
    <tr><td>Jammy (22.04)</td><td>i386</td><td><span>Up to date</span></td></tr>
    <tr><td>Jammy (22.04)</td><td>amd64</td><td><span class="distromirrorstatusONEWEEKBEHIND">One week behind</span></td></tr>
  </tbody>
</table>
"#;

    #[test]
    fn test_parse_release_status() -> Result<()> {
        assert_eq!(
            parse_release_status(MIRROR_PAGE, "jammy", "amd64")?.as_deref(),
            Some("One week behind")
        );
        assert_eq!(
            parse_release_status(MIRROR_PAGE, "Noble", "amd64")?.as_deref(),
            Some("Up to date")
        );
        assert!(parse_release_status(MIRROR_PAGE, "focal", "amd64")?.is_none());
        assert!(parse_release_status(MIRROR_PAGE, "jammy", "arm64")?.is_none());
        assert!(parse_release_status("<html></html>", "jammy", "amd64")?.is_none());
        Ok(())
    }

    #[test]
    fn test_parse_garbage_is_empty() -> Result<()> {
        assert!(parse_mirror_table("<html>nothing</html>", PAGE)?.is_empty());
        assert!(parse_mirror_table("", "not a url")?.is_empty());
        Ok(())
    }
}
