//! Rewrites the main and security archive URLs of an apt `sources.list`.

use crate::types::Mirror;
use tracing::{debug, warn};
use url::Url;

/// Hosts reserved for the security feed.
const SECURITY_HOSTS: &[&str] = &["security.ubuntu.com", "security.debian.org"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Main,
    Security,
}

/// 重写结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rewrite {
    pub text: String,
    /// First URL used by a main entry
    pub main: Option<String>,
    /// First URL used by a security entry
    pub security: Option<String>,
    pub replacements: usize,
    /// URL found serving both roles; it was rewritten, but callers should warn
    pub ambiguous: Option<String>,
}

impl Rewrite {
    /// 没有找到 main/security 条目, 文本原样返回
    pub fn is_noop(&self) -> bool {
        self.main.is_none() && self.security.is_none()
    }
}

struct Entry<'a> {
    url: &'a str,
    suite: &'a str,
    components: Vec<&'a str>,
}

impl<'a> Entry<'a> {
    /// `deb|deb-src [options] URL SUITE COMPONENTS...`
    fn parse(line: &'a str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let kind = tokens.next()?;
        if kind != "deb" && kind != "deb-src" {
            return None;
        }

        let mut next = tokens.next()?;
        if next.starts_with('[') {
            // options may span several tokens: [arch=amd64 signed-by=...]
            while !next.ends_with(']') {
                next = tokens.next()?;
            }
            next = tokens.next()?;
        }

        Some(Self {
            url: next,
            suite: tokens.next()?,
            components: tokens.collect(),
        })
    }

    fn role(&self) -> Option<Role> {
        if self.suite.ends_with("-security") || is_security_host(self.url) {
            Some(Role::Security)
        } else if self.components.contains(&"main") {
            Some(Role::Main)
        } else {
            None
        }
    }

    /// A reserved security host carrying a plain release suite with `main`
    /// fits both roles' patterns.
    fn matches_both_roles(&self) -> bool {
        is_security_host(self.url)
            && !self.suite.ends_with("-security")
            && self.components.contains(&"main")
    }
}

fn is_security_host(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    let Some(host) = url.host_str() else {
        return false;
    };
    SECURITY_HOSTS
        .iter()
        .any(|h| host == *h || host.ends_with(&format!(".{}", h)))
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}

/// Keep the trailing-slash style of the URL being replaced.
fn styled_like(original: &str, replacement: &str) -> String {
    let bare = replacement.trim_end_matches('/');
    if original.ends_with('/') {
        format!("{}/", bare)
    } else {
        bare.to_string()
    }
}

/// Replace whitespace-delimited tokens equal to one of `targets`, leaving
/// every other byte of the line untouched.
fn replace_tokens(line: &str, targets: &[&str], to: &str, count: &mut usize) -> String {
    let mut out = String::with_capacity(line.len() + to.len());
    let mut rest = line;

    while !rest.is_empty() {
        let ws_end = rest
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(rest.len());
        out.push_str(&rest[..ws_end]);
        rest = &rest[ws_end..];

        let tok_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        let token = &rest[..tok_end];
        if !token.is_empty() && targets.iter().any(|t| same_url(t, token)) {
            out.push_str(&styled_like(token, to));
            *count += 1;
        } else {
            out.push_str(token);
        }
        rest = &rest[tok_end..];
    }
    out
}

/// Point the main and security entries of `text` at `mirror`.
pub fn rewrite(text: &str, mirror: &Mirror) -> Rewrite {
    let mut main: Option<&str> = None;
    let mut security: Option<&str> = None;
    let mut main_urls: Vec<&str> = Vec::new();
    let mut security_urls: Vec<&str> = Vec::new();
    let mut both_roles: Option<&str> = None;

    for entry in text.lines().filter_map(Entry::parse) {
        if entry.matches_both_roles() {
            both_roles.get_or_insert(entry.url);
        }
        match entry.role() {
            Some(Role::Main) => {
                main.get_or_insert(entry.url);
                main_urls.push(entry.url);
            }
            Some(Role::Security) => {
                security.get_or_insert(entry.url);
                security_urls.push(entry.url);
            }
            None => {}
        }
    }

    let ambiguous = main_urls
        .iter()
        .find(|m| security_urls.iter().any(|s| same_url(m, s)))
        .or(both_roles.as_ref())
        .map(|u| u.to_string());
    if let Some(ref url) = ambiguous {
        warn!(url = %url, "URL matches both main and security roles");
    }

    let targets: Vec<&str> = main.iter().chain(security.iter()).copied().collect();
    if targets.is_empty() {
        debug!("no main or security entries found");
        return Rewrite {
            text: text.to_string(),
            main: None,
            security: None,
            replacements: 0,
            ambiguous: None,
        };
    }

    let to = mirror.url.as_str();
    let mut replacements = 0;
    let new_text: String = text
        .split_inclusive('\n')
        .map(|line| replace_tokens(line, &targets, to, &mut replacements))
        .collect();

    debug!(replacements, "sources rewritten");
    Rewrite {
        text: new_text,
        main: main.map(str::to_string),
        security: security.map(str::to_string),
        replacements,
        ambiguous,
    }
}
