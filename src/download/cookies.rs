//! Cookie cache for authenticated platforms.
//!
//! Reads a Netscape-format cookie file (the format browser exporters and
//! yt-dlp produce) and caches the parsed cookies for a TTL, re-reading the
//! file when the cache goes stale. The cache is an explicit object owned
//! by the downloader that uses it.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::warn;

#[derive(Debug, Clone)]
struct Cookie {
    domain: String,
    name: String,
    value: String,
}

struct CacheState {
    loaded_at: Instant,
    cookies: Vec<Cookie>,
}

pub struct CookieCache {
    path: PathBuf,
    ttl: Duration,
    state: Mutex<Option<CacheState>>,
}

impl CookieCache {
    pub fn new(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
            state: Mutex::new(None),
        }
    }

    /// Build a `Cookie:` header value for a host, or None when no cookie
    /// applies. Matches the cookie domain exactly or as a dot-suffix
    /// (".example.com" matches "www.example.com").
    pub async fn header_for(&self, host: &str) -> Option<String> {
        let mut state = self.state.lock().await;

        let stale = match state.as_ref() {
            Some(cached) => cached.loaded_at.elapsed() >= self.ttl,
            None => true,
        };
        if stale {
            let cookies = match tokio::fs::read_to_string(&self.path).await {
                Ok(contents) => parse_netscape_cookies(&contents),
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "could not read cookie file");
                    Vec::new()
                }
            };
            *state = Some(CacheState {
                loaded_at: Instant::now(),
                cookies,
            });
        }

        let cached = state.as_ref()?;
        let pairs: Vec<String> = cached
            .cookies
            .iter()
            .filter(|c| domain_matches(&c.domain, host))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();

        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }
}

/// Netscape cookie-file lines: domain, include-subdomains flag, path,
/// secure, expiry, name, value (tab separated). `#HttpOnly_` prefixed
/// entries are real cookies; other `#` lines are comments.
fn parse_netscape_cookies(contents: &str) -> Vec<Cookie> {
    let mut cookies = Vec::new();
    for line in contents.lines() {
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            continue;
        }
        cookies.push(Cookie {
            domain: fields[0].to_string(),
            name: fields[5].to_string(),
            value: fields[6].to_string(),
        });
    }
    cookies
}

fn domain_matches(cookie_domain: &str, host: &str) -> bool {
    let domain = cookie_domain.strip_prefix('.').unwrap_or(cookie_domain);
    host == domain || host.ends_with(&format!(".{domain}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOKIE_FILE: &str = "\
# Netscape HTTP Cookie File
.example.com\tTRUE\t/\tFALSE\t1999999999\tsession\tabc123
#HttpOnly_.example.com\tTRUE\t/\tTRUE\t1999999999\ttoken\txyz
other.test\tFALSE\t/\tFALSE\t0\tid\t42
malformed line
";

    #[test]
    fn parses_netscape_format() {
        let cookies = parse_netscape_cookies(COOKIE_FILE);
        assert_eq!(cookies.len(), 3);
        assert_eq!(cookies[0].name, "session");
        assert_eq!(cookies[1].name, "token");
        assert_eq!(cookies[2].domain, "other.test");
    }

    #[test]
    fn domain_matching() {
        assert!(domain_matches(".example.com", "example.com"));
        assert!(domain_matches(".example.com", "www.example.com"));
        assert!(domain_matches("example.com", "example.com"));
        assert!(!domain_matches(".example.com", "badexample.com"));
        assert!(!domain_matches("other.test", "example.com"));
    }

    #[tokio::test]
    async fn header_built_for_matching_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        tokio::fs::write(&path, COOKIE_FILE).await.unwrap();

        let cache = CookieCache::new(&path, Duration::from_secs(60));
        let header = cache.header_for("www.example.com").await.unwrap();
        assert_eq!(header, "session=abc123; token=xyz");
        assert!(cache.header_for("unrelated.test").await.is_none());
    }

    #[tokio::test]
    async fn stale_cache_rereads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cookies.txt");
        tokio::fs::write(&path, COOKIE_FILE).await.unwrap();

        let cache = CookieCache::new(&path, Duration::from_millis(10));
        assert!(cache.header_for("example.com").await.is_some());

        tokio::fs::write(&path, "").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.header_for("example.com").await.is_none());
    }
}
