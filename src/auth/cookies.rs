//! Netscape cookie file (`cookies.txt`) reading and writing.
//!
//! One cookie per line, seven TAB-separated fields:
//! `domain  tailmatch  path  secure  expires  name  value`.
//! Lines prefixed with `#HttpOnly_` are cookies, every other `#` line is a comment.

use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::cookie::Jar;
use tracing::{debug, warn};
use url::Url;

const HEADER: &str = "# Netscape HTTP Cookie File";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

#[derive(Clone, PartialEq, Eq)]
pub struct CookieLine {
    pub domain: String,
    /// Also sent to subdomains of `domain`.
    pub tailmatch: bool,
    pub path: String,
    pub secure: bool,
    /// Unix seconds; 0 marks a session cookie.
    pub expires: u64,
    pub name: String,
    pub value: String,
}

// Values are session secrets.
impl fmt::Debug for CookieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieLine")
            .field("domain", &self.domain)
            .field("tailmatch", &self.tailmatch)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    #[error("no valid cookies found ({malformed} malformed lines)")]
    Empty { malformed: usize },
}

/// Parses a cookie file, skipping malformed lines with a warning.
///
/// A file without a single usable cookie is an error so the caller can fall
/// back to a fresh login.
pub fn read_cookie_file(reader: impl BufRead) -> Result<Vec<CookieLine>, CookieError> {
    let mut cookies = Vec::new();
    let mut malformed = 0;

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);
        let line = line.strip_prefix(HTTP_ONLY_PREFIX).unwrap_or(line);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(cookie) => cookies.push(cookie),
            None => {
                malformed += 1;
                warn!(line = idx + 1, "skipping malformed cookie line");
            }
        }
    }

    if cookies.is_empty() {
        return Err(CookieError::Empty { malformed });
    }
    Ok(cookies)
}

fn parse_line(line: &str) -> Option<CookieLine> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [domain, tailmatch, path, secure, expires, name, value] = fields.as_slice() else {
        return None;
    };
    if domain.is_empty() || name.is_empty() {
        return None;
    }
    Some(CookieLine {
        domain: (*domain).to_string(),
        tailmatch: parse_flag(tailmatch)?,
        path: (*path).to_string(),
        secure: parse_flag(secure)?,
        expires: expires.parse().ok()?,
        name: (*name).to_string(),
        value: (*value).to_string(),
    })
}

fn parse_flag(field: &str) -> Option<bool> {
    match field {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

fn flag(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

pub fn write_cookie_file(mut writer: impl Write, cookies: &[CookieLine]) -> std::io::Result<()> {
    writeln!(writer, "{HEADER}")?;
    writeln!(writer, "# This file was generated by language101. Do not edit.")?;
    writeln!(writer)?;
    for cookie in cookies {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            cookie.domain,
            flag(cookie.tailmatch),
            cookie.path,
            flag(cookie.secure),
            cookie.expires,
            cookie.name,
            cookie.value
        )?;
    }
    writer.flush()
}

/// Builds a jar preloaded with `cookies`, ready for `ClientBuilder::cookie_provider`.
pub fn jar_from_cookies(cookies: &[CookieLine]) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());
    for cookie in cookies {
        let host = cookie.domain.trim_start_matches('.');
        let scheme = if cookie.secure { "https" } else { "http" };
        let Ok(url) = Url::parse(&format!("{scheme}://{host}{}", cookie.path)) else {
            warn!(domain = %cookie.domain, name = %cookie.name, "skipping cookie with unusable domain");
            continue;
        };
        jar.add_cookie_str(&to_set_cookie(cookie), &url);
        debug!(domain = %cookie.domain, name = %cookie.name, "loaded cookie");
    }
    jar
}

fn to_set_cookie(cookie: &CookieLine) -> String {
    let mut header = format!("{}={}; Path={}", cookie.name, cookie.value, cookie.path);
    if cookie.tailmatch {
        header.push_str(&format!("; Domain={}", cookie.domain.trim_start_matches('.')));
    }
    if cookie.secure {
        header.push_str("; Secure");
    }
    if cookie.expires > 0 {
        if let Some(at) = UNIX_EPOCH.checked_add(Duration::from_secs(cookie.expires)) {
            header.push_str(&format!("; Expires={}", httpdate::fmt_http_date(at)));
        }
    }
    header
}

/// Parses one `Set-Cookie` header as received from `host`.
///
/// Returns `None` for headers without a name and for deletions
/// (`Max-Age<=0`).
pub fn parse_set_cookie(header: &str, host: &str, now: SystemTime) -> Option<CookieLine> {
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.trim().split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = CookieLine {
        domain: host.to_string(),
        tailmatch: false,
        path: "/".to_string(),
        secure: false,
        expires: 0,
        name: name.to_string(),
        value: value.trim().to_string(),
    };
    let mut max_age: Option<i64> = None;

    for attribute in parts {
        let (key, val) = attribute
            .trim()
            .split_once('=')
            .map_or((attribute.trim(), ""), |(k, v)| (k.trim(), v.trim()));
        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => {
                cookie.domain = format!(".{}", val.trim_start_matches('.'));
                cookie.tailmatch = true;
            }
            "path" if val.starts_with('/') => cookie.path = val.to_string(),
            "secure" => cookie.secure = true,
            "expires" => {
                if let Ok(at) = httpdate::parse_http_date(val) {
                    cookie.expires = unix_seconds(at);
                }
            }
            "max-age" => max_age = val.parse().ok(),
            _ => {}
        }
    }

    if let Some(seconds) = max_age {
        let seconds = u64::try_from(seconds).ok().filter(|s| *s > 0)?;
        cookie.expires = unix_seconds(now) + seconds;
    }
    Some(cookie)
}

fn unix_seconds(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

/// Merges the cookies a login produced into a list worth persisting.
///
/// `set_cookie` headers carry full attributes; `jar_pairs` covers cookies set
/// on redirect hops the final response never showed. Those become host-only
/// session cookies.
pub fn collect_session_cookies(
    origin: &Url,
    set_cookie: &[String],
    jar_pairs: &[(String, String)],
) -> Vec<CookieLine> {
    let host = origin.host_str().unwrap_or_default();
    let now = SystemTime::now();

    let mut cookies: Vec<CookieLine> = set_cookie
        .iter()
        .filter_map(|header| parse_set_cookie(header, host, now))
        .collect();

    for (name, value) in jar_pairs {
        if let Some(existing) = cookies.iter_mut().find(|c| &c.name == name) {
            existing.value.clone_from(value);
            continue;
        }
        cookies.push(CookieLine {
            domain: host.to_string(),
            tailmatch: false,
            path: "/".to_string(),
            secure: origin.scheme() == "https",
            expires: 0,
            name: name.clone(),
            value: value.clone(),
        });
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use std::io::Cursor;

    fn cookie(name: &str, value: &str) -> CookieLine {
        CookieLine {
            domain: ".japanesepod101.com".to_string(),
            tailmatch: true,
            path: "/".to_string(),
            secure: true,
            expires: 2_000_000_000,
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_written_file_reads_back() {
        let cookies = vec![cookie("amember_nr", "abc"), cookie("PHPSESSID", "xyz")];
        let mut buffer = Vec::new();
        write_cookie_file(&mut buffer, &cookies).unwrap();

        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with(HEADER));
        assert!(text.contains(".japanesepod101.com\tTRUE\t/\tTRUE\t2000000000\tamember_nr\tabc"));

        let read = read_cookie_file(Cursor::new(buffer)).unwrap();
        assert_eq!(read, cookies);
    }

    #[test]
    fn test_read_skips_comments_and_malformed_lines() {
        let input = "\
# Netscape HTTP Cookie File

not a cookie line
#HttpOnly_.example.com\tTRUE\t/\tFALSE\t0\tsid\tv1
.example.com\tMAYBE\t/\tFALSE\t0\tbad\tv2
www.example.com\tFALSE\t/\tFALSE\t0\tlang\ten
";
        let read = read_cookie_file(Cursor::new(input)).unwrap();
        let names: Vec<&str> = read.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["sid", "lang"]);
    }

    #[test]
    fn test_read_without_cookies_is_error() {
        let err = read_cookie_file(Cursor::new("# Netscape HTTP Cookie File\njunk\n")).unwrap_err();
        assert!(matches!(err, CookieError::Empty { malformed: 1 }));
    }

    #[test]
    fn test_debug_redacts_value() {
        let debug = format!("{:?}", cookie("sid", "super-secret"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn test_parse_set_cookie_attributes() {
        let now = UNIX_EPOCH + Duration::from_secs(1_000);
        let parsed = parse_set_cookie(
            "sid=abc123; Domain=example.com; Path=/member; Secure; HttpOnly; Max-Age=60",
            "www.example.com",
            now,
        )
        .unwrap();
        assert_eq!(parsed.domain, ".example.com");
        assert!(parsed.tailmatch);
        assert_eq!(parsed.path, "/member");
        assert!(parsed.secure);
        assert_eq!(parsed.expires, 1_060);
        assert_eq!(parsed.value, "abc123");
    }

    #[test]
    fn test_parse_set_cookie_host_only_defaults() {
        let parsed = parse_set_cookie("lang=en", "www.example.com", SystemTime::now()).unwrap();
        assert_eq!(parsed.domain, "www.example.com");
        assert!(!parsed.tailmatch);
        assert_eq!(parsed.path, "/");
        assert_eq!(parsed.expires, 0);
    }

    #[test]
    fn test_parse_set_cookie_deletion_is_dropped() {
        assert!(parse_set_cookie("sid=; Max-Age=0", "example.com", SystemTime::now()).is_none());
        assert!(parse_set_cookie("=nameless", "example.com", SystemTime::now()).is_none());
    }

    #[test]
    fn test_collect_prefers_jar_value_and_adds_redirect_cookies() {
        let origin = Url::parse("https://www.example.com").unwrap();
        let collected = collect_session_cookies(
            &origin,
            &["sid=old; Path=/".to_string()],
            &[
                ("sid".to_string(), "new".to_string()),
                ("amember_nr".to_string(), "42".to_string()),
            ],
        );
        assert_eq!(collected.len(), 2);
        assert_eq!(collected[0].value, "new");
        assert_eq!(collected[1].name, "amember_nr");
        assert_eq!(collected[1].domain, "www.example.com");
        assert!(collected[1].secure);
    }

    #[test]
    fn test_jar_sends_loaded_cookies_to_matching_host() {
        let jar = jar_from_cookies(&[CookieLine {
            domain: ".example.com".to_string(),
            tailmatch: true,
            path: "/".to_string(),
            secure: false,
            expires: 0,
            name: "sid".to_string(),
            value: "abc".to_string(),
        }]);

        let matching = Url::parse("http://www.example.com/lesson/a").unwrap();
        let header = jar.cookies(&matching).unwrap();
        assert_eq!(header.to_str().unwrap(), "sid=abc");

        let other = Url::parse("http://other.org/").unwrap();
        assert!(jar.cookies(&other).is_none());
    }
}
