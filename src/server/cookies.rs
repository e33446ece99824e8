//! Cookie header parsing and `Set-Cookie` rendering
//!
//! Parsing accepts `name=value` pairs separated by `;` with optional
//! whitespace, and values optionally wrapped in double quotes. Values are
//! URL-decoded on the way in and URL-encoded on the way out.

use crate::auth::ticket::{EXTRA_COOKIE, INFO_COOKIE, MAC_COOKIE};
use crate::auth::{SessionCookies, Ticket, AUTH_COOKIE, USER_COOKIE};
use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use chrono::DateTime;
use std::borrow::Cow;

/// Split one `Cookie` header value into raw `(name, value)` pairs
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    let mut cookies = Vec::new();
    let mut rest = header;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let Some(eq) = rest.find('=') else {
            break;
        };
        let name = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            value = quoted[..end].to_string();
            rest = quoted.get(end + 1..).unwrap_or("");
        } else {
            let end = rest
                .find(|c: char| c == ';' || c.is_whitespace())
                .unwrap_or(rest.len());
            value = rest[..end].to_string();
            rest = &rest[end..];
        }

        if !name.is_empty() {
            cookies.push((name, value));
        }

        rest = rest.trim_start();
        match rest.strip_prefix(';') {
            Some(after) => rest = after,
            None if rest.is_empty() => break,
            // Junk after a value: skip to the next separator
            None => match rest.find(';') {
                Some(i) => rest = &rest[i + 1..],
                None => break,
            },
        }
    }

    cookies
}

/// Cookies of one request, URL-decoded
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    pairs: Vec<(String, String)>,
}

impl CookieJar {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let pairs = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(parse_cookie_header)
            .map(|(name, value)| {
                let decoded = urlencoding::decode(&value)
                    .map(Cow::into_owned)
                    .unwrap_or(value);
                (name, decoded)
            })
            .collect();
        Self { pairs }
    }

    /// First cookie with this name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// Attributes shared by every cookie we set
#[derive(Debug, Clone)]
pub struct CookieAttributes {
    pub path: String,
    pub domain: Option<String>,
}

impl Default for CookieAttributes {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
            domain: None,
        }
    }
}

fn http_date(unix_seconds: u64) -> String {
    let secs = i64::try_from(unix_seconds).unwrap_or(i64::MAX);
    DateTime::from_timestamp(secs, 0)
        .or_else(|| DateTime::from_timestamp(0, 0))
        .map(|dt| dt.format("%a, %d %b %Y %H:%M:%S GMT").to_string())
        .unwrap_or_default()
}

/// Render one `Set-Cookie` header value
pub fn set_cookie(name: &str, value: &str, expires_at: u64, attrs: &CookieAttributes) -> String {
    let mut out = format!(
        "{}={}; Path={}; Expires={}",
        name,
        urlencoding::encode(value),
        attrs.path,
        http_date(expires_at)
    );
    if let Some(domain) = &attrs.domain {
        out.push_str("; Domain=");
        out.push_str(domain);
    }
    out
}

/// `Set-Cookie` values for a session (or a cleared session)
pub fn session_set_cookies(cookies: &SessionCookies, attrs: &CookieAttributes) -> Vec<String> {
    vec![
        set_cookie(USER_COOKIE, &cookies.user, cookies.expires_at, attrs),
        set_cookie(AUTH_COOKIE, &cookies.authentication, cookies.expires_at, attrs),
    ]
}

/// `Set-Cookie` values carrying a WebSocket ticket; all share one expiry
pub fn ticket_set_cookies(ticket: &Ticket, attrs: &CookieAttributes) -> Vec<String> {
    let expires_at = ticket.expires_at();
    let mut out = vec![set_cookie(INFO_COOKIE, &ticket.info, expires_at, attrs)];
    if let Some(extra) = &ticket.extra {
        out.push(set_cookie(EXTRA_COOKIE, extra, expires_at, attrs));
    }
    out.push(set_cookie(MAC_COOKIE, &ticket.mac, expires_at, attrs));
    out
}

/// A single `Cookie` request header carrying a ticket, as a browser would send it
pub fn ticket_cookie_header(ticket: &Ticket) -> String {
    let mut parts = vec![format!("{}={}", INFO_COOKIE, urlencoding::encode(&ticket.info))];
    if let Some(extra) = &ticket.extra {
        parts.push(format!("{}={}", EXTRA_COOKIE, urlencoding::encode(extra)));
    }
    parts.push(format!("{}={}", MAC_COOKIE, ticket.mac));
    parts.join("; ")
}
