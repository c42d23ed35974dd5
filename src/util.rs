use chrono::{DateTime, NaiveDateTime, Utc};
use url::Url;

/// Append a file/path to a base endpoint, dropping any query on the base.
/// `https://host/` + `torrents.php` -> `https://host/torrents.php`,
/// `https://host/tracker` + `ajax.php` -> `https://host/tracker/ajax.php`.
pub fn endpoint(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            segments.push(part);
        }
    }
    url
}

/// Decode the HTML entities trackers embed in names: the common named ones
/// and numeric references (`&#233;`, `&#xE9;`). `&amp;` is decoded last so
/// that an escaped entity stays literal.
pub fn html_unescape(value: &str) -> String {
    let named = value
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&ndash;", "\u{2013}")
        .replace("&mdash;", "\u{2014}")
        .replace("&nbsp;", " ");
    decode_numeric_refs(&named)
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

fn decode_numeric_refs(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("&#") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let decoded = after.find(';').and_then(|end| {
            let body = &after[..end];
            let code = match body.strip_prefix('x').or_else(|| body.strip_prefix('X')) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None if body.bytes().all(|b| b.is_ascii_digit()) => body.parse().ok(),
                None => None,
            }?;
            char::from_u32(code).map(|c| (c, end))
        });
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str("&#");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Parse a provider timestamp as UTC: RFC 3339, or `YYYY-MM-DD HH:MM:SS`
/// without a zone.
pub fn parse_utc(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Trimmed, non-empty string or None.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Serde helpers for upstream fields whose JSON type is not reliable:
/// numbers that arrive as strings, booleans that arrive as 0/1 or null.
/// Anything unusable becomes None/false rather than failing the item.
pub mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn as_u64(value: Option<Value>) -> Option<u64> {
        match value? {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn opt_u64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        Ok(as_u64(Option::<Value>::deserialize(d)?))
    }

    pub fn opt_u32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
        Ok(as_u64(Option::<Value>::deserialize(d)?).and_then(|n| u32::try_from(n).ok()))
    }

    pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::String(s)) => Some(s),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    pub fn flag<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        Ok(match Option::<Value>::deserialize(d)? {
            Some(Value::Bool(b)) => b,
            Some(Value::Number(n)) => n.as_u64().map(|n| n != 0).unwrap_or(false),
            Some(Value::String(s)) => matches!(s.trim(), "1" | "true" | "True"),
            _ => false,
        })
    }
}
