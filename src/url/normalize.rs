use crate::UrlError;
use std::borrow::Cow;
use url::Url;

/// Schemes that never name a fetchable resource
const NON_FETCHABLE_SCHEMES: &[&str] = &["mailto:", "javascript:", "tel:", "data:", "about:", "blob:"];

/// Normalizes an absolute URL string
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject anything that is not HTTP or HTTPS
/// 3. Lowercase scheme and host, drop default ports (done by the parser)
/// 4. Resolve dot segments in the path (done by the parser)
/// 5. Remove the fragment
///
/// The query string is kept as-is: distinct queries are distinct resources.
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::normalize_url;
///
/// let url = normalize_url("HTTP://EXAMPLE.COM:80/a/../page?x=1#top").unwrap();
/// assert_eq!(url.as_str(), "http://example.com/page?x=1");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    url.set_fragment(None);
    Ok(url)
}

/// Resolves a reference found in a document against the document's URL
///
/// Handles relative, protocol-relative and absolute references. Returns `None`
/// for references that do not name a fetchable resource: empty values,
/// fragment-only anchors, and `mailto:`, `javascript:`, `tel:` or `data:` URIs.
/// These are dropped silently, never reported as errors.
///
/// # Examples
///
/// ```
/// use sumi_mirror::url::normalize;
/// use url::Url;
///
/// let base = Url::parse("https://example.com/blog/post.html").unwrap();
/// let img = normalize(&base, "../img/logo.png#x").unwrap();
/// assert_eq!(img.as_str(), "https://example.com/img/logo.png");
/// assert!(normalize(&base, "mailto:info@example.com").is_none());
/// ```
pub fn normalize(base: &Url, reference: &str) -> Option<Url> {
    let decoded = decode_entities(reference.trim());
    let reference = decoded.trim();

    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    let lowered = reference.to_ascii_lowercase();
    if NON_FETCHABLE_SCHEMES
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let mut resolved = base.join(reference).ok()?;
    if resolved.scheme() != "http" && resolved.scheme() != "https" {
        return None;
    }
    if resolved.host_str().map_or(true, str::is_empty) {
        return None;
    }

    resolved.set_fragment(None);
    Some(resolved)
}

/// Decodes the character references that commonly appear in attribute values
///
/// Unknown named references are left untouched.
pub fn decode_entities(value: &str) -> Cow<'_, str> {
    if !value.contains('&') {
        return Cow::Borrowed(value);
    }

    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        match entity_at(rest) {
            Some((c, consumed)) => {
                out.push(c);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}

/// Byte offset in a raw attribute value where its `#fragment` starts
///
/// Character references are decoded while looking, so the `#` of `&#38;` is
/// not taken for a fragment while `&#35;` (an encoded `#`) is.
pub fn fragment_offset(value: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(c) = value[offset..].chars().next() {
        let (decoded, consumed) = match c {
            '&' => entity_at(&value[offset..]).unwrap_or(('&', 1)),
            _ => (c, c.len_utf8()),
        };
        if decoded == '#' {
            return Some(offset);
        }
        offset += consumed;
    }
    None
}

/// Decodes the character reference at the start of `rest`, if there is one,
/// returning the character and the number of bytes it spans
fn entity_at(rest: &str) -> Option<(char, usize)> {
    let end = rest.find(';').filter(|&end| end <= 10)?;
    decode_entity(&rest[1..end]).map(|c| (c, end + 1))
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = entity.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}
