use url::Url;

/// Extracts the domain from a URL
///
/// Returns the lowercase host portion, or `None` if the URL has no host.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the site a URL belongs to: its host, plus the port when it is
/// not the scheme's default
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::extract_site;
///
/// let url = Url::parse("https://Example.com:443/").unwrap();
/// assert_eq!(extract_site(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://example.com:8080/").unwrap();
/// assert_eq!(extract_site(&url), Some("example.com:8080".to_string()));
/// ```
pub fn extract_site(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host,
    })
}

/// Returns true if `url` is on exactly the same site as the root
///
/// `root_site` is a host, optionally followed by `:port` (see
/// [`extract_site`]). There is no subdomain generalization:
/// `blog.example.com` is not the same site as `example.com`, and neither is
/// `example.com:8080`. The scheme is ignored.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use sumi_mirror::url::is_same_domain;
///
/// let url = Url::parse("https://example.com/about.html").unwrap();
/// assert!(is_same_domain(&url, "example.com"));
/// assert!(!is_same_domain(&url, "www.example.com"));
/// assert!(!is_same_domain(&url, "example.com:8080"));
/// ```
pub fn is_same_domain(url: &Url, root_site: &str) -> bool {
    extract_site(url).map_or(false, |site| site == root_site.to_lowercase())
}
