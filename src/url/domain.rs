use std::collections::HashSet;
use std::path::Path;
use url::Url;

/// Multi-label public suffixes (`co.uk`, `com.au`) that count as part of a domain
///
/// Loaded from a plain text file with one suffix per line. Blank lines and lines
/// starting with `//` are ignored.
#[derive(Debug, Clone, Default)]
pub struct TldList {
    suffixes: HashSet<String>,
}

impl TldList {
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let suffixes = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with("//"))
            .map(str::to_lowercase)
            .collect();
        Self { suffixes }
    }

    pub fn contains(&self, suffix: &str) -> bool {
        self.suffixes.contains(suffix)
    }

    pub fn len(&self) -> usize {
        self.suffixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suffixes.is_empty()
    }
}

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use nanocrawl::url::extract_host;
///
/// let url = Url::parse("https://EXAMPLE.COM:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Splits a host into its registrable domain and the subdomain in front of it
///
/// The domain is the last two labels, or the last three when the last two form a
/// suffix listed in `tld_list`. Hosts with two labels or fewer have no subdomain.
///
/// # Examples
///
/// ```
/// use nanocrawl::url::{split_host, TldList};
///
/// let tlds = TldList::parse("co.uk");
/// assert_eq!(split_host("news.bbc.co.uk", &tlds), ("bbc.co.uk".to_string(), "news".to_string()));
/// assert_eq!(split_host("a.b.example.com", &tlds), ("example.com".to_string(), "a.b".to_string()));
/// ```
pub fn split_host(host: &str, tld_list: &TldList) -> (String, String) {
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() <= 2 {
        return (host.to_string(), String::new());
    }

    let n = parts.len();
    let mut domain = format!("{}.{}", parts[n - 2], parts[n - 1]);
    let mut limit = 2;
    if tld_list.contains(&domain) {
        domain = format!("{}.{}", parts[n - 3], domain);
        limit = 3;
    }

    let sub_domain = parts[..n - limit].join(".");
    (domain, sub_domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_host_lowercases() {
        let url = Url::parse("https://Example.COM/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_host_ignores_port() {
        let url = Url::parse("http://127.0.0.1:8080/").unwrap();
        assert_eq!(extract_host(&url), Some("127.0.0.1".to_string()));
    }

    #[test]
    fn test_split_two_labels() {
        let tlds = TldList::default();
        assert_eq!(
            split_host("example.com", &tlds),
            ("example.com".to_string(), String::new())
        );
    }

    #[test]
    fn test_split_subdomain() {
        let tlds = TldList::default();
        assert_eq!(
            split_host("www.example.com", &tlds),
            ("example.com".to_string(), "www".to_string())
        );
        assert_eq!(
            split_host("api.v2.example.com", &tlds),
            ("example.com".to_string(), "api.v2".to_string())
        );
    }

    #[test]
    fn test_split_with_multi_label_suffix() {
        let tlds = TldList::parse("co.uk\ncom.au");
        assert_eq!(
            split_host("www.bbc.co.uk", &tlds),
            ("bbc.co.uk".to_string(), "www".to_string())
        );
        assert_eq!(
            split_host("shop.example.com.au", &tlds),
            ("example.com.au".to_string(), "shop".to_string())
        );
    }

    #[test]
    fn test_suffix_not_listed_is_treated_as_domain() {
        let tlds = TldList::default();
        assert_eq!(
            split_host("www.bbc.co.uk", &tlds),
            ("co.uk".to_string(), "www.bbc".to_string())
        );
    }

    #[test]
    fn test_tld_list_parse_skips_comments_and_blanks() {
        let tlds = TldList::parse("// header\n\nco.uk\n  CO.JP  \n// trailing");
        assert_eq!(tlds.len(), 2);
        assert!(tlds.contains("co.uk"));
        assert!(tlds.contains("co.jp"));
        assert!(!tlds.contains("// header"));
    }
}
