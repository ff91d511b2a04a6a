use url::Url;

/// Host used to key stored credentials: lowercase, without `www.`.
/// Local files are keyed by their file name.
pub fn minimized_host(raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url).ok()?;
    if url.scheme() == "file" {
        return url
            .path_segments()?
            .filter(|s| !s.is_empty())
            .last()
            .map(str::to_string);
    }
    let host = url.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_www_prefix() {
        assert_eq!(minimized_host("https://www.Example.com/login?next=/").as_deref(), Some("example.com"));
        assert_eq!(minimized_host("https://accounts.example.com/").as_deref(), Some("accounts.example.com"));
    }

    #[test]
    fn file_urls_use_last_path_component() {
        assert_eq!(minimized_host("file:///tmp/forms/login.html?x=1").as_deref(), Some("login.html"));
    }

    #[test]
    fn unparsable_url_has_no_host() {
        assert_eq!(minimized_host("not a url"), None);
        assert_eq!(minimized_host("about:blank"), None);
    }
}
