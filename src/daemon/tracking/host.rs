use url::Url;

/// Returns the host a url should be accounted to, or `None` if the url isn't trackable: anything
/// that isn't http(s) (browser internals, `about:` pages, extension pages) and anything that
/// doesn't parse.
///
/// The host is returned exactly as it is spelled in the url, `https://Example.COM/` gives
/// `Example.COM`. Userinfo and port are dropped.
pub fn normalize_host(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let parsed_host = parsed.host_str().filter(|v| !v.is_empty())?;

    // The parser lowercases hosts. Keep the original spelling when it is the same host, fall back
    // to the parsed form for anything the parser had to rewrite (punycode, percent encoding).
    let host = written_host(url)
        .filter(|raw| raw.eq_ignore_ascii_case(parsed_host))
        .unwrap_or(parsed_host);
    Some(host.to_owned())
}

/// Host part of the authority as it appears in the input.
fn written_host(url: &str) -> Option<&str> {
    let (_, rest) = url.trim().split_once("://")?;
    let authority = rest.split(['/', '\\', '?', '#']).next()?;
    let host_and_port = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);

    if host_and_port.starts_with('[') {
        return host_and_port
            .find(']')
            .map(|end| &host_and_port[..=end]);
    }
    Some(
        host_and_port
            .split_once(':')
            .map_or(host_and_port, |(host, _)| host),
    )
}
