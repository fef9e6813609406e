use url::Url;

/// Normalize a raw URL into its canonical string form.
///
/// Rules, in order:
/// - parse; reject anything that is not http/https
/// - lowercase the host and drop default ports (the `url` crate does both on parse)
/// - drop the fragment
/// - remove query parameters whose lowercased name is in `ignore_params`
/// - sort the remaining query parameters by name (stable) and re-encode them
/// - strip the trailing slash from the path, unless the path is exactly "/"
///
/// Returns `None` for URLs that cannot be canonicalized.
pub fn normalize(raw: &str, ignore_params: &[String]) -> Option<String> {
    let parsed = Url::parse(raw).ok()?;
    normalize_url(parsed, ignore_params)
}

/// Resolve a candidate href against a base URL using standard URI resolution.
pub fn resolve(href: &str, base: &str) -> Option<Url> {
    let base = Url::parse(base).ok()?;
    base.join(href).ok()
}

/// Resolve an href against a base URL, then normalize the result.
pub fn resolve_and_normalize(href: &str, base: &str, ignore_params: &[String]) -> Option<String> {
    let joined = resolve(href, base)?;
    normalize_url(joined, ignore_params)
}

/// Whether a normalized URL is internal to the crawled site.
///
/// Internal iff the host equals the base domain, or `include_subdomains` is
/// set and the host is a subdomain of it. Case-insensitive on both sides.
pub fn is_internal(url: &str, base_domain: &str, include_subdomains: bool) -> bool {
    let host = match Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_lowercase())) {
        Some(h) => h,
        None => return false,
    };
    let base = base_domain.to_lowercase();
    host == base || (include_subdomains && host.ends_with(&format!(".{base}")))
}

fn normalize_url(mut parsed: Url, ignore_params: &[String]) -> Option<String> {
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }

    parsed.set_fragment(None);

    // Filter the ignore set, then sort the survivors by name. Vec::sort_by is
    // stable, so parameters sharing a name keep their relative order.
    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .filter(|(k, _)| {
            let name = k.to_lowercase();
            !ignore_params.iter().any(|p| p.to_lowercase() == name)
        })
        .collect();
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let mut serializer = parsed.query_pairs_mut();
        serializer.clear();
        for (k, v) in &pairs {
            serializer.append_pair(k, v);
        }
        drop(serializer);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(&path[..path.len() - 1]);
    }

    Some(parsed.to_string())
}
