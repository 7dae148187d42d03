use url::Url;

/// Outcome of normalizing a raw asset reference against a base URL.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Fully-resolved absolute URL, usable as a deduplication key.
    Canonical(Url),
    /// Not fetchable: `data:` payload, same-document fragment, non-HTTP
    /// scheme, or a string that does not parse as a URL.
    Skip,
}

/// Resolve a reference as found in HTML or CSS into its canonical absolute
/// form. References discovered inside a stylesheet must pass the
/// stylesheet's own URL as `base`, not the page URL.
pub fn resolve(reference: &str, base: &Url) -> Resolution {
    let reference = reference.trim();
    if reference.is_empty()
        || reference.starts_with('#')
        || reference.starts_with("data:")
    {
        return Resolution::Skip;
    }

    let resolved = if reference.starts_with("http://") || reference.starts_with("https://") {
        Url::parse(reference)
    } else if let Some(rest) = reference.strip_prefix("//") {
        // Protocol-relative: inherit the base scheme
        Url::parse(&format!("{}://{}", base.scheme(), rest))
    } else {
        base.join(reference)
    };

    match resolved {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Resolution::Canonical(url),
        _ => Resolution::Skip,
    }
}
