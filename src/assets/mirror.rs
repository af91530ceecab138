//! Mirror list construction (§4.4.1 step 2): https-only, deduplicated,
//! order-preserving.

use std::collections::HashSet;

use url::Url;

/// Parse and filter a list of candidate mirror base URLs down to the
/// https-only, de-duplicated set, preserving first-seen order. Entries that
/// fail to parse or use a non-https scheme are silently dropped; callers are
/// expected to check the result for emptiness.
pub fn build_mirror_list(bases: &[String]) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for raw in bases {
        let Ok(parsed) = Url::parse(raw) else { continue };
        if parsed.scheme() != "https" {
            continue;
        }
        let key = normalize(&parsed);
        if seen.insert(key) {
            out.push(parsed);
        }
    }

    out
}

fn normalize(url: &Url) -> String {
    let mut s = url.as_str().to_string();
    while s.ends_with('/') {
        s.pop();
    }
    s.to_ascii_lowercase()
}
