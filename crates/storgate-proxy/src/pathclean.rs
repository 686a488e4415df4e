//! URL path canonicalization.
//!
//! Runs before any routing decision so `..` segments and duplicate slashes
//! cannot dodge the per-path mediation rules.

/// Canonicalizes a request path: collapses duplicate slashes, resolves `.`
/// and `..` segments, preserves a trailing slash, and never escapes the
/// root.
pub fn clean_path(path: &str) -> String {
    let trailing_slash = path.len() > 1 && path.ends_with('/');
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut cleaned = String::with_capacity(path.len());
    for segment in &segments {
        cleaned.push('/');
        cleaned.push_str(segment);
    }
    if trailing_slash {
        cleaned.push('/');
    }
    cleaned
}
