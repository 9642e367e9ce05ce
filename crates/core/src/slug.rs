//! URL-safe application slugs.

use std::collections::HashSet;

/// Lowercase `name`, collapsing every run of non-alphanumeric characters into one `-`.
pub fn slugify(name: &str) -> crate::Result<String> {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        return Err(crate::Error::InvalidSlug(format!(
            "'{name}' has no alphanumeric characters"
        )));
    }
    Ok(slug)
}

/// First free slug among `base`, `base-1`, `base-2`, ...
pub fn unique_slug<S: AsRef<str>>(base: &str, existing: &[S]) -> String {
    let taken: HashSet<&str> = existing.iter().map(AsRef::as_ref).collect();
    if !taken.contains(base) {
        return base.to_string();
    }

    (1..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}
