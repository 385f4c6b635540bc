//! Slug helpers.

/// Turn arbitrary text into a URL-safe slug.
///
/// Letters and digits are lowercased and kept; every other run of
/// characters becomes a single `-`. Leading and trailing dashes are
/// dropped.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_dash = false;
    for c in text.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}
