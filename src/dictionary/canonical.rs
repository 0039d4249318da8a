use unicode_normalization::UnicodeNormalization;

/// Canonicalizes source text for dictionary keys: Unicode NFKC, trim,
/// collapse internal whitespace. Case is preserved unless `fold_case` is
/// set (per-pair option, default off per §4.4).
#[must_use]
pub fn canonicalize(text: &str, fold_case: bool) -> String {
    let normalized: String = text.nfkc().collect();
    let collapsed = collapse_whitespace(normalized.trim());
    if fold_case {
        collapsed.to_lowercase()
    } else {
        collapsed
    }
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}
