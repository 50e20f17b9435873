// src/util.rs — Small text helpers shared across modules

/// Single-line preview for logs: whitespace collapsed, cut to `max_chars`
/// characters with a trailing ellipsis.
pub fn preview(s: &str, max_chars: usize) -> String {
    let collapsed = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// At most `max_chars` characters of `s`, cut on a char boundary.
pub fn take_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Non-empty entries joined by newlines, first occurrence wins.
pub fn join_distinct<'a>(items: impl IntoIterator<Item = &'a str>) -> String {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty() && seen.insert(*s))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preview_short_untouched() {
        assert_eq!(preview("hello", 10), "hello");
    }

    #[test]
    fn test_preview_collapses_and_cuts() {
        assert_eq!(preview("be\n  very   brief", 7), "be very…");
    }

    #[test]
    fn test_take_chars_multibyte() {
        assert_eq!(take_chars("café au lait", 4), "café");
        assert_eq!(take_chars("abc", 10), "abc");
        assert_eq!(take_chars("abc", 0), "");
    }

    #[test]
    fn test_join_distinct() {
        let joined = join_distinct(["too long", "", "unclear", "too long ", "  "]);
        assert_eq!(joined, "too long\nunclear");
    }
}
