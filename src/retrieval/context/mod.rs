
/// Greedily join ranked passages into a context of at most `max_chars`
/// characters.
///
/// Passages are trimmed and taken in order. Each accepted passage also
/// reserves room for the separator that would follow it, and packing stops
/// at the first passage that does not fit: a shorter passage further down
/// the ranking is never pulled forward. Passages that are empty after
/// trimming still take up a separator.
#[inline]
pub fn pack_context<S: AsRef<str>>(passages: &[S], max_chars: usize, separator: &str) -> String {
    let separator_len = separator.chars().count();
    let mut used = 0;
    let mut selected = Vec::new();

    for passage in passages {
        let text = passage.as_ref().trim();
        let len = text.chars().count();
        if used + len > max_chars {
            break;
        }
        used += len + separator_len;
        selected.push(text);
    }

    selected.join(separator)
}
