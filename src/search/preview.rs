use serde::Serialize;

/// One line of a file that literally contains the query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMatch {
    /// 1-based
    pub line_number: usize,
    pub content: String,
    pub preview: String,
}

/// Case-insensitive char offset of `needle` in `haystack`
pub fn find_ignore_case(haystack: &[char], needle: &[char]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&start| {
        haystack[start..start + needle.len()]
            .iter()
            .zip(needle)
            .all(|(a, b)| chars_eq_ignore_case(*a, *b))
    })
}

fn chars_eq_ignore_case(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

/// `context` chars on each side of the first match, trimmed, with `...` on
/// every side that was cut. Lines without a match come back trimmed.
pub fn context_preview(line: &str, query: &str, context: usize) -> String {
    let chars: Vec<char> = line.chars().collect();
    let needle: Vec<char> = query.chars().collect();
    match find_ignore_case(&chars, &needle) {
        Some(index) => preview_at(&chars, index, needle.len(), context),
        None => line.trim().to_string(),
    }
}

fn preview_at(chars: &[char], index: usize, needle_len: usize, context: usize) -> String {
    let start = index.saturating_sub(context);
    let end = (index + needle_len + context).min(chars.len());

    let window: String = chars[start..end].iter().collect();
    let mut preview = window.trim().to_string();
    if start > 0 {
        preview = format!("...{}", preview);
    }
    if end < chars.len() {
        preview.push_str("...");
    }
    preview
}

/// Scan `lines` for `query`; keeps the first `max_previews` matches and
/// returns the uncapped number of matching lines alongside.
pub fn collect_line_matches(
    lines: &[String],
    query: &str,
    max_previews: usize,
    context: usize,
) -> (Vec<LineMatch>, usize) {
    let needle: Vec<char> = query.chars().collect();
    let mut matches = Vec::new();
    let mut match_count = 0;

    for (i, line) in lines.iter().enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let Some(index) = find_ignore_case(&chars, &needle) else {
            continue;
        };
        match_count += 1;
        if matches.len() < max_previews {
            matches.push(LineMatch {
                line_number: i + 1,
                content: line.trim().to_string(),
                preview: preview_at(&chars, index, needle.len(), context),
            });
        }
    }

    (matches, match_count)
}
