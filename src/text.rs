//! Artist-name canonicalization shared by matching and classification.

const LEADING_ARTICLES: [&str; 3] = ["the", "a", "an"];
const PLATFORM_LABEL_NOISE: [&str; 4] = [" | Spotify", "Album by ", "EP by ", "Single by "];

/// Collapses runs of whitespace into single spaces and trims both ends.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonical comparison form of an artist name.
///
/// Lowercases, drops punctuation, turns separators into spaces, collapses
/// whitespace and removes leading articles. Letters with diacritics are kept
/// as-is. Normalizing an already normalized value returns it unchanged.
pub fn normalize(value: &str) -> String {
    let mut cleaned = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_alphanumeric() {
            cleaned.extend(ch.to_lowercase());
        } else if ch.is_whitespace() || matches!(ch, '-' | '_' | '/' | '+') {
            cleaned.push(' ');
        }
    }

    let mut tokens: Vec<&str> = cleaned.split_whitespace().collect();
    while tokens.len() > 1 && LEADING_ARTICLES.contains(&tokens[0]) {
        tokens.remove(0);
    }
    tokens.join(" ")
}

/// Lowercase alphanumeric tokens of a raw name, without article stripping.
pub fn tokens(value: &str) -> Vec<String> {
    value
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `needle` occurs in `haystack` on word boundaries.
///
/// Both arguments are expected in normalized form.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if haystack.is_empty() || needle.is_empty() {
        return false;
    }
    let padded_haystack = format!(" {haystack} ");
    let padded_needle = format!(" {needle} ");
    padded_haystack.contains(&padded_needle)
}

/// Strips storefront decorations that leak into artist labels scraped from
/// page titles ("Album by X", "X | Spotify").
pub fn clean_artist_label(value: &str) -> String {
    let mut cleaned = value.to_string();
    for noise in PLATFORM_LABEL_NOISE {
        cleaned = cleaned.replace(noise, "");
    }
    collapse_whitespace(&cleaned)
}

/// Minimal HTML entity decoding for scraped attribute and text values.
pub fn decode_html_entities(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';').filter(|end| *end <= 10) else {
            out.push('&');
            rest = &tail[1..];
            continue;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some(' '),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| {
                    entity
                        .strip_prefix('#')
                        .and_then(|dec| dec.parse::<u32>().ok())
                })
                .and_then(char::from_u32),
        };
        match decoded {
            Some(ch) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
