//! Fuzzy artist-name similarity in the 0..=100 range.

use std::collections::BTreeSet;

use crate::text;

/// Threshold for judging two names to be the same entity.
pub const SAME_ENTITY_THRESHOLD: u8 = 85;
/// Threshold for dropping related artists that are name variants of the seed.
pub const CONFUSABLE_THRESHOLD: u8 = 90;

fn levenshtein_score(left: &str, right: &str) -> u8 {
    if left.is_empty() || right.is_empty() {
        return 0;
    }
    (strsim::normalized_levenshtein(left, right) * 100.0).round() as u8
}

/// Character-level similarity of the normalized names.
pub fn ratio(left: &str, right: &str) -> u8 {
    levenshtein_score(&text::normalize(left), &text::normalize(right))
}

/// Order-independent token overlap similarity of the raw names.
///
/// Compares the shared tokens against each side's full token set, so
/// reordered names score 100.
pub fn token_set_ratio(left: &str, right: &str) -> u8 {
    let left_tokens: BTreeSet<String> = text::tokens(left).into_iter().collect();
    let right_tokens: BTreeSet<String> = text::tokens(right).into_iter().collect();
    if left_tokens.is_empty() || right_tokens.is_empty() {
        return 0;
    }

    let join = |tokens: Vec<&String>| {
        tokens
            .into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    };
    let shared = join(left_tokens.intersection(&right_tokens).collect());
    let left_only = join(left_tokens.difference(&right_tokens).collect());
    let right_only = join(right_tokens.difference(&left_tokens).collect());

    let combine = |rest: &str| {
        if shared.is_empty() {
            rest.to_string()
        } else if rest.is_empty() {
            shared.clone()
        } else {
            format!("{shared} {rest}")
        }
    };
    let left_combined = combine(&left_only);
    let right_combined = combine(&right_only);

    [
        levenshtein_score(&shared, &left_combined),
        levenshtein_score(&shared, &right_combined),
        levenshtein_score(&left_combined, &right_combined),
    ]
    .into_iter()
    .max()
    .unwrap_or(0)
}

/// Whether one name's words are a strict subset of the other's
/// ("Decapitation" inside "Cattle Decapitation").
fn is_partial_containment(left: &str, right: &str) -> bool {
    let left_count = left.split_whitespace().count();
    let right_count = right.split_whitespace().count();
    if left_count == right_count {
        return false;
    }
    let (shorter, longer) = if left_count < right_count {
        (left, right)
    } else {
        (right, left)
    };
    text::contains_phrase(longer, shorter)
        || shorter
            .split_whitespace()
            .all(|word| longer.split_whitespace().any(|other| other == word))
}

/// Combined same-entity score of two artist names.
///
/// A shorter name contained word-for-word inside a longer one is treated as
/// a likely mismatch: token overlap is ignored and only the character ratio
/// counts.
pub fn match_score(left: &str, right: &str) -> u8 {
    let normalized_left = text::normalize(left);
    let normalized_right = text::normalize(right);
    if normalized_left.is_empty() || normalized_right.is_empty() {
        return 0;
    }
    if normalized_left == normalized_right {
        return 100;
    }

    let char_ratio = levenshtein_score(&normalized_left, &normalized_right);
    if is_partial_containment(&normalized_left, &normalized_right) {
        return char_ratio;
    }
    char_ratio.max(token_set_ratio(left, right))
}

/// Whether two artist names likely refer to the same entity.
pub fn are_similar(left: &str, right: &str, threshold: u8) -> bool {
    let score = match_score(left, right);
    score > 0 && score >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_are_similar_rejects_word_contained_in_longer_name() {
        assert!(!are_similar("Cattle Decapitation", "Decapitation", 90));
        assert!(!are_similar("Decapitation", "Cattle Decapitation", 85));
    }

    #[test]
    fn test_are_similar_accepts_case_variants() {
        assert!(are_similar("Darkthrone", "darkthrone", 85));
        assert!(are_similar("The Black Dahlia Murder", "Black Dahlia Murder", 90));
    }

    #[test]
    fn test_are_similar_accepts_minor_spelling_variants() {
        assert!(are_similar("Mgla", "Mgła", 70));
        assert!(are_similar("Dying Fetus", "Dying Foetus", 85));
    }

    #[test]
    fn test_are_similar_rejects_unrelated_names() {
        assert!(!are_similar("Cannibal Corpse", "Dying Fetus", 85));
        assert!(!are_similar("", "Dying Fetus", 0));
    }

    #[test]
    fn test_token_set_ratio_is_order_insensitive() {
        assert_eq!(
            token_set_ratio("Death, Cannibal Corpse", "Cannibal Corpse Death"),
            100
        );
        assert!(are_similar("Death, Cannibal Corpse", "Cannibal Corpse Death", 90));
    }

    #[test]
    fn test_match_score_ignores_token_overlap_for_contained_names() {
        assert_eq!(token_set_ratio("Cattle Decapitation", "Decapitation"), 100);
        assert!(match_score("Cattle Decapitation", "Decapitation") < 70);
        assert_eq!(match_score("Darkthrone", "DARKTHRONE"), 100);
    }

    #[test]
    fn test_ratio_bounds() {
        assert_eq!(ratio("Obituary", "obituary"), 100);
        assert_eq!(ratio("", "obituary"), 0);
        assert!(ratio("Obituary", "Entombed") < 50);
    }
}
