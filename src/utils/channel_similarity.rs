//! Channel name similarity scoring for fuzzy catalog search
//!
//! Names are normalized (lowercased, punctuation stripped, tokenized) and
//! compared with a token-set ratio: the shared tokens are compared against
//! each side's full token set, so "BBC One Lon" scores highly against
//! "BBC One" while word order and extra qualifiers matter little.

use std::collections::BTreeSet;

/// Lowercase `name` and split it into alphanumeric tokens
pub fn tokenize(name: &str) -> BTreeSet<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Token-set similarity between two names in `0.0..=1.0`
///
/// Returns 0.0 if either side has no tokens.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens_a = tokenize(a);
    let tokens_b = tokenize(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let join = |tokens: Vec<&String>| -> String {
        tokens
            .into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    };

    let common = join(tokens_a.intersection(&tokens_b).collect());
    let only_a = join(tokens_a.difference(&tokens_b).collect());
    let only_b = join(tokens_b.difference(&tokens_a).collect());

    let combined_a = [common.as_str(), only_a.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");
    let combined_b = [common.as_str(), only_b.as_str()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    let mut best = strsim::normalized_levenshtein(&combined_a, &combined_b);
    if !common.is_empty() {
        best = best
            .max(strsim::normalized_levenshtein(&common, &combined_a))
            .max(strsim::normalized_levenshtein(&common, &combined_b));
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation() {
        let tokens = tokenize("BBC One (Lon)+1");
        let expected: BTreeSet<String> = ["bbc", "one", "lon", "1"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_subset_scores_perfectly() {
        assert_eq!(token_set_ratio("BBC One", "BBC One Lon"), 1.0);
        assert_eq!(token_set_ratio("one bbc", "BBC ONE"), 1.0);
    }

    #[test]
    fn test_ranking_prefers_closer_names() {
        let close = token_set_ratio("BBC One", "BBC One HD");
        let far = token_set_ratio("BBC One", "UCB Ireland");
        assert!(close > far);
        assert!(far < 0.5);
    }

    #[test]
    fn test_empty_names_score_zero() {
        assert_eq!(token_set_ratio("", "BBC One"), 0.0);
        assert_eq!(token_set_ratio("!!!", "BBC One"), 0.0);
    }
}
