//! Token-set similarity on a 0–100 scale.

use std::collections::BTreeSet;

/// Lowercases, turns every non-alphanumeric character into a space and
/// collapses whitespace.
pub fn normalize(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Edit-distance ratio of two already-normalized strings, 0–100.
pub fn ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 100.0;
    }
    strsim::normalized_levenshtein(a, b) * 100.0
}

/// Token-set ratio: compares the shared tokens against each side's full
/// token set, so word order and extra words on one side cost little.
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    let a = normalize(a);
    let b = normalize(b);
    let tokens_a: BTreeSet<&str> = a.split_whitespace().collect();
    let tokens_b: BTreeSet<&str> = b.split_whitespace().collect();
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let join = |tokens: Vec<&str>| tokens.join(" ");
    let sect = join(tokens_a.intersection(&tokens_b).copied().collect());
    let diff_ab = join(tokens_a.difference(&tokens_b).copied().collect());
    let diff_ba = join(tokens_b.difference(&tokens_a).copied().collect());

    if !sect.is_empty() && (diff_ab.is_empty() || diff_ba.is_empty()) {
        return 100.0;
    }

    let combine = |diff: &str| {
        if sect.is_empty() {
            diff.to_string()
        } else {
            format!("{sect} {diff}")
        }
    };
    let combined_ab = combine(&diff_ab);
    let combined_ba = combine(&diff_ba);

    let mut best = ratio(&combined_ab, &combined_ba);
    if !sect.is_empty() {
        best = best
            .max(ratio(&sect, &combined_ab))
            .max(ratio(&sect, &combined_ba));
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("  J. Lillvis, et-al!  "), "j lillvis et al");
        assert_eq!(normalize("Ünïcode Title"), "ünïcode title");
    }

    #[test]
    fn reordered_tokens_score_100() {
        assert_eq!(
            token_set_ratio("Lillvis J Stern D axon guidance", "J. Lillvis D. Stern Axon Guidance"),
            100.0
        );
    }

    #[test]
    fn subset_scores_100() {
        assert_eq!(token_set_ratio("axon guidance", "axon guidance in drosophila"), 100.0);
    }

    #[test]
    fn unrelated_titles_score_low() {
        let score = token_set_ratio(
            "Smith Jones Cryo-EM structure of a bacterial transporter",
            "Lillvis Stern Axon guidance in Drosophila",
        );
        assert!(score < 60.0, "score was {score}");
    }

    #[test]
    fn small_edits_score_high() {
        let score = token_set_ratio(
            "Lillvis Stern Axon guidance in the Drosophila visual system",
            "Lillvis Stern Axon guidance in the Drosophila visual systems",
        );
        assert!(score > 90.0 && score < 100.0, "score was {score}");
    }

    #[test]
    fn empty_input_scores_zero() {
        assert_eq!(token_set_ratio("", "anything"), 0.0);
        assert_eq!(token_set_ratio("!!!", "???"), 0.0);
    }

    #[test]
    fn symmetric() {
        let a = "Lillvis Stern neuronal wiring of the fly";
        let b = "Stern Lillvis neural wiring in flies";
        assert_eq!(token_set_ratio(a, b), token_set_ratio(b, a));
    }
}
