/// Flesch-Kincaid grade level of `text`, rounded to one decimal.
///
/// `None` when the text holds no words.
pub fn flesch_kincaid_grade(text: &str) -> Option<f64> {
    let words: Vec<&str> = text
        .split_whitespace()
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|word| word.chars().any(char::is_alphabetic))
        .collect();
    if words.is_empty() {
        return None;
    }

    let sentences = text
        .split(['.', '!', '?'])
        .filter(|chunk| chunk.chars().any(char::is_alphabetic))
        .count()
        .max(1);
    let syllables: usize = words.iter().map(|word| syllables(word)).sum();

    let words_per_sentence = words.len() as f64 / sentences as f64;
    let syllables_per_word = syllables as f64 / words.len() as f64;
    let grade = 0.39 * words_per_sentence + 11.8 * syllables_per_word - 15.59;
    Some((grade * 10.0).round() / 10.0)
}

/// Vowel-group estimate; at least one per word.
fn syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let is_vowel = |c: char| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');

    let mut count = 0;
    let mut previous_vowel = false;
    for c in lower.chars() {
        let vowel = is_vowel(c);
        if vowel && !previous_vowel {
            count += 1;
        }
        previous_vowel = vowel;
    }

    let chars: Vec<char> = lower.chars().collect();
    let silent_e = match chars.as_slice() {
        [.., before, 'l', 'e'] => is_vowel(*before),
        [.., before, 'e'] => !is_vowel(*before),
        _ => false,
    };
    if silent_e && count > 1 {
        count -= 1;
    }
    count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_vowel_groups() {
        assert_eq!(syllables("cat"), 1);
        assert_eq!(syllables("the"), 1);
        assert_eq!(syllables("make"), 1);
        assert_eq!(syllables("table"), 2);
        assert_eq!(syllables("beautiful"), 3);
        assert_eq!(syllables("Rhythm"), 1);
    }

    #[test]
    fn short_plain_sentences_score_low() {
        assert_eq!(flesch_kincaid_grade("The cat sat."), Some(-2.6));
    }

    #[test]
    fn long_words_and_sentences_score_higher() {
        let plain = flesch_kincaid_grade("The dog ran. The cat sat. We had fun.").unwrap();
        let dense = flesch_kincaid_grade(
            "Comprehensive organizational documentation facilitates considerably \
             improved interdepartmental communication and institutional accountability.",
        )
        .unwrap();
        assert!(dense > plain + 10.0, "{dense} vs {plain}");
    }

    #[test]
    fn text_without_words_has_no_grade() {
        assert_eq!(flesch_kincaid_grade(""), None);
        assert_eq!(flesch_kincaid_grade("  42 -- 7 "), None);
    }
}
