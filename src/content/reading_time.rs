//! Reading time estimation

use super::post::ContentSection;
use super::rich_text;

pub const DEFAULT_WORDS_PER_MINUTE: usize = 200;

/// Count whitespace-separated words
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Estimate how many minutes it takes to read `sections`.
///
/// Body words (the text of every body block across all sections) and
/// heading words are counted separately, summed, and divided by
/// `words_per_minute`, rounding up. A post without words reads in 0
/// minutes.
pub fn estimate_reading_minutes(sections: &[ContentSection], words_per_minute: usize) -> u32 {
    let body_words = count_words(&rich_text::as_text(
        sections.iter().flat_map(|s| s.body.iter()),
    ));
    let heading_words: usize = sections
        .iter()
        .filter_map(|s| s.heading.as_deref())
        .map(count_words)
        .sum();

    let words_per_minute = if words_per_minute == 0 {
        DEFAULT_WORDS_PER_MINUTE
    } else {
        words_per_minute
    };
    (body_words + heading_words).div_ceil(words_per_minute) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::RichTextBlock;

    fn words(n: usize) -> String {
        vec!["palavra"; n].join(" ")
    }

    fn section(heading: Option<&str>, body: &[&str]) -> ContentSection {
        ContentSection {
            heading: heading.map(str::to_string),
            body: body.iter().map(|t| RichTextBlock::paragraph(t)).collect(),
        }
    }

    #[test]
    fn test_exact_boundaries() {
        let two_hundred = words(200);
        let s = vec![section(None, &[&two_hundred])];
        assert_eq!(estimate_reading_minutes(&s, 200), 1);

        let two_hundred_one = words(201);
        let s = vec![section(None, &[&two_hundred_one])];
        assert_eq!(estimate_reading_minutes(&s, 200), 2);
    }

    #[test]
    fn test_headings_count() {
        let body = words(199);
        let s = vec![section(Some("Introdução ao tema"), &[&body])];
        assert_eq!(estimate_reading_minutes(&s, 200), 2);
    }

    #[test]
    fn test_words_across_sections_and_blocks() {
        let a = words(150);
        let b = words(150);
        let s = vec![section(Some("Um"), &[&a]), section(None, &[&b, "  "])];
        assert_eq!(estimate_reading_minutes(&s, 200), 2);
        assert_eq!(estimate_reading_minutes(&s, 301), 1);
    }

    #[test]
    fn test_empty_post() {
        assert_eq!(estimate_reading_minutes(&[], 200), 0);
        let s = vec![section(None, &["", "   "])];
        assert_eq!(estimate_reading_minutes(&s, 200), 0);
    }

    #[test]
    fn test_zero_rate_uses_default() {
        let body = words(201);
        let s = vec![section(None, &[&body])];
        assert_eq!(estimate_reading_minutes(&s, 0), 2);
    }

    #[test]
    fn test_monotonic_in_word_count() {
        let mut previous = 0;
        for n in 0..1000 {
            let body = words(n);
            let s = vec![section(None, &[&body])];
            let minutes = estimate_reading_minutes(&s, 200);
            assert!(minutes >= previous, "{} words gave {} < {}", n, minutes, previous);
            previous = minutes;
        }
    }

    #[test]
    fn test_count_words() {
        assert_eq!(count_words("  Lorem\tipsum\n dolor "), 3);
        assert_eq!(count_words(""), 0);
    }
}
