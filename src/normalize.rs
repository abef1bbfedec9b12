// 🧹 Name Normalizer - canonical comparison form for entity names
//
// "ACME Holdings, Inc." and "Acme Holdings" must compare equal: legal
// suffixes and punctuation carry no identity signal in public records.

/// Organizational suffix tokens stripped during normalization.
/// Matched as whole words, case-insensitive. Note: abbreviations only —
/// spelled-out forms like "incorporated" are NOT stripped.
const SUFFIX_TOKENS: [&str; 10] = [
    "inc",
    "llc",
    "corp",
    "ltd",
    "co",
    "foundation",
    "fund",
    "association",
    "committee",
    "pac",
];

/// Normalize an entity name into its canonical comparison form.
///
/// - Lowercase
/// - Strip punctuation (`. , ' " ( ) & # *`); `-` and `/` become spaces
/// - Drop organizational suffix tokens (whole words)
/// - Collapse whitespace, trim
///
/// Pure and total: always returns a string, possibly empty.
pub fn normalize(name: &str) -> String {
    let mut cleaned = String::with_capacity(name.len());

    for c in name.to_lowercase().chars() {
        match c {
            '.' | ',' | '\'' | '"' | '(' | ')' | '&' | '#' | '*' => {}
            '-' | '/' => cleaned.push(' '),
            _ => cleaned.push(c),
        }
    }

    cleaned
        .split_whitespace()
        .filter(|word| !SUFFIX_TOKENS.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_legal_suffixes() {
        assert_eq!(normalize("Acme Inc."), "acme");
        assert_eq!(normalize("Acme Corp"), "acme");
        assert_eq!(normalize("Acme LLC"), "acme");
        assert_eq!(normalize("Smith Family Foundation"), "smith family");
    }

    #[test]
    fn test_spelled_out_suffixes_are_kept() {
        // Only the abbreviation list is stripped
        assert_eq!(normalize("ACME INCORPORATED"), "acme incorporated");
        assert_eq!(normalize("Acme Corporation"), "acme corporation");
    }

    #[test]
    fn test_suffix_tokens_removed_anywhere() {
        // Whole-word matching, not just trailing position
        assert_eq!(normalize("Committee to Elect Jane Smith"), "to elect jane smith");
        assert_eq!(normalize("Acme Inc Holdings"), "acme holdings");
    }

    #[test]
    fn test_punctuation_and_whitespace() {
        assert_eq!(normalize("  Jane    Smith "), "jane smith");
        assert_eq!(normalize("O'Brien & Sons"), "obrien sons");
        assert_eq!(normalize("Smith-Jones / Partners"), "smith jones partners");
        assert_eq!(normalize("A.C.L.U"), "aclu");
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(normalize("JANE SMITH"), normalize("jane smith"));
    }

    #[test]
    fn test_whole_word_only() {
        // "inc" inside a word is not a suffix token
        assert_eq!(normalize("Incline Village"), "incline village");
        assert_eq!(normalize("Pacifica"), "pacifica");
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("..."), "");
        assert_eq!(normalize("Inc. LLC Corp"), "");
    }
}
