//! Production-filename sanitization for the move-to-production endpoint
//! (§6): strip extension, NFKD-normalize, drop non-ASCII, replace non-word
//! characters with `_`, lowercase.

use std::path::Path;

use unicode_normalization::UnicodeNormalization;

pub fn sanitize_filename(original: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original);

    let decomposed: String = stem.nfkd().collect();
    let ascii_only: String = decomposed.chars().filter(char::is_ascii).collect();
    let replaced: String = ascii_only
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    replaced.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_extension_and_lowercases() {
        assert_eq!(sanitize_filename("My Channel Final.MP4"), "my_channel_final");
    }

    #[test]
    fn drops_accents_via_nfkd_decomposition() {
        assert_eq!(sanitize_filename("caf\u{00e9}.mp4"), "cafe");
    }

    #[test]
    fn replaces_non_word_runs_individually() {
        assert_eq!(sanitize_filename("a/b c!d.mov"), "a_b_c_d");
    }
}
