//! Fuzzy launcher-name matching
//!
//! Desktop environments re-number copies of a launcher (`App.desktop`,
//! `App-2.desktop`, `App_17.desktop`). The normalized key drops that
//! trailing number so a restore request still finds its backup after
//! renumbering. Distinct launchers that legitimately end in digits
//! (`Python3.desktop` vs `Python.desktop`) collide; this is accepted.

use std::sync::OnceLock;

use regex::Regex;

fn numeric_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-_]?\d+$").expect("suffix pattern is valid"))
}

/// Matching key for `filename`; never written to disk
///
/// Names without `extension` are their own key.
pub fn normalized_key(filename: &str, extension: &str) -> String {
    let Some(stem) = filename.strip_suffix(extension) else {
        return filename.to_string();
    };

    let stripped = numeric_suffix().replace(stem, "");
    if stripped.trim_matches([' ', '-', '_']).is_empty() {
        return filename.to_string();
    }
    format!("{}{}", stripped, extension)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXT: &str = ".desktop";

    #[test]
    fn test_renumbered_copies_share_a_key() {
        assert_eq!(normalized_key("App-142.desktop", EXT), "App.desktop");
        assert_eq!(normalized_key("App-7.desktop", EXT), "App.desktop");
        assert_eq!(normalized_key("App_3.desktop", EXT), "App.desktop");
        assert_eq!(normalized_key("App.desktop", EXT), "App.desktop");
    }

    #[test]
    fn test_digits_without_separator_are_stripped() {
        assert_eq!(normalized_key("Python3.desktop", EXT), "Python.desktop");
    }

    #[test]
    fn test_all_digit_stem_keeps_original() {
        assert_eq!(normalized_key("2024.desktop", EXT), "2024.desktop");
        assert_eq!(normalized_key("-12.desktop", EXT), "-12.desktop");
    }

    #[test]
    fn test_other_extensions_untouched() {
        assert_eq!(normalized_key("notes-2.txt", EXT), "notes-2.txt");
    }

    #[test]
    fn test_only_last_number_run_is_removed() {
        assert_eq!(normalized_key("Game-2-10.desktop", EXT), "Game-2.desktop");
    }
}
