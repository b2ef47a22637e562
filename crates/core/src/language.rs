/// Language groups harvested by default, in priority order.
pub const DEFAULT_LANGUAGE_ORDER: [&str; 3] = ["zh", "en", "th"];

pub const DEFAULT_ATTRIBUTION: &str = "Speaker";

pub struct LanguageConfig {
    pub code: &'static str,
    /// Track codes accepted for this group, most preferred first.
    pub track_codes: &'static [&'static str],
    pub attribution: &'static str,
}

const LANGUAGES: [LanguageConfig; 3] = [
    LanguageConfig {
        code: "zh",
        track_codes: &["zh", "zh-Hans", "zh-CN", "zh-Hant", "zh-TW", "zh-HK"],
        attribution: "老师",
    },
    LanguageConfig {
        code: "en",
        track_codes: &["en", "en-US", "en-GB"],
        attribution: "Speaker",
    },
    LanguageConfig {
        code: "th",
        track_codes: &["th"],
        attribution: "Ajahn",
    },
];

pub fn language_config(code: &str) -> Option<&'static LanguageConfig> {
    LANGUAGES.iter().find(|lang| lang.code == code)
}

/// Track codes to request for a language group. Unknown groups request themselves.
pub fn track_codes(language: &str) -> Vec<String> {
    match language_config(language) {
        Some(config) => config.track_codes.iter().map(|c| c.to_string()).collect(),
        None => vec![language.to_string()],
    }
}

pub fn attribution(language: &str) -> &'static str {
    language_config(language)
        .map(|config| config.attribution)
        .unwrap_or(DEFAULT_ATTRIBUTION)
}

/// Fold a raw track code (`zh-TW`, `en-GB`, `th`) into its language group.
pub fn normalize_language(code: &str) -> Option<&'static str> {
    let code = code.trim();
    LANGUAGES
        .iter()
        .find(|lang| {
            code.strip_prefix(lang.code)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with(['-', '_']))
        })
        .map(|lang| lang.code)
}

pub fn default_languages() -> Vec<String> {
    DEFAULT_LANGUAGE_ORDER.iter().map(|c| c.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_regional_variants() {
        assert_eq!(normalize_language("zh-Hant"), Some("zh"));
        assert_eq!(normalize_language("en-GB"), Some("en"));
        assert_eq!(normalize_language("th"), Some("th"));
        assert_eq!(normalize_language("de"), None);
        // "the" is not Thai
        assert_eq!(normalize_language("the"), None);
    }

    #[test]
    fn unknown_language_requests_itself() {
        assert_eq!(track_codes("de"), vec!["de".to_string()]);
        assert_eq!(attribution("de"), DEFAULT_ATTRIBUTION);
    }

    #[test]
    fn known_language_labels() {
        assert_eq!(attribution("zh"), "老师");
        assert_eq!(attribution("th"), "Ajahn");
        assert_eq!(track_codes("en")[0], "en");
    }
}
