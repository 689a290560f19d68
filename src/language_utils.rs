use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for the lecture prompt
///
/// Settings carry ISO 639-1 / 639-3 codes, sometimes with a region suffix
/// (`en-us`, `pt_BR`) because speech backends expect one. The script prompt
/// wants a human-readable language name instead.

/// Strip a region suffix and lowercase the primary subtag
pub fn primary_subtag(code: &str) -> String {
    code.trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase()
}

/// Parse a language code (2 or 3 letters, optional region) into a language
pub fn parse_language(code: &str) -> Result<Language> {
    let primary = primary_subtag(code);

    let language = match primary.len() {
        2 => Language::from_639_1(&primary),
        3 => Language::from_639_3(&primary),
        _ => None,
    };

    language.ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// English name of a language code, e.g. `de` -> `German`
pub fn get_language_name(code: &str) -> Result<String> {
    Ok(parse_language(code)?.to_name().to_string())
}

/// Name to substitute into prompts; falls back to the raw code so that an
/// unusual code never blocks a run
pub fn prompt_language_name(code: &str) -> String {
    get_language_name(code).unwrap_or_else(|_| code.trim().to_string())
}
