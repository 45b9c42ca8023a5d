use anyhow::{Result, anyhow};
use isolang::Language;
use once_cell::sync::Lazy;

/// Language utilities for the pipeline
///
/// This module provides validation and normalization of ISO 639-1/639-2
/// language codes plus the heuristic source-language detection used when a
/// job is submitted with `source_language = "auto"`. Detection runs on the
/// text extracted by the OCR stage, not on the original document.
/// Sentinel value for jobs whose source language should be detected
pub const AUTO: &str = "auto";

/// Validate and normalize a language code to ISO 639-1 where one exists,
/// falling back to ISO 639-3 for languages without a 2-letter code.
pub fn normalize(code: &str) -> Result<String> {
    let trimmed = code.trim().to_lowercase();
    if trimmed == AUTO {
        return Ok(trimmed);
    }

    let language = match trimmed.len() {
        2 => Language::from_639_1(&trimmed),
        3 => Language::from_639_3(&trimmed),
        _ => Language::from_name(code.trim()),
    }
    .ok_or_else(|| anyhow!("Invalid language code: {}", code))?;

    Ok(language
        .to_639_1()
        .map(str::to_string)
        .unwrap_or_else(|| language.to_639_3().to_string()))
}

/// Whether two codes identify the same language regardless of code form.
pub fn codes_match(a: &str, b: &str) -> bool {
    match (normalize(a), normalize(b)) {
        (Ok(left), Ok(right)) => left == right,
        _ => false,
    }
}

/// English display name for a language code, falling back to the code itself.
pub fn language_name(code: &str) -> String {
    let trimmed = code.trim().to_lowercase();
    let language = match trimmed.len() {
        2 => Language::from_639_1(&trimmed),
        3 => Language::from_639_3(&trimmed),
        _ => None,
    };
    language
        .map(|l| l.to_name().to_string())
        .unwrap_or_else(|| code.trim().to_string())
}

/// Stop-word tables for heuristic detection. Small on purpose: the detector
/// only needs to separate the major OCR target languages, and an unknown
/// language is reported as `None` rather than guessed.
static STOPWORDS: Lazy<Vec<(&'static str, &'static [&'static str])>> = Lazy::new(|| {
    vec![
        (
            "en",
            &[
                "the", "and", "of", "to", "in", "is", "that", "for", "with", "was", "this",
            ][..],
        ),
        (
            "fr",
            &[
                "le", "la", "les", "de", "des", "et", "est", "une", "dans", "que", "pour",
            ][..],
        ),
        (
            "de",
            &[
                "der", "die", "das", "und", "ist", "nicht", "ein", "eine", "mit", "von", "zu",
            ][..],
        ),
        (
            "es",
            &[
                "el", "los", "las", "de", "que", "y", "es", "una", "en", "por", "para",
            ][..],
        ),
        (
            "it",
            &[
                "il", "gli", "di", "che", "e", "una", "per", "non", "con", "sono", "della",
            ][..],
        ),
        (
            "pt",
            &[
                "o", "os", "as", "de", "que", "e", "um", "uma", "para", "com", "não",
            ][..],
        ),
    ]
});

/// Minimum stop-word hits before a detection result is trusted
const MIN_HITS: usize = 2;

/// Detect the dominant language of a text sample by stop-word scoring.
///
/// Returns an ISO 639-1 code, or `None` when the sample is too short or no
/// table scores decisively. Ties go to the earlier table entry (English
/// first), matching how the original system resolved ambiguous pages.
pub fn detect(text: &str) -> Option<&'static str> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphabetic())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        return None;
    }

    let mut best: Option<(&'static str, usize)> = None;
    for (code, stopwords) in STOPWORDS.iter() {
        let hits = words
            .iter()
            .filter(|w| stopwords.contains(&w.as_str()))
            .count();
        if hits >= MIN_HITS && best.map(|(_, b)| hits > b).unwrap_or(true) {
            best = Some((code, hits));
        }
    }

    best.map(|(code, _)| code)
}
