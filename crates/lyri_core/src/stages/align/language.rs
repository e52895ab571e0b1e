//! Lyrics language detection and aligner config rewriting.

use crate::stages::errors::{StageError, StageResult};

/// Detect the language of a lyrics text as an ISO 639-3 code.
pub fn detect_language(text: &str) -> Option<String> {
    let info = whatlang::detect(text)?;
    Some(info.lang().code().to_string())
}

/// Turn a user-supplied code into ISO 639-3. Two-letter codes for the
/// common lyric languages are mapped; anything else passes through.
pub fn normalize_code(code: &str) -> String {
    let code = code.trim().to_ascii_lowercase();
    let mapped = match code.as_str() {
        "en" => "eng",
        "ru" => "rus",
        "uk" => "ukr",
        "de" => "deu",
        "fr" => "fra",
        "es" => "spa",
        "it" => "ita",
        "pt" => "por",
        "ja" => "jpn",
        "ko" => "kor",
        "zh" => "cmn",
        other => other,
    };
    mapped.to_string()
}

/// Decide which language the forced aligner runs in.
///
/// A hint wins over detection; text with no detectable language uses
/// `default`. Anything other than `default` must be in `allowed`.
pub fn resolve_language(
    hint: Option<&str>,
    text: &str,
    default: &str,
    allowed: &[String],
) -> StageResult<String> {
    let default = normalize_code(default);
    let language = match hint.filter(|h| !h.trim().is_empty()) {
        Some(h) => normalize_code(h),
        None => detect_language(text).unwrap_or_else(|| default.clone()),
    };

    if language == default || allowed.iter().any(|a| normalize_code(a) == language) {
        return Ok(language);
    }

    let mut supported = vec![default];
    for code in allowed.iter().map(|a| normalize_code(a)) {
        if !supported.contains(&code) {
            supported.push(code);
        }
    }
    Err(StageError::unsupported_language(language, &supported))
}

/// Set `task_language` in a `key=value|key=value` config string.
pub fn rewrite_task_language(config: &str, language: &str) -> String {
    let mut found = false;
    let mut parts: Vec<String> = config
        .split('|')
        .filter(|p| !p.trim().is_empty())
        .map(|part| match part.split_once('=') {
            Some((key, _)) if key.trim() == "task_language" => {
                found = true;
                format!("task_language={}", language)
            }
            _ => part.to_string(),
        })
        .collect();

    if !found {
        parts.insert(0, format!("task_language={}", language));
    }
    parts.join("|")
}
