/// Helpers for HS-style taxonomy codes.
///
/// Codes are digit groups separated by dots: a 4-digit heading followed by optional
/// 2-digit groups (`8708`, `8708.30`, `8708.30.10`, `8708.30.10.00`). The hierarchy
/// level of a code is encoded purely by its digit count:
/// - 2 digits: chapter (`87`)
/// - 4 digits: heading (`8708`)
/// - 6 digits: subheading (`8708.30`)
/// - 8 digits: tariff line (`8708.30.10`)
use std::sync::LazyLock;

use regex::Regex;

static CODE_FORMAT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{4}(\.\d{2})?(\.\d{2})?(\.\d{2})?$").expect("valid regex")
});

/// Digit counts of the four hierarchy levels, indexed by `level - 1`.
pub const LEVEL_DIGITS: [usize; 4] = [2, 4, 6, 8];

/// Chapter, heading and subheading of a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeParts {
    pub chapter: String,
    pub heading: String,
    pub subheading: String,
}

/// The chapter of a code: its first two characters.
///
/// Codes shorter than two characters are returned unchanged.
pub fn chapter(code: &str) -> &str {
    code.get(..2).unwrap_or(code)
}

/// The chapter of a code as a number, if it is numeric.
pub fn chapter_number(code: &str) -> Option<u8> {
    chapter(code).parse().ok()
}

/// Strip everything but ASCII digits.
pub fn digits(code: &str) -> String {
    code.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Format a bare digit string in dotted notation (`09011131` → `0901.11.31`).
pub fn format_digits(digits: &str) -> String {
    if digits.len() <= 4 {
        return digits.to_string();
    }
    let mut out = digits[..4].to_string();
    let mut rest = &digits[4..];
    while !rest.is_empty() {
        let take = rest.len().min(2);
        out.push('.');
        out.push_str(&rest[..take]);
        rest = &rest[take..];
    }
    out
}

/// The dotted prefix of `code` at `digit_count` digits, or `None` if the code is shorter.
pub fn prefix_at(code: &str, digit_count: usize) -> Option<String> {
    let d = digits(code);
    if d.len() < digit_count {
        return None;
    }
    Some(format_digits(&d[..digit_count]))
}

/// Whether `code` sits at or below `prefix` in the hierarchy.
pub fn is_under(code: &str, prefix: &str) -> bool {
    let prefix_digits = digits(prefix);
    !prefix_digits.is_empty() && digits(code).starts_with(&prefix_digits)
}

/// Validate the dotted code format (4, 6, 8 or 10 digits).
pub fn is_valid_code(code: &str) -> bool {
    let code = code.trim().replace(' ', "");
    CODE_FORMAT.is_match(&code)
}

/// Split a code into chapter, heading and subheading.
///
/// Short codes repeat the deepest available level: `8708` yields subheading `8708`.
pub fn code_parts(code: &str) -> CodeParts {
    let clean = digits(code);
    let chapter = clean.get(..2).unwrap_or(&clean).to_string();
    let heading = clean.get(..4).unwrap_or(&clean).to_string();
    let subheading = match clean.get(..6) {
        Some(sub) => format_digits(sub),
        None => heading.clone(),
    };
    CodeParts {
        chapter,
        heading,
        subheading,
    }
}

/// The parent of a code, dropping the last dotted segment.
///
/// `8708.30.10` → `8708.30` → `8708` → `None`.
pub fn parent_code(code: &str) -> Option<String> {
    let clean = code.trim().replace(' ', "");
    if let Some((parent, _)) = clean.rsplit_once('.') {
        return Some(parent.to_string());
    }
    let d = digits(&clean);
    if d.len() <= 4 {
        return None;
    }
    Some(d[..4].to_string())
}
