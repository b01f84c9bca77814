//! Filename parsing and content fingerprinting.

use sha2::{Digest, Sha256};

use crate::error::ParseError;
use crate::model::ExamType;

/// Full identity recovered from a strict-mode filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedIdentity {
    pub register_number: String,
    pub subject_code: String,
    pub extension: String,
}

/// Best-effort identity recovered from a flexible-mode filename or from a
/// degraded AI extraction result. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialIdentity {
    pub register_number: Option<String>,
    pub subject_code: Option<String>,
    pub exam_type: Option<ExamType>,
}

const ALLOWED_EXTENSIONS: [&str; 3] = ["pdf", "jpg", "png"];

/// Parses a strict-mode filename: `{12-digit register}_{2-10 alphanumeric
/// subject}.{pdf|jpg|jpeg|png}`. `jpeg` normalizes to the `jpg` extension
/// family for magic-byte sniffing purposes but is preserved verbatim in the
/// returned `extension`.
///
/// # Errors
///
/// Returns [`ParseError`] if the filename doesn't match the pattern, the
/// register number isn't exactly 12 ASCII digits, the subject code doesn't
/// match `[A-Z0-9]{2,10}`, or the extension is unsupported.
pub fn parse_strict(filename: &str) -> Result<ParsedIdentity, ParseError> {
    let (stem, extension) = split_extension(filename).ok_or(ParseError::MalformedFilename)?;
    validate_extension(&extension)?;

    let mut parts = stem.splitn(2, '_');
    let register_number = parts.next().ok_or(ParseError::MalformedFilename)?;
    let subject_code = parts.next().ok_or(ParseError::MalformedFilename)?;

    validate_register_number(register_number)?;
    let subject_code = normalize_subject_code(subject_code)?;

    Ok(ParsedIdentity {
        register_number: register_number.to_string(),
        subject_code,
        extension,
    })
}

/// Best-effort parse for flexible-mode uploads. Never errors: fields that
/// can't be recovered are left `None` so the caller (C3) can fill them in.
#[must_use]
pub fn parse_flexible(filename: &str) -> PartialIdentity {
    let Some((stem, _ext)) = split_extension(filename) else {
        return PartialIdentity::default();
    };

    let segments: Vec<&str> = stem.split('_').collect();
    let register_number = segments
        .first()
        .filter(|s| validate_register_number(s).is_ok())
        .map(ToString::to_string);
    let subject_code = segments
        .get(1)
        .and_then(|s| normalize_subject_code(s).ok());
    let exam_type = segments.get(2).and_then(|s| s.parse().ok());

    PartialIdentity {
        register_number,
        subject_code,
        exam_type,
    }
}

/// Upper-cases and validates a subject code against `[A-Z0-9]{2,10}`.
///
/// # Errors
///
/// Returns [`ParseError::InvalidSubjectCode`] if the normalized code doesn't
/// satisfy the pattern.
pub fn normalize_subject_code(raw: &str) -> Result<String, ParseError> {
    let upper = raw.to_ascii_uppercase();
    let valid = (2..=10).contains(&upper.len())
        && upper.chars().all(|c| c.is_ascii_alphanumeric());
    if valid {
        Ok(upper)
    } else {
        Err(ParseError::InvalidSubjectCode)
    }
}

/// Validates that `raw` is exactly 12 ASCII digits.
///
/// # Errors
///
/// Returns [`ParseError::InvalidRegisterNumber`] otherwise.
pub fn validate_register_number(raw: &str) -> Result<(), ParseError> {
    if raw.len() == 12 && raw.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ParseError::InvalidRegisterNumber)
    }
}

fn validate_extension(ext: &str) -> Result<(), ParseError> {
    let lower = ext.to_ascii_lowercase();
    let normalized = if lower == "jpeg" { "jpg" } else { lower.as_str() };
    if ALLOWED_EXTENSIONS.contains(&normalized) {
        Ok(())
    } else {
        Err(ParseError::UnsupportedExtension(ext.to_string()))
    }
}

fn split_extension(filename: &str) -> Option<(&str, String)> {
    let (stem, ext) = filename.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some((stem, ext.to_string()))
}

/// Sniffs the real MIME type from magic bytes and cross-checks against the
/// declared extension. Accepted signatures: `%PDF`, JPEG
/// `FF D8`, PNG `89 50 4E 47`.
///
/// # Errors
///
/// Returns [`ParseError::ContentMismatch`] if the bytes don't match any known
/// signature, or don't match the declared extension's signature.
pub fn sniff_mime(bytes: &[u8], declared_extension: &str) -> Result<&'static str, ParseError> {
    let declared = declared_extension.to_ascii_lowercase();
    let sniffed = if bytes.starts_with(b"%PDF") {
        "application/pdf"
    } else if bytes.starts_with(&[0xFF, 0xD8]) {
        "image/jpeg"
    } else if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else {
        return Err(ParseError::ContentMismatch);
    };

    let matches_declared = matches!(
        (sniffed, declared.as_str()),
        ("application/pdf", "pdf")
            | ("image/jpeg", "jpg" | "jpeg")
            | ("image/png", "png")
    );
    if matches_declared {
        Ok(sniffed)
    } else {
        Err(ParseError::ContentMismatch)
    }
}

/// Computes the fingerprint / idempotency key: `hex(SHA-256(register |
/// subject | exam_type | content_hash))`. This is the deduplication key from
/// the glossary — re-uploading identical bytes for the same tuple must
/// produce the same fingerprint.
#[must_use]
pub fn compute_fingerprint(
    register_number: &str,
    subject_code: &str,
    exam_type: ExamType,
    content_hash: &str,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(register_number.as_bytes());
    hasher.update(b"|");
    hasher.update(subject_code.as_bytes());
    hasher.update(b"|");
    hasher.update(exam_type.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(content_hash.as_bytes());
    hex::encode(hasher.finalize())
}

/// SHA-256 content hash, hex-encoded. Deterministic over exact byte content
/// (testable property 1).
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_parse_accepts_canonical_filename() {
        let parsed = parse_strict("212222240047_19AI405.pdf").unwrap();
        assert_eq!(parsed.register_number, "212222240047");
        assert_eq!(parsed.subject_code, "19AI405");
        assert_eq!(parsed.extension, "pdf");
    }

    #[test]
    fn strict_parse_lowercases_subject_normalized_to_upper() {
        let parsed = parse_strict("212222240047_19ai405.pdf").unwrap();
        assert_eq!(parsed.subject_code, "19AI405");
    }

    #[test]
    fn strict_parse_rejects_short_register() {
        assert!(matches!(
            parse_strict("12345_19AI405.pdf"),
            Err(ParseError::InvalidRegisterNumber)
        ));
    }

    #[test]
    fn strict_parse_rejects_non_digit_register() {
        assert!(matches!(
            parse_strict("21222224004X_19AI405.pdf"),
            Err(ParseError::InvalidRegisterNumber)
        ));
    }

    #[test]
    fn strict_parse_rejects_bad_subject_code() {
        assert!(matches!(
            parse_strict("212222240047_1.pdf"),
            Err(ParseError::InvalidSubjectCode)
        ));
    }

    #[test]
    fn strict_parse_rejects_unsupported_extension() {
        assert!(matches!(
            parse_strict("212222240047_19AI405.docx"),
            Err(ParseError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn strict_parse_rejects_missing_underscore() {
        assert!(matches!(
            parse_strict("212222240047.pdf"),
            Err(ParseError::MalformedFilename)
        ));
    }

    #[test]
    fn flexible_parse_recovers_nothing_from_arbitrary_name() {
        let partial = parse_flexible("scan_0001.pdf");
        assert_eq!(partial, PartialIdentity::default());
    }

    #[test]
    fn flexible_parse_recovers_full_tuple_when_present() {
        let partial = parse_flexible("212222240047_19AI405_CIA2.pdf");
        assert_eq!(partial.register_number.as_deref(), Some("212222240047"));
        assert_eq!(partial.subject_code.as_deref(), Some("19AI405"));
        assert_eq!(partial.exam_type, Some(ExamType::Cia2));
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = compute_fingerprint("212222240047", "19AI405", ExamType::Cia1, "abc");
        let b = compute_fingerprint("212222240047", "19AI405", ExamType::Cia1, "abc");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_changes_with_content_hash() {
        let a = compute_fingerprint("212222240047", "19AI405", ExamType::Cia1, "abc");
        let b = compute_fingerprint("212222240047", "19AI405", ExamType::Cia1, "def");
        assert_ne!(a, b);
    }

    #[test]
    fn content_hash_is_deterministic_over_bytes() {
        let bytes = b"hello world";
        assert_eq!(content_hash(bytes), content_hash(bytes));
    }

    #[test]
    fn sniff_mime_accepts_matching_pdf() {
        assert_eq!(sniff_mime(b"%PDF-1.4 ...", "pdf").unwrap(), "application/pdf");
    }

    #[test]
    fn sniff_mime_accepts_matching_jpeg() {
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0], "jpg").unwrap(), "image/jpeg");
    }

    #[test]
    fn sniff_mime_accepts_matching_png() {
        assert_eq!(
            sniff_mime(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A], "png").unwrap(),
            "image/png"
        );
    }

    #[test]
    fn sniff_mime_rejects_mismatched_extension() {
        assert!(matches!(
            sniff_mime(b"%PDF-1.4", "png"),
            Err(ParseError::ContentMismatch)
        ));
    }

    #[test]
    fn sniff_mime_rejects_unknown_signature() {
        assert!(matches!(
            sniff_mime(b"not a real file", "pdf"),
            Err(ParseError::ContentMismatch)
        ));
    }
}
