//! Injectable stand-ins for the phone-number normalisation and email
//! tokenisation libraries spec.md §1 names as external collaborators —
//! "pure functions, assumed correct". The core depends only on these
//! traits; a host wires in whatever real library it trusts (e.g.
//! libphonenumber) by implementing them.
//!
//! The default implementations here are intentionally simple — enough to
//! make the literal scenarios in spec.md §8 behave correctly, not a
//! production-grade phone/email library, which is explicitly out of scope.

/// Canonicalises a raw phone number string for exact-equality lookup.
pub trait PhoneNormalizer: Send + Sync {
  /// Returns `None` if `raw` doesn't look like a phone number at all.
  fn normalize(&self, raw: &str) -> Option<String>;
}

/// Canonicalises an email address for case-insensitive equality, and
/// extracts the local-part used to derive an `EMAIL_BASED_NICKNAME`
/// candidate (§4.2, §4.4).
pub trait EmailTokenizer: Send + Sync {
  /// Returns `None` if `raw` isn't a syntactically plausible address.
  fn normalize(&self, raw: &str) -> Option<String>;

  fn local_part(&self, raw: &str) -> Option<String>;
}

/// Strips everything but digits and a leading `+`. Good enough to make
/// `"+1 (415) 555-1111"` and `"+14155551111"` compare equal; not a
/// libphonenumber replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigitsOnlyPhoneNormalizer;

impl PhoneNormalizer for DigitsOnlyPhoneNormalizer {
  fn normalize(&self, raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for (i, c) in raw.chars().enumerate() {
      if c == '+' && i == 0 {
        out.push(c);
      } else if c.is_ascii_digit() {
        out.push(c);
      }
    }
    if out.chars().any(|c| c.is_ascii_digit()) {
      Some(out)
    } else {
      None
    }
  }
}

/// Lower-cases the whole address for equality and splits on the first `@`
/// for the local-part.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleEmailTokenizer;

impl EmailTokenizer for SimpleEmailTokenizer {
  fn normalize(&self, raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.contains('@') {
      Some(trimmed.to_lowercase())
    } else {
      None
    }
  }

  fn local_part(&self, raw: &str) -> Option<String> {
    raw.split('@').next().map(|s| s.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn phone_normalizer_strips_formatting() {
    let n = DigitsOnlyPhoneNormalizer;
    assert_eq!(n.normalize("+1 (415) 555-1111"), Some("+14155551111".to_string()));
    assert_eq!(n.normalize("no digits here"), None);
  }

  #[test]
  fn email_normalizer_lowercases_for_equality() {
    let t = SimpleEmailTokenizer;
    assert_eq!(t.normalize("John.Doe@Example.com"), Some("john.doe@example.com".to_string()));
    assert_eq!(t.local_part("johndoe@example.com"), Some("johndoe".to_string()));
    assert_eq!(t.normalize("not-an-email"), None);
  }
}
