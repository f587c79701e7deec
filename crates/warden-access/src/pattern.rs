//! Slash-delimited role paths and the patterns they are tested against.
//!
//! A pattern without `*` matches a path exactly or as a hierarchical prefix:
//! `chronicle/abc` matches `chronicle/abc` and `chronicle/abc/hst`, but not
//! `chronicle/abcd`. Each `*` matches exactly one segment.

use regex::Regex;
use warden_core::registry::SLUG_PLACEHOLDER;

/// A compiled access pattern.
#[derive(Debug, Clone)]
pub enum PathPattern {
  Exact(String),
  Wildcard(Regex),
}

impl PathPattern {
  /// Compile `pattern`. Every character other than `*` is literal, so this
  /// cannot fail.
  pub fn new(pattern: &str) -> Self {
    if !pattern.contains('*') {
      return Self::Exact(pattern.to_owned());
    }
    // Escaped literals and a fixed character class always compile.
    match Regex::new(&format!("^{}$", wildcard_body(pattern))) {
      Ok(re) => Self::Wildcard(re),
      Err(_) => Self::Exact(pattern.to_owned()),
    }
  }

  pub fn matches(&self, path: &str) -> bool {
    match self {
      Self::Exact(q) => {
        path == q
          || path
            .strip_prefix(q.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
      }
      Self::Wildcard(re) => re.is_match(path),
    }
  }
}

/// Regex source for `pattern` with each `*` standing for one segment.
fn wildcard_body(pattern: &str) -> String {
  pattern
    .split('*')
    .map(regex::escape)
    .collect::<Vec<_>>()
    .join("[^/]*")
}

/// Shorthand for a one-off match.
pub fn path_matches(path: &str, pattern: &str) -> bool {
  PathPattern::new(pattern).matches(path)
}

/// Substitute `slug` for every `{slug}` in `template`.
pub fn expand_template(template: &str, slug: &str) -> String {
  template.replace(SLUG_PLACEHOLDER, slug)
}

// ─── Slug capture ────────────────────────────────────────────────────────────

/// Extracts the slug from role paths that fall under an access template
/// with its trailing role segment removed.
///
/// For `chronicle/{slug}/hst` the capture pattern is `chronicle/{slug}`, so
/// `chronicle/abc/cm` and `chronicle/abc` both yield `abc`.
#[derive(Debug, Clone)]
pub struct SlugCapture {
  re: Regex,
}

impl SlugCapture {
  /// `None` when the template carries no `{slug}` placeholder.
  pub fn from_template(template: &str) -> Option<Self> {
    let (before, after) = template.split_once(SLUG_PLACEHOLDER)?;

    // Drop the role segment that follows the slug, if any.
    let after = match after.rfind('/') {
      Some(0) | None => "",
      Some(idx) => &after[..idx],
    };
    let re = Regex::new(&format!(
      "^{}([^/]+){}(?:/.*)?$",
      wildcard_body(before),
      wildcard_body(after),
    ))
    .ok()?;
    Some(Self { re })
  }

  pub fn capture<'p>(&self, path: &'p str) -> Option<&'p str> {
    self
      .re
      .captures(path)
      .and_then(|c| c.get(1))
      .map(|m| m.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exact_and_hierarchical_prefix() {
    assert!(path_matches("chronicle/abc/hst", "chronicle/abc/hst"));
    assert!(path_matches("chronicle/abc/hst/extra", "chronicle/abc"));
    assert!(!path_matches("chronicle/abcd", "chronicle/abc"));
    assert!(!path_matches("chronicle", "chronicle/abc"));
  }

  #[test]
  fn wildcard_matches_one_segment() {
    assert!(path_matches("chronicle/abc/hst", "chronicle/*/hst"));
    assert!(!path_matches("chronicle/abc/def/hst", "chronicle/*/hst"));
    assert!(!path_matches("chronicle/abc/hst/extra", "chronicle/*/hst"));
    assert!(path_matches("chronicle/abc/hst", "chronicle/abc/*"));
  }

  #[test]
  fn regex_metacharacters_are_literal() {
    assert!(path_matches("a.b/c", "a.b/*"));
    assert!(!path_matches("axb/c", "a.b/*"));
  }

  #[test]
  fn templates_expand_before_matching() {
    let q = expand_template("chronicle/{slug}/hst", "abc");
    assert!(path_matches("chronicle/abc/hst", &q));
    assert!(path_matches("chronicle/abc/hst/extra", &expand_template("chronicle/{slug}", "abc")));
    assert!(!path_matches("chronicle/xyz/hst", &q));
  }

  #[test]
  fn slug_capture_strips_role_segment() {
    let cap = SlugCapture::from_template("chronicle/{slug}/hst").unwrap();
    assert_eq!(cap.capture("chronicle/abc/hst"), Some("abc"));
    assert_eq!(cap.capture("chronicle/abc/cm"), Some("abc"));
    assert_eq!(cap.capture("chronicle/abc"), Some("abc"));
    assert_eq!(cap.capture("coordinator/abc/hst"), None);
    assert_eq!(cap.capture("chronicle"), None);
  }

  #[test]
  fn slug_capture_without_role_segment() {
    let cap = SlugCapture::from_template("venue/{slug}").unwrap();
    assert_eq!(cap.capture("venue/hall/manager"), Some("hall"));
    assert!(SlugCapture::from_template("venue/all").is_none());
  }
}
