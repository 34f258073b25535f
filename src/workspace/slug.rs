//! Heading slugs.
//!
//! `slugify` is a pure function of the heading text. Disambiguating duplicate
//! slugs is not its job; the document model build appends `-n` suffixes in
//! document order (see [`SlugCounter`]).

use std::collections::HashMap;

/// Derive the anchor slug for a heading text: lowercase, keep alphanumerics,
/// `-` and `_`, collapse whitespace runs into single hyphens, drop the rest.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for c in text.trim().chars() {
        if c.is_whitespace() {
            pending_hyphen = !slug.is_empty();
            continue;
        }
        if c.is_alphanumeric() || c == '-' || c == '_' {
            if pending_hyphen {
                slug.push('-');
                pending_hyphen = false;
            }
            for lower in c.to_lowercase() {
                slug.push(lower);
            }
        }
    }

    slug
}

/// Tracks slugs seen so far in one document and yields unique ones.
///
/// The n-th duplicate of a base slug gets the suffix `-n`, starting at 1 for
/// the second occurrence. A suffixed candidate that happens to collide with a
/// literal heading seen earlier keeps counting until it is free.
#[derive(Default)]
pub struct SlugCounter {
    seen: HashMap<String, usize>,
}

impl SlugCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unique(&mut self, base: &str) -> String {
        match self.seen.get(base).copied() {
            None => {
                self.seen.insert(base.to_string(), 0);
                base.to_string()
            }
            Some(count) => {
                let mut n = count + 1;
                let mut candidate = format!("{}-{}", base, n);
                while self.seen.contains_key(&candidate) {
                    n += 1;
                    candidate = format!("{}-{}", base, n);
                }
                self.seen.insert(base.to_string(), n);
                self.seen.insert(candidate.clone(), 0);
                candidate
            }
        }
    }
}
