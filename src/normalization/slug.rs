//! URL slug generation.
//!
//! Product names arrive with accents, punctuation and arbitrary length;
//! slugs must stay lowercase ASCII, hyphen-separated and within the 100-char
//! column limit while staying collision-resistant under truncation.

use sha2::{Digest, Sha256};
use std::future::Future;

/// Hard column limit for slugs.
const MAX_SLUG_LEN: usize = 100;
/// Generation caps below the column limit to leave room for unique suffixes.
const TRUNCATE_AT: usize = 95;
/// Hex chars of the content hash appended when a slug is truncated.
const HASH_SUFFIX_LEN: usize = 6;

/// Build a slug from display text: "Tarjeta Gráfica ASUS TUF" becomes
/// "tarjeta-grafica-asus-tuf".
pub fn generate_slug(text: &str) -> String {
    let lowered = text.to_lowercase();

    // Fold accents, then squash every non-alphanumeric run into one hyphen.
    let cleaned: String = lowered
        .chars()
        .map(fold_diacritic)
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect();

    let mut slug = cleaned.split_whitespace().collect::<Vec<_>>().join("-");

    if slug.len() > TRUNCATE_AT {
        // Keep the head and append a short content hash of the full text so
        // two long names that share a prefix still get distinct slugs.
        let digest = Sha256::digest(text.as_bytes());
        let hex: String = digest
            .iter()
            .take(HASH_SUFFIX_LEN.div_ceil(2))
            .map(|b| format!("{b:02x}"))
            .collect();
        slug.truncate(TRUNCATE_AT - HASH_SUFFIX_LEN - 1);
        slug.push('-');
        slug.push_str(&hex[..HASH_SUFFIX_LEN]);
    }

    slug
}

/// Slug that is guaranteed free according to the supplied existence check.
/// Collisions get an incrementing numeric suffix; the base is shortened when
/// needed so the result never exceeds the column limit.
pub fn generate_unique_slug<F>(text: &str, exists: F) -> String
where
    F: Fn(&str) -> bool,
{
    let mut base = generate_slug(text);
    let mut slug = base.clone();
    let mut counter = 1u32;

    while exists(&slug) {
        let suffix = format!("-{counter}");
        if base.len() + suffix.len() > MAX_SLUG_LEN {
            base.truncate(MAX_SLUG_LEN - suffix.len());
        }
        slug = format!("{base}{suffix}");
        counter += 1;
    }

    slug
}

/// Async variant of [`generate_unique_slug`] for existence checks that hit
/// the database.
pub async fn generate_unique_slug_async<F, Fut>(text: &str, exists: F) -> anyhow::Result<String>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = anyhow::Result<bool>>,
{
    let mut base = generate_slug(text);
    let mut slug = base.clone();
    let mut counter = 1u32;

    while exists(slug.clone()).await? {
        let suffix = format!("-{counter}");
        if base.len() + suffix.len() > MAX_SLUG_LEN {
            base.truncate(MAX_SLUG_LEN - suffix.len());
        }
        slug = format!("{base}{suffix}");
        counter += 1;
    }

    Ok(slug)
}

/// Map accented Latin characters onto their ASCII base letter. Input is
/// already lowercased.
fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'å' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ý' | 'ÿ' => 'y',
        'ñ' => 'n',
        'ç' => 'c',
        'ß' => 's',
        _ => c,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folds_accents_and_hyphenates() {
        assert_eq!(
            generate_slug("Tarjeta Gráfica ASUS TUF"),
            "tarjeta-grafica-asus-tuf"
        );
        assert_eq!(generate_slug("Ratón Óptico (Negro)"), "raton-optico-negro");
    }

    #[test]
    fn collapses_punctuation_runs() {
        assert_eq!(generate_slug("SSD -- 1TB!! NVMe"), "ssd-1tb-nvme");
        assert_eq!(generate_slug("  --trimmed--  "), "trimmed");
    }

    #[test]
    fn long_names_get_hash_suffix_and_stay_bounded() {
        let name = "portatil ".repeat(30);
        let slug = generate_slug(&name);
        assert!(slug.len() <= MAX_SLUG_LEN);
        assert!(slug.len() <= TRUNCATE_AT);
        // Distinct long names sharing a 95-char prefix still diverge.
        let other = format!("{name} edicion especial");
        assert_ne!(slug, generate_slug(&other));
    }

    #[test]
    fn unique_slug_appends_counter_until_free() {
        let taken = ["teclado-gaming", "teclado-gaming-1", "teclado-gaming-2"];
        let slug = generate_unique_slug("Teclado Gaming", |s| taken.contains(&s));
        assert_eq!(slug, "teclado-gaming-3");
    }

    #[test]
    fn unique_slug_never_returns_existing() {
        let slug = generate_unique_slug("Monitor 27", |s| s == "monitor-27");
        assert_ne!(slug, "monitor-27");
        assert!(slug.len() <= MAX_SLUG_LEN);
    }

    #[test]
    fn unique_slug_counter_survives_double_digits() {
        let slug = generate_unique_slug("ssd", |s| {
            s == "ssd" || s.strip_prefix("ssd-").is_some_and(|n| n.parse::<u32>().is_ok_and(|n| n <= 11))
        });
        assert_eq!(slug, "ssd-12");
    }
}
