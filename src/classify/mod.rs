//! Rule-based category classification.
//!
//! Retailer search pages are noisy: a query for "teclados" returns wrist
//! rests, keycap pullers and the odd laptop. The classifier decides whether a
//! scraped item really belongs to the category it was scraped under, and when
//! it does not, which category (if any) it should move to.
//!
//! The engine is purely data-driven: every keyword table, pattern set and
//! threshold lives in an injected [`RuleSet`] (defaults in [`rules`]), so the
//! whole thing is unit-testable with synthetic rule sets and adding a category
//! is a data change, not a code change.
//!
//! Evaluation order is strict and the thresholds are deliberately literal —
//! they were tuned against live listings and changing them silently changes
//! classification outcomes:
//!
//! 1. global exclusion keywords (accessories/consumables) reject outright
//! 2. override rules (unambiguous brand/keyword combinations) redirect to a
//!    fixed category
//! 3. per-category exclusion keywords, weighted: a whole-word hit in the name
//!    counts 1.0 (reject at 2.0), in the description 0.5 (reject at 3.0)
//! 4. per-category required keywords: zero whole-word hits across name and
//!    description rejects; any hit accepts
//! 5. for rule sets without a required list, pattern scoring against the
//!    category's minimum score

use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;

pub mod rules;

/// Outcome of evaluating one (item, category) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The item belongs to the candidate category.
    Accept,
    /// The item does not belong to the candidate category.
    Reject,
    /// An override matched: the item belongs to this category instead
    /// (which may equal the candidate).
    Redirect(i64),
}

/// Complete rule configuration, plain data.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    /// Lowercase substrings that disqualify an item from every category.
    pub global_excluded: Vec<String>,
    /// Checked in order; first matching branch wins.
    pub overrides: Vec<OverrideRule>,
    pub categories: Vec<CategoryRule>,
}

/// Short-circuit rule for products that generic keyword overlap tends to
/// misfile (e.g. mechanical keyboards scored into the monitors category).
#[derive(Debug, Clone)]
pub struct OverrideRule {
    /// Any of these substrings in the name arms the rule.
    pub trigger: Vec<String>,
    pub branches: Vec<OverrideBranch>,
}

#[derive(Debug, Clone)]
pub struct OverrideBranch {
    pub category_id: i64,
    /// Branch fires when any keyword appears in the name, or when the
    /// candidate category already is this branch's category.
    pub keywords: Vec<String>,
}

/// Per-category keyword tables and scoring configuration.
#[derive(Debug, Clone, Default)]
pub struct CategoryRule {
    pub category_id: i64,
    /// Whole-word matches counting toward exclusion.
    pub excluded: Vec<String>,
    /// Whole-word matches; any hit accepts, none rejects. Empty list means
    /// the category relies on pattern scoring instead.
    pub required: Vec<String>,
    /// Regex patterns with weights, matched against the name.
    pub score_patterns: Vec<ScorePattern>,
    /// Plain substrings with weights, matched against the name.
    pub extra_keywords: Vec<(String, i32)>,
    /// Brand + qualifier combinations worth extra weight.
    pub combos: Vec<ComboKeyword>,
    /// Minimum accumulated score for acceptance when scoring runs.
    pub min_score: i32,
}

#[derive(Debug, Clone)]
pub struct ScorePattern {
    pub pattern: String,
    pub weight: i32,
}

/// Counts once when `required` appears in the name together with any of
/// `with_any`.
#[derive(Debug, Clone)]
pub struct ComboKeyword {
    pub required: String,
    pub with_any: Vec<String>,
    pub weight: i32,
}

struct CompiledCategory {
    excluded: Vec<Regex>,
    required: Vec<Regex>,
    patterns: Vec<(Regex, i32)>,
    extra_keywords: Vec<(String, i32)>,
    combos: Vec<ComboKeyword>,
    min_score: i32,
}

/// Compiled classifier. Construction compiles every keyword into a
/// word-boundary regex once; evaluation is allocation-light after that.
pub struct Classifier {
    global_excluded: Vec<String>,
    overrides: Vec<OverrideRule>,
    categories: HashMap<i64, CompiledCategory>,
}

impl Classifier {
    pub fn new(rules: RuleSet) -> Result<Self> {
        let mut categories = HashMap::new();
        for rule in rules.categories {
            let compiled = CompiledCategory {
                excluded: compile_words(&rule.excluded)?,
                required: compile_words(&rule.required)?,
                patterns: rule
                    .score_patterns
                    .iter()
                    .map(|p| Ok((Regex::new(&p.pattern)?, p.weight)))
                    .collect::<Result<Vec<_>>>()?,
                extra_keywords: rule.extra_keywords,
                combos: rule.combos,
                min_score: rule.min_score,
            };
            categories.insert(rule.category_id, compiled);
        }
        Ok(Self {
            global_excluded: rules.global_excluded,
            overrides: rules.overrides,
            categories,
        })
    }

    /// Classifier loaded with the built-in retail keyword tables.
    pub fn with_default_rules() -> Result<Self> {
        Self::new(rules::default_rules())
    }

    /// Decide whether an item described by (name, description) belongs to
    /// `category_id`. Pure: same inputs always produce the same verdict.
    pub fn evaluate(&self, name: &str, description: &str, category_id: i64) -> Verdict {
        let name = name.to_lowercase();
        let description = description.to_lowercase();

        for keyword in &self.global_excluded {
            if name.contains(keyword.as_str()) {
                return Verdict::Reject;
            }
        }

        for rule in &self.overrides {
            if !rule.trigger.iter().any(|t| name.contains(t.as_str())) {
                continue;
            }
            for branch in &rule.branches {
                if category_id == branch.category_id
                    || branch.keywords.iter().any(|k| name.contains(k.as_str()))
                {
                    return Verdict::Redirect(branch.category_id);
                }
            }
        }

        let Some(category) = self.categories.get(&category_id) else {
            return Verdict::Reject;
        };

        // Weighted exclusion: name hits weigh double description hits.
        let mut exclusion = 0.0f32;
        for re in &category.excluded {
            if re.is_match(&name) {
                exclusion += 1.0;
                if exclusion >= 2.0 {
                    return Verdict::Reject;
                }
            }
            if !description.is_empty() && re.is_match(&description) {
                exclusion += 0.5;
                if exclusion >= 3.0 {
                    return Verdict::Reject;
                }
            }
        }

        // Required gate: categories with a whitelist are decided right here.
        if !category.required.is_empty() {
            let mut found = 0usize;
            for re in &category.required {
                if re.is_match(&name) {
                    found += 1;
                    continue;
                }
                if description.len() > 5 && re.is_match(&description) {
                    found += 1;
                }
            }
            return if found == 0 {
                Verdict::Reject
            } else {
                Verdict::Accept
            };
        }

        // Scoring fallback for rule sets without a required list.
        let mut score = 0i32;
        for (re, weight) in &category.patterns {
            if re.is_match(&name) {
                score += weight;
            }
        }
        for (keyword, weight) in &category.extra_keywords {
            if name.contains(keyword.as_str()) {
                score += weight;
            }
        }
        for combo in &category.combos {
            if name.contains(combo.required.as_str())
                && combo.with_any.iter().any(|q| name.contains(q.as_str()))
            {
                score += combo.weight;
            }
        }

        if score >= category.min_score {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }

    /// Boolean view of [`Classifier::evaluate`]: an item is valid for a
    /// category when the verdict is `Accept` or any `Redirect` (the item has
    /// a home, possibly a corrected one).
    pub fn validate(&self, name: &str, description: &str, category_id: i64) -> bool {
        !matches!(self.evaluate(name, description, category_id), Verdict::Reject)
    }

    /// Hunt for the best-fitting category among `category_ids`, in order.
    /// Returns the first category that accepts the item, following override
    /// redirects to their target.
    pub fn classify(&self, name: &str, description: &str, category_ids: &[i64]) -> Option<i64> {
        for &id in category_ids {
            match self.evaluate(name, description, id) {
                Verdict::Accept => return Some(id),
                Verdict::Redirect(target) => return Some(target),
                Verdict::Reject => {}
            }
        }
        None
    }
}

fn compile_words(keywords: &[String]) -> Result<Vec<Regex>> {
    keywords
        .iter()
        .map(|kw| Ok(Regex::new(&format!(r"\b{}\b", regex::escape(kw)))?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::with_default_rules().unwrap()
    }

    #[test]
    fn global_exclusion_rejects_for_every_category() {
        let c = classifier();
        for category in 1..=6 {
            assert_eq!(
                c.evaluate("Funda para portátil 15.6 pulgadas", "", category),
                Verdict::Reject,
                "category {category} should reject an accessory"
            );
        }
    }

    #[test]
    fn evaluation_is_deterministic() {
        let c = classifier();
        let first = c.evaluate("Portátil Gaming ASUS TUF 15", "16GB RAM 512GB SSD", 1);
        for _ in 0..10 {
            assert_eq!(
                c.evaluate("Portátil Gaming ASUS TUF 15", "16GB RAM 512GB SSD", 1),
                first
            );
        }
    }

    #[test]
    fn accepts_laptop_in_laptop_category() {
        let c = classifier();
        assert_eq!(
            c.evaluate("Portátil HP Pavilion 15 Ryzen 5", "", rules::LAPTOPS),
            Verdict::Accept
        );
    }

    #[test]
    fn rejects_gpu_scraped_under_laptops_and_reclassifies() {
        let c = classifier();
        let name = "Tarjeta Gráfica MSI GeForce RTX 4070";
        assert_eq!(c.evaluate(name, "", rules::LAPTOPS), Verdict::Reject);
        assert_eq!(
            c.classify(name, "", &[1, 2, 3, 4, 5, 6]),
            Some(rules::GRAPHICS_CARDS)
        );
    }

    #[test]
    fn mechanical_keyboard_redirects_to_keyboards() {
        let c = classifier();
        // Scraped under monitors, but the override wins.
        assert_eq!(
            c.evaluate("Razer Mechanical Gaming Keyboard RGB", "", rules::MONITORS),
            Verdict::Redirect(rules::KEYBOARDS)
        );
    }

    #[test]
    fn house_brand_laptop_redirects_to_laptops() {
        let c = classifier();
        assert_eq!(
            c.evaluate("COOLPC Gamer Laptop i7 RTX", "", rules::GRAPHICS_CARDS),
            Verdict::Redirect(rules::LAPTOPS)
        );
    }

    #[test]
    fn unknown_category_rejects() {
        let c = classifier();
        assert_eq!(c.evaluate("Portátil HP", "", 99), Verdict::Reject);
    }

    #[test]
    fn description_counts_toward_required_gate() {
        let c = classifier();
        assert_eq!(
            c.evaluate("Kingston A2000 1TB", "Disco SSD NVMe M.2 Gen3", rules::SSDS),
            Verdict::Accept
        );
    }

    #[test]
    fn required_gate_rejects_unrelated_item() {
        let c = classifier();
        assert_eq!(
            c.evaluate("Silla ergonómica oficina", "", rules::HEADSETS),
            Verdict::Reject
        );
    }

    #[test]
    fn classify_returns_none_when_nothing_fits() {
        let c = classifier();
        assert_eq!(c.classify("Silla ergonómica oficina", "", &[1, 2, 3, 4, 5, 6]), None);
    }

    #[test]
    fn scoring_fallback_honors_min_score() {
        // Synthetic rule set with no required list: pure pattern scoring.
        let rules = RuleSet {
            global_excluded: vec![],
            overrides: vec![],
            categories: vec![CategoryRule {
                category_id: 7,
                score_patterns: vec![
                    ScorePattern {
                        pattern: r"\bwebcam\b".into(),
                        weight: 2,
                    },
                    ScorePattern {
                        pattern: r"\b1080p\b".into(),
                        weight: 1,
                    },
                ],
                min_score: 3,
                ..Default::default()
            }],
        };
        let c = Classifier::new(rules).unwrap();
        assert_eq!(c.evaluate("Webcam Logitech 1080p", "", 7), Verdict::Accept);
        assert_eq!(c.evaluate("Webcam Logitech", "", 7), Verdict::Reject);
    }

    #[test]
    fn combo_keywords_add_weight_once() {
        let rules = RuleSet {
            categories: vec![CategoryRule {
                category_id: 8,
                combos: vec![ComboKeyword {
                    required: "razer".into(),
                    with_any: vec!["keyboard".into(), "teclado".into()],
                    weight: 4,
                }],
                min_score: 4,
                ..Default::default()
            }],
            ..Default::default()
        };
        let c = Classifier::new(rules).unwrap();
        assert_eq!(c.evaluate("razer keyboard", "", 8), Verdict::Accept);
        assert_eq!(c.evaluate("razer mouse", "", 8), Verdict::Reject);
    }

    #[test]
    fn weighted_exclusion_rejects_on_two_name_hits() {
        let rules = RuleSet {
            categories: vec![CategoryRule {
                category_id: 9,
                excluded: vec!["mouse".into(), "webcam".into()],
                required: vec!["monitor".into()],
                ..Default::default()
            }],
            ..Default::default()
        };
        let c = Classifier::new(rules).unwrap();
        // One exclusion hit is tolerated when a required keyword matches.
        assert_eq!(c.evaluate("monitor with webcam", "", 9), Verdict::Accept);
        // Two exclusion hits reject before the required gate runs.
        assert_eq!(
            c.evaluate("monitor with webcam and mouse", "", 9),
            Verdict::Reject
        );
    }
}
