//! Emotion taxonomy: fine-grained labels → macro category + valence weight.
//!
//! The default table covers the GoEmotions label set. A [`Taxonomy`] is a plain
//! owned value handed to every component that needs it, so tests can build
//! small synthetic taxonomies with [`Taxonomy::new`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ContagionError, Result};

/// Macro categories of the default taxonomy, in reporting order.
pub const MACRO_LABELS: [&str; 6] = ["joy", "anger", "sadness", "fear", "other_negative", "neutral"];

/// Category that unknown fine labels fall back to.
pub const FALLBACK_MACRO: &str = "neutral";

/// (fine label, macro category, valence weight).
const GOEMOTIONS: &[(&str, &str, f64)] = &[
    // Positive affect
    ("admiration", "joy", 0.7),
    ("amusement", "joy", 0.8),
    ("approval", "joy", 0.6),
    ("caring", "joy", 0.6),
    ("excitement", "joy", 0.8),
    ("gratitude", "joy", 0.9),
    ("joy", "joy", 1.0),
    ("love", "joy", 0.9),
    ("optimism", "joy", 0.8),
    ("pride", "joy", 0.7),
    ("relief", "joy", 0.6),
    // Anger and frustration
    ("anger", "anger", -0.9),
    ("annoyance", "anger", -0.6),
    ("disappointment", "anger", -0.7),
    ("disapproval", "anger", -0.6),
    // Sadness and loss
    ("grief", "sadness", -0.9),
    ("remorse", "sadness", -0.7),
    ("sadness", "sadness", -0.8),
    // Fear and anxiety
    ("fear", "fear", -0.8),
    ("nervousness", "fear", -0.6),
    // Other negative
    ("confusion", "other_negative", -0.3),
    ("embarrassment", "other_negative", -0.5),
    ("disgust", "other_negative", -0.8),
    // Neutral, informational or ambiguous
    ("neutral", "neutral", 0.0),
    ("realization", "neutral", 0.0),
    ("surprise", "neutral", 0.0),
    ("curiosity", "neutral", 0.1),
    ("desire", "neutral", 0.2),
    ("example_very_unclear", "neutral", 0.0),
];

/// One fine-grained label entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FineLabel {
    pub name: String,
    pub macro_label: String,
    pub valence: f64,
}

/// Macro category and valence assigned to a label or a set of labels.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Classification {
    pub macro_label: String,
    pub valence: f64,
}

/// Immutable lookup table shared by every component.
#[derive(Debug, Clone, PartialEq)]
pub struct Taxonomy {
    macros: Vec<String>,
    fine: Vec<FineLabel>,
    index: HashMap<String, usize>,
    fallback: String,
}

fn normalize(label: &str) -> String {
    label.trim().to_lowercase()
}

impl Taxonomy {
    /// Build a taxonomy from explicit parts.
    ///
    /// Rejects empty macro sets, duplicate names, fine labels mapped to an
    /// unlisted macro, valences outside [-1, 1], and an unlisted fallback.
    pub fn new(macros: Vec<String>, fine: Vec<FineLabel>, fallback: &str) -> Result<Self> {
        let macros: Vec<String> = macros.iter().map(|m| normalize(m)).collect();
        if macros.is_empty() {
            return Err(ContagionError::Taxonomy("no macro categories".into()));
        }
        for (i, m) in macros.iter().enumerate() {
            if m.is_empty() {
                return Err(ContagionError::Taxonomy("empty macro category name".into()));
            }
            if macros[..i].contains(m) {
                return Err(ContagionError::Taxonomy(format!("duplicate macro category '{m}'")));
            }
        }
        let fallback = normalize(fallback);
        if !macros.contains(&fallback) {
            return Err(ContagionError::Taxonomy(format!(
                "fallback category '{fallback}' is not a macro category"
            )));
        }

        let mut index = HashMap::with_capacity(fine.len());
        let mut entries = Vec::with_capacity(fine.len());
        for label in fine {
            let name = normalize(&label.name);
            let macro_label = normalize(&label.macro_label);
            if !macros.contains(&macro_label) {
                return Err(ContagionError::Taxonomy(format!(
                    "label '{name}' maps to unknown category '{macro_label}'"
                )));
            }
            if !label.valence.is_finite() || !(-1.0..=1.0).contains(&label.valence) {
                return Err(ContagionError::Taxonomy(format!(
                    "label '{name}' has valence {} outside [-1, 1]",
                    label.valence
                )));
            }
            if index.insert(name.clone(), entries.len()).is_some() {
                return Err(ContagionError::Taxonomy(format!("duplicate label '{name}'")));
            }
            entries.push(FineLabel {
                name,
                macro_label,
                valence: label.valence,
            });
        }

        Ok(Self {
            macros,
            fine: entries,
            index,
            fallback,
        })
    }

    /// The built-in GoEmotions taxonomy.
    pub fn goemotions() -> Self {
        let macros: Vec<String> = MACRO_LABELS.iter().map(|m| m.to_string()).collect();
        let fine: Vec<FineLabel> = GOEMOTIONS
            .iter()
            .map(|&(name, macro_label, valence)| FineLabel {
                name: name.to_string(),
                macro_label: macro_label.to_string(),
                valence,
            })
            .collect();
        let index = fine
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        Self {
            macros,
            fine,
            index,
            fallback: FALLBACK_MACRO.to_string(),
        }
    }

    /// Macro categories in reporting order.
    pub fn macros(&self) -> &[String] {
        &self.macros
    }

    pub fn fine_labels(&self) -> &[FineLabel] {
        &self.fine
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Position of a macro category in [`Taxonomy::macros`].
    pub fn macro_index(&self, label: &str) -> Option<usize> {
        let label = normalize(label);
        self.macros.iter().position(|m| *m == label)
    }

    pub fn contains_macro(&self, label: &str) -> bool {
        self.macro_index(label).is_some()
    }

    /// Classify one fine label. Unknown labels map to the fallback with valence 0.
    pub fn classify(&self, fine_label: &str) -> Classification {
        match self.index.get(&normalize(fine_label)) {
            Some(&i) => Classification {
                macro_label: self.fine[i].macro_label.clone(),
                valence: self.fine[i].valence,
            },
            None => Classification {
                macro_label: self.fallback.clone(),
                valence: 0.0,
            },
        }
    }

    /// Collapse a comment's active fine labels into one macro label and valence.
    ///
    /// No active labels gives the fallback with valence 0. Otherwise the macro
    /// with the most active labels wins (ties go to the one reached first) and
    /// valence is the mean weight of the active labels.
    pub fn resolve<'a, I>(&self, active: I) -> Classification
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut counts: Vec<(String, usize)> = Vec::new();
        let mut valence_sum = 0.0;
        let mut n = 0usize;

        for label in active {
            let c = self.classify(label);
            valence_sum += c.valence;
            n += 1;
            match counts.iter_mut().find(|(m, _)| *m == c.macro_label) {
                Some((_, count)) => *count += 1,
                None => counts.push((c.macro_label, 1)),
            }
        }

        if n == 0 {
            return Classification {
                macro_label: self.fallback.clone(),
                valence: 0.0,
            };
        }

        let mut best = 0;
        for (i, (_, count)) in counts.iter().enumerate() {
            if *count > counts[best].1 {
                best = i;
            }
        }
        Classification {
            macro_label: counts.swap_remove(best).0,
            valence: valence_sum / n as f64,
        }
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::goemotions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny() -> Taxonomy {
        Taxonomy::new(
            vec!["up".into(), "down".into(), "flat".into()],
            vec![
                FineLabel { name: "glad".into(), macro_label: "up".into(), valence: 0.5 },
                FineLabel { name: "sad".into(), macro_label: "down".into(), valence: -0.5 },
            ],
            "flat",
        )
        .unwrap()
    }

    #[test]
    fn test_default_covers_all_macros() {
        let t = Taxonomy::goemotions();
        assert_eq!(t.macros().len(), MACRO_LABELS.len());
        for m in MACRO_LABELS {
            assert!(t.fine_labels().iter().any(|f| f.macro_label == m), "{m} unused");
        }
        assert_eq!(t.fine_labels().len(), 29);
        let surprise = t.classify("surprise");
        assert_eq!(surprise.macro_label, "neutral");
        assert_eq!(surprise.valence, 0.0);
        assert!(t.fine_labels().iter().any(|f| f.name == "surprise"));
    }

    #[test]
    fn test_default_passes_own_validation() {
        let t = Taxonomy::goemotions();
        let rebuilt = Taxonomy::new(
            t.macros().to_vec(),
            t.fine_labels().to_vec(),
            t.fallback(),
        )
        .unwrap();
        assert_eq!(rebuilt, t);
    }

    #[test]
    fn test_classify_known_labels() {
        let t = Taxonomy::goemotions();
        let c = t.classify("gratitude");
        assert_eq!(c.macro_label, "joy");
        assert!((c.valence - 0.9).abs() < 1e-12);
        assert_eq!(t.classify("nervousness").macro_label, "fear");
        assert_eq!(t.classify("disgust").macro_label, "other_negative");
        assert_eq!(t.classify(" Anger ").macro_label, "anger");
    }

    #[test]
    fn test_classify_unknown_falls_back() {
        let t = Taxonomy::goemotions();
        let c = t.classify("schadenfreude");
        assert_eq!(c.macro_label, "neutral");
        assert_eq!(c.valence, 0.0);
    }

    #[test]
    fn test_classification_is_stable_across_instances() {
        let a = Taxonomy::goemotions();
        let b = Taxonomy::default();
        for f in a.fine_labels() {
            assert_eq!(a.classify(&f.name), b.classify(&f.name));
        }
    }

    #[test]
    fn test_resolve_empty_is_fallback() {
        let t = Taxonomy::goemotions();
        let c = t.resolve(std::iter::empty());
        assert_eq!(c.macro_label, "neutral");
        assert_eq!(c.valence, 0.0);
    }

    #[test]
    fn test_resolve_majority_and_mean_valence() {
        let t = Taxonomy::goemotions();
        let c = t.resolve(["anger", "annoyance", "joy"]);
        assert_eq!(c.macro_label, "anger");
        assert!((c.valence - (-0.9 - 0.6 + 1.0) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_resolve_tie_goes_to_first_reached() {
        let t = Taxonomy::goemotions();
        assert_eq!(t.resolve(["fear", "joy"]).macro_label, "fear");
        assert_eq!(t.resolve(["joy", "fear"]).macro_label, "joy");
    }

    #[test]
    fn test_synthetic_taxonomy() {
        let t = tiny();
        assert_eq!(t.macro_index("down"), Some(1));
        assert_eq!(t.classify("unknown").macro_label, "flat");
        assert_eq!(t.resolve(["glad", "glad", "sad"]).macro_label, "up");
    }

    #[test]
    fn test_new_rejects_bad_valence() {
        let err = Taxonomy::new(
            vec!["a".into()],
            vec![FineLabel { name: "x".into(), macro_label: "a".into(), valence: 1.5 }],
            "a",
        );
        assert!(matches!(err, Err(ContagionError::Taxonomy(_))));
    }

    #[test]
    fn test_new_rejects_unknown_macro_and_fallback() {
        let bad_macro = Taxonomy::new(
            vec!["a".into()],
            vec![FineLabel { name: "x".into(), macro_label: "b".into(), valence: 0.0 }],
            "a",
        );
        assert!(bad_macro.is_err());
        assert!(Taxonomy::new(vec!["a".into()], vec![], "z").is_err());
        assert!(Taxonomy::new(vec![], vec![], "a").is_err());
    }
}
