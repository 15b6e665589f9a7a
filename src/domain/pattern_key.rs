//! Pattern Keys
//!
//! A pattern key is the canonical identity of a contextual pattern:
//!
//! ```text
//! module=<m>|<dim_a>=<v>|<dim_b>=<v>|outcome_class=<c>
//! ```
//!
//! Dimension pairs are sorted by dimension name, so the same bucketed
//! context always renders the same key regardless of input ordering.
//! Key generation enumerates every dimension subset of size 1..=k of the
//! eligible context plus the zero-dimension key.

use statrs::function::factorial::binomial;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::context::{BucketedDimensions, DimensionMap, ModuleSpec, MODULE_TOKEN, OUTCOME_CLASS_DIM};

/// Default maximum number of dimensions combined in one key
pub const DEFAULT_MAX_ARITY: usize = 3;

/// Key separator
pub const KEY_SEPARATOR: char = '|';

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Trade context has no outcome_class")]
    MissingOutcomeClass,

    #[error("Malformed pattern key '{key}': {reason}")]
    Malformed { key: String, reason: String },
}

/// Replace the key separator inside a value
pub fn sanitize_token(value: &str) -> String {
    value.replace(KEY_SEPARATOR, "/")
}

/// Parsed, canonical pattern key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternKey {
    module: String,
    dimensions: Vec<(String, String)>,
    outcome_class: String,
}

impl PatternKey {
    /// Build a key; dimension pairs are sorted into canonical order.
    ///
    /// Values and the outcome class never carry the key separator: `|` is
    /// coerced to `/` so every built key parses back.
    pub fn new<I>(module: &str, dimensions: I, outcome_class: &str) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut dimensions: Vec<(String, String)> = dimensions
            .into_iter()
            .map(|(name, value)| (name, sanitize_token(&value)))
            .collect();
        dimensions.sort();
        Self {
            module: sanitize_token(module),
            dimensions,
            outcome_class: sanitize_token(outcome_class),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn outcome_class(&self) -> &str {
        &self.outcome_class
    }

    /// Variable (non-module, non-outcome) dimension pairs in canonical order
    pub fn dimensions(&self) -> &[(String, String)] {
        &self.dimensions
    }

    /// Number of variable dimensions
    pub fn arity(&self) -> usize {
        self.dimensions.len()
    }

    pub fn dimension_map(&self) -> BucketedDimensions {
        self.dimensions.iter().cloned().collect()
    }

    /// Copy of this key with the variable dimension at `index` removed
    pub fn without(&self, index: usize) -> Self {
        let dimensions = self
            .dimensions
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, pair)| pair.clone());
        Self::new(&self.module, dimensions, &self.outcome_class)
    }

    /// Render to the canonical string form
    pub fn render(&self) -> String {
        let mut out = format!("{}={}", MODULE_TOKEN, self.module);
        for (dimension, value) in &self.dimensions {
            out.push(KEY_SEPARATOR);
            out.push_str(dimension);
            out.push('=');
            out.push_str(value);
        }
        out.push(KEY_SEPARATOR);
        out.push_str(OUTCOME_CLASS_DIM);
        out.push('=');
        out.push_str(&self.outcome_class);
        out
    }

    /// Parse a rendered key. Token order in the input is not significant.
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        let malformed = |reason: &str| KeyError::Malformed {
            key: key.to_string(),
            reason: reason.to_string(),
        };

        let mut module = None;
        let mut outcome_class = None;
        let mut dimensions = Vec::new();

        for token in key.split(KEY_SEPARATOR) {
            let (name, value) = token
                .split_once('=')
                .ok_or_else(|| malformed("token without '='"))?;
            if name.is_empty() {
                return Err(malformed("empty dimension name"));
            }
            match name {
                MODULE_TOKEN => module = Some(value.to_string()),
                OUTCOME_CLASS_DIM => outcome_class = Some(value.to_string()),
                _ => dimensions.push((name.to_string(), value.to_string())),
            }
        }

        let module = module.ok_or_else(|| malformed("missing module token"))?;
        let outcome_class = outcome_class.ok_or_else(|| malformed("missing outcome_class token"))?;
        Ok(Self::new(&module, dimensions, &outcome_class))
    }
}

impl fmt::Display for PatternKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl FromStr for PatternKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Iterator over all k-combinations of `0..n` in lexicographic order
#[derive(Debug, Clone)]
pub struct IndexCombinations {
    n: usize,
    indices: Vec<usize>,
    done: bool,
}

impl IndexCombinations {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            n,
            indices: (0..k).collect(),
            done: k > n,
        }
    }
}

impl Iterator for IndexCombinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let current = self.indices.clone();

        // Advance: find the rightmost index that can still move right
        let k = self.indices.len();
        let mut i = k;
        loop {
            if i == 0 {
                self.done = true;
                break;
            }
            i -= 1;
            if self.indices[i] < self.n - k + i {
                self.indices[i] += 1;
                for j in (i + 1)..k {
                    self.indices[j] = self.indices[j - 1] + 1;
                }
                break;
            }
        }

        Some(current)
    }
}

/// Number of keys `generate_pattern_keys` emits for `d` eligible dimensions:
/// `sum(C(d, i) for i in 1..=min(k, d)) + 1`
pub fn expected_key_count(eligible: usize, max_arity: usize) -> usize {
    let combinatorial: f64 = (1..=max_arity.min(eligible))
        .map(|size| binomial(eligible as u64, size as u64))
        .sum();
    combinatorial.round() as usize + 1
}

/// Eligible (dimension, rendered value) pairs of a context, sorted by name
pub fn eligible_dimensions(context: &DimensionMap, module: &ModuleSpec) -> Vec<(String, String)> {
    // BTreeMap iteration is already sorted by dimension name
    context
        .iter()
        .filter(|(name, _)| module.allows(name))
        .filter_map(|(name, value)| value.as_ref().map(|v| (name.clone(), v.render())))
        .collect()
}

/// Enumerate every pattern key of a bucketed context.
///
/// Emits the zero-dimension key first, then all combinations of size
/// 1..=`max_arity` in lexicographic order of the sorted eligible dimensions.
pub fn generate_pattern_keys(
    context: &DimensionMap,
    outcome_class: Option<&str>,
    module: &ModuleSpec,
    max_arity: usize,
) -> Result<Vec<PatternKey>, KeyError> {
    let outcome_class = outcome_class
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(KeyError::MissingOutcomeClass)?;

    let eligible = eligible_dimensions(context, module);
    let mut keys = Vec::with_capacity(expected_key_count(eligible.len(), max_arity));

    keys.push(PatternKey::new(&module.name, Vec::new(), outcome_class));

    for size in 1..=max_arity.min(eligible.len()) {
        for combo in IndexCombinations::new(eligible.len(), size) {
            let pairs = combo.into_iter().map(|i| eligible[i].clone());
            keys.push(PatternKey::new(&module.name, pairs, outcome_class));
        }
    }

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::DimensionValue;
    use rand::seq::SliceRandom;
    use regex::Regex;

    fn pm_module() -> ModuleSpec {
        ModuleSpec::new("pm", ["state", "a_bucket", "action_type", "mcap_bucket", "flag"], ["state"])
    }

    fn context(pairs: &[(&str, DimensionValue)]) -> DimensionMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.clone())))
            .collect()
    }

    #[test]
    fn test_render_canonical_order() {
        let key = PatternKey::new(
            "pm",
            vec![
                ("state".to_string(), "S1".to_string()),
                ("a_bucket".to_string(), "med".to_string()),
            ],
            "win",
        );
        assert_eq!(key.render(), "module=pm|a_bucket=med|state=S1|outcome_class=win");
    }

    #[test]
    fn test_parse_round_trip() {
        let rendered = "module=pm|a_bucket=med|state=S1|outcome_class=win";
        let key = PatternKey::parse(rendered).unwrap();

        assert_eq!(key.module(), "pm");
        assert_eq!(key.outcome_class(), "win");
        assert_eq!(key.arity(), 2);
        assert_eq!(key.to_string(), rendered);
    }

    #[test]
    fn test_parse_reorders_tokens() {
        let key: PatternKey = "outcome_class=win|state=S1|module=pm|a_bucket=med".parse().unwrap();
        assert_eq!(key.render(), "module=pm|a_bucket=med|state=S1|outcome_class=win");
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            PatternKey::parse("module=pm|garbage|outcome_class=win"),
            Err(KeyError::Malformed { .. })
        ));
        assert!(matches!(
            PatternKey::parse("state=S1|outcome_class=win"),
            Err(KeyError::Malformed { .. })
        ));
        assert!(matches!(
            PatternKey::parse("module=pm|state=S1"),
            Err(KeyError::Malformed { .. })
        ));
    }

    #[test]
    fn test_index_combinations() {
        let combos: Vec<Vec<usize>> = IndexCombinations::new(4, 2).collect();
        assert_eq!(
            combos,
            vec![
                vec![0, 1],
                vec![0, 2],
                vec![0, 3],
                vec![1, 2],
                vec![1, 3],
                vec![2, 3]
            ]
        );
        assert_eq!(IndexCombinations::new(2, 3).count(), 0);
        assert_eq!(IndexCombinations::new(3, 3).count(), 1);
    }

    #[test]
    fn test_scenario_two_dimensions() {
        let ctx = context(&[("state", "S1".into()), ("a_bucket", "med".into())]);
        let keys = generate_pattern_keys(&ctx, Some("win"), &pm_module(), 3).unwrap();
        let rendered: Vec<String> = keys.iter().map(|k| k.render()).collect();

        assert_eq!(
            rendered,
            vec![
                "module=pm|outcome_class=win",
                "module=pm|a_bucket=med|outcome_class=win",
                "module=pm|state=S1|outcome_class=win",
                "module=pm|a_bucket=med|state=S1|outcome_class=win",
            ]
        );
    }

    #[test]
    fn test_key_count_invariant() {
        let module = ModuleSpec::new("pm", (0..8).map(|i| format!("d{}", i)), Vec::<String>::new());

        for d in 0..=8 {
            let ctx: DimensionMap = (0..d)
                .map(|i| (format!("d{}", i), Some(DimensionValue::from("x"))))
                .collect();
            let keys = generate_pattern_keys(&ctx, Some("win"), &module, 3).unwrap();

            let combinatorial: usize = (1..=3.min(d))
                .map(|i| binomial(d as u64, i as u64).round() as usize)
                .sum();
            assert_eq!(keys.len(), combinatorial + 1, "d = {}", d);
            assert_eq!(keys.len(), expected_key_count(d, 3));
        }
    }

    #[test]
    fn test_order_independent() {
        let pairs = vec![
            ("state", DimensionValue::from("S2")),
            ("a_bucket", DimensionValue::from("low")),
            ("action_type", DimensionValue::from("add")),
            ("flag", DimensionValue::Bool(true)),
            ("mcap_bucket", DimensionValue::from("micro")),
        ];
        let reference = generate_pattern_keys(&context(&pairs), Some("loss"), &pm_module(), 3).unwrap();

        let mut rng = rand::thread_rng();
        for _ in 0..10 {
            let mut shuffled = pairs.clone();
            shuffled.shuffle(&mut rng);
            let keys = generate_pattern_keys(&context(&shuffled), Some("loss"), &pm_module(), 3).unwrap();
            assert_eq!(keys, reference);
        }
    }

    #[test]
    fn test_filters_non_whitelisted_and_null() {
        let mut ctx = context(&[("state", "S1".into()), ("curator", "alice".into())]);
        ctx.insert("a_bucket".to_string(), None);
        ctx.insert(OUTCOME_CLASS_DIM.to_string(), Some("win".into()));

        let keys = generate_pattern_keys(&ctx, Some("win"), &pm_module(), 3).unwrap();
        let rendered: Vec<String> = keys.iter().map(|k| k.render()).collect();

        assert_eq!(
            rendered,
            vec!["module=pm|outcome_class=win", "module=pm|state=S1|outcome_class=win"]
        );
    }

    #[test]
    fn test_booleans_lowercase() {
        let ctx = context(&[("flag", DimensionValue::Bool(true))]);
        let keys = generate_pattern_keys(&ctx, Some("win"), &pm_module(), 3).unwrap();
        assert_eq!(keys[1].render(), "module=pm|flag=true|outcome_class=win");
    }

    #[test]
    fn test_missing_outcome_class() {
        let ctx = context(&[("state", "S1".into())]);
        assert_eq!(
            generate_pattern_keys(&ctx, None, &pm_module(), 3),
            Err(KeyError::MissingOutcomeClass)
        );
        assert_eq!(
            generate_pattern_keys(&ctx, Some("  "), &pm_module(), 3),
            Err(KeyError::MissingOutcomeClass)
        );
    }

    #[test]
    fn test_key_format() {
        let re = Regex::new(r"^module=[^|=]+(\|[a-z_]+=[^|]+)*\|outcome_class=[^|]+$").unwrap();
        let ctx = context(&[
            ("state", "S1".into()),
            ("a_bucket", "med".into()),
            ("mcap_bucket", "micro".into()),
            ("flag", DimensionValue::Bool(false)),
        ]);

        for key in generate_pattern_keys(&ctx, Some("win"), &pm_module(), 3).unwrap() {
            assert!(re.is_match(&key.render()), "bad key {}", key);
        }
    }

    #[test]
    fn test_separator_in_outcome_class_coerced() {
        let ctx = context(&[("state", "S1".into())]);

        let keys = generate_pattern_keys(&ctx, Some("win|big"), &pm_module(), 3).unwrap();

        assert_eq!(keys[0].render(), "module=pm|outcome_class=win/big");
        for key in keys {
            let rendered = key.render();
            assert_eq!(PatternKey::parse(&rendered).unwrap().render(), rendered);
        }
    }

    #[test]
    fn test_new_coerces_separator_in_values() {
        let key = PatternKey::new("pm", [("state".to_string(), "a|b".to_string())], "win");
        assert_eq!(key.render(), "module=pm|state=a/b|outcome_class=win");
    }

    #[test]
    fn test_without_drops_one_dimension() {
        let key = PatternKey::parse("module=pm|a_bucket=med|state=S1|outcome_class=win").unwrap();
        assert_eq!(key.without(0).render(), "module=pm|state=S1|outcome_class=win");
        assert_eq!(key.without(1).render(), "module=pm|a_bucket=med|outcome_class=win");
    }
}
