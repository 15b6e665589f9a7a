//! Family & Lineage
//!
//! Every pattern belongs to one coarse family (module + the module's core
//! dimensions + outcome class) and has a set of one-dimension-simpler
//! parents. Parents are derived from the key string on demand, so the
//! pattern hierarchy is a DAG that never has to be stored explicitly.

use super::context::{DimensionMap, ModuleSpec};
use super::pattern_key::{KeyError, PatternKey};

/// Family id of a trade context.
///
/// Only core dimensions actually present in the context take part; missing
/// ones are never defaulted. The family id uses the canonical key rendering.
pub fn family_id(context: &DimensionMap, outcome_class: &str, module: &ModuleSpec) -> String {
    let core = module.core_dimensions.iter().filter_map(|dimension| {
        context
            .get(dimension)
            .and_then(|value| value.as_ref())
            .map(|value| (dimension.clone(), value.render()))
    });
    PatternKey::new(&module.name, core, outcome_class).render()
}

/// All parents of a key: one per dropped variable dimension.
///
/// Module and outcome class are immutable. Keys with fewer than two variable
/// dimensions have no parents.
pub fn parent_keys(key: &PatternKey) -> Vec<PatternKey> {
    if key.arity() < 2 {
        return Vec::new();
    }
    (0..key.arity()).map(|index| key.without(index)).collect()
}

/// String form of `parent_keys`
pub fn parent_key_strings(key: &str) -> Result<Vec<String>, KeyError> {
    let parsed = PatternKey::parse(key)?;
    Ok(parent_keys(&parsed).iter().map(PatternKey::render).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::DimensionValue;

    fn pm_module() -> ModuleSpec {
        ModuleSpec::new("pm", ["state", "a_bucket", "action_type", "mcap_bucket"], ["state", "action_type"])
    }

    #[test]
    fn test_family_id_present_only() {
        let mut ctx = DimensionMap::new();
        ctx.insert("state".to_string(), Some(DimensionValue::from("S1")));
        ctx.insert("a_bucket".to_string(), Some(DimensionValue::from("med")));

        assert_eq!(family_id(&ctx, "win", &pm_module()), "module=pm|state=S1|outcome_class=win");

        ctx.insert("action_type".to_string(), Some(DimensionValue::from("add")));
        assert_eq!(
            family_id(&ctx, "win", &pm_module()),
            "module=pm|action_type=add|state=S1|outcome_class=win"
        );
    }

    #[test]
    fn test_family_id_ignores_null_core() {
        let mut ctx = DimensionMap::new();
        ctx.insert("state".to_string(), None);

        assert_eq!(family_id(&ctx, "loss", &pm_module()), "module=pm|outcome_class=loss");
    }

    #[test]
    fn test_parent_count_invariant() {
        let dims = ["a", "b", "c", "d"];
        for m in 0..=dims.len() {
            let key = PatternKey::new(
                "pm",
                dims[..m].iter().map(|d| (d.to_string(), "x".to_string())),
                "win",
            );
            let parents = parent_keys(&key);

            if m <= 1 {
                assert!(parents.is_empty(), "m = {}", m);
            } else {
                assert_eq!(parents.len(), m);
                assert!(parents.iter().all(|p| p.arity() == m - 1));
                assert!(parents.iter().all(|p| p.module() == "pm" && p.outcome_class() == "win"));
            }
        }
    }

    #[test]
    fn test_parent_key_strings() {
        let parents =
            parent_key_strings("module=pm|a_bucket=med|mcap_bucket=micro|state=S1|outcome_class=win").unwrap();

        assert_eq!(
            parents,
            vec![
                "module=pm|mcap_bucket=micro|state=S1|outcome_class=win",
                "module=pm|a_bucket=med|state=S1|outcome_class=win",
                "module=pm|a_bucket=med|mcap_bucket=micro|outcome_class=win",
            ]
        );
    }

    #[test]
    fn test_parents_are_distinct() {
        let key = PatternKey::parse("module=pm|a=1|b=2|c=3|outcome_class=win").unwrap();
        let mut parents: Vec<String> = parent_keys(&key).iter().map(|p| p.render()).collect();
        parents.sort();
        parents.dedup();
        assert_eq!(parents.len(), 3);
    }

    #[test]
    fn test_parent_key_strings_malformed() {
        assert!(parent_key_strings("nonsense").is_err());
    }
}
