use serde_json::Value;

use fairvalue_core::AssumptionSet;

use crate::input;

/// Built-in assumptions, or a JSON / YAML assumption set from `path`.
pub fn load_assumptions(path: Option<&str>) -> Result<AssumptionSet, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(AssumptionSet::builtin());
    };
    let (canonical, contents) = input::file::read_text(path)?;
    let is_yaml = canonical
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let set = if is_yaml {
        let set: AssumptionSet = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
        set.validate()?;
        set
    } else {
        AssumptionSet::from_json_str(&contents)?
    };
    Ok(set)
}

/// The active assumption set, for inspection or as a template to edit.
pub fn run_regions(assumptions: &AssumptionSet) -> Result<Value, Box<dyn std::error::Error>> {
    Ok(serde_json::json!({
        "regions": assumptions.region_names(),
        "assumptions": assumptions,
    }))
}
