use serde_json::{Map, Value};

/// Headline fields, most useful first.
const PRIORITY_KEYS: [&str; 6] = ["fair_value", "median", "outlook", "upside", "wacc", "regions"];

/// Print just the key answer from the output: the fair value with its
/// upside when there is one, otherwise the first headline field present,
/// otherwise the first field of the result.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    if let Value::Object(map) = result_obj {
        if let Some(line) = fair_value_line(map) {
            println!("{line}");
            return;
        }
        for key in PRIORITY_KEYS {
            if let Some(val) = map.get(key).filter(|v| !v.is_null()) {
                println!("{}", format_minimal(val));
                return;
            }
        }
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    // Absent result or a bare value
    println!("{}", format_minimal(result_obj));
}

/// `fair_value (+12.3%)` when both fields are present.
fn fair_value_line(map: &Map<String, Value>) -> Option<String> {
    let fair_value = map.get("fair_value").filter(|v| !v.is_null())?;
    let upside = as_f64(map.get("upside")?)?;
    Some(format!("{} ({:+.1}%)", format_minimal(fair_value), upside * 100.0))
}

/// Decimals serialise as strings, floats as numbers.
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
