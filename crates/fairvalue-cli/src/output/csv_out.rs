use serde_json::{Map, Value};
use std::io;

type StdoutWriter<'a> = csv::Writer<io::StdoutLock<'a>>;

/// Write output as CSV to stdout.
///
/// A sensitivity grid is written as a matrix (one row per WACC); any other
/// result becomes field/value pairs.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => match map.get("result") {
            Some(Value::Object(result)) if result.contains_key("matrix") => write_grid_csv(&mut wtr, result),
            Some(Value::Object(result)) => write_pairs_csv(&mut wtr, result),
            _ => write_pairs_csv(&mut wtr, map),
        },
        Value::Array(arr) => write_array_csv(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

fn write_pairs_csv(wtr: &mut StdoutWriter<'_>, map: &Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

fn write_grid_csv(wtr: &mut StdoutWriter<'_>, result: &Map<String, Value>) {
    let empty = Vec::new();
    let array = |key: &str| result.get(key).and_then(Value::as_array).unwrap_or(&empty);

    let mut header = vec!["wacc".to_string()];
    header.extend(array("terminal_growth_values").iter().map(format_csv_value));
    let _ = wtr.write_record(&header);

    for (wacc, row) in array("wacc_values").iter().zip(array("matrix")) {
        let mut record = vec![format_csv_value(wacc)];
        record.extend(
            row.as_array()
                .unwrap_or(&empty)
                .iter()
                .map(|cell| cell.get("fair_value").map(format_csv_value).unwrap_or_default()),
        );
        let _ = wtr.write_record(&record);
    }
}

fn write_array_csv(wtr: &mut StdoutWriter<'_>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
