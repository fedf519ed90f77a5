use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_flat_object(map);
            }
        }
        Value::Array(arr) => print_array_table(arr),
        _ => println!("{}", value),
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(res_map) => {
            print_flat_object(res_map);
            if let Some(grid) = sensitivity_grid(res_map) {
                println!("\nFair value by WACC (rows) x terminal growth (columns):");
                println!("{}", grid);
            }
            if let Some(Value::Array(peers)) = res_map.get("peers") {
                println!("\nPeers:");
                print_array_table(peers);
            }
        }
        Value::Null => println!("(no result)"),
        other => println!("{}", format_value(other)),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Scalar fields as a two-column table; nested sections are summarised.
fn print_flat_object(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        if key == "matrix" || key == "peers" {
            continue;
        }
        builder.push_record([key.as_str(), &format_value(val)]);
    }
    println!("{}", Table::from(builder));
}

/// Render a sensitivity `matrix` against its WACC / growth axes.
fn sensitivity_grid(map: &Map<String, Value>) -> Option<Table> {
    let rows = map.get("matrix")?.as_array()?;
    let waccs = map.get("wacc_values")?.as_array()?;
    let growths = map.get("terminal_growth_values")?.as_array()?;

    let mut builder = Builder::default();
    let mut header = vec!["WACC \\ g".to_string()];
    header.extend(growths.iter().map(format_value));
    builder.push_record(header);

    for (wacc, row) in waccs.iter().zip(rows) {
        let mut record = vec![format_value(wacc)];
        for cell in row.as_array()? {
            let text = match cell.get("fair_value") {
                Some(fv) if cell.get("is_base_case").and_then(Value::as_bool) == Some(true) => {
                    format!("[{}]", format_value(fv))
                }
                Some(fv) => format_value(fv),
                None => "invalid".to_string(),
            };
            record.push(text);
        }
        builder.push_record(record);
    }
    Some(Table::from(builder))
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }
        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
