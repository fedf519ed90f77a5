pub mod file;
pub mod stdin;

use serde_json::Value;

/// JSON payload from `--input <file>` or, failing that, piped stdin.
pub fn read_payload(path: Option<&str>) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(path) = path {
        return file::read_json_value(path);
    }
    match stdin::read_stdin()? {
        Some(value) => Ok(value),
        None => Err("No input: pass --input <file.json> or pipe JSON on stdin".into()),
    }
}
