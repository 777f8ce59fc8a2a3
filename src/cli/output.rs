use serde_json::{json, Value};

use crate::cli::OutputFormat;

/// Print a success message; in JSON mode `data` is merged into the envelope.
pub fn output_success(output_format: OutputFormat, message: &str, data: Option<Value>) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&success_envelope(message, data))?),
        OutputFormat::Text => {
            println!("✓ {}", message);
            if let Some(data) = data {
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
        }
    }
    Ok(())
}

fn success_envelope(message: &str, data: Option<Value>) -> Value {
    let mut response = json!({
        "success": true,
        "message": message
    });
    match data {
        Some(Value::Object(fields)) => {
            if let Some(envelope) = response.as_object_mut() {
                envelope.extend(fields);
            }
        }
        Some(other) => response["data"] = other,
        None => {}
    }
    response
}

/// Rows as a JSON array, or one compact line per row in text mode.
pub fn output_rows(output_format: OutputFormat, rows: &[serde_json::Map<String, Value>]) -> anyhow::Result<()> {
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(rows)?),
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("(no rows)");
            }
            for row in rows {
                println!("{}", serde_json::to_string(row)?);
            }
        }
    }
    Ok(())
}
