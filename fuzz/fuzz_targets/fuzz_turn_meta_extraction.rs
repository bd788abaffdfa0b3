#![no_main]

use libfuzzer_sys::fuzz_target;

use serde_json::Value;

/// Mirrors the field extraction the turn-metadata path performs on model
/// output. The real parsers in `src/coach/assembler.rs` are crate-private,
/// so the same access pattern is replicated here: parse JSON, then pull
/// "actions", "summary", "topics", and "sentiment" out of whatever shape
/// came back. Model output is adversarial by nature; none of this may panic.
fn extract_meta(data: &[u8]) {
    let value: Value = match serde_json::from_slice(data) {
        Ok(v) => v,
        Err(_) => return,
    };

    if let Some(items) = value["actions"].as_array() {
        for item in items {
            let _ = item["description"].as_str().map(str::trim);
            let _ = item["priority"].as_str();
            let _ = item["due_suggestion"].as_str();
        }
    }
    let _ = value["summary"].as_str();
    if let Some(topics) = value["topics"].as_array() {
        for topic in topics {
            let _ = topic.as_str();
        }
    }
    let _ = value["sentiment"].as_str();
}

fuzz_target!(|data: &[u8]| {
    extract_meta(data);
});
