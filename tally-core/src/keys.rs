//! Cache-key derivation.
//!
//! The cache treats keys as opaque strings; deriving them is the caller's
//! job. Logically identical requests must map to the same key and different
//! requests must not collide.
//!
//! ## Completion keys
//!
//! ```text
//! key = "llm:" || hex(SHA3-256(len(domain) || domain || canonical_json(request)))
//! ```
//!
//! `canonical_json` writes object members in sorted key order with no
//! whitespace, so two schemas that differ only in member order share a key.

use serde_json::Value;
use sha3::{Digest, Sha3_256};

use crate::constants::{COMPLETION_KEY_PREFIX, DOMAIN_COMPLETION_KEY, MAX_SYMBOL_LEN};
use crate::error::{Result, TallyError};
use crate::types::CompletionRequest;

// ═══════════════════════════════════════════════════════════════════════════════
// SYMBOL KEYS
// ═══════════════════════════════════════════════════════════════════════════════

/// Normalizes a ticker symbol into its cache key.
///
/// Trims whitespace and upper-cases. Accepts ASCII alphanumerics plus
/// `.`, `-`, `^` and `=` (indices, share classes, FX pairs).
pub fn symbol_key(raw: &str) -> Result<String> {
    let symbol = raw.trim().to_ascii_uppercase();

    if symbol.is_empty() {
        return Err(TallyError::InvalidSymbol("symbol cannot be empty".into()));
    }
    if symbol.len() > MAX_SYMBOL_LEN {
        return Err(TallyError::InvalidSymbol(format!(
            "'{}' is longer than {} characters",
            symbol, MAX_SYMBOL_LEN
        )));
    }
    if !symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='))
    {
        return Err(TallyError::InvalidSymbol(format!(
            "'{}' contains unsupported characters",
            symbol
        )));
    }

    Ok(symbol)
}

/// Splits a comma-separated symbol list (as sent by the dashboard) into keys.
///
/// Blank items are skipped; the first malformed symbol fails the whole list.
pub fn symbol_keys(list: &str) -> Result<Vec<String>> {
    list.split(',')
        .filter(|item| !item.trim().is_empty())
        .map(symbol_key)
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPLETION KEYS
// ═══════════════════════════════════════════════════════════════════════════════

/// Derives the cache key of an LLM completion request.
pub fn completion_key(request: &CompletionRequest) -> String {
    let mut canonical = String::new();
    write_canonical(
        &serde_json::json!({
            "prompt": request.prompt,
            "schema": request.schema,
            "systemInstruction": request.system_instruction,
            "addInternetContext": request.add_internet_context,
        }),
        &mut canonical,
    );

    let mut hasher = Sha3_256::new();
    hasher.update((DOMAIN_COMPLETION_KEY.len() as u32).to_le_bytes());
    hasher.update(DOMAIN_COMPLETION_KEY);
    hasher.update(canonical.as_bytes());

    format!("{}{}", COMPLETION_KEY_PREFIX, hex::encode(hasher.finalize()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut members: Vec<_> = map.iter().collect();
            members.sort_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (i, (key, member)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(member, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}
