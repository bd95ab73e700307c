/*!
shared.rs - argument helpers for command handlers.

Handlers receive `&[String]` already padded to their parameter count, so an
omitted optional argument is an empty string. These helpers turn that into
`&str` access with a readable error for missing required values.
*/

use anyhow::{Result, bail};

/// Positional argument `idx`, trimmed; empty when absent.
pub fn arg(args: &[String], idx: usize) -> &str {
    args.get(idx).map(|s| s.trim()).unwrap_or("")
}

/// Positional argument that must not be empty.
pub fn required<'a>(args: &'a [String], idx: usize, name: &str, usage: &str) -> Result<&'a str> {
    let value = arg(args, idx);
    if value.is_empty() {
        bail!("missing required parameter <{name}> (usage: {usage})");
    }
    Ok(value)
}
