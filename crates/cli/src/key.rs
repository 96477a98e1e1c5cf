//! API key resolution.
//!
//! Precedence, lowest to highest: `PUSHWIRE_API_KEY` environment
//! variable, `--key`, `--key-file` (trimmed file contents).

use std::path::Path;

use anyhow::Context;

pub const KEY_ENV: &str = "PUSHWIRE_API_KEY";

pub fn resolve(flag: Option<&str>, file: Option<&Path>) -> anyhow::Result<Option<String>> {
    let mut key = std::env::var(KEY_ENV).ok();

    if let Some(k) = flag {
        key = Some(k.to_owned());
    }

    if let Some(path) = file {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        key = Some(contents.trim().to_owned());
    }

    Ok(key.filter(|k| !k.is_empty()))
}
