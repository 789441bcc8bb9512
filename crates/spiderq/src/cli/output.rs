//! JSON-lines output.

use std::io::Write;

use anyhow::Result;
use serde::Serialize;

/// Write `value` as one compact JSON document followed by a newline.
pub fn emit<W: Write + ?Sized, T: Serialize + ?Sized>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Parse the lines written by [`emit`]; used by command tests.
#[cfg(test)]
pub fn lines(buf: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(buf)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}
