use std::io::{self, BufRead, Write};

use anyhow::{bail, Context, Result};

/// Print `label` and read one trimmed line from stdin
pub fn line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut input)
        .context("Failed to read from stdin")?;
    if read == 0 {
        bail!("Input closed");
    }
    Ok(input.trim().to_string())
}

pub fn password(label: &str) -> Result<String> {
    rpassword::prompt_password(label).context("Failed to read password")
}

/// Ask twice and require both entries to match
pub fn new_password() -> Result<String> {
    let first = password("New password: ")?;
    let second = password("Confirm password: ")?;
    if first != second {
        bail!("Passwords do not match");
    }
    Ok(first)
}
