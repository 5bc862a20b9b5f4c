//! Credential resolution: flag, then environment, then an interactive prompt.

use std::io::{BufRead, Write};

use anyhow::{Context, Result, bail};
use media_rescue_core::Credentials;

pub(crate) const EMAIL_ENV: &str = "MEDIA_RESCUE_EMAIL";
pub(crate) const PASSWORD_ENV: &str = "MEDIA_RESCUE_PASSWORD";

const PROMPT_BANNER: &str = "\
Your email and password are needed to sign in and fetch your photos and videos.
Nothing is stored or sent anywhere except the media service.";

/// Resolves credentials from the process environment, prompting on stdin for gaps.
pub(crate) fn resolve_credentials(email_flag: Option<String>) -> Result<Credentials> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stderr();
    resolve_credentials_from(
        email_flag,
        std::env::var(EMAIL_ENV).ok(),
        std::env::var(PASSWORD_ENV).ok(),
        &mut input,
        &mut output,
    )
}

pub(crate) fn resolve_credentials_from(
    email_flag: Option<String>,
    email_env: Option<String>,
    password_env: Option<String>,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Credentials> {
    let email = non_empty(email_flag).or_else(|| non_empty(email_env));
    let password = non_empty(password_env);

    if email.is_none() || password.is_none() {
        writeln!(output, "{PROMPT_BANNER}")?;
    }

    let email = match email {
        Some(email) => email,
        None => prompt(input, output, "Email: ")?,
    };
    let password = match password {
        Some(password) => password,
        None => prompt(input, output, "Password: ")?,
    };

    if email.is_empty() {
        bail!("An email address is required to sign in");
    }
    if password.is_empty() {
        bail!("A password is required to sign in");
    }

    Ok(Credentials::new(email, password))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn prompt(input: &mut impl BufRead, output: &mut impl Write, label: &str) -> Result<String> {
    write!(output, "{label}")?;
    output.flush()?;
    let mut line = String::new();
    input
        .read_line(&mut line)
        .with_context(|| format!("Failed to read {}", label.trim_end_matches(": ")))?;
    Ok(line.trim().to_string())
}
