//! API token lookup from a netrc-format credentials file.
//!
//! The PMM API key lives in the `password` slot of the entry for the
//! server's hostname. It is base64 and must decode to something carrying an
//! `id` marker.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Url;
use tracing::debug;

use crate::error::{ConnectError, ConnectResult};

const TOKEN_MARKER: &[u8] = b"id";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub login: String,
    pub account: String,
    pub token: String,
}

/// Load and validate the credentials for `server_address`.
pub fn for_server(netrc_path: &Path, server_address: &str) -> ConnectResult<Credentials> {
    let host = Url::parse(server_address)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .ok_or_else(|| ConnectError::fatal(format!("Invalid server address {server_address}")))?;

    let content = std::fs::read_to_string(netrc_path).map_err(|e| {
        ConnectError::fatal(format!("Unable to read {}: {e}", netrc_path.display()))
    })?;

    let credentials = lookup(&content, &host).ok_or_else(|| ConnectError::fatal("No auth found"))?;
    debug!(host = %host, login = %credentials.login, "found credentials");

    validate_token(&credentials.token)?;
    Ok(credentials)
}

pub fn validate_token(token: &str) -> ConnectResult<()> {
    let decoded = STANDARD.decode(token.trim())?;
    if !decoded
        .windows(TOKEN_MARKER.len())
        .any(|window| window == TOKEN_MARKER)
    {
        return Err(ConnectError::fatal("Unexpected content in token"));
    }
    Ok(())
}

/// Find the entry for `host`, falling back to a `default` entry.
pub fn lookup(content: &str, host: &str) -> Option<Credentials> {
    let entries = parse(content);
    let matched = entries
        .iter()
        .find(|(machine, _)| machine.as_deref() == Some(host))
        .or_else(|| entries.iter().find(|(machine, _)| machine.is_none()))?;
    let credentials = matched.1.clone();
    (!credentials.token.is_empty()).then_some(credentials)
}

// (machine, credentials); `None` is the `default` entry.
fn parse(content: &str) -> Vec<(Option<String>, Credentials)> {
    let mut entries: Vec<(Option<String>, Credentials)> = Vec::new();
    let mut in_macdef = false;

    for line in content.lines() {
        if in_macdef {
            in_macdef = !line.trim().is_empty();
            continue;
        }

        let mut tokens = tokenize(line).into_iter();
        while let Some(token) = tokens.next() {
            match token.as_str() {
                "machine" => {
                    let name = tokens.next().unwrap_or_default();
                    entries.push((Some(name), Credentials::default()));
                }
                "default" => entries.push((None, Credentials::default())),
                "macdef" => {
                    in_macdef = true;
                    break;
                }
                "login" | "password" | "account" => {
                    let value = tokens.next().unwrap_or_default();
                    if let Some((_, entry)) = entries.last_mut() {
                        match token.as_str() {
                            "login" => entry.login = value,
                            "password" => entry.token = value,
                            _ => entry.account = value,
                        }
                    }
                }
                _ => {}
            }
        }
    }
    entries
}

// Whitespace-separated words; double quotes group a value and `\` escapes
// the next character. An unquoted `#` starting a word ends the line.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current: Option<String> = None;
    let mut quoted = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    current.get_or_insert_with(String::new).push(next);
                }
            }
            '"' => {
                quoted = !quoted;
                current.get_or_insert_with(String::new);
            }
            c if c.is_whitespace() && !quoted => tokens.extend(current.take()),
            '#' if !quoted && current.is_none() => break,
            c => current.get_or_insert_with(String::new).push(c),
        }
    }
    tokens.extend(current);
    tokens
}
