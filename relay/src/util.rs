//! Shared utility functions

use chrono::{DateTime, SecondsFormat, Utc};

/// Mask a secret-ish value for logging, keeping the first and last four characters.
///
/// # Examples
///
/// ```
/// use join_relay::util::mask;
///
/// assert_eq!(mask(None), "<not set>");
/// assert_eq!(mask(Some("short")), "short");
/// assert_eq!(mask(Some("https://api.example.com/log")), "http.../log");
/// ```
pub fn mask(value: Option<&str>) -> String {
    match value {
        None | Some("") => "<not set>".to_string(),
        Some(s) if s.chars().count() <= 8 => s.to_string(),
        Some(s) => {
            let head: String = s.chars().take(4).collect();
            let tail: String = s
                .chars()
                .rev()
                .take(4)
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            format!("{head}...{tail}")
        }
    }
}

/// Render an account the way the platform prints it: `name`, or `name#1234`
/// for accounts that still carry a legacy discriminator.
pub fn display_tag(username: &str, discriminator: Option<&str>) -> String {
    match discriminator {
        Some(d) if !d.is_empty() && d != "0" => format!("{username}#{d}"),
        _ => username.to_string(),
    }
}

/// Format an instant as ISO-8601 with an explicit `+00:00` offset.
pub fn iso8601(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}
