//! Interactive channel for plugin identities
//!
//! Plugins may ask the user to confirm a hardware touch, enter a PIN, or
//! acknowledge a message. These requests are routed to the controlling
//! terminal. Without a terminal every request resolves to `None`, which the
//! plugin reports as a failed unwrap.

use age::secrecy::SecretString;
use std::io::{self, BufRead, Write};
use tracing::{debug, info};

/// Callbacks that talk to the controlling terminal
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalCallbacks;

impl TerminalCallbacks {
    fn prompt_line(prompt: &str) -> Option<String> {
        let mut stderr = io::stderr();
        write!(stderr, "{}", prompt).ok()?;
        stderr.flush().ok()?;

        let mut line = String::new();
        let read = io::stdin().lock().read_line(&mut line).ok()?;
        if read == 0 {
            return None;
        }
        Some(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl age::Callbacks for TerminalCallbacks {
    fn display_message(&self, message: &str) {
        info!("plugin: {}", message);
        eprintln!("{}", message);
    }

    fn confirm(&self, message: &str, yes_string: &str, no_string: Option<&str>) -> Option<bool> {
        let choices = match no_string {
            Some(no) => format!("[{}/{}]", yes_string, no),
            None => format!("[{}]", yes_string),
        };
        let answer = Self::prompt_line(&format!("{} {} ", message, choices))?;
        let answer = answer.trim();

        if answer.eq_ignore_ascii_case(yes_string) {
            Some(true)
        } else if no_string.is_some_and(|no| answer.eq_ignore_ascii_case(no)) {
            Some(false)
        } else {
            debug!("unrecognised plugin confirmation answer");
            None
        }
    }

    fn request_public_string(&self, description: &str) -> Option<String> {
        Self::prompt_line(&format!("{}: ", description))
    }

    fn request_passphrase(&self, description: &str) -> Option<SecretString> {
        rpassword::prompt_password(format!("{}: ", description))
            .ok()
            .map(SecretString::from)
    }
}
