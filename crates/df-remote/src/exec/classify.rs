//! Output classification for privileged commands

use std::sync::OnceLock;

use regex::Regex;

use df_core::error::CommandExecutionError;
use df_core::CommandResult;

/// Prefix that marks a stderr line as a non-fatal warning
pub const WARNING_MARKER: &str = "W:";

/// Reported when the channel closed without an exit status
pub const MISSING_EXIT_CODE: i32 = -1;

fn prompt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // The prompt is never followed by a newline because the secret is not echoed.
        Regex::new(
            r"(?i)\[sudo\] (?:password|senha|contraseña|mot de passe|passwort|пароль)[^:\n]*:\s?",
        )
        .expect("sudo prompt pattern is valid")
    })
}

/// Remove every echoed sudo prompt from `text`
pub fn strip_prompts(text: &str) -> String {
    prompt_pattern().replace_all(text, "").into_owned()
}

/// Stderr split into warnings and errors
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Classified {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Prompt-free stderr, trimmed
    pub cleaned: String,
}

pub fn classify_stderr(stderr: &str) -> Classified {
    let cleaned = strip_prompts(stderr).trim().to_string();
    let mut out = Classified::default();

    for line in cleaned.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.starts_with(WARNING_MARKER) {
            out.warnings.push(trimmed.to_string());
        } else {
            out.errors.push(trimmed.to_string());
        }
    }

    out.cleaned = cleaned;
    out
}

/// Turn raw command output into a result
///
/// Only the exit status decides failure; stderr content alone never does.
pub fn into_result(
    stdout: &[u8],
    stderr: &[u8],
    exit_status: Option<u32>,
) -> Result<CommandResult, CommandExecutionError> {
    let stdout = String::from_utf8_lossy(stdout).trim().to_string();
    let classified = classify_stderr(&String::from_utf8_lossy(stderr));
    let exit_code = exit_status.map(|s| s as i32).unwrap_or(MISSING_EXIT_CODE);

    if exit_code != 0 {
        let error_details = if classified.errors.is_empty() {
            classified.cleaned
        } else {
            classified.errors.join("\n")
        };
        return Err(CommandExecutionError {
            exit_code,
            error_details,
            warnings: classified.warnings,
        });
    }

    Ok(CommandResult {
        stdout,
        warnings: classified.warnings,
        exit_code,
    })
}
