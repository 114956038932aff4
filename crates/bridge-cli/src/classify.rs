use std::sync::LazyLock;

use regex::Regex;

use crate::CliError;

/// Exit status shells use for "command not found"
const EXIT_COMMAND_NOT_FOUND: i32 = 127;

/// Shell and `env` reports about the executable itself, e.g.
/// `sh: 1: claude: not found` or `env: 'claude': No such file or directory`
static NOT_FOUND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)(?:^|: )'?(?:\S*/)?claude'?: (?:command not found|not found|no such file or directory)\s*$")
        .expect("must be valid regex")
});

static AUTHENTICATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(not (logged|signed) in|please run /login|invalid api key|authentication[_ ](error|failed|required)|\bunauthorized\b|oauth token (has )?expired)",
    )
    .expect("must be valid regex")
});

static TOOL_DENIED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(tool\b.*\bnot (permitted|allowed)|permission to use \S+ (was|has been) denied|requested permissions? to use)")
        .expect("must be valid regex")
});

static MODEL_UNAVAILABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(unknown model|invalid model|model\b.*\bnot (found|supported|available)|model\b.*\bdoes not exist)")
        .expect("must be valid regex")
});

/// Map a failed run onto a [`CliError`]
///
/// `reported` is the text of a `result` line flagged `is_error`, which is more
/// precise than stderr when the CLI produced one. Falls back to stderr and
/// finally to the bare exit code.
pub fn classify_failure(code: Option<i32>, stderr: &str, reported: Option<&str>) -> CliError {
    let message = reported
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .or_else(|| Some(stderr.trim()).filter(|m| !m.is_empty()))
        .map_or_else(
            || match code {
                Some(code) => format!("command failed with exit code {code}"),
                None => "command terminated by signal".to_owned(),
            },
            str::to_owned,
        );

    if code == Some(EXIT_COMMAND_NOT_FOUND) || NOT_FOUND.is_match(&message) {
        return CliError::NotFound { path: message };
    }

    if AUTHENTICATION.is_match(&message) {
        return CliError::AuthenticationRequired { message };
    }

    if TOOL_DENIED.is_match(&message) {
        return CliError::ToolNotPermitted { message };
    }

    if MODEL_UNAVAILABLE.is_match(&message) {
        return CliError::ModelUnavailable { message };
    }

    CliError::Execution { code, message }
}
