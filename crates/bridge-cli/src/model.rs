//! Mapping of Messages API model identifiers onto CLI model names

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

/// Known identifiers and the CLI alias each one selects
const ALIASES: &[(&str, &str)] = &[
    ("sonnet", "sonnet"),
    ("opus", "opus"),
    ("haiku", "haiku"),
    ("claude-sonnet-4", "sonnet"),
    ("claude-opus-4", "opus"),
    ("claude-haiku-4", "haiku"),
    ("claude-3-5-sonnet", "sonnet"),
    ("claude-3-opus", "opus"),
    ("claude-3-haiku", "haiku"),
];

/// Full vendor identifiers, e.g. `claude-sonnet-4-5-20250929` or `claude-3-5-haiku-latest`
static FULL_MODEL_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^claude-[a-z0-9]+(?:[.-][a-z0-9]+)*$").expect("must be valid regex"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown model: {model}")]
pub struct UnknownModel {
    pub model: String,
}

/// A model identifier paired with the name passed to `--model`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModel {
    /// Identifier the client asked for, echoed back in responses
    pub requested: String,
    /// Name handed to the CLI
    pub cli_name: String,
}

/// Resolve a client model identifier
///
/// Table entries map to CLI aliases. Anything else that looks like a full
/// vendor model id is passed through unchanged.
///
/// # Errors
///
/// Returns [`UnknownModel`] when the identifier is neither a table entry nor
/// a well-formed `claude-*` id
pub fn resolve(model_id: &str) -> Result<ResolvedModel, UnknownModel> {
    let cli_name = ALIASES
        .iter()
        .find_map(|(id, alias)| (*id == model_id).then_some(*alias))
        .or_else(|| FULL_MODEL_ID.is_match(model_id).then_some(model_id))
        .ok_or_else(|| UnknownModel {
            model: model_id.to_owned(),
        })?;

    Ok(ResolvedModel {
        requested: model_id.to_owned(),
        cli_name: cli_name.to_owned(),
    })
}
