//! Turning a normalized request into a `claude` command line

use bridge_cli::{Invocation, PermissionPolicy, ResolvedModel};
use bridge_config::CliConfig;

use crate::{
    MessagesError,
    attachment::{Attachment, AttachmentKind, Attachments, READ_TOOL},
    normalize::{Block, NormalizedRequest},
    protocol::ToolChoice,
};

/// Build the invocation for one request
///
/// Pure: the same inputs always produce the same invocation.
///
/// # Errors
///
/// Returns [`MessagesError::InvocationBuild`] when `max_tokens` is missing or
/// zero, when no user turn exists, when a requested tool is not authorized, or
/// when `tool_choice` names a tool the request does not define
pub fn build_invocation(
    request: &NormalizedRequest,
    model: &ResolvedModel,
    attachments: &Attachments,
    policy: &PermissionPolicy,
    cli: &CliConfig,
) -> Result<Invocation, MessagesError> {
    if !request.max_tokens.is_some_and(|n| n > 0) {
        return Err(MessagesError::InvocationBuild(
            "max_tokens: must be a positive integer".to_owned(),
        ));
    }

    let last_user = request.last_user_turn().ok_or_else(|| {
        MessagesError::InvocationBuild("messages: at least one user message is required".to_owned())
    })?;

    let requested_tools: Vec<&str> = request
        .tools
        .iter()
        .flatten()
        .map(|tool| tool.name.as_str())
        .collect();

    if let Some(tool) = requested_tools.iter().find(|tool| !policy.authorize(tool, None)) {
        return Err(MessagesError::InvocationBuild(format!(
            "tools: '{tool}' is not permitted by this server"
        )));
    }

    if let Some(ToolChoice::Tool { name }) = &request.tool_choice
        && !requested_tools.contains(&name.as_str())
    {
        return Err(MessagesError::InvocationBuild(format!(
            "tool_choice: '{name}' is not one of the request's tools"
        )));
    }

    let mut allowed_tools: Vec<&str> = if requested_tools.is_empty() {
        policy.allowed_tools().iter().map(String::as_str).collect()
    } else {
        requested_tools
    };
    // Attachments are only reachable through Read
    if !attachments.is_empty() && !allowed_tools.contains(&READ_TOOL) {
        allowed_tools.push(READ_TOOL);
    }

    let mut invocation = Invocation::new(&cli.path)
        .arg("--print")
        .flag_value("--permission-mode", policy.mode().as_str())
        .flag_value("--output-format", "stream-json")
        .arg("--verbose")
        .arg("--include-partial-messages")
        .flag_value("--model", &model.cli_name);

    if let Some(system) = &request.system {
        invocation = invocation.flag_value("--append-system-prompt", system);
    }

    if !allowed_tools.is_empty() {
        invocation = invocation.flag_value("--allowed-tools", allowed_tools.join(" "));
    }

    if !policy.disallowed_tools().is_empty() {
        invocation = invocation.flag_value("--disallowed-tools", policy.disallowed_tools().join(" "));
    }

    if !attachments.is_empty() {
        for dir in policy.allowed_directories() {
            invocation = invocation.flag_value("--add-dir", dir.display().to_string());
        }
    }

    Ok(invocation
        .cwd(cli.cwd.clone())
        .stdin(render_prompt(request, last_user, attachments)))
}

/// Conversation text written to the CLI's stdin
///
/// Turns before the final user turn become a `<conversation>` transcript;
/// turns after it are dropped.
fn render_prompt(request: &NormalizedRequest, last_user: usize, attachments: &Attachments) -> String {
    let current = render_turn(request, last_user, attachments);

    let mut prompt = if last_user == 0 {
        current
    } else {
        let history = (0..last_user)
            .map(|t| {
                format!(
                    "<turn role=\"{}\">{}</turn>",
                    request.turns[t].role,
                    render_turn(request, t, attachments)
                )
            })
            .collect::<Vec<_>>()
            .join("\n");

        format!("<conversation>\n{history}\n</conversation>\n\n{current}")
    };

    if !attachments.is_empty() {
        let references = attachments
            .paths()
            .map(|path| format!("Please use your Read tool to analyze this file: {}", path.display()))
            .collect::<Vec<_>>()
            .join("\n\n");
        prompt = format!("{references}\n\n{prompt}");
    }

    prompt
}

fn render_turn(request: &NormalizedRequest, turn: usize, attachments: &Attachments) -> String {
    request.turns[turn]
        .blocks
        .iter()
        .enumerate()
        .map(|(b, block)| render_block(block, attachments.get(turn, b)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_block(block: &Block, attachment: Option<&Attachment>) -> String {
    match block {
        Block::Text(text) => text.clone(),
        Block::Image(_) | Block::Document(_) => match attachment {
            Some(file) if file.kind() == AttachmentKind::Image => format!("[Image: {}]", file.path().display()),
            Some(file) => format!("[Document: {}]", file.path().display()),
            None => "[attachment]".to_owned(),
        },
        Block::ToolUse { id, name, input } => format!("<tool_use id=\"{id}\" name=\"{name}\">{input}</tool_use>"),
        Block::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => {
            let error = if *is_error { " is_error=\"true\"" } else { "" };
            format!("<tool_result tool_use_id=\"{tool_use_id}\"{error}>{content}</tool_result>")
        }
    }
}
