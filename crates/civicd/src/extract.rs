//! Structured case extraction from a conversation.
//!
//! When the assistant signals it is about to file a request, the whole
//! conversation is flattened into a transcript and replayed to the text
//! backend with a JSON-only prompt. Model output is treated as hostile:
//! we take the outermost brace span, deserialize leniently, then clamp
//! every field through the shared sanitizer. Anything that fails along
//! the way is `None` and the caller files with an empty record instead.

use civic_common::sanitize::{
    sanitize_text, validate_email, validate_phone, MAX_DESCRIPTION_LEN, MAX_SUBJECT_LEN,
};
use civic_common::types::{CaseInfo, Role};
use tracing::{info, warn};

use crate::ai::{AiRouter, BackendMessage};
use crate::prompts;

const EXTRACTION_MAX_TOKENS: u32 = 1024;

/// Flatten a message list into `User: ...` / `Assistant: ...` lines.
/// Image parts contribute nothing; empty fragments are skipped.
pub fn transcript_of(messages: &[BackendMessage]) -> String {
    let mut lines = Vec::new();
    for message in messages {
        for fragment in message.content.text_fragments() {
            let text = sanitize_text(fragment, MAX_DESCRIPTION_LEN);
            if text.is_empty() {
                continue;
            }
            lines.push(format!("{}: {}", message.role.transcript_label(), text));
        }
    }
    lines.join("\n")
}

/// The outermost `{ ... }` span of a reply, if one exists. Models like
/// to wrap JSON in prose or code fences; everything outside the braces
/// is noise.
fn brace_span(reply: &str) -> Option<&str> {
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&reply[start..=end])
}

fn clamp_optional(value: Option<String>, max_len: usize) -> Option<String> {
    value
        .map(|text| sanitize_text(&text, max_len))
        .filter(|text| !text.is_empty())
}

/// Parse an extraction reply into a clamped [`CaseInfo`]. An empty
/// `{}` object counts as nothing extracted, not as an all-blank record.
fn parse_reply(reply: &str) -> Option<CaseInfo> {
    let span = brace_span(reply)?;
    let value: serde_json::Value = match serde_json::from_str(span) {
        Ok(value) => value,
        Err(err) => {
            warn!("extraction reply is not valid JSON: {err}");
            return None;
        }
    };
    if value.as_object().map_or(true, |map| map.is_empty()) {
        return None;
    }
    let raw: CaseInfo = match serde_json::from_value(value) {
        Ok(info) => info,
        Err(err) => {
            warn!("extraction JSON has the wrong shape: {err}");
            return None;
        }
    };

    Some(CaseInfo {
        complaint_type: clamp_optional(raw.complaint_type, MAX_SUBJECT_LEN),
        subject: clamp_optional(raw.subject, MAX_SUBJECT_LEN),
        description: clamp_optional(raw.description, MAX_DESCRIPTION_LEN),
        citizen_email: raw.citizen_email.as_deref().and_then(validate_email),
        citizen_phone: raw.citizen_phone.as_deref().and_then(validate_phone),
        ward: clamp_optional(raw.ward, MAX_SUBJECT_LEN),
    })
}

/// Replay the conversation through the text backend and pull out a
/// structured case record.
pub async fn extract_case_info(
    router: &AiRouter,
    messages: &[BackendMessage],
) -> Option<CaseInfo> {
    let transcript = transcript_of(messages);
    if transcript.is_empty() {
        warn!("nothing to extract from an empty conversation");
        return None;
    }

    let prompt = prompts::build_extraction_prompt(&transcript);
    let request = [BackendMessage::text(Role::User, prompt)];
    let reply = router
        .create_message(&request, false, EXTRACTION_MAX_TOKENS)
        .await;

    match parse_reply(&reply) {
        Some(info) => {
            info!(
                "extracted case info: type={:?} subject={:?}",
                info.complaint_type, info.subject
            );
            Some(info)
        }
        None => {
            warn!("no usable JSON object in extraction reply");
            None
        }
    }
}
