//! Conversation orchestrator.
//!
//! One request, one pass: validate the turn, rebuild the history the
//! client holds, route to an AI backend, scan the reply for
//! case-creation intent, and when the assistant has committed to filing,
//! extract a structured record and submit it. The reply is never edited
//! piecemeal; it is either replaced whole by a filing rewrite or
//! returned exactly as the model produced it.

use civic_common::safety::rate_limit::RateLimiter;
use civic_common::sanitize::{sanitize_text, validate_photo, MAX_MESSAGE_LEN};
use civic_common::types::{ChatRequest, ChatTurn, PhotoUpload, Role, SubmitOutcome};
use thiserror::Error;
use tracing::info;

use crate::ai::{AiRouter, BackendMessage};
use crate::cases;
use crate::extract;
use crate::location::Geocoder;
use crate::prompts::{self, CREATE_CASE_MARKER};
use crate::salesforce::CaseDesk;

/// Token budget for a chat reply.
const CHAT_MAX_TOKENS: u32 = 1024;

/// Phrases that signal the assistant has committed to filing a case.
/// Matched as lowercase substrings alongside the explicit marker.
pub const TRIGGER_PHRASES: [&str; 10] = [
    "creating your service request",
    "service request now",
    "case created",
    "i've submitted",
    "i've created",
    "report has been submitted",
    "has been submitted as case",
    "submitted as case",
    "service request **#",
    "case **#",
];

/// Turn-level validation failures, worded for residents.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Message is too long. Please keep it under {} characters.", MAX_MESSAGE_LEN)]
    MessageTooLong,

    #[error("Please send a message or upload a photo to get started! 📸")]
    EmptyTurn,

    #[error("The photo couldn't be processed. Please try uploading a different image (max 10MB).")]
    BadPhoto,
}

/// Whether a reply asks for a case to be filed.
fn wants_case_creation(reply: &str) -> bool {
    if reply.contains(CREATE_CASE_MARKER) {
        return true;
    }
    let lowered = reply.to_lowercase();
    TRIGGER_PHRASES.iter().any(|phrase| lowered.contains(phrase))
}

/// Rebuild client-held history as backend messages: blank turns are
/// dropped, surviving text is sanitized, roles are preserved.
fn rebuild_history(conversation: &[ChatTurn]) -> Vec<BackendMessage> {
    let mut messages = Vec::with_capacity(conversation.len() + 1);
    for turn in conversation {
        if turn.content.trim().is_empty() {
            continue;
        }
        messages.push(BackendMessage::text(
            turn.role,
            sanitize_text(&turn.content, MAX_MESSAGE_LEN),
        ));
    }
    messages
}

/// The newest photo anywhere in history, for filing a case whose turn
/// carried no upload of its own.
fn newest_history_photo(conversation: &[ChatTurn]) -> Option<String> {
    conversation
        .iter()
        .rev()
        .find_map(|turn| turn.photo.as_ref())
        .and_then(PhotoUpload::resolve)
        .map(|photo| photo.base64)
}

fn success_reply(outcome: &SubmitOutcome) -> String {
    format!(
        "🎉 Excellent! Your service request **#{}** has been created! \
         Our team will take care of this. {}",
        outcome.case_number.as_deref().unwrap_or_default(),
        outcome.message
    )
}

fn failure_reply(message: &str) -> String {
    format!(
        "I apologize, but there was an issue creating your case: {message} \
         Please try again or call 311 at 416-392-2219."
    )
}

/// Run one conversation turn end to end and produce the reply text.
pub async fn handle_chat_turn(
    router: &AiRouter,
    desk: Option<&dyn CaseDesk>,
    geocoder: &Geocoder,
    limiter: &RateLimiter,
    req: &ChatRequest,
) -> Result<String, ChatError> {
    let trimmed = req.message.trim();
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(ChatError::MessageTooLong);
    }
    let message = sanitize_text(trimmed, MAX_MESSAGE_LEN);

    let resolved = req.photo.as_ref().and_then(PhotoUpload::resolve);
    if message.is_empty() && resolved.is_none() {
        return Err(ChatError::EmptyTurn);
    }

    let photo = match resolved {
        Some(photo) => {
            if validate_photo(&photo.base64).is_none() {
                return Err(ChatError::BadPhoto);
            }
            info!("photo validated ({})", photo.media_type);
            Some(photo)
        }
        None => None,
    };
    let has_photo = photo.is_some();

    let mut messages = rebuild_history(&req.conversation);
    let context = prompts::build_context(&message, has_photo);
    match &photo {
        Some(photo) => messages.push(BackendMessage::with_image(
            Role::User,
            context,
            photo.media_type.clone(),
            photo.base64.clone(),
        )),
        None => messages.push(BackendMessage::text(Role::User, context)),
    }

    let reply = router
        .create_message(&messages, has_photo, CHAT_MAX_TOKENS)
        .await;

    if !wants_case_creation(&reply) {
        return Ok(reply);
    }

    // The assistant committed to filing. If extraction comes back empty
    // the commitment is hollow and the reply stands as generated.
    let Some(case_info) = extract::extract_case_info(router, &messages).await else {
        return Ok(reply);
    };

    let case_photo = photo
        .map(|photo| photo.base64)
        .or_else(|| newest_history_photo(&req.conversation));

    let outcome = cases::submit_case(
        desk,
        geocoder,
        limiter,
        &case_info,
        case_photo.as_deref(),
    )
    .await;

    if outcome.success {
        Ok(success_reply(&outcome))
    } else {
        Ok(failure_reply(&outcome.message))
    }
}
