//! End-to-end conversation tests over scripted backends and a
//! scripted case desk.
//!
//! Drives `handle_chat_turn` the way the HTTP layer does: input
//! rejection, plain replies, the trigger-to-filing pipeline, photo
//! routing and attachment, and the rewritten confirmation and apology
//! replies.

use std::sync::Arc;

use civic_common::safety::rate_limit::RateLimiter;
use civic_common::types::{ChatRequest, ChatTurn, PhotoUpload, Role, SubmitOutcome};
use civicd::ai::{AiRouter, ChatBackend, FakeBackend, RetryPolicy};
use civicd::chat::{self, ChatError};
use civicd::location::Geocoder;
use civicd::prompts::PHOTO_ONLY_MESSAGE;
use civicd::salesforce::{CaseDeskError, FakeCaseDesk};

/// A reply that commits to filing, as the persona produces it.
const TRIGGER_REPLY: &str = "Perfect! I'm creating your service request now. <create_case>";

/// A well-formed extraction answer for the follow-up model call.
const EXTRACTION_JSON: &str = r#"{
    "complaintType": "Pothole",
    "subject": "Pothole on Main Street",
    "description": "Deep pothole swallowing tires",
    "ward": "5"
}"#;

/// Geocoder aimed at a closed local port so lookups fail fast without
/// leaving the machine.
fn offline_geocoder() -> Geocoder {
    Geocoder::new("http://127.0.0.1:9").unwrap()
}

/// A base64 body long enough to clear the corrupt-payload floor.
fn photo_payload() -> String {
    "cG90".repeat(40)
}

fn request(message: &str) -> ChatRequest {
    ChatRequest {
        message: message.to_string(),
        conversation: Vec::new(),
        photo: None,
    }
}

fn turn(role: Role, content: &str) -> ChatTurn {
    ChatTurn {
        role,
        content: content.to_string(),
        photo: None,
    }
}

/// Run one conversation turn against the given fakes.
async fn run_turn(
    text: &Arc<FakeBackend>,
    vision: &Arc<FakeBackend>,
    desk: &FakeCaseDesk,
    req: &ChatRequest,
) -> Result<String, ChatError> {
    let limiter = Arc::new(RateLimiter::standard());
    let router = AiRouter::new(
        Some(text.clone() as Arc<dyn ChatBackend>),
        Some(vision.clone() as Arc<dyn ChatBackend>),
        limiter.clone(),
    )
    .with_retry(RetryPolicy::immediate());
    chat::handle_chat_turn(&router, Some(desk), &offline_geocoder(), &limiter, req).await
}

// === Input rejection ===

#[tokio::test]
async fn test_overlong_message_is_rejected_before_any_backend_call() {
    let text = Arc::new(FakeBackend::with_reply("text", "unused"));
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new();

    let req = request(&"x".repeat(2001));
    let err = run_turn(&text, &vision, &desk, &req).await.unwrap_err();

    assert!(matches!(err, ChatError::MessageTooLong));
    assert_eq!(text.call_count(), 0);
    assert_eq!(vision.call_count(), 0);
}

#[tokio::test]
async fn test_blank_turn_is_rejected() {
    let text = Arc::new(FakeBackend::with_reply("text", "unused"));
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new();

    let err = run_turn(&text, &vision, &desk, &request("   ")).await.unwrap_err();

    assert!(matches!(err, ChatError::EmptyTurn));
    assert_eq!(text.call_count(), 0);
}

#[tokio::test]
async fn test_unreadable_photo_is_rejected() {
    let text = Arc::new(FakeBackend::with_reply("text", "unused"));
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new();

    let req = ChatRequest {
        message: "here is the damage".to_string(),
        conversation: Vec::new(),
        photo: Some(PhotoUpload::Inline("!".repeat(200))),
    };
    let err = run_turn(&text, &vision, &desk, &req).await.unwrap_err();

    assert!(matches!(err, ChatError::BadPhoto));
    assert_eq!(vision.call_count(), 0);
}

// === Plain conversation ===

#[tokio::test]
async fn test_plain_reply_passes_through_untouched() {
    let text = Arc::new(FakeBackend::with_reply(
        "text",
        "Could you tell me the nearest intersection?",
    ));
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new();

    let reply = run_turn(&text, &vision, &desk, &request("there's a pothole"))
        .await
        .unwrap();

    assert_eq!(reply, "Could you tell me the nearest intersection?");
    // No trigger means no extraction call and no desk traffic.
    assert_eq!(text.call_count(), 1);
    assert_eq!(desk.create_calls(), 0);
}

#[tokio::test]
async fn test_history_is_replayed_to_the_backend() {
    let text = Arc::new(FakeBackend::with_reply("text", "Thanks, noted."));
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new();

    let req = ChatRequest {
        message: "On Elm near the school".to_string(),
        conversation: vec![
            turn(Role::User, "There's a pothole"),
            turn(Role::Assistant, "Where is it?"),
            turn(Role::User, "   "),
        ],
        photo: None,
    };
    run_turn(&text, &vision, &desk, &req).await.unwrap();

    // Two surviving history turns plus the context turn; the blank one
    // is dropped.
    let messages = text.last_messages().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].content.text_fragments(), vec!["There's a pothole"]);
    assert_eq!(messages[1].content.text_fragments(), vec!["Where is it?"]);
}

// === Case filing ===

#[tokio::test]
async fn test_trigger_reply_files_case_and_rewrites_reply() {
    let text = Arc::new(
        FakeBackend::with_reply("text", "unused")
            .queue_result(Ok(TRIGGER_REPLY.to_string()))
            .queue_result(Ok(EXTRACTION_JSON.to_string())),
    );
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new();

    let reply = run_turn(&text, &vision, &desk, &request("yes please file it"))
        .await
        .unwrap();

    assert!(reply.contains("**#00001059**"), "reply: {reply}");
    assert_eq!(text.call_count(), 2);
    assert_eq!(desk.create_calls(), 1);

    let record = desk.last_create().unwrap();
    assert_eq!(record.subject, "Pothole on Main Street");
    assert_eq!(record.complaint_type.as_deref(), Some("Pothole"));
    assert_eq!(record.ward.as_deref(), Some("5"));
}

#[tokio::test]
async fn test_hollow_commitment_returns_raw_reply() {
    let text = Arc::new(
        FakeBackend::with_reply("text", "unused")
            .queue_result(Ok(TRIGGER_REPLY.to_string()))
            .queue_result(Ok("Sorry, I cannot produce JSON today.".to_string())),
    );
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new();

    let reply = run_turn(&text, &vision, &desk, &request("yes please file it"))
        .await
        .unwrap();

    // Extraction came back empty, so the reply stands as generated and
    // nothing is filed.
    assert_eq!(reply, TRIGGER_REPLY);
    assert_eq!(desk.create_calls(), 0);
}

#[tokio::test]
async fn test_failed_submission_becomes_apology_with_reason() {
    let text = Arc::new(
        FakeBackend::with_reply("text", "unused")
            .queue_result(Ok(TRIGGER_REPLY.to_string()))
            .queue_result(Ok(EXTRACTION_JSON.to_string())),
    );
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new().queue_create(Ok(SubmitOutcome {
        success: false,
        case_number: None,
        message: "Ward number is required.".to_string(),
        case_id: None,
    }));

    let reply = run_turn(&text, &vision, &desk, &request("yes please file it"))
        .await
        .unwrap();

    assert!(reply.contains("Ward number is required."), "reply: {reply}");
    assert!(reply.contains("416-392-2219"), "reply: {reply}");
}

#[tokio::test]
async fn test_desk_transport_error_is_not_leaked_into_the_reply() {
    let text = Arc::new(
        FakeBackend::with_reply("text", "unused")
            .queue_result(Ok(TRIGGER_REPLY.to_string()))
            .queue_result(Ok(EXTRACTION_JSON.to_string())),
    );
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new().queue_create(Err(CaseDeskError::Http {
        status: 401,
        detail: "INVALID_SESSION_ID".to_string(),
    }));

    let reply = run_turn(&text, &vision, &desk, &request("yes please file it"))
        .await
        .unwrap();

    assert!(reply.contains("Unable to create case"), "reply: {reply}");
    assert!(!reply.contains("INVALID_SESSION_ID"), "reply: {reply}");
}

// === Photos ===

#[tokio::test]
async fn test_photo_turn_routes_vision_and_attaches_current_photo() {
    let text = Arc::new(
        FakeBackend::with_reply("text", "unused")
            .queue_result(Ok(EXTRACTION_JSON.to_string())),
    );
    let vision = Arc::new(FakeBackend::with_reply("vision", TRIGGER_REPLY));
    let desk = FakeCaseDesk::new();

    let req = ChatRequest {
        message: "please report this".to_string(),
        conversation: Vec::new(),
        photo: Some(PhotoUpload::Inline(photo_payload())),
    };
    let reply = run_turn(&text, &vision, &desk, &req).await.unwrap();

    assert!(reply.contains("**#00001059**"), "reply: {reply}");
    assert_eq!(vision.call_count(), 1);
    assert!(vision.last_call_had_image());
    // Extraction is a text-only follow-up.
    assert_eq!(text.call_count(), 1);

    assert_eq!(desk.attach_calls(), 1);
    let (case_id, photo) = desk.last_attachment().unwrap();
    assert_eq!(case_id, "500xx0000000001");
    assert_eq!(photo, photo_payload());
}

#[tokio::test]
async fn test_newest_history_photo_is_attached_when_turn_has_none() {
    let text = Arc::new(
        FakeBackend::with_reply("text", "unused")
            .queue_result(Ok(TRIGGER_REPLY.to_string()))
            .queue_result(Ok(EXTRACTION_JSON.to_string())),
    );
    let vision = Arc::new(FakeBackend::with_reply("vision", "unused"));
    let desk = FakeCaseDesk::new();

    let req = ChatRequest {
        message: "yes, go ahead".to_string(),
        conversation: vec![
            ChatTurn {
                role: Role::User,
                content: "here is a photo".to_string(),
                photo: Some(PhotoUpload::Inline("b2xkZXIgcGhvdG8=".to_string())),
            },
            turn(Role::Assistant, "Got it, thanks!"),
            ChatTurn {
                role: Role::User,
                content: "another angle".to_string(),
                photo: Some(PhotoUpload::Detailed {
                    compressed_data: Some("bmV3ZXIgcGhvdG8=".to_string()),
                    data: Some("b3JpZ2luYWw=".to_string()),
                    media_type: Some("image/png".to_string()),
                    was_compressed: Some(true),
                }),
            },
        ],
        photo: None,
    };
    run_turn(&text, &vision, &desk, &req).await.unwrap();

    // The most recent photo in the conversation rides along, with the
    // compressed body preferred.
    assert_eq!(desk.attach_calls(), 1);
    let (_, photo) = desk.last_attachment().unwrap();
    assert_eq!(photo, "bmV3ZXIgcGhvdG8=");
}

#[tokio::test]
async fn test_photo_only_turn_uses_the_default_report_line() {
    let text = Arc::new(FakeBackend::with_reply("text", "unused"));
    let vision = Arc::new(FakeBackend::with_reply(
        "vision",
        "That looks like graffiti on a utility box.",
    ));
    let desk = FakeCaseDesk::new();

    let req = ChatRequest {
        message: String::new(),
        conversation: Vec::new(),
        photo: Some(PhotoUpload::Inline(photo_payload())),
    };
    let reply = run_turn(&text, &vision, &desk, &req).await.unwrap();

    assert_eq!(reply, "That looks like graffiti on a utility box.");
    let messages = vision.last_messages().unwrap();
    let context = messages.last().unwrap().content.text_fragments().join("\n");
    assert!(context.contains(PHOTO_ONLY_MESSAGE), "context: {context}");
}
