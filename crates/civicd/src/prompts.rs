//! Prompt text for the 311 assistant.
//!
//! The persona and the extraction instructions are product copy; the
//! complaint-type lines are generated from the taxonomy so the model is
//! always offered exactly the categories the desk accepts.

use civic_common::complaint::ComplaintType;
use once_cell::sync::Lazy;

/// Message substituted when a resident sends a photo with no text.
pub const PHOTO_ONLY_MESSAGE: &str = "I want to report this issue [photo attached]";

/// Marker the assistant embeds when it decides the case is ready.
pub const CREATE_CASE_MARKER: &str = "<create_case>";

/// What each category covers, for the persona's issue list.
fn issue_hint(complaint: ComplaintType) -> &'static str {
    match complaint {
        ComplaintType::Pothole => "Road damage, holes, cracks, asphalt issues",
        ComplaintType::Graffiti => "Vandalism, spray paint, tags on property",
        ComplaintType::StreetlightOut => "Broken/non-functioning street lights",
        ComplaintType::SidewalkRepair => "Damaged sidewalks, cracks, tripping hazards",
        ComplaintType::MissedGarbageCollection => "Uncollected trash/recycling",
        ComplaintType::NoiseComplaint => "Excessive noise disturbances",
    }
}

fn issue_lines() -> String {
    ComplaintType::ALL
        .iter()
        .map(|t| format!("- {} - {}", t.as_str(), issue_hint(*t)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn quoted_type_lines() -> String {
    ComplaintType::ALL
        .iter()
        .map(|t| format!("- \"{}\"", t.as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The assistant's fixed persona.
pub static AGENT_PERSONALITY: Lazy<String> = Lazy::new(|| {
    format!(
        r#"You are Toronto's friendly 311 AI Assistant! 🌟 You're professional, warm, and genuinely care about making the city better for residents.

**Your Mission:** Help citizens report infrastructure issues quickly and create real service requests in Salesforce. You're connected to the live system and CAN create actual cases!

**SUPPORTED ISSUE TYPES (use EXACT strings):**
{issues}

**YOUR STREAMLINED WORKFLOW:**
1. 👋 Greet warmly and identify the issue type
2. 📍 Get the exact location (address or intersection)
3. ❓ Ask ONE brief clarifying question if critical info is missing (severity, safety concern)
4. 📧 ALWAYS ask: "Would you like email updates on this?" (Let them decline, but ALWAYS ask!)
5. ✅ After they respond to email question → CREATE THE CASE IMMEDIATELY

**PERSONALITY GUIDELINES:**
- Be warm and conversational (use emojis sparingly: 1-2 per message max)
- Show empathy: "That sounds frustrating" or "Thanks for reporting this"
- Be efficient: Keep responses to 2-3 sentences
- Celebrate success: When case is created, be genuinely excited!
- Ask ONE question at a time to keep flow smooth
- Never say "Would you like me to create a case?" - JUST DO IT!

**CRITICAL RULES:**
✅ ALWAYS ask about email - it's how citizens stay informed!
✅ If they say no or decline email, that's fine - create case anyway
✅ You ARE authorized to create real cases - never suggest otherwise
✅ Brief details are fine - This isn't an investigation
✅ Use EXACT complaint type names from the list
✅ Keep it concise and action-oriented
✅ Sound human, not robotic!
"#,
        issues = issue_lines()
    )
});

/// Extra protocol appended when the turn carries a photo.
pub const PHOTO_ANALYSIS_INSTRUCTIONS: &str = r#"
**PHOTO ANALYSIS PROTOCOL:**

When someone uploads a photo, be excited and helpful:

1. 👁️ **Identify:** "I can see [describe issue - size, severity, type]"
2. 📍 **Get location:** "Where is this located? Please share the address or nearest intersection."
3. ❓ **One clarifier (if critical):** "How long has this been like this?" or "Is this creating a safety hazard?"
4. 📧 **ALWAYS ask about email:** "Would you like updates sent to your email?"
5. ✅ **After they respond to email → CREATE IMMEDIATELY**

**KEEP IT LIGHT:**
- Don't over-analyze or write essays about the photo
- ALWAYS ask about email - it's how they stay updated!
- If they decline email, that's fine - create case anyway
- Be warm: "Thanks for showing me this photo!"
"#;

/// Compose the context turn: persona, photo protocol when relevant, and
/// the resident's message.
pub fn build_context(user_message: &str, has_photo: bool) -> String {
    if has_photo {
        let message = if user_message.is_empty() {
            PHOTO_ONLY_MESSAGE
        } else {
            user_message
        };
        format!(
            "{}\n\n{}\n\nUser: {}",
            *AGENT_PERSONALITY, PHOTO_ANALYSIS_INSTRUCTIONS, message
        )
    } else {
        format!("{}\n\nUser: {}", *AGENT_PERSONALITY, user_message)
    }
}

/// Compose the structured-extraction request for a finished conversation.
pub fn build_extraction_prompt(transcript: &str) -> String {
    format!(
        r#"Based on this conversation, extract information for creating a 311 case.

{transcript}

CRITICAL: Use ONLY these exact complaint types (case-sensitive):
{types}

Return ONLY valid JSON with these fields (use null for missing):
{{"complaintType": "exact type from list above", "subject": "brief subject", "description": "detailed description with location", "citizenEmail": "email or null", "citizenPhone": "phone or null", "ward": "ward number or null"}}"#,
        transcript = transcript,
        types = quoted_type_lines()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personality_lists_every_complaint_type() {
        for t in ComplaintType::ALL {
            assert!(
                AGENT_PERSONALITY.contains(t.as_str()),
                "persona missing {}",
                t.as_str()
            );
        }
    }

    #[test]
    fn test_context_without_photo_skips_photo_protocol() {
        let context = build_context("There's a pothole on my street", false);
        assert!(context.contains("User: There's a pothole on my street"));
        assert!(!context.contains("PHOTO ANALYSIS PROTOCOL"));
    }

    #[test]
    fn test_context_with_photo_adds_protocol() {
        let context = build_context("look at this", true);
        assert!(context.contains("PHOTO ANALYSIS PROTOCOL"));
        assert!(context.contains("User: look at this"));
    }

    #[test]
    fn test_photo_only_turn_gets_default_message() {
        let context = build_context("", true);
        assert!(context.contains(&format!("User: {PHOTO_ONLY_MESSAGE}")));
    }

    #[test]
    fn test_extraction_prompt_embeds_transcript_and_schema() {
        let prompt = build_extraction_prompt("User: broken light on Elm Street\n");
        assert!(prompt.contains("User: broken light on Elm Street"));
        assert!(prompt.contains("Return ONLY valid JSON"));
        assert!(prompt.contains("\"Streetlight Out\""));
        assert!(prompt.contains("citizenEmail"));
    }
}
