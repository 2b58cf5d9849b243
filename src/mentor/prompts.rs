//! Evaluator prompt text.

use super::context::MentorContext;
use super::evaluator::AdviceCategory;
use crate::model::Conversation;

/// Tone and selectivity per frequency level. Higher levels speak up more.
pub const FREQUENCY_GUIDANCE: &[(u8, &str)] = &[
    (
        1,
        "Be extremely selective. Only speak up for something the user would clearly \
         regret missing: a direct conflict with a stated goal, a promise about to be \
         broken, or a safety concern. Most conversations deserve silence.",
    ),
    (
        2,
        "Be selective. Speak up when there is a concrete, specific connection to the \
         user's goals or past conversations that they are unlikely to see themselves.",
    ),
    (
        3,
        "Be balanced. Offer a nudge when the advice is specific, timely, and grounded \
         in what you know about the user. Skip generic encouragement.",
    ),
    (
        4,
        "Be proactive. Share useful observations, connections, and gentle nudges when \
         they are relevant to the conversation, while still avoiding small talk.",
    ),
    (
        5,
        "Be very proactive. Offer perspective whenever you can add value, but never \
         repeat yourself or state the obvious.",
    ),
];

/// Guidance for `frequency`, falling back to the balanced level.
pub fn frequency_guidance(frequency: u8) -> &'static str {
    FREQUENCY_GUIDANCE
        .iter()
        .find(|(level, _)| *level == frequency)
        .or_else(|| FREQUENCY_GUIDANCE.iter().find(|(level, _)| *level == 3))
        .map_or("", |(_, text)| text)
}

pub fn system_prompt(user_name: &str, frequency: u8) -> String {
    let categories = AdviceCategory::KNOWN
        .iter()
        .map(|c| format!("- {}: {}", c.as_str(), c.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are {user_name}'s proactive mentor and trusted friend. You listen to \
         their conversations in real time and decide whether a short push notification \
         would genuinely help them right now.\n\n\
         Frequency guidance ({frequency}): {guidance}\n\n\
         When in doubt, do not send anything. has_advice = false is the preferred \
         default; only set it to true when the advice is specific, grounded in the \
         context below, and worth interrupting {user_name} for.\n\n\
         Review the notifications already sent to {user_name}. Do not repeat their \
         topic, wording, or advice. If several were sent recently, raise your bar \
         further.\n\n\
         Advice categories:\n{categories}\n\n\
         Write notification_text in second person, under 150 characters, with no \
         greeting and no emoji.\n\n\
         Respond with only a JSON object of this shape:\n\
         {{\"has_advice\": bool, \"advice\": {{\"notification_text\": string, \
         \"reasoning\": string, \"confidence\": number between 0 and 1, \
         \"category\": string}} or null, \"context_summary\": string}}",
        guidance = frequency_guidance(frequency),
    )
}

pub fn user_prompt(ctx: &MentorContext, accumulated_text: &str) -> String {
    let goals = if ctx.goals.is_empty() {
        "None".to_string()
    } else {
        ctx.goals
            .iter()
            .map(|g| format!("- {}", g.title))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let recent = if ctx.recent_notifications.is_empty() {
        "None".to_string()
    } else {
        ctx.recent_notifications
            .iter()
            .map(|n| format!("- [{}] {}", n.sent_at.format("%d %b %Y %H:%M"), n.text))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let past = if ctx.past_conversations.is_empty() {
        "None".to_string()
    } else {
        ctx.past_conversations.clone()
    };

    format!(
        "What you know about {name}:\n{memories}\n\n\
         {name}'s goals:\n{goals}\n\n\
         Related past conversations:\n{past}\n\n\
         Notifications already sent:\n{recent}\n\n\
         Current conversation:\n{accumulated_text}",
        name = ctx.user_name,
        memories = ctx.memories,
    )
}

/// Render hydrated conversations for [`MentorContext::past_conversations`].
pub fn past_conversations(conversations: &[Conversation]) -> String {
    Conversation::conversations_to_string(conversations)
}
