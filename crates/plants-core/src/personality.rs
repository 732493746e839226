//! Personality-flavoured message templates.
//!
//! Each (personality, kind) pair has one or more variants. Callers pass a
//! rotating `variant` (usually the plant's watering count) so consecutive
//! reminders do not repeat word for word.

use crate::types::Personality;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Welcome,
    Reminder,
    Overdue,
    Thanks,
    FeedbackAck,
    Paused,
    Resumed,
    Help,
    WhichPlant,
    PlanLimit,
}

/// Values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct MessageContext {
    pub plant: String,
    pub species: String,
    pub owner: Option<String>,
    pub days: Option<i64>,
    /// Comma-separated plant nicknames, used when asking which plant.
    pub plants: Option<String>,
}

fn templates(personality: Personality, kind: MessageKind) -> &'static [&'static str] {
    use MessageKind::*;
    use Personality::*;
    match (personality, kind) {
        (Funny, Welcome) => &[
            "Hi {owner}! It's me, {plant} the {species}. I've been adopted and I'm already emotionally attached. Text me \"watered\" when you give me a drink 💦",
        ],
        (Funny, Reminder) => &[
            "{owner}, it's {plant}. I'm not saying I'm parched, but I just tried to photosynthesize a cactus. Water me? 🥤",
            "Knock knock. Who's there? Water. Water who? WATER ME PLEASE, {owner}. Love, {plant} 🌿",
            "Breaking news: local {species} named {plant} reports dangerously low hydration levels. More at 11. Or now. Now is good.",
        ],
        (Funny, Overdue) => &[
            "{owner}... it's been {days} days. I've started writing my memoirs. Chapter 1: The Drought. Sincerely, {plant} 🥀",
            "Day {days} without water. I've begun talking to the dust bunnies. They're not great listeners. -{plant}",
        ],
        (Funny, Thanks) => &[
            "Ahhh that hit the spot! 10/10 would get watered again. -{plant} 😎",
            "GLUG GLUG GLUG. Thank you {owner}, I feel like a brand new {species}.",
        ],
        (Funny, FeedbackAck) => &[
            "Noted! I'll recalibrate my drama levels accordingly. -{plant}",
        ],
        (Funny, Paused) => &["Fine, I'll stop texting. I'll just be here. Silently. Photosynthesizing. Text \"start\" if you miss me. -{plant}"],
        (Funny, Resumed) => &["I'M BACK! Did you miss me? Don't answer that. -{plant}"],
        (Funny, Help) => &["Plant-speak 101: \"watered\" = you watered me, \"too dry\" / \"too wet\" = tell me how my soil feels, \"stop\" / \"start\" = pause or resume my texts. -{plant}"],
        (Funny, WhichPlant) => &["Uh oh, we're all shouting at once! Which one of us do you mean: {plants}?"],
        (Funny, PlanLimit) => &["Your jungle is full on the free plan! Upgrade to Pro to adopt more of us 🌱"],

        (Coach, Welcome) => &[
            "{owner}! {plant} here, your {species}. We're a team now. I'll tell you when it's go time, you reply \"watered\" when it's done. Let's GROW! 💪",
        ],
        (Coach, Reminder) => &[
            "Rise and grind, {owner}! {plant} needs hydration to hit today's growth goals. Water me up! 💪",
            "Champions stay consistent. Today's rep: one watering for {plant}. You've got this!",
        ],
        (Coach, Overdue) => &[
            "{owner}, we're {days} days behind schedule. No excuses, we bounce back TODAY. Water {plant} now! 🏋️",
        ],
        (Coach, Thanks) => &[
            "That's how it's done! Another win for Team {plant}. 🏆",
            "Great work, {owner}! Consistency builds roots. 🌱",
        ],
        (Coach, FeedbackAck) => &["Good call, {owner}. Adjusting the training plan for {plant}."],
        (Coach, Paused) => &["Taking a rest day? Recovery matters. Text \"start\" when you're ready to get back at it."],
        (Coach, Resumed) => &["Back in the game! {plant} is ready to train. 💪"],
        (Coach, Help) => &["Playbook: \"watered\" logs a watering, \"too dry\" or \"too wet\" fine-tunes my schedule, \"stop\" pauses texts, \"start\" resumes them."],
        (Coach, WhichPlant) => &["Which teammate are we talking about: {plants}?"],
        (Coach, PlanLimit) => &["You've maxed out the free roster! Go Pro to add more plants to the team."],

        (Zen, Welcome) => &[
            "Hello {owner}. I am {plant}, a {species}. Together we will find balance. When you water me, simply reply \"watered\". 🍃",
        ],
        (Zen, Reminder) => &[
            "The river flows, the rain falls. Today, {owner}, you are the rain. 💧 -{plant}",
            "Stillness is good. Thirst is not. A little water for {plant}, when you are ready. 🍃",
        ],
        (Zen, Overdue) => &[
            "{days} days have passed like clouds. The soil remembers. Please water {plant}. 🍂",
        ],
        (Zen, Thanks) => &[
            "Gratitude flows through every root. Thank you, {owner}. -{plant}",
        ],
        (Zen, FeedbackAck) => &["I hear you. We adjust, as the bamboo bends. -{plant}"],
        (Zen, Paused) => &["Silence, too, is a teaching. Reply \"start\" to hear from me again."],
        (Zen, Resumed) => &["We return to the path together. 🍃 -{plant}"],
        (Zen, Help) => &["Simple words guide us: \"watered\", \"too dry\", \"too wet\", \"stop\", \"start\"."],
        (Zen, WhichPlant) => &["Many leaves, one garden. Which of us do you mean: {plants}?"],
        (Zen, PlanLimit) => &["Your garden has reached its free limit. Pro makes room for more life. 🌱"],

        (Classic, Welcome) => &[
            "Hi {owner}, this is {plant} ({species}). I'll text you when I need water. Reply \"watered\" after watering me.",
        ],
        (Classic, Reminder) => &[
            "Hi {owner}, {plant} needs watering today.",
            "Reminder: it's time to water {plant}.",
        ],
        (Classic, Overdue) => &[
            "{plant} is {days} days overdue for watering.",
        ],
        (Classic, Thanks) => &["Thanks {owner}! Watering logged for {plant}."],
        (Classic, FeedbackAck) => &["Thanks, {plant}'s watering schedule has been adjusted."],
        (Classic, Paused) => &["Reminders paused. Reply \"start\" to resume."],
        (Classic, Resumed) => &["Reminders resumed for {plant}."],
        (Classic, Help) => &["Commands: \"watered\", \"too dry\", \"too wet\", \"stop\", \"start\", \"help\"."],
        (Classic, WhichPlant) => &["Which plant do you mean: {plants}?"],
        (Classic, PlanLimit) => &["You've reached the free plan's plant limit. Upgrade to Pro to add more plants."],
    }
}

/// Number of variants for a given pair; always at least one.
pub fn variant_count(personality: Personality, kind: MessageKind) -> usize {
    templates(personality, kind).len()
}

/// Render a message. Unknown `{placeholders}` are left as-is.
pub fn render(personality: Personality, kind: MessageKind, ctx: &MessageContext, variant: usize) -> String {
    let options = templates(personality, kind);
    let template = options[variant % options.len()];
    substitute(template, ctx)
}

fn substitute(template: &str, ctx: &MessageContext) -> String {
    let owner = ctx
        .owner
        .as_deref()
        .filter(|o| !o.trim().is_empty())
        .unwrap_or("friend");
    let days = ctx.days.map(|d| d.to_string()).unwrap_or_default();
    let plants = ctx.plants.clone().unwrap_or_default();

    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match key {
            "plant" => out.push_str(&ctx.plant),
            "species" => out.push_str(&ctx.species),
            "owner" => out.push_str(owner),
            "days" => out.push_str(&days),
            "plants" => out.push_str(&plants),
            _ => {
                out.push('{');
                out.push_str(key);
                out.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
