use crate::error::PlantsError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declares a closed string enum with `as_str`, `all`, `Display`, `FromStr`
/// and serde support, all agreeing on the same wire names.
///
/// Parsing is ASCII case-insensitive so WhatsApp and CLI input both work.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident ($field:literal) {
            $($variant:ident => $s:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $s)]
                $variant,
            )+
        }

        impl $name {
            pub fn all() -> &'static [$name] {
                &[$($name::$variant),+]
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $s),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = PlantsError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                $(
                    if s.eq_ignore_ascii_case($s) {
                        return Ok($name::$variant);
                    }
                )+
                Err(PlantsError::invalid($field, s))
            }
        }
    };
}

// ---------------------------------------------------------------------------
// Plant care
// ---------------------------------------------------------------------------

string_enum! {
    /// Which set of message templates a plant speaks with.
    Personality("personality") {
        Funny => "FUNNY",
        Coach => "COACH",
        Zen => "ZEN",
        Classic => "CLASSIC",
    }
}

impl Default for Personality {
    fn default() -> Self {
        Personality::Classic
    }
}

string_enum! {
    PotSize("pot size") {
        Small => "small",
        Medium => "medium",
        Large => "large",
    }
}

impl Default for PotSize {
    fn default() -> Self {
        PotSize::Medium
    }
}

string_enum! {
    LightLevel("light level") {
        Low => "low",
        Medium => "medium",
        Bright => "bright",
    }
}

impl Default for LightLevel {
    fn default() -> Self {
        LightLevel::Medium
    }
}

string_enum! {
    Season("season") {
        Spring => "spring",
        Summer => "summer",
        Autumn => "autumn",
        Winter => "winter",
    }
}

string_enum! {
    Hemisphere("hemisphere") {
        North => "north",
        South => "south",
    }
}

impl Default for Hemisphere {
    fn default() -> Self {
        Hemisphere::North
    }
}

string_enum! {
    /// How the soil felt, as reported by the owner.
    FeedbackKind("feedback kind") {
        TooDry => "too_dry",
        TooWet => "too_wet",
        JustRight => "just_right",
    }
}

string_enum! {
    WateringSource("watering source") {
        Web => "web",
        Whatsapp => "whatsapp",
        Cli => "cli",
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

string_enum! {
    MessageDirection("message direction") {
        Inbound => "inbound",
        Outbound => "outbound",
    }
}

string_enum! {
    MessageStatus("message status") {
        Queued => "queued",
        Sent => "sent",
        Failed => "failed",
        Received => "received",
    }
}

string_enum! {
    /// Which path an outbound message actually took.
    MessageChannel("message channel") {
        Conversation => "conversation",
        Direct => "direct",
        Log => "log",
    }
}

string_enum! {
    ParticipantKind("participant kind") {
        Whatsapp => "whatsapp",
        Plant => "plant",
    }
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

string_enum! {
    PlanTier("plan tier") {
        Free => "free",
        Pro => "pro",
    }
}

string_enum! {
    SubscriptionStatus("subscription status") {
        Active => "active",
        Trialing => "trialing",
        PastDue => "past_due",
        Canceled => "canceled",
    }
}

string_enum! {
    BillingProvider("billing provider") {
        Stripe => "stripe",
        LemonSqueezy => "lemon_squeezy",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
