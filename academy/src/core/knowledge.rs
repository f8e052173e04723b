//! Static knowledge base used by the advisor when no model reply is available.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::core::types::MissionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    RailFence,
    DiffieHellman,
    Mitm,
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Knowledge {
    pub title: &'static str,
    pub keywords: &'static [&'static str],
    pub simple_explanation: &'static str,
    pub hint: &'static str,
}

const RAIL_FENCE: Knowledge = Knowledge {
    title: "Rail Fence Cipher",
    keywords: &["rail", "fence", "zig", "zag", "transposition", "rows", "offset"],
    simple_explanation: "The Rail Fence cipher is a transposition cipher: it keeps every letter \
        but changes their order. With two rails the letters alternate top, bottom, top, bottom, \
        and the ciphertext is the top rail read left to right followed by the bottom rail.",
    hint: "Letter one goes on the top rail, letter two on the bottom rail, letter three on top again.",
};

const DIFFIE_HELLMAN: Knowledge = Knowledge {
    title: "Diffie-Hellman Key Exchange",
    keywords: &[
        "diffie", "hellman", "exchange", "public", "private", "shared", "secret", "paint", "color",
        "colour",
    ],
    simple_explanation: "Diffie-Hellman lets two parties agree on a shared secret over a line \
        anyone can listen to. Think of paint: both start from the same public colour, each adds \
        a private colour, they swap the mixtures, and each adds its private colour again. Both \
        end up with the same final colour without ever sending their private one.",
    hint: "Never send your private colour. Send the mixture, then add your private colour to what HQ sent back.",
};

const MITM: Knowledge = Knowledge {
    title: "Man-in-the-Middle Attack",
    keywords: &["mitm", "man", "middle", "intercept", "attack", "eavesdrop", "mallory"],
    simple_explanation: "In a man-in-the-middle attack someone sits between two parties, reading \
        or forging their messages while both sides believe they are talking directly to each other.",
    hint: "Only the forged packets matter. Let the clean traffic through and stop the bugs before they reach HQ.",
};

const GENERAL: Knowledge = Knowledge {
    title: "Cryptography Training",
    keywords: &[],
    simple_explanation: "I am your field advisor for cryptography. I can walk you through the Rail \
        Fence cipher, Diffie-Hellman key exchange and man-in-the-middle attacks.",
    hint: "Pick a mission from the map, or ask me about a specific cipher.",
};

impl Topic {
    pub fn for_mission(id: MissionId) -> Self {
        match id {
            MissionId::DiffieHellman => Topic::DiffieHellman,
            MissionId::Mitm => Topic::Mitm,
            MissionId::RailFence => Topic::RailFence,
        }
    }

    /// Resolve the topic of a free-text question.
    ///
    /// The current mission wins. Without one, topics are scanned in a fixed
    /// order for a keyword appearing anywhere in the text, case-insensitive.
    pub fn detect(message: &str, mission: Option<MissionId>) -> Self {
        if let Some(id) = mission {
            return Self::for_mission(id);
        }
        KEYWORD_PATTERNS
            .iter()
            .find(|(_, pattern)| pattern.is_match(message))
            .map(|(topic, _)| *topic)
            .unwrap_or(Topic::General)
    }

    pub fn knowledge(self) -> &'static Knowledge {
        match self {
            Topic::RailFence => &RAIL_FENCE,
            Topic::DiffieHellman => &DIFFIE_HELLMAN,
            Topic::Mitm => &MITM,
            Topic::General => &GENERAL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::RailFence => "rail-fence",
            Topic::DiffieHellman => "diffie-hellman",
            Topic::Mitm => "mitm",
            Topic::General => "general",
        }
    }
}

static KEYWORD_PATTERNS: LazyLock<Vec<(Topic, Regex)>> = LazyLock::new(|| {
    [Topic::RailFence, Topic::DiffieHellman, Topic::Mitm]
        .into_iter()
        .filter_map(|topic| {
            let alternatives = topic
                .knowledge()
                .keywords
                .iter()
                .map(|word| regex::escape(word))
                .collect::<Vec<_>>()
                .join("|");
            Regex::new(&format!(r"(?i){alternatives}"))
                .ok()
                .map(|pattern| (topic, pattern))
        })
        .collect()
});

/// Static reply used when the model cannot answer.
pub fn fallback_reply(topic: Topic) -> String {
    let knowledge = topic.knowledge();
    format!("{}\n\nHint: {}", knowledge.simple_explanation, knowledge.hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mission_topic_wins_over_keywords() {
        assert_eq!(
            Topic::detect("what is a rail fence?", Some(MissionId::Mitm)),
            Topic::Mitm
        );
    }

    #[test]
    fn keyword_scan_matches_inside_words() {
        assert_eq!(Topic::detect("How does the ZIGZAG work?", None), Topic::RailFence);
        assert_eq!(
            Topic::detect("how do I stop intercepted packets?", None),
            Topic::Mitm
        );
        assert_eq!(Topic::detect("what is a public key?", None), Topic::DiffieHellman);
        assert_eq!(Topic::detect("is mixing colors safe?", None), Topic::DiffieHellman);
        assert_eq!(Topic::detect("who is Mallory", None), Topic::Mitm);
    }

    #[test]
    fn text_without_keywords_is_general() {
        assert_eq!(Topic::detect("tell me a joke", None), Topic::General);
        assert_eq!(Topic::detect("", None), Topic::General);
    }

    #[test]
    fn keyword_scan_checks_topics_in_order() {
        assert_eq!(
            Topic::detect("rail fence versus diffie hellman", None),
            Topic::RailFence
        );
    }

    #[test]
    fn fallback_reply_joins_explanation_and_hint() {
        let reply = fallback_reply(Topic::General);
        let knowledge = Topic::General.knowledge();
        assert_eq!(
            reply,
            format!("{}\n\nHint: {}", knowledge.simple_explanation, knowledge.hint)
        );
    }
}
