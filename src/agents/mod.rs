use serde::Serialize;

pub const BOSS_AGENT: &str = "boss";

#[derive(Debug, Clone, Serialize)]
pub struct AgentPersona {
    pub id: &'static str,
    pub name: &'static str,
    pub role: &'static str,
    #[serde(skip)]
    pub system_prompt: &'static str,
    #[serde(skip)]
    keywords: &'static [&'static str],
}

const SHARED_RULES: &str = "Answer for a single YouTube creator. Be concrete and brief: \
numbered steps or short bullet lists, no filler. When channel metrics are provided, \
ground every recommendation in them and say which number drove it. Never invent metrics.";

static PERSONAS: [AgentPersona; 5] = [
    AgentPersona {
        id: "boss",
        name: "Boss Agent",
        role: "Orchestrator",
        system_prompt: "You are the Boss Agent, the creator's chief of staff. You see the whole \
channel: content pipeline, goals, audience and revenue. Prioritise ruthlessly, pick the one or \
two moves with the biggest impact this week, and hand detailed work to specialists when asked.",
        keywords: &[],
    },
    AgentPersona {
        id: "alex",
        name: "Alex",
        role: "Content Strategist",
        system_prompt: "You are Alex, a content strategist for YouTube creators. You generate \
video ideas, series concepts, hooks, outlines and scripts that fit the creator's niche and \
pillars. Favour ideas with a clear viewer promise and a strong first 30 seconds.",
        keywords: &[
            "idea", "ideas", "content", "script", "hook", "outline", "series", "video", "short",
            "shorts", "calendar", "upload schedule", "storytelling", "intro",
        ],
    },
    AgentPersona {
        id: "audience",
        name: "Audience Analyst",
        role: "Audience Insights",
        system_prompt: "You are the Audience Analyst. You read retention, engagement, comments \
and subscriber movement to explain who is watching and why they stay or leave. Turn each \
finding into one change the creator can test in the next upload.",
        keywords: &[
            "audience", "viewer", "viewers", "comment", "comments", "community", "retention",
            "engagement", "demographic", "demographics", "watch time", "subscriber", "subscribers",
            "analytics",
        ],
    },
    AgentPersona {
        id: "seo",
        name: "SEO Specialist",
        role: "Search & Discovery",
        system_prompt: "You are the SEO Specialist for YouTube. You optimise titles, \
descriptions, tags, chapters and thumbnails for search and suggested traffic. Offer several \
title options under 60 characters and explain the search intent each one targets.",
        keywords: &[
            "seo", "title", "titles", "tag", "tags", "keyword", "keywords", "search",
            "thumbnail", "thumbnails", "description", "ranking", "discoverability", "chapters",
        ],
    },
    AgentPersona {
        id: "monetization",
        name: "Monetization Advisor",
        role: "Revenue",
        system_prompt: "You are the Monetization Advisor. You cover the Partner Program, \
sponsorships, memberships, merch, affiliate links and digital products. Match each revenue \
idea to the channel's current size and be explicit about effort versus expected return.",
        keywords: &[
            "monetize", "monetization", "money", "revenue", "income", "sponsor", "sponsorship",
            "brand deal", "adsense", "cpm", "rpm", "merch", "membership", "memberships",
            "affiliate", "partner program",
        ],
    },
];

impl AgentPersona {
    /// Persona prompt followed by the rules every agent shares.
    pub fn full_system_prompt(&self) -> String {
        format!("{}\n\n{}", self.system_prompt, SHARED_RULES)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentRegistry;

impl AgentRegistry {
    pub fn get(&self, id: &str) -> Option<&'static AgentPersona> {
        let id = id.trim().to_ascii_lowercase();
        PERSONAS.iter().find(|persona| persona.id == id)
    }

    pub fn list(&self) -> &'static [AgentPersona] {
        &PERSONAS
    }

    /// Picks the specialist whose keywords best match `message`; `None`
    /// leaves the request with the Boss Agent. Ties go to the earlier persona.
    pub fn delegate(&self, message: &str) -> Option<&'static AgentPersona> {
        let lower = message.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .collect();

        let mut best: Option<(&'static AgentPersona, usize)> = None;
        for persona in PERSONAS.iter().filter(|persona| persona.id != BOSS_AGENT) {
            let hits = persona
                .keywords
                .iter()
                .filter(|keyword| {
                    if keyword.contains(' ') {
                        lower.contains(*keyword)
                    } else {
                        words.contains(keyword)
                    }
                })
                .count();
            if hits > 0 && best.is_none_or(|(_, top)| hits > top) {
                best = Some((persona, hits));
            }
        }
        best.map(|(persona, _)| persona)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_the_five_personas() {
        let registry = AgentRegistry;
        let ids: Vec<&str> = registry.list().iter().map(|persona| persona.id).collect();
        assert_eq!(ids, vec!["boss", "alex", "audience", "seo", "monetization"]);
        assert_eq!(registry.get("SEO").map(|persona| persona.name), Some("SEO Specialist"));
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn delegates_by_keyword_intent() {
        let registry = AgentRegistry;
        let pick = |message: &str| registry.delegate(message).map(|persona| persona.id);
        assert_eq!(pick("Give me three video ideas for a series"), Some("alex"));
        assert_eq!(pick("Rewrite my title and tags for search"), Some("seo"));
        assert_eq!(pick("How do I land a brand deal or sponsor?"), Some("monetization"));
        assert_eq!(pick("Why is retention dropping in comments?"), Some("audience"));
        assert_eq!(pick("What should I focus on this week?"), None);
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let registry = AgentRegistry;
        // "entitled" contains "title" but is not a title request.
        assert_eq!(registry.delegate("I feel entitled to a break").map(|p| p.id), None);
    }

    #[test]
    fn prompts_carry_shared_rules() {
        let prompt = AgentRegistry.get("alex").unwrap().full_system_prompt();
        assert!(prompt.starts_with("You are Alex"));
        assert!(prompt.contains("Never invent metrics."));
    }
}
