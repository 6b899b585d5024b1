// src/matcher/patterns.rs
//! Built-in intent patterns: posts asking what people are building, naming
//! pain points, looking for ideas, inviting self-promotion, or asking how to
//! grow and validate a product.
//!
//! Order matters: the first pattern that hits names the match.

use once_cell::sync::Lazy;
use regex::Regex;

/// A compiled intent pattern. `id` is what ends up in `MatchResult::term`.
#[derive(Debug, Clone)]
pub struct IntentPattern {
    pub id: String,
    pub re: Regex,
}

impl IntentPattern {
    /// Compile a pattern, forcing case-insensitive matching.
    pub fn compile(id: &str, pattern: &str) -> Result<Self, regex::Error> {
        let re = regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            id: id.to_string(),
            re,
        })
    }
}

const BUILTIN: &[(&str, &str)] = &[
    // Project / building
    (
        "question:what_are_you_building",
        r"what (are you|'?re you|have you been) (working on|building|developing|coding|creating)",
    ),
    (
        "question:share_what_you_built",
        r"share what you'?ve (been working on|built|developed|created)",
    ),
    (
        "question:show_your_project",
        r"show (off|us) your (project|side project|latest project|build)",
    ),
    (
        "question:side_projects_thread",
        r"what side projects? (are you|is everyone) working on",
    ),
    // Pain points / problems
    (
        "question:whats_your_pain_point",
        r"(what('s| is) your|biggest|main) (pain point|struggle|roadblock|bottleneck)",
    ),
    (
        "question:biggest_problem",
        r"(what('s| is)|biggest|main) (problem|issue|challenge|frustration) (you'?re facing|with your business|with your startup)?",
    ),
    ("question:holding_you_back", r"what('s| is) holding you back"),
    (
        "question:why_did_it_fail",
        r"why did your (startup|project|idea) fail",
    ),
    (
        "question:stopping_you_launching",
        r"what('s| is) stopping you from launching",
    ),
    // Ideas
    (
        "question:looking_for_ideas",
        r"looking for (saas )?(ideas|opportunities|niches|markets)",
    ),
    (
        "question:need_an_idea",
        r"need (an )?(idea|inspiration|side hustle idea)",
    ),
    (
        "question:need_business_idea",
        r"need a (business|startup) idea",
    ),
    (
        "question:good_idea",
        r"what('s| is) a good (saas|startup|side project) idea",
    ),
    (
        "question:brainstorm_ideas",
        r"brainstorm (saas|startup|app|product) ideas",
    ),
    (
        "question:help_me_find_idea",
        r"help me come up with (an|a new) idea",
    ),
    (
        "question:anyone_have_ideas",
        r"anyone have (saas|startup|business) ideas",
    ),
    // Self-promotion / showcase
    ("promo:self_promotion_thread", r"time for self-?promotion"),
    (
        "promo:showcase_your_project",
        r"showcase your (project|business|startup|side hustle)",
    ),
    (
        "promo:post_your_product",
        r"post your (product|app|website|startup|saas)",
    ),
    (
        "promo:plug_your_work",
        r"plug your (work|project|startup|product|service)",
    ),
    (
        "promo:promote_your_business",
        r"promote your (business|startup|side hustle|saas|app)",
    ),
    (
        "promo:tell_me_about_your_startup",
        r"tell me about your (startup|project|business|product)",
    ),
    ("promo:what_have_you_launched", r"what have you launched"),
    // Growth / validation
    (
        "growth:get_first_users",
        r"how do i get users for my (startup|saas|mvp|side project)",
    ),
    (
        "growth:market_my_product",
        r"how to market my (startup|business|saas|product)",
    ),
    (
        "validation:best_way_to_validate",
        r"best way to validate a (startup|saas|business) idea",
    ),
    (
        "growth:first_users_story",
        r"how did you get your first (10|100|1000) users",
    ),
    (
        "validation:how_to_validate",
        r"how do you validate a (business|saas|startup) idea",
    ),
];

static BUILTIN_PATTERNS: Lazy<Vec<IntentPattern>> = Lazy::new(|| {
    BUILTIN
        .iter()
        .map(|(id, p)| IntentPattern::compile(id, p).expect("builtin intent regex"))
        .collect()
});

/// The fixed, ordered built-in list.
pub fn builtin() -> &'static [IntentPattern] {
    &BUILTIN_PATTERNS
}
