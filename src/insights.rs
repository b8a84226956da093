//! Human-readable context attached to alert payloads.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InsightCard {
    pub title: String,
    pub expectation: String,
    pub why: String,
    pub action: String,
}

struct InsightRule {
    keywords: &'static [&'static str],
    expectation: &'static str,
    why: &'static str,
    action: &'static str,
}

/// First match wins.
const RULES: &[InsightRule] = &[
    InsightRule {
        keywords: &["barrier", "ceramide", "panthenol", "cica", "centella", "heartleaf"],
        expectation: "Stronger skin barrier and gentle soothing",
        why: "Searches around sensitive and damaged-barrier skin are growing",
        action: "Lead with barrier clinical results and bundle the soothing line",
    },
    InsightRule {
        keywords: &[
            "hyperpigmentation",
            "dark spot",
            "melasma",
            "tranexamic",
            "azelaic",
            "vitamin c",
        ],
        expectation: "Visible improvement in spots, melasma and tone",
        why: "Brightening demand is splitting by active ingredient",
        action: "Propose step-by-step pigmentation routines with ingredient pairings",
    },
    InsightRule {
        keywords: &["acne", "fungal acne", "non comedogenic", "oil control"],
        expectation: "Breakout relief without clogged pores",
        why: "Safety and non-comedogenic checks are rising among acne-prone shoppers",
        action: "Show non-comedogenic test evidence and short-form routine content",
    },
    InsightRule {
        keywords: &["retinol", "bakuchiol", "peptide", "pdrn", "anti aging", "wrinkle"],
        expectation: "Low-irritation anti-aging and skin renewal",
        why: "Gentler retinol alternatives and renewal actives are gaining ground",
        action: "Publish sensitive-skin usage guides tied to night routines",
    },
    InsightRule {
        keywords: &["hydrating", "hyaluronic", "beta glucan", "cream toner", "essence"],
        expectation: "Relief from inner dryness and long-lasting hydration",
        why: "Moisturizing is being judged on how long hydration lasts",
        action: "Highlight hydration retention data and layering routines",
    },
    InsightRule {
        keywords: &["sunscreen", "sun stick", "tone up", "spf"],
        expectation: "Light daily sun care without white cast",
        why: "Demand is growing for sun care that works under makeup",
        action: "Run makeup compatibility tests and stress portability and reapplication",
    },
    InsightRule {
        keywords: &["cushion", "foundation", "base makeup"],
        expectation: "Fast base makeup with strong adherence",
        why: "Cushion-led routines are shortening base makeup steps",
        action: "Compare coverage and wear time with skin-type recommendations",
    },
    InsightRule {
        keywords: &["k beauty", "korean skincare", "tiktok", "viral", "amazon"],
        expectation: "Trust in proven K-beauty and viral products",
        why: "Social platforms drive a growing share of purchase decisions",
        action: "Secure short-form reviews and localize global product pages",
    },
    InsightRule {
        keywords: &["dermatologist", "fragrance free", "vegan", "cruelty free", "pregnancy"],
        expectation: "Confidence in safety, ethics and expert endorsement",
        why: "Ingredient safety and value-driven keywords are surging",
        action: "Surface certification badges and expand the FAQ",
    },
];

pub fn make_insight(term: &str) -> InsightCard {
    let lowered = term.to_lowercase();
    let title = format!("\u{201c}{term}\u{201d}");

    match RULES
        .iter()
        .find(|rule| rule.keywords.iter().any(|k| lowered.contains(k)))
    {
        Some(rule) => InsightCard {
            title,
            expectation: rule.expectation.to_string(),
            why: rule.why.to_string(),
            action: rule.action.to_string(),
        },
        None => InsightCard {
            title,
            expectation: "Clear explanation of benefits and usage context".to_string(),
            why: "Interest is growing but the underlying need is not yet distinct".to_string(),
            action: "Test adjacent ingredient and routine keywords and watch content response"
                .to_string(),
        },
    }
}
