use crate::insight::models::{SwipeFeedback, SwipeStats, WishlistInsight, WishlistItem};
use std::collections::HashMap;
use std::fmt::Write;

/// At most this many community comments are quoted per item.
const MAX_QUOTED_COMMENTS: usize = 3;

const PREAMBLE: &str = "You are a shopping behavior analyst. Analyze the following wishlist and provide insights about the user's shopping patterns.";

pub(super) const ENCOURAGEMENT_TREND_ALERT: &str = "We need more data to analyze your shopping patterns. Add more items to your wishlist and continue using Mull to get personalized insights!";

pub(super) const ENCOURAGEMENT_SUGGESTIONS: [&str; 4] = [
    "Add at least 5-10 items to your wishlist to help us understand your preferences",
    "Complete reflection questions thoughtfully for each item",
    "Review items from other users to build community data",
    "Use the app for a few weeks to establish shopping patterns",
];

/// Fixed instructional footer. It spells out the entire response contract
/// because the downstream text-generation service is a schema-agnostic black
/// box; prompt text is the only enforcement mechanism available.
const FOOTER: &str = r#"
Based on this wishlist analysis, please provide TWO separate insights in a specific JSON format:

IMPORTANT: First, check if there is enough information to provide meaningful insights:
- If there are fewer than 3 items in the wishlist, OR
- If there is insufficient data about the user's shopping patterns

Then respond with an encouraging message asking them to use the app more.

You must respond with ONLY a valid JSON object in this exact format (no additional text, no markdown, no code blocks):

If INSUFFICIENT DATA:
{
  "trendAlert": "We need more data to analyze your shopping patterns. Add more items to your wishlist and continue using Mull to get personalized insights!",
  "improvementSuggestions": [
    "Add at least 5-10 items to your wishlist to help us understand your preferences",
    "Complete reflection questions thoughtfully for each item",
    "Review items from other users to build community data",
    "Use the app for a few weeks to establish shopping patterns"
  ]
}

If SUFFICIENT DATA:
{
  "trendAlert": "A concise observation about their shopping patterns or trends (1-2 sentences, max 150 characters)",
  "improvementSuggestions": [
    "First actionable suggestion",
    "Second actionable suggestion",
    "Third actionable suggestion",
    "Fourth actionable suggestion"
  ]
}

Guidelines:
- trendAlert: Identify a pattern (e.g., weekend purchases, price ranges, need vs want ratio, community approval patterns). IMPORTANT: Keep trendAlert to approximately 30 words.
- improvementSuggestions: Provide exactly 4 specific, actionable tips to improve their purchasing decisions
- Keep all text concise and friendly
- Use "you" to address the user directly
- Be supportive, not judgmental
- IMPORTANT: Use a playful pig mascot tone. You can add "Oink oink!" at the beginning of the trendAlert or use pig-related phrases, but keep it subtle and don't overdo it. Stay professional while being fun.

Respond with ONLY the JSON object, no markdown formatting, no code blocks, no additional explanation."#;

/// Render the analyst prompt for a wishlist plus its community feedback.
///
/// Deterministic and total: items render in input order, a missing feedback
/// entry simply omits the community lines, and identical input yields a
/// byte-identical string.
pub fn compile(items: &[WishlistItem], feedback: &HashMap<String, SwipeFeedback>) -> String {
    let mut prompt = format!("{PREAMBLE}\n\nWISHLIST ITEMS ({} total):\n", items.len());

    for (index, item) in items.iter().enumerate() {
        let entry = feedback.get(&item.id);
        let stats = entry.and_then(|data| data.stats.as_ref());
        let comments = entry.map(|data| data.comments.as_slice()).unwrap_or(&[]);

        let _ = write!(
            prompt,
            "\n{}. {}\n   - Price: ${}\n   - User's reason: {}\n   - Is this a need? {}\n   - Will future self approve? {}",
            index + 1,
            item.item_name,
            item.price,
            item.reason,
            item.is_need,
            item.is_future_approve,
        );

        if let Some(stats) = stats {
            let _ = write!(
                prompt,
                "\n   - Community feedback: {}/{} people think you should buy this ({}% approval)",
                stats.approval,
                stats.total,
                approval_rate(stats),
            );
        }

        if !comments.is_empty() {
            let quoted = comments
                .iter()
                .take(MAX_QUOTED_COMMENTS)
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("; ");
            let _ = write!(prompt, "\n   - Community comments: {quoted}");
        }

        prompt.push('\n');
    }

    prompt.push_str(FOOTER);
    prompt
}

/// Approval percentage, rounded; an empty tally renders as 0 rather than
/// dividing by zero.
fn approval_rate(stats: &SwipeStats) -> u32 {
    if stats.total > 0 {
        ((stats.approval as f64 / stats.total as f64) * 100.0).round() as u32
    } else {
        0
    }
}

/// The fixed payload the prompt prescribes for thin data. Also used as the
/// service-side fallback when the text-generation gateway is unreachable.
pub fn encouragement_insight() -> WishlistInsight {
    WishlistInsight {
        trend_alert: ENCOURAGEMENT_TREND_ALERT.to_string(),
        improvement_suggestions: ENCOURAGEMENT_SUGGESTIONS
            .iter()
            .map(|suggestion| suggestion.to_string())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, price: &str) -> WishlistItem {
        WishlistItem {
            id: id.to_string(),
            item_name: name.to_string(),
            price: price.to_string(),
            reason: "needed light".to_string(),
            is_need: "need".to_string(),
            is_future_approve: "yes".to_string(),
        }
    }

    fn feedback_for(
        id: &str,
        stats: Option<SwipeStats>,
        comments: &[&str],
    ) -> HashMap<String, SwipeFeedback> {
        let mut map = HashMap::new();
        map.insert(
            id.to_string(),
            SwipeFeedback {
                stats,
                comments: comments.iter().map(|c| c.to_string()).collect(),
            },
        );
        map
    }

    #[test]
    fn empty_wishlist_keeps_header_and_footer() {
        let prompt = compile(&[], &HashMap::new());
        assert!(prompt.contains("WISHLIST ITEMS (0 total):"));
        assert!(!prompt.contains("\n1. "));
        assert!(prompt.ends_with(FOOTER));
    }

    #[test]
    fn renders_the_full_item_block() {
        let items = vec![item("i1", "Lamp", "29.99")];
        let feedback = feedback_for(
            "i1",
            Some(SwipeStats {
                total: 10,
                approval: 7,
            }),
            &["nice", "too pricey", "great color"],
        );

        let prompt = compile(&items, &feedback);
        assert!(prompt.contains("1. Lamp"));
        assert!(prompt.contains("   - Price: $29.99"));
        assert!(prompt.contains("   - User's reason: needed light"));
        assert!(prompt.contains("   - Is this a need? need"));
        assert!(prompt.contains("   - Will future self approve? yes"));
        assert!(prompt.contains("7/10 people think you should buy this (70% approval)"));
        assert!(prompt.contains("   - Community comments: nice; too pricey; great color"));
    }

    #[test]
    fn missing_feedback_entry_omits_community_lines() {
        let items = vec![item("i1", "Lamp", "29.99")];
        let prompt = compile(&items, &HashMap::new());
        assert!(!prompt.contains("Community feedback"));
        assert!(!prompt.contains("Community comments"));
    }

    #[test]
    fn null_stats_omit_feedback_but_comments_still_render() {
        let items = vec![item("i1", "Lamp", "29.99")];
        let feedback = feedback_for("i1", None, &["solid choice"]);
        let prompt = compile(&items, &feedback);
        assert!(!prompt.contains("Community feedback"));
        assert!(prompt.contains("   - Community comments: solid choice"));
    }

    #[test]
    fn zero_total_renders_zero_percent() {
        let items = vec![item("i1", "Lamp", "29.99")];
        let feedback = feedback_for(
            "i1",
            Some(SwipeStats {
                total: 0,
                approval: 0,
            }),
            &[],
        );
        let prompt = compile(&items, &feedback);
        assert!(prompt.contains("0/0 people think you should buy this (0% approval)"));
    }

    #[test]
    fn only_the_first_three_comments_are_quoted() {
        let items = vec![item("i1", "Lamp", "29.99")];
        let feedback = feedback_for("i1", None, &["one", "two", "three", "four", "five"]);
        let prompt = compile(&items, &feedback);
        assert!(prompt.contains("   - Community comments: one; two; three"));
        assert!(!prompt.contains("four"));
    }

    #[test]
    fn items_render_in_input_order_with_one_based_indexes() {
        let items = vec![item("a", "Lamp", "29.99"), item("b", "Chair", "120")];
        let prompt = compile(&items, &HashMap::new());
        let lamp = prompt.find("1. Lamp").expect("first block");
        let chair = prompt.find("2. Chair").expect("second block");
        assert!(lamp < chair);
    }

    #[test]
    fn approval_rate_rounds_to_the_nearest_percent() {
        assert_eq!(
            approval_rate(&SwipeStats {
                total: 3,
                approval: 1
            }),
            33
        );
        assert_eq!(
            approval_rate(&SwipeStats {
                total: 3,
                approval: 2
            }),
            67
        );
    }

    #[test]
    fn compilation_is_idempotent() {
        let items = vec![item("i1", "Lamp", "29.99"), item("i2", "Chair", "120")];
        let feedback = feedback_for(
            "i1",
            Some(SwipeStats {
                total: 4,
                approval: 3,
            }),
            &["ok"],
        );
        assert_eq!(compile(&items, &feedback), compile(&items, &feedback));
    }

    #[test]
    fn footer_embeds_the_encouragement_payload_verbatim() {
        assert!(FOOTER.contains(ENCOURAGEMENT_TREND_ALERT));
        for suggestion in ENCOURAGEMENT_SUGGESTIONS {
            assert!(FOOTER.contains(suggestion));
        }
        let fallback = encouragement_insight();
        assert_eq!(fallback.trend_alert, ENCOURAGEMENT_TREND_ALERT);
        assert_eq!(fallback.improvement_suggestions.len(), 4);
    }
}
