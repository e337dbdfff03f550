//! Heuristic relationship detection over active market questions.
//!
//! Everything here is lexical: grouping by category and by stop-word-
//! filtered question signatures, "who wins" patterns for mutual exclusion,
//! stage-progression keywords for conditional pairs, time references for
//! sequences, and threshold qualifiers for subsets. Detected candidates
//! carry sub-1.0 confidence and are never written automatically.

use std::collections::HashMap;

use diesel::SqliteConnection;

use crate::core::domain::{Market, MarketId, RelationshipCandidate, RelationshipKind};
use crate::core::store::markets as market_store;
use crate::error::Result;

const STOP_WORDS: [&str; 10] = ["will", "the", "a", "an", "be", "is", "to", "in", "of", "for"];

const EXCLUSIVE_KEYWORDS: [&str; 6] = ["win", "winner", "champion", "elected", "nominee", "first"];

/// Ordered stages; a market earlier in this list is a prerequisite for one
/// later in it.
const STAGE_ORDER: [&str; 6] = ["nominee", "primary", "nomination", "win", "president", "elected"];

const MONTHS: [(&str, u32); 12] = [
    ("january", 1),
    ("february", 2),
    ("march", 3),
    ("april", 4),
    ("may", 5),
    ("june", 6),
    ("july", 7),
    ("august", 8),
    ("september", 9),
    ("october", 10),
    ("november", 11),
    ("december", 12),
];

/// Proposes relationship candidates from question text.
pub struct RelationshipDetector {
    min_confidence: f64,
}

impl Default for RelationshipDetector {
    fn default() -> Self {
        Self {
            min_confidence: 0.6,
        }
    }
}

/// Lowercased words of a question, punctuation stripped.
fn words(question: &str) -> Vec<String> {
    question
        .split(|c: char| !c.is_alphanumeric() && c != '+')
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Stop-word-filtered signature: the first five distinct meaningful words,
/// sorted for determinism.
#[must_use]
pub fn question_signature(question: &str) -> Option<String> {
    let mut meaningful: Vec<String> = words(question)
        .into_iter()
        .filter(|w| !STOP_WORDS.contains(&w.as_str()))
        .collect();
    meaningful.sort();
    meaningful.dedup();
    if meaningful.is_empty() {
        return None;
    }
    Some(meaningful.into_iter().take(5).collect::<Vec<_>>().join("_"))
}

/// First capitalized run in the question, used as the competing subject.
#[must_use]
pub fn leading_subject(question: &str) -> Option<String> {
    let tokens: Vec<&str> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let mut run: Vec<&str> = Vec::new();
    for token in tokens {
        let capitalized = token.chars().next().is_some_and(char::is_uppercase)
            && token.chars().skip(1).all(char::is_lowercase);
        if capitalized {
            run.push(token);
        } else if !run.is_empty() {
            break;
        }
    }
    (!run.is_empty()).then(|| run.join(" "))
}

/// Capitalized multi-word runs (candidate named entities).
#[must_use]
pub fn named_entities(question: &str) -> Vec<String> {
    let tokens: Vec<&str> = question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    let mut entities = Vec::new();
    let mut run: Vec<&str> = Vec::new();
    for token in tokens {
        let capitalized = token.chars().next().is_some_and(char::is_uppercase)
            && token.len() > 1
            && token.chars().skip(1).all(char::is_lowercase);
        if capitalized {
            run.push(token);
        } else {
            if run.len() >= 2 {
                entities.push(run.join(" "));
            }
            run.clear();
        }
    }
    if run.len() >= 2 {
        entities.push(run.join(" "));
    }
    entities
}

/// Index of the first stage keyword appearing in the question.
fn stage_of(question_lower: &str) -> Option<usize> {
    STAGE_ORDER.iter().position(|stage| question_lower.contains(stage))
}

/// A "by March 2026" / "before 2027" / "in 2026" style time reference,
/// resolved to (year, month) for ordering. Month defaults to January.
#[must_use]
pub fn time_reference(question: &str) -> Option<(i32, u32)> {
    let lower = question.to_lowercase();
    for marker in ["by ", "before ", "in "] {
        let Some(pos) = lower.find(marker) else {
            continue;
        };
        let tail = &lower[pos + marker.len()..];
        let month = MONTHS
            .iter()
            .find(|(name, _)| tail.starts_with(name))
            .map(|(_, number)| *number);
        let year = tail
            .split(|c: char| !c.is_ascii_digit())
            .find(|chunk| chunk.len() == 4)
            .and_then(|chunk| chunk.parse::<i32>().ok());
        match (month, year) {
            (Some(month), year) => return Some((year.unwrap_or(2025), month)),
            (None, Some(year)) => return Some((year, 1)),
            (None, None) => continue,
        }
    }
    None
}

/// The question with its time reference removed, for grouping same-event
/// markets that differ only in deadline.
#[must_use]
pub fn base_question(question: &str) -> Option<String> {
    let lower = question.to_lowercase();
    for marker in [" by ", " before ", " in "] {
        if let Some(pos) = lower.find(marker) {
            let tail = &lower[pos + marker.len()..];
            let has_time = MONTHS.iter().any(|(name, _)| tail.starts_with(name))
                || tail
                    .split(|c: char| !c.is_ascii_digit())
                    .any(|chunk| chunk.len() == 4 && chunk.parse::<i32>().is_ok());
            if has_time {
                return Some(question[..pos].trim().to_lowercase());
            }
        }
    }
    None
}

/// True when the question carries a subset qualifier ("by 10+", "over 50",
/// "more than ...").
#[must_use]
pub fn has_subset_qualifier(question: &str) -> bool {
    let lower = question.to_lowercase();
    if lower.contains("more than") {
        return true;
    }
    let word_list = words(&lower);
    for pair in word_list.windows(2) {
        let [marker, value] = pair else { continue };
        let numeric_plus = value.strip_suffix('+').unwrap_or(value);
        let is_numeric = !numeric_plus.is_empty() && numeric_plus.chars().all(|c| c.is_ascii_digit());
        if is_numeric && (marker == "by" && value.ends_with('+') || marker == "over") {
            return true;
        }
    }
    false
}

/// Word-overlap relatedness: over half of the longer question's meaningful
/// words appear in the other.
#[must_use]
pub fn questions_related(q1: &str, q2: &str) -> bool {
    let words1: std::collections::HashSet<String> = words(q1)
        .into_iter()
        .filter(|w| w.len() >= 3)
        .collect();
    let words2: std::collections::HashSet<String> = words(q2)
        .into_iter()
        .filter(|w| w.len() >= 3)
        .collect();
    let total = words1.len().max(words2.len());
    if total == 0 {
        return false;
    }
    let overlap = words1.intersection(&words2).count();
    overlap * 2 > total
}

impl RelationshipDetector {
    #[must_use]
    pub fn new(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    /// Run all heuristics over the active markets and return candidates at
    /// or above the confidence floor.
    pub fn find_candidates(
        &self,
        conn: &mut SqliteConnection,
    ) -> Result<Vec<RelationshipCandidate>> {
        let markets = market_store::active(conn)?;
        Ok(self.candidates_for(&markets))
    }

    /// Pure detection over an in-memory market list.
    #[must_use]
    pub fn candidates_for(&self, markets: &[Market]) -> Vec<RelationshipCandidate> {
        let mut candidates = Vec::new();
        candidates.extend(detect_mutually_exclusive(markets));
        candidates.extend(detect_conditional(markets));
        candidates.extend(detect_time_sequence(markets));
        candidates.extend(detect_subset(markets));
        candidates.retain(|c| c.confidence >= self.min_confidence);
        candidates
    }
}

/// Competing-outcome groups: markets sharing a category or question
/// signature whose questions match a win pattern with distinct subjects.
fn detect_mutually_exclusive(markets: &[Market]) -> Vec<RelationshipCandidate> {
    let mut groups: HashMap<String, Vec<&Market>> = HashMap::new();
    for market in markets {
        if let Some(category) = &market.category {
            groups.entry(format!("cat:{category}")).or_default().push(market);
        }
        if let Some(signature) = question_signature(&market.question) {
            groups.entry(format!("sig:{signature}")).or_default().push(market);
        }
    }

    let mut candidates = Vec::new();
    let mut sorted_groups: Vec<(String, Vec<&Market>)> = groups.into_iter().collect();
    sorted_groups.sort_by(|a, b| a.0.cmp(&b.0));

    for (group_key, members) in sorted_groups {
        let winners: Vec<&&Market> = members
            .iter()
            .filter(|m| {
                let lower = m.question.to_lowercase();
                EXCLUSIVE_KEYWORDS.iter().any(|kw| lower.contains(kw))
            })
            .collect();
        if winners.len() < 2 {
            continue;
        }

        let subjects: Vec<String> = winners
            .iter()
            .filter_map(|m| leading_subject(&m.question))
            .collect();
        let mut distinct = subjects.clone();
        distinct.sort();
        distinct.dedup();
        if subjects.len() != winners.len() || distinct.len() != subjects.len() {
            continue;
        }

        let confidence = if winners.len() <= 5 { 0.7 } else { 0.5 };
        let group_tag: String = group_key.chars().take(24).collect();
        candidates.push(RelationshipCandidate {
            kind: RelationshipKind::MutuallyExclusive,
            market_ids: winners.iter().map(|m| m.id.clone()).collect(),
            group_id: Some(format!("auto-exclusive-{group_tag}")),
            confidence,
            reason: format!("Similar questions with different subjects: {}", subjects.join(", ")),
        });
    }
    candidates
}

/// Stage progressions for a shared entity ("X wins primary" before
/// "X elected president").
fn detect_conditional(markets: &[Market]) -> Vec<RelationshipCandidate> {
    let mut by_entity: HashMap<String, Vec<&Market>> = HashMap::new();
    for market in markets {
        for entity in named_entities(&market.question) {
            by_entity.entry(entity.to_lowercase()).or_default().push(market);
        }
    }

    let mut candidates = Vec::new();
    let mut entities: Vec<(String, Vec<&Market>)> = by_entity.into_iter().collect();
    entities.sort_by(|a, b| a.0.cmp(&b.0));

    for (entity, members) in entities {
        for (i, first) in members.iter().enumerate() {
            for second in &members[i + 1..] {
                let stage1 = stage_of(&first.question.to_lowercase());
                let stage2 = stage_of(&second.question.to_lowercase());
                let (Some(stage1), Some(stage2)) = (stage1, stage2) else {
                    continue;
                };
                if stage1 == stage2 {
                    continue;
                }
                let (parent, child) = if stage1 < stage2 {
                    (*first, *second)
                } else {
                    (*second, *first)
                };
                candidates.push(RelationshipCandidate {
                    kind: RelationshipKind::Conditional,
                    market_ids: vec![parent.id.clone(), child.id.clone()],
                    group_id: None,
                    confidence: 0.65,
                    reason: format!("Stage progression for '{entity}'"),
                });
            }
        }
    }
    candidates
}

/// Same base question with different deadlines, ordered by the deadline.
fn detect_time_sequence(markets: &[Market]) -> Vec<RelationshipCandidate> {
    let mut by_base: HashMap<String, Vec<(&Market, (i32, u32))>> = HashMap::new();
    for market in markets {
        let (Some(base), Some(reference)) = (
            base_question(&market.question),
            time_reference(&market.question),
        ) else {
            continue;
        };
        by_base.entry(base).or_default().push((market, reference));
    }

    let mut candidates = Vec::new();
    let mut bases: Vec<(String, Vec<(&Market, (i32, u32))>)> = by_base.into_iter().collect();
    bases.sort_by(|a, b| a.0.cmp(&b.0));

    for (base, mut members) in bases {
        if members.len() < 2 {
            continue;
        }
        members.sort_by_key(|(_, reference)| *reference);
        for pair in members.windows(2) {
            let [(earlier, earlier_ref), (later, later_ref)] = pair else {
                continue;
            };
            if earlier_ref == later_ref {
                continue;
            }
            let group_tag: String = base.chars().take(30).collect();
            candidates.push(RelationshipCandidate {
                kind: RelationshipKind::TimeSequence,
                market_ids: vec![earlier.id.clone(), later.id.clone()],
                group_id: Some(format!("auto-time-{group_tag}")),
                confidence: 0.75,
                reason: format!(
                    "Same event with different deadlines: {}-{:02} before {}-{:02}",
                    earlier_ref.0, earlier_ref.1, later_ref.0, later_ref.1
                ),
            });
        }
    }
    candidates
}

/// A qualified question ("wins by 10+") against its unqualified twin.
fn detect_subset(markets: &[Market]) -> Vec<RelationshipCandidate> {
    let mut candidates = Vec::new();
    for (i, first) in markets.iter().enumerate() {
        for second in &markets[i + 1..] {
            let first_qualified = has_subset_qualifier(&first.question);
            let second_qualified = has_subset_qualifier(&second.question);
            let (general, specific) = match (first_qualified, second_qualified) {
                (true, false) => (second, first),
                (false, true) => (first, second),
                _ => continue,
            };
            if !questions_related(&first.question, &second.question) {
                continue;
            }
            candidates.push(RelationshipCandidate {
                kind: RelationshipKind::Subset,
                market_ids: vec![general.id.clone(), specific.id.clone()],
                group_id: None,
                confidence: 0.7,
                reason: "Specific version with threshold qualifier".into(),
            });
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn market(id: &str, question: &str, category: Option<&str>) -> Market {
        Market {
            id: MarketId::new(id),
            condition_id: None,
            slug: None,
            question: question.into(),
            description: None,
            outcomes: vec![],
            end_date: None,
            volume: None,
            liquidity: None,
            active: true,
            enable_order_book: false,
            category: category.map(str::to_string),
        }
    }

    #[test]
    fn signature_is_deterministic_and_filtered() {
        let a = question_signature("Will the Chiefs win the Super Bowl?").unwrap();
        let b = question_signature("Will the Chiefs win the Super Bowl?").unwrap();
        assert_eq!(a, b);
        assert!(!a.contains("will"));
        assert!(!a.contains("the"));
    }

    #[test]
    fn subjects_and_entities_come_from_capitalized_runs() {
        assert_eq!(
            leading_subject("Will Taylor Swift win album of the year?").as_deref(),
            Some("Will Taylor Swift")
        );
        let entities = named_entities("Will Gavin Newsom win the California primary?");
        assert!(entities.iter().any(|e| e == "Will Gavin Newsom"));
    }

    #[test]
    fn time_references_parse_month_and_year() {
        assert_eq!(time_reference("Will X happen by March 2026?"), Some((2026, 3)));
        assert_eq!(time_reference("Will X happen before 2027?"), Some((2027, 1)));
        assert_eq!(time_reference("Will X happen in 2026?"), Some((2026, 1)));
        assert_eq!(time_reference("Will X happen soon?"), None);
    }

    #[test]
    fn subset_qualifiers_are_detected() {
        assert!(has_subset_qualifier("Will the Chiefs win by 10+?"));
        assert!(has_subset_qualifier("Will turnout be over 60?"));
        assert!(has_subset_qualifier("Will she earn more than before?"));
        assert!(!has_subset_qualifier("Will the Chiefs win?"));
    }

    #[test]
    fn exclusive_group_needs_distinct_subjects() {
        let detector = RelationshipDetector::default();
        let markets = vec![
            market("a", "Will Alice win the election?", Some("politics")),
            market("b", "Will Bob win the election?", Some("politics")),
            market("c", "Will Carol win the election?", Some("politics")),
        ];
        let candidates = detector.candidates_for(&markets);
        let exclusive: Vec<_> = candidates
            .iter()
            .filter(|c| c.kind == RelationshipKind::MutuallyExclusive)
            .collect();
        assert!(!exclusive.is_empty());
        assert_eq!(exclusive[0].market_ids.len(), 3);
        assert!(exclusive[0].group_id.as_deref().unwrap().starts_with("auto-exclusive-"));
    }

    #[test]
    fn stage_progression_yields_conditional_pair() {
        let detector = RelationshipDetector::default();
        let markets = vec![
            market("primary", "Will Gavin Newsom win the primary?", None),
            market("general", "Will Gavin Newsom be elected?", None),
        ];
        let candidates = detector.candidates_for(&markets);
        let conditional: Vec<_> = candidates
            .iter()
            .filter(|c| c.kind == RelationshipKind::Conditional)
            .collect();
        assert_eq!(conditional.len(), 1);
        // "win" precedes "elected" in the stage order: primary is parent.
        assert_eq!(conditional[0].market_ids[0], MarketId::new("primary"));
        assert_eq!(conditional[0].market_ids[1], MarketId::new("general"));
    }

    #[test]
    fn deadline_variants_yield_time_sequence() {
        let detector = RelationshipDetector::default();
        let markets = vec![
            market("late", "Will the bill pass by December 2026?", None),
            market("early", "Will the bill pass by March 2026?", None),
        ];
        let candidates = detector.candidates_for(&markets);
        let sequence: Vec<_> = candidates
            .iter()
            .filter(|c| c.kind == RelationshipKind::TimeSequence)
            .collect();
        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence[0].market_ids[0], MarketId::new("early"));
        assert_eq!(sequence[0].market_ids[1], MarketId::new("late"));
    }

    #[test]
    fn qualified_twin_yields_subset() {
        let detector = RelationshipDetector::default();
        let markets = vec![
            market("general", "Will the Chiefs win the game?", None),
            market("specific", "Will the Chiefs win the game by 10+?", None),
        ];
        let candidates = detector.candidates_for(&markets);
        let subset: Vec<_> = candidates
            .iter()
            .filter(|c| c.kind == RelationshipKind::Subset)
            .collect();
        assert_eq!(subset.len(), 1);
        assert_eq!(subset[0].market_ids[0], MarketId::new("general"));
        assert_eq!(subset[0].market_ids[1], MarketId::new("specific"));
    }

    #[test]
    fn low_confidence_candidates_are_filtered() {
        let strict = RelationshipDetector::new(0.9);
        let markets = vec![
            market("general", "Will the Chiefs win the game?", None),
            market("specific", "Will the Chiefs win the game by 10+?", None),
        ];
        assert!(strict.candidates_for(&markets).is_empty());
    }
}
