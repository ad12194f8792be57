//! Joins routing and response logs into numbered conversation turns.
//!
//! Responses are grouped by `response_id` in first-seen order and walked in
//! that order. A response without a `previous_response_id` opens the next
//! conversation; any other response is the next turn of the current one.
//! The chain itself is not validated.

use crate::ground_truth::GroundTruth;
use crate::logs::{ResponseRecord, RoutingRecord};
use crate::report::{EvaluationResult, NO_GROUND_TRUTH};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

/// Which responses are turned into rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RowSelection {
    /// Every response in the log; the id list only has to be non-empty.
    #[default]
    All,
    /// Only responses whose id is in the id list.
    Listed,
}

impl RowSelection {
    pub fn from_filter_flag(filter_rows: bool) -> Self {
        if filter_rows { Self::Listed } else { Self::All }
    }
}

/// A response paired with the routing decision it answers.
struct Turn<'a> {
    response: &'a ResponseRecord,
    routing: Option<&'a RoutingRecord>,
}

/// Running conversation and turn counters.
#[derive(Debug, Default)]
struct TurnCounter {
    conversation: Option<usize>,
    turn: usize,
}

impl TurnCounter {
    /// Advance for one response and return `(conversation_id, turn)`.
    fn advance(&mut self, response: &ResponseRecord) -> (usize, usize) {
        match self.conversation {
            Some(current) if !response.starts_conversation() => {
                self.turn += 1;
                (current, self.turn)
            }
            current => {
                if current.is_none() && !response.starts_conversation() {
                    warn!(
                        response_id = %response.response_id,
                        "log starts mid-conversation, opening a conversation for it"
                    );
                }
                let next = current.map_or(0, |c| c + 1);
                self.conversation = Some(next);
                self.turn = 1;
                (next, 1)
            }
        }
    }
}

/// Group responses by `response_id`, keeping first-seen group order and
/// log order within each group.
fn group_responses<'a>(
    responses: impl IntoIterator<Item = &'a ResponseRecord>,
    routing: &HashMap<&str, &'a RoutingRecord>,
) -> Vec<Vec<Turn<'a>>> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<Turn<'a>>> = Vec::new();

    for response in responses {
        let slot = *index
            .entry(response.response_id.as_str())
            .or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
        groups[slot].push(Turn {
            response,
            routing: routing.get(response.orchestrator_request_id.as_str()).copied(),
        });
    }

    groups
}

/// Build one unjudged row per response turn.
///
/// Returns nothing when `response_ids` is empty.
pub fn correlate(
    routing: &[RoutingRecord],
    responses: &[ResponseRecord],
    ground_truth: &GroundTruth,
    response_ids: &[String],
    selection: RowSelection,
) -> Vec<EvaluationResult> {
    if response_ids.is_empty() {
        info!("no response ids given, nothing to evaluate");
        return Vec::new();
    }

    // Later records replace earlier ones with the same key.
    let routing_lookup: HashMap<&str, &RoutingRecord> = routing
        .iter()
        .map(|r| (r.orchestrator_request_id.as_str(), r))
        .collect();

    let wanted: Option<HashSet<&str>> = match selection {
        RowSelection::All => None,
        RowSelection::Listed => Some(response_ids.iter().map(String::as_str).collect()),
    };
    let kept = responses.iter().filter(|r| {
        wanted
            .as_ref()
            .is_none_or(|w| w.contains(r.response_id.as_str()))
    });

    let mut counter = TurnCounter::default();
    let mut results = Vec::new();

    for group in group_responses(kept, &routing_lookup) {
        for turn in group {
            let (conversation_id, turn_number) = counter.advance(turn.response);
            results.push(build_row(&turn, conversation_id, turn_number, ground_truth));
        }
    }

    results
}

fn build_row(
    turn: &Turn<'_>,
    conversation_id: usize,
    turn_number: usize,
    ground_truth: &GroundTruth,
) -> EvaluationResult {
    let routing = turn.routing;
    let question = routing.map(|r| r.question.clone()).unwrap_or_default();
    let selected: &[String] = routing
        .map(|r| r.selected_sources.as_slice())
        .unwrap_or(&[]);

    let (reference_answer, expected_source) = ground_truth
        .get(&question)
        .map(|gt| (gt.answer.clone(), gt.source_name.clone()))
        .unwrap_or_default();

    let routing_correct = routing_correctness(&expected_source, selected);
    let error = if reference_answer.is_empty() {
        NO_GROUND_TRUTH.to_string()
    } else {
        String::new()
    };

    EvaluationResult {
        response_id: turn.response.response_id.clone(),
        conversation_id,
        turn: turn_number,
        question,
        reference_answer,
        generated_answer: turn.response.assistant_response.clone(),
        error,
        routing_correct,
        expected_sources: expected_source,
        selected_sources: selected.join(","),
        routing_decision: routing.map(|r| r.decision.clone()).unwrap_or_default(),
        routing_reasoning: routing.map(|r| r.reasoning.clone()).unwrap_or_default(),
        routing_model: routing.map(|r| r.model.clone()).unwrap_or_default(),
        judge_correctness: None,
        judge_relevance: None,
        judge_usage_input: None,
        judge_usage_output: None,
    }
}

/// `None` when there is no expected source, otherwise whether it was selected.
pub fn routing_correctness(expected_source: &str, selected: &[String]) -> Option<bool> {
    if expected_source.is_empty() {
        None
    } else {
        Some(selected.iter().any(|s| s == expected_source))
    }
}
