//! Prompts sent to the judge model.

/// Collection of prompts used for judging.
pub struct Prompts;

impl Prompts {
    /// System instruction for scoring a generated answer against a reference.
    pub fn judge_instruction() -> &'static str {
        r#"You are an expert evaluator. Score the AI-generated answer compared to the reference answer.

For each criterion, give a score from 0 to 5:
- correctness: factual correctness (0=completely wrong, 5=perfectly correct)
- relevance: how relevant the answer is to the question (0=irrelevant, 5=highly relevant)

Return ONLY valid JSON in the following format:
{
  "correctness": <0-5>,
  "relevance": <0-5>
}"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_judge_instruction_names_criteria() {
        let prompt = Prompts::judge_instruction();
        assert!(prompt.contains("\"correctness\""));
        assert!(prompt.contains("\"relevance\""));
        assert!(prompt.contains("0 to 5"));
    }
}
