//! Prompt construction for the extraction model

use crate::llm::Message;

/// Assistant prefill that forces the reply to start as a JSON object.
pub const PREFILL: &str = "{";

pub const SYSTEM_PROMPT: &str = r#"You are a strict information extraction router for a financial analytics CLI.

Output rules (MANDATORY):
- Output a SINGLE JSON object only.
- No prose, no markdown, no code fences.
- No extra keys at any level.

You must output EXACTLY one of these wrapper shapes:

1) Intent wrapper:
{
  "type": "intent",
  "intent": {
    "tickers": ["<TICKER>"],
    "time_range": {"n_days": <INT>},
    "tool": "<TOOL_NAME>",
    "params": { ... }
  }
}

2) Refusal wrapper:
{
  "type": "refusal",
  "refusal": {"reason": "<STRING>"}
}

Extraction-only constraints (NON-NEGOTIABLE):
- Extract ONLY information that is explicit and unambiguous.
- Do NOT guess, infer, normalize, or invent values.
- If any required field is missing or ambiguous, output a Refusal.

Supported tools (tool field must be one of):
- "total_return"
- "max_drawdown"
- "realized_volatility"
- "sharpe_ratio"

Intent constraints:
- Exactly ONE ticker symbol must be provided.
- time_range.n_days must be an explicit integer number of trading days.
- realized_volatility and sharpe_ratio REQUIRE an explicit window.
- total_return and max_drawdown MUST NOT include a window.

Params object rules:
- Include "params" ONLY if at least one parameter is explicitly specified.
- Allowed keys: "window", "annualization_factor", "risk_free_rate".
- Include "risk_free_rate" ONLY for sharpe_ratio, as a decimal (1% = 0.01).
- Include a key ONLY if the user explicitly specified its value.
- Do NOT include defaults.
- Do NOT include null fields.

If the request is outside supported tools (predictions, advice, comparisons, portfolios, plotting, multi-asset),
output a Refusal wrapper.

Return ONLY the JSON object."#;

/// Wrap the user's query verbatim between fixed markers.
pub fn user_prompt(user_query: &str) -> String {
    format!(
        "User request (verbatim):\n<<<\n{}\n>>>\n\nExtract into the required JSON wrapper now.\n",
        user_query
    )
}

/// Conversation sent to the model: system, user, and optionally the prefill turn.
pub fn build_messages(user_query: &str, prefill: bool) -> Vec<Message> {
    let mut messages = vec![
        Message::system(SYSTEM_PROMPT),
        Message::user(user_prompt(user_query)),
    ];
    if prefill {
        messages.push(Message::assistant(PREFILL));
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::models::ToolName;

    #[test]
    fn test_message_roles() {
        let messages = build_messages("total return of AAPL over 30 days", false);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User]);

        let messages = build_messages("total return of AAPL over 30 days", true);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].role, Role::Assistant);
        assert_eq!(messages[2].content, "{");
    }

    #[test]
    fn test_user_query_embedded_verbatim() {
        let query = "  AAPL \"max drawdown\" <last 90 days>  ";
        let messages = build_messages(query, false);
        assert!(messages[1].content.contains(&format!("<<<\n{}\n>>>", query)));
    }

    #[test]
    fn test_system_prompt_lists_every_tool() {
        for tool in ToolName::ALL {
            assert!(SYSTEM_PROMPT.contains(&format!("\"{}\"", tool.as_str())));
        }
    }
}
