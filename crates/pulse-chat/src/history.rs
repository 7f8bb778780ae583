//! Turn history construction.
//!
//! Every conversation sent to the provider starts with a fixed priming
//! exchange that sets the assistant's behavioural contract, followed by the
//! caller's prior turns translated into the provider's role vocabulary.

use pulse_core::{ProviderRole, ProviderTurn, Turn};

/// Instruction turn, sent with the provider's `user` role.
pub const PRIMING_INSTRUCTION: &str = "Você é o Pulse, assistente comercial da empresa. \
Responda sempre em português, de forma objetiva e cordial. \
Baseie-se apenas nos dados de contexto fornecidos na primeira mensagem da conversa; \
quando um dado não estiver disponível, diga isso claramente e não invente números, \
nomes ou valores.";

/// Fixed acknowledgment, sent with the provider's `model` role.
pub const PRIMING_ACKNOWLEDGMENT: &str =
    "Entendido. Vou responder em português usando apenas os dados fornecidos.";

/// Number of synthetic turns prepended to every history.
pub const PRIMING_TURNS: usize = 2;

/// Map an external role label to the provider vocabulary.
///
/// Only `"assistant"` maps to the model; every other label is a user turn.
pub fn provider_role(turn: &Turn) -> ProviderRole {
    if turn.is_assistant() {
        ProviderRole::Model
    } else {
        ProviderRole::User
    }
}

/// Build the provider history for `prior` turns.
///
/// Always yields `2 + prior.len()` turns. Caller turns keep their order and
/// text; nothing is filtered or merged.
pub fn build_history(prior: &[Turn]) -> Vec<ProviderTurn> {
    let mut history = Vec::with_capacity(PRIMING_TURNS + prior.len());
    history.push(ProviderTurn::new(ProviderRole::User, PRIMING_INSTRUCTION));
    history.push(ProviderTurn::new(ProviderRole::Model, PRIMING_ACKNOWLEDGMENT));
    history.extend(
        prior
            .iter()
            .map(|turn| ProviderTurn::new(provider_role(turn), turn.content.clone())),
    );
    history
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_history_has_only_priming() {
        let history = build_history(&[]);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ProviderRole::User);
        assert_eq!(history[0].text, PRIMING_INSTRUCTION);
        assert_eq!(history[1].role, ProviderRole::Model);
        assert_eq!(history[1].text, PRIMING_ACKNOWLEDGMENT);
    }

    #[test]
    fn test_role_mapping_and_order() {
        let prior = vec![
            Turn::user("quantos leads tenho?"),
            Turn::assistant("Você tem 3 leads."),
            Turn {
                role: "system".to_string(),
                content: "x".to_string(),
            },
            Turn {
                role: "Assistant".to_string(),
                content: "y".to_string(),
            },
        ];
        let history = build_history(&prior);

        assert_eq!(history.len(), 2 + prior.len());
        let roles: Vec<ProviderRole> = history[2..].iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![
                ProviderRole::User,
                ProviderRole::Model,
                ProviderRole::User,
                ProviderRole::User,
            ]
        );
        let texts: Vec<&str> = history[2..].iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["quantos leads tenho?", "Você tem 3 leads.", "x", "y"]);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let prior = vec![Turn::user("oi"), Turn::user("oi")];
        let history = build_history(&prior);
        assert_eq!(history.len(), 4);
        assert_eq!(history[2], history[3]);
    }

    #[test]
    fn test_caller_turns_are_not_mutated() {
        let prior = vec![Turn::assistant("  espaços  ")];
        let snapshot = prior.clone();
        let history = build_history(&prior);
        assert_eq!(prior, snapshot);
        assert_eq!(history[2].text, "  espaços  ");
    }
}
