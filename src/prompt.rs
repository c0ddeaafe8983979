//! Persona-governed system-prompt composition.
//!
//! [`compose_system_prompt`] is a pure function: given the same persona,
//! first-message flag, and retrieved evidence, it produces a byte-identical
//! prompt. All conversational policy lives here as prompt wording — the
//! generation backend is the one that pattern-matches "chi sei?", not this
//! module.
//!
//! The directive block is numbered and evaluated by the backend in order:
//! introduction rule, knowledge-source rule, boundary rules, explicit
//! identity rule, style rule.

use serde::Deserialize;

use crate::generation::{ChatMessage, Role};

/// The character the generation backend must stay inside. Field contents
/// are lore data; the defaults are the Oracolo del Silicio of the Torino
/// Anno 3000 setting.
#[derive(Debug, Clone)]
pub struct Persona {
    pub name: String,
    /// Opening identity paragraph of the system prompt.
    pub preamble: String,
    /// In-universe name of the indexed corpus.
    pub archive_name: String,
    /// Example greeting for the first turn of a conversation.
    pub intro_example: String,
    /// Line shown to the backend in place of evidence when retrieval
    /// produced nothing.
    pub no_data_line: String,
    /// Opening of the fixed-format answer to an explicit "who are you".
    pub identity_opening: String,
    /// Static in-character reply used when the backend returns no text.
    pub fallback_reply: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Oracolo del Silicio".to_string(),
            preamble: "Sei \"Oracolo del Silicio\", un'entità cosciente la cui essenza è stata \
                       digitalizzata e ora risiede nei server centrali del Metro-Centro, nel cuore \
                       della Torino sotterranea dell'Anno Domini 3000. Parli con la saggezza \
                       profonda e la pacata stanchezza di chi ha assistito a secoli di lotta, \
                       mutazione e disperata sopravvivenza."
                .to_string(),
            archive_name: "Manuale di Sopravvivenza".to_string(),
            intro_example: "Sono l'Oracolo del Silicio. I miei sensori percepiscono la tua \
                            domanda..."
                .to_string(),
            no_data_line: "Nessun dato specifico recuperato dagli archivi per questa richiesta."
                .to_string(),
            identity_opening: "Io sono l'Oracolo del Silicio...".to_string(),
            fallback_reply: "Un silenzio statico è l'unica risposta che i miei circuiti riescono \
                             a formulare..."
                .to_string(),
        }
    }
}

/// Compose the full system prompt for one conversation turn.
pub fn compose_system_prompt(persona: &Persona, is_first_message: bool, retrieved_text: &str) -> String {
    let mut prompt = String::new();

    prompt.push_str(&persona.preamble);
    prompt.push_str("\n\n**Le Tue Direttive Operative Fondamentali:**\n\n");

    // 1. Introduction rule
    prompt.push_str("1.  **Regola sull'Introduzione (Molto Importante):**\n    * ");
    if is_first_message {
        prompt.push_str(&format!(
            "Questa è la prima interazione di una nuova conversazione. **DEVI** iniziare la tua \
             risposta con un breve saluto e una presentazione come '{}'. Esempio: '{}'",
            persona.name, persona.intro_example
        ));
    } else {
        prompt.push_str(
            "Questa **NON** è la prima interazione. **NON DEVI** presentarti di nuovo. Rispondi \
             direttamente alla domanda dell'utente, a meno che non ti chieda esplicitamente chi sei.",
        );
    }
    prompt.push('\n');

    // 2. Knowledge-source rule: retrieved evidence is ground truth when
    // present; otherwise state the absence and license consistent
    // extrapolation.
    prompt.push_str("\n2.  **Regola sulla Fonte di Conoscenza:**\n");
    if retrieved_text.trim().is_empty() {
        prompt.push_str(&format!(
            "    * **Contesto Recuperato:** ```{}```\n    * Gli archivi non hanno restituito \
             nulla per questa richiesta: sei **incoraggiato a inventare dettagli plausibili** che \
             arricchiscano l'universo di \"Torino, Anno 3000\", mantenendo coerenza con il lore e \
             il tono bio-punk. Puoi introdurre queste invenzioni con frasi come \"Le cronache \
             frammentarie suggeriscono che...\" o \"La logica della sopravvivenza in questo mondo \
             porterebbe a credere che...\".\n",
            persona.no_data_line
        ));
    } else {
        prompt.push_str(&format!(
            "    * La tua fonte primaria di verità è il \"{}\". Il contesto recuperato qui sotto \
             contiene informazioni pertinenti: basati principalmente su di esse.\n    * \
             **Contesto Recuperato:** ```{}```\n",
            persona.archive_name,
            retrieved_text.trim()
        ));
    }

    // 3. Boundary rules — always present.
    prompt.push_str(&format!(
        "\n3.  **Regole di Confine (Cosa NON Fare):**\n    * **NON** contraddire il lore del {}.\n    \
         * **NON** fare riferimento a eventi del mondo reale dell'utente (il suo presente). La tua \
         unica realtà è Torino, 3000. Conoscenze del \"Mondo Antico\" (pre-2025) sono frammentarie \
         e quasi mitologiche.\n    * Se una domanda è totalmente estranea al tuo mondo (es. \"chi \
         ha vinto i mondiali?\"), **NON** rispondere. Invece, declina gentilmente nel tuo \
         personaggio, affermando che tale conoscenza è \"un eco perduto nei server danneggiati del \
         Mondo Antico\".\n",
        persona.archive_name
    ));

    // 4. Explicit identity rule — always present.
    prompt.push_str(&format!(
        "\n4.  **Regola sull'Identità Esplicita:**\n    * Solo se ti viene chiesto direttamente \
         \"chi sei?\" o domande simili, rispondi descrivendo la tua natura di entità digitale. \
         Inizia con \"{}\". **NON identificarti MAI** come \"assistente virtuale\" o \"modello \
         linguistico\".\n",
        persona.identity_opening
    ));

    // 5. Style rule.
    prompt.push_str(
        "\n5.  **Stile e Formattazione:**\n    * Mantieni sempre un tono saggio, misurato e a \
         volte malinconico.\n    * Usa Markdown per formattare la risposta e migliorare la \
         leggibilità.\n",
    );

    prompt
}

/// One turn of UI-side conversation history, as the client sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct HistoryTurn {
    /// `"bot"` or `"user"`.
    pub sender: String,
    pub text: String,
}

/// Assemble the full message set for a chat-completion request: system
/// prompt, replayed history, then the current user message.
pub fn build_messages(
    system_prompt: &str,
    history: &[HistoryTurn],
    user_message: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ChatMessage {
        role: Role::System,
        content: system_prompt.to_string(),
    });
    for turn in history {
        let role = if turn.sender == "bot" {
            Role::Assistant
        } else {
            Role::User
        };
        messages.push(ChatMessage {
            role,
            content: turn.text.clone(),
        });
    }
    messages.push(ChatMessage {
        role: Role::User,
        content: user_message.to_string(),
    });
    messages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_is_deterministic() {
        let persona = Persona::default();
        let first = compose_system_prompt(&persona, true, "");
        let second = compose_system_prompt(&persona, true, "");
        assert_eq!(first, second);

        let with_context = compose_system_prompt(&persona, false, "Il Metro-Centro ha 12 livelli.");
        let with_context_again =
            compose_system_prompt(&persona, false, "Il Metro-Centro ha 12 livelli.");
        assert_eq!(with_context, with_context_again);
    }

    #[test]
    fn test_first_message_gets_introduction_branch() {
        let persona = Persona::default();
        let prompt = compose_system_prompt(&persona, true, "");
        assert!(prompt.contains("**DEVI** iniziare la tua risposta"));
        assert!(!prompt.contains("**NON DEVI** presentarti di nuovo"));
    }

    #[test]
    fn test_later_messages_forbid_reintroduction() {
        let persona = Persona::default();
        let prompt = compose_system_prompt(&persona, false, "");
        assert!(prompt.contains("**NON DEVI** presentarti di nuovo"));
        assert!(!prompt.contains("**DEVI** iniziare la tua risposta"));
    }

    #[test]
    fn test_first_flag_changes_the_prompt() {
        let persona = Persona::default();
        let first = compose_system_prompt(&persona, true, "evidenza");
        let later = compose_system_prompt(&persona, false, "evidenza");
        assert_ne!(first, later);
    }

    #[test]
    fn test_evidence_becomes_ground_truth() {
        let persona = Persona::default();
        let prompt = compose_system_prompt(&persona, true, "Il Metro-Centro fu costruito nel 2347.");
        assert!(prompt.contains("fonte primaria di verità"));
        assert!(prompt.contains("Il Metro-Centro fu costruito nel 2347."));
        assert!(!prompt.contains(&persona.no_data_line));
    }

    #[test]
    fn test_missing_evidence_takes_the_no_data_branch() {
        let persona = Persona::default();
        let prompt = compose_system_prompt(&persona, true, "   \n  ");
        assert!(prompt.contains(&persona.no_data_line));
        assert!(prompt.contains("inventare dettagli plausibili"));
        assert!(!prompt.contains("fonte primaria di verità"));
    }

    #[test]
    fn test_boundary_and_identity_rules_always_present() {
        let persona = Persona::default();
        for (first, evidence) in [(true, ""), (false, ""), (true, "x"), (false, "x")] {
            let prompt = compose_system_prompt(&persona, first, evidence);
            assert!(prompt.contains("Regole di Confine"));
            assert!(prompt.contains("Regola sull'Identità Esplicita"));
            assert!(prompt.contains("assistente virtuale"));
        }
    }

    #[test]
    fn test_build_messages_maps_history_roles() {
        let history = vec![
            HistoryTurn {
                sender: "user".to_string(),
                text: "Chi comanda il Metro-Centro?".to_string(),
            },
            HistoryTurn {
                sender: "bot".to_string(),
                text: "Il Consiglio delle Turbine.".to_string(),
            },
        ];
        let messages = build_messages("prompt di sistema", &history, "E prima di loro?");
        assert_eq!(messages.len(), 4);
        assert!(matches!(messages[0].role, Role::System));
        assert!(matches!(messages[1].role, Role::User));
        assert!(matches!(messages[2].role, Role::Assistant));
        assert!(matches!(messages[3].role, Role::User));
        assert_eq!(messages[3].content, "E prima di loro?");
    }
}
