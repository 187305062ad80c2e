use serde::{Deserialize, Serialize};

use crate::actions::types::{hints, ActionResult, ActionStatus, Payload};
use crate::kernel::utterance::Modality;

pub const DEFAULT_LOCALE: &str = "en-US";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    Prompt,
    Clarification,
    Confirmation,
    Success,
    Declined,
    Unsupported,
    Failure,
    Apology,
}

/// Terminal artifact of a turn. Exactly one per turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub session_id: String,
    pub text: String,
    pub speak: bool,
    pub ended_session: bool,
    pub kind: ResponseKind,
    /// Action payload on success; empty otherwise.
    #[serde(default)]
    pub payload: Payload,
}

/// Structured result of a turn, before wording.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    PromptForInput,
    MissingSlot {
        description: String,
        slot: String,
        prompt: Option<String>,
    },
    /// Low confidence. `None` when we cannot even name a guess.
    Disambiguate { description: Option<String> },
    Confirm { description: String, reprompt: bool },
    Declined,
    Completed {
        description: String,
        result: ActionResult,
        ends_session: bool,
    },
    /// The turn itself failed (store or classifier down).
    Apology,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lang {
    En,
    Es,
}

impl Lang {
    fn from_locale(locale: &str) -> Self {
        let primary = locale.split(&['-', '_'][..]).next().unwrap_or_default();
        match primary.to_ascii_lowercase().as_str() {
            "es" => Lang::Es,
            _ => Lang::En,
        }
    }
}

/// Deterministic mapping from outcomes to user-facing text. Failure wording is
/// apologetic and non-technical; internal hints stay in the logs.
#[derive(Debug, Clone, Default)]
pub struct ResponseComposer;

impl ResponseComposer {
    pub fn new() -> Self {
        Self
    }

    pub fn compose(&self, outcome: &Outcome, locale: &str, session_id: &str, modality: Modality) -> Response {
        let lang = Lang::from_locale(locale);
        let mut payload = Payload::new();
        let mut ended_session = false;

        let (kind, text) = match outcome {
            Outcome::PromptForInput => (ResponseKind::Prompt, prompt_for_input(lang)),
            Outcome::MissingSlot { description, slot, prompt } => {
                let text = match prompt {
                    Some(p) => p.clone(),
                    None => ask_slot(lang, &slot.replace('_', " "), description),
                };
                (ResponseKind::Clarification, text)
            }
            Outcome::Disambiguate { description } => (ResponseKind::Clarification, disambiguate(lang, description.as_deref())),
            Outcome::Confirm { description, reprompt } => (ResponseKind::Confirmation, confirm(lang, description, *reprompt)),
            Outcome::Declined => (ResponseKind::Declined, declined(lang)),
            Outcome::Completed {
                description,
                result,
                ends_session,
            } => match result.status {
                ActionStatus::Ok => {
                    payload = result.payload.clone();
                    ended_session = *ends_session;
                    let text = match result.payload.get("summary").and_then(|v| v.as_str()) {
                        Some(summary) => summary.to_string(),
                        None if *ends_session => farewell(lang),
                        None => done(lang, description),
                    };
                    (ResponseKind::Success, text)
                }
                ActionStatus::NeedsConfirmation => (ResponseKind::Confirmation, confirm(lang, description, false)),
                ActionStatus::Failed => match result.message_hint.as_deref() {
                    Some(hints::UNSUPPORTED_INTENT) => (ResponseKind::Unsupported, unsupported(lang)),
                    Some(hints::PERMISSION_DENIED) => (ResponseKind::Failure, not_allowed(lang)),
                    Some(hints::HANDLER_TIMEOUT) => (ResponseKind::Failure, too_slow(lang)),
                    _ => (ResponseKind::Failure, went_wrong(lang, description)),
                },
            },
            Outcome::Apology => (ResponseKind::Apology, apology(lang)),
        };

        Response {
            session_id: session_id.to_string(),
            text,
            speak: modality == Modality::Voice,
            ended_session,
            kind,
            payload,
        }
    }
}

fn prompt_for_input(lang: Lang) -> String {
    match lang {
        Lang::En => "I'm listening. What would you like me to do?".to_string(),
        Lang::Es => "Te escucho. ¿Qué quieres que haga?".to_string(),
    }
}

fn ask_slot(lang: Lang, slot: &str, description: &str) -> String {
    match lang {
        Lang::En => format!("What {} should I use to {}?", slot, description),
        Lang::Es => format!("¿Qué {} debo usar para {}?", slot, description),
    }
}

fn disambiguate(lang: Lang, description: Option<&str>) -> String {
    match (lang, description) {
        (Lang::En, Some(d)) => format!("Sorry, did you want me to {}?", d),
        (Lang::En, None) => "Sorry, I didn't catch that. Could you say it another way?".to_string(),
        (Lang::Es, Some(d)) => format!("Perdona, ¿querías que {}?", d),
        (Lang::Es, None) => "Perdona, no te he entendido. ¿Puedes decirlo de otra forma?".to_string(),
    }
}

fn confirm(lang: Lang, description: &str, reprompt: bool) -> String {
    match (lang, reprompt) {
        (Lang::En, false) => format!("Just to confirm, should I {}?", description),
        (Lang::En, true) => format!("Please answer yes or no: should I {}?", description),
        (Lang::Es, false) => format!("Para confirmar, ¿debo {}?", description),
        (Lang::Es, true) => format!("Responde sí o no: ¿debo {}?", description),
    }
}

fn declined(lang: Lang) -> String {
    match lang {
        Lang::En => "Okay, I won't do that.".to_string(),
        Lang::Es => "De acuerdo, no lo haré.".to_string(),
    }
}

fn done(lang: Lang, description: &str) -> String {
    match lang {
        Lang::En => format!("Done: {}.", description),
        Lang::Es => format!("Hecho: {}.", description),
    }
}

fn farewell(lang: Lang) -> String {
    match lang {
        Lang::En => "Goodbye.".to_string(),
        Lang::Es => "Hasta luego.".to_string(),
    }
}

fn unsupported(lang: Lang) -> String {
    match lang {
        Lang::En => "Sorry, I can't do that yet.".to_string(),
        Lang::Es => "Lo siento, todavía no sé hacer eso.".to_string(),
    }
}

fn not_allowed(lang: Lang) -> String {
    match lang {
        Lang::En => "Sorry, I'm not allowed to do that here.".to_string(),
        Lang::Es => "Lo siento, aquí no tengo permiso para hacer eso.".to_string(),
    }
}

fn too_slow(lang: Lang) -> String {
    match lang {
        Lang::En => "Sorry, that's taking too long. Please try again in a moment.".to_string(),
        Lang::Es => "Lo siento, está tardando demasiado. Inténtalo de nuevo en un momento.".to_string(),
    }
}

fn went_wrong(lang: Lang, description: &str) -> String {
    match lang {
        Lang::En => format!("Sorry, something went wrong while trying to {}.", description),
        Lang::Es => format!("Lo siento, algo salió mal al intentar {}.", description),
    }
}

fn apology(lang: Lang) -> String {
    match lang {
        Lang::En => "Sorry, I ran into a problem. Please try again.".to_string(),
        Lang::Es => "Lo siento, he tenido un problema. Inténtalo de nuevo.".to_string(),
    }
}
