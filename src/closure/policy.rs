use serde::{Deserialize, Serialize};

use crate::api::ClosureRegistration;
use crate::error::Error;

use super::ClosureAction;

/// What the insight service answers for a user's first dismissal of a
/// campaign.
pub const FIRST_CLOSURE_ACTION: &str = "RECORDED_FIRST_CLOSURE";

pub const GENERIC_CONFIRMATION: &str = "Thanks, we've noted your choice.";

/// Which of the two dismissal prompts is shown.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING-KEBAB-CASE")]
pub enum PromptLevel {
    /// Offers "show later" or "don't show this campaign again".
    FirstLevel,
    /// Offers "close but keep showing campaigns" or "stop all campaigns".
    Global,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ClosureDecision {
    HideFirstClosure,
    Prompt(PromptLevel),
}

/// Decides what follows a dismissal from the service's answer to the
/// closure registration. Anything unexpected, including no answer at
/// all, gets the first-level prompt.
pub fn decide(registration: Option<&ClosureRegistration>) -> ClosureDecision {
    let registration = match registration {
        Some(registration) => registration,
        None => return ClosureDecision::Prompt(PromptLevel::FirstLevel),
    };

    if registration.closure_count == 1 && registration.action == FIRST_CLOSURE_ACTION {
        return ClosureDecision::HideFirstClosure;
    }

    if (registration.closure_count >= 2 || registration.requires_user_input)
        && registration.is_global_prompt
    {
        return ClosureDecision::Prompt(PromptLevel::Global);
    }

    ClosureDecision::Prompt(PromptLevel::FirstLevel)
}

#[derive(Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING-KEBAB-CASE")]
pub enum PromptChoice {
    CloseShowLater,
    DontShowAgain { reason: String },
    StopAllCampaigns { reason: String },
}

impl PromptChoice {
    fn reason(&self) -> &str {
        match self {
            PromptChoice::CloseShowLater => "",
            PromptChoice::DontShowAgain { reason } => reason,
            PromptChoice::StopAllCampaigns { reason } => reason,
        }
    }
}

/// Where a committed prompt choice leads.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClosureOutcome {
    pub action: ClosureAction,
    pub wants_to_see: bool,
    pub is_global_response: bool,
    pub reason: String,
    pub confirmation: &'static str,
}

pub fn resolve_choice(
    campaign_id: &str,
    prompt: PromptLevel,
    choice: &PromptChoice,
) -> Result<ClosureOutcome, Error> {
    let (action, wants_to_see, confirmation) = match (prompt, choice) {
        (PromptLevel::FirstLevel, PromptChoice::CloseShowLater) => (
            ClosureAction::TemporaryCloseSession,
            true,
            "Closed for now. We may show this to you again later.",
        ),
        (PromptLevel::FirstLevel, PromptChoice::DontShowAgain { .. }) => (
            ClosureAction::PermanentBlock,
            false,
            "You won't see this campaign again.",
        ),
        (PromptLevel::Global, PromptChoice::CloseShowLater) => (
            ClosureAction::TemporaryCloseSession,
            true,
            "Closed. You'll keep seeing future campaigns.",
        ),
        (PromptLevel::Global, PromptChoice::StopAllCampaigns { .. }) => (
            ClosureAction::GlobalOptOut,
            false,
            "You won't see any more campaigns.",
        ),
        (prompt, choice) => {
            return Err(Error::ChoiceNotOffered {
                campaign_id: campaign_id.to_owned(),
                prompt,
                choice: choice.clone(),
            })
        }
    };

    let reason = choice.reason().trim();
    if !wants_to_see && reason.is_empty() {
        return Err(Error::ReasonRequired {
            campaign_id: campaign_id.to_owned(),
        });
    }

    Ok(ClosureOutcome {
        action,
        wants_to_see,
        is_global_response: prompt == PromptLevel::Global,
        reason: reason.to_owned(),
        confirmation,
    })
}
