//! Per-step validation gates.

use super::{draft::DraftForm, Step};
use regex::Regex;

pub const CATEGORY_REQUIRED: &str = "Please choose a category or type your own.";
pub const EMAIL_INVALID: &str = "Please enter a valid email.";
pub const COMPANY_REQUIRED: &str = "Company is required";
pub const DESCRIPTION_REQUIRED: &str = "Please describe what you need.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// At least one selected category, or non-blank free text.
    RequiredSelectionOrText,
    Optional,
    RequiredText,
    EmailFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationError {
    pub step: Step,
    pub message: &'static str,
}

/// Email shape accepted by both the form and the server.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").is_ok_and(|re| re.is_match(email))
}

#[must_use]
pub const fn rule_for(step: Step) -> Rule {
    match step {
        Step::Category => Rule::RequiredSelectionOrText,
        Step::Email => Rule::EmailFormat,
        Step::Company | Step::Description => Rule::RequiredText,
        Step::Details | Step::AwaitingVerification | Step::Done => Rule::Optional,
    }
}

const fn message_for(step: Step) -> &'static str {
    match step {
        Step::Category => CATEGORY_REQUIRED,
        Step::Email => EMAIL_INVALID,
        Step::Company => COMPANY_REQUIRED,
        _ => DESCRIPTION_REQUIRED,
    }
}

/// Run the gate for `step` against the current draft.
///
/// # Errors
///
/// Returns the step-specific message when the draft does not satisfy the rule.
pub fn check(step: Step, form: &DraftForm) -> Result<(), ValidationError> {
    let ok = match rule_for(step) {
        Rule::Optional => true,
        Rule::RequiredSelectionOrText => {
            !form.selected_categories.is_empty() || !form.free_text.trim().is_empty()
        }
        Rule::RequiredText => {
            let value = if step == Step::Company {
                &form.company
            } else {
                &form.details
            };
            !value.trim().is_empty()
        }
        Rule::EmailFormat => valid_email(&form.email),
    };

    if ok {
        Ok(())
    } else {
        Err(ValidationError {
            step,
            message: message_for(step),
        })
    }
}
