//! Prefilled scenario prompts and the hand-off from picker to chat.
//!
//! Choosing a [`Scenario`] puts a [`PendingPrompt`] on the [`PromptDesk`].
//! The prompt editor may rewrite its text; a chat session then takes it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::error::{Error, Result};

/// A canned instructor task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Accessibility review of a Canvas page.
    Accessibility,
    /// Redesign of an assessment that AI can complete too easily.
    AiResilientAssessment,
    /// Rubric plus academic integrity statement.
    RubricIntegrity,
}

impl Scenario {
    /// Every scenario, in picker order.
    pub const ALL: [Scenario; 3] = [
        Scenario::Accessibility,
        Scenario::AiResilientAssessment,
        Scenario::RubricIntegrity,
    ];

    /// Short identifier used on the command line.
    pub fn id(self) -> &'static str {
        match self {
            Scenario::Accessibility => "accessibility",
            Scenario::AiResilientAssessment => "ai-resilient",
            Scenario::RubricIntegrity => "rubric",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Scenario::Accessibility => "Make a Canvas page accessible",
            Scenario::AiResilientAssessment => "Convert a quiz to AI-resilient assessment",
            Scenario::RubricIntegrity => "Build a rubric + integrity note",
        }
    }

    pub fn subtitle(self) -> &'static str {
        match self {
            Scenario::Accessibility => "Check headings, alt text, links, contrast, and structure.",
            Scenario::AiResilientAssessment => {
                "Shift toward authentic tasks, reasoning, and process evidence."
            }
            Scenario::RubricIntegrity => {
                "Create criteria, performance levels, and a student-facing integrity statement."
            }
        }
    }

    /// The prefilled prompt, ending where the instructor pastes their material.
    pub fn prompt(self) -> &'static str {
        match self {
            Scenario::Accessibility => {
                "I'm working on a Canvas page for COASTAL. Please help me improve accessibility and clarity.\n\
                 \n\
                 1) Provide an accessibility checklist.\n\
                 2) Identify issues with headings, links, alt text, contrast, and structure.\n\
                 3) Suggest Canvas-friendly corrections.\n\
                 \n\
                 Content (paste below):"
            }
            Scenario::AiResilientAssessment => {
                "I have a quiz or assessment that may be vulnerable to AI-assisted completion.\n\
                 \n\
                 1) Identify vulnerabilities.\n\
                 2) Propose an AI-resilient redesign emphasizing reasoning and authenticity.\n\
                 3) Include a student-facing integrity note.\n\
                 \n\
                 Assessment (paste below):"
            }
            Scenario::RubricIntegrity => {
                "Please create a rubric and an integrity note for this assignment.\n\
                 \n\
                 1) Rubric criteria with performance levels.\n\
                 2) Guidance for student success.\n\
                 3) Ethical AI use note.\n\
                 \n\
                 Assignment description (paste below):"
            }
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Scenario {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_lowercase();
        if let Ok(index) = needle.parse::<usize>() {
            if let Some(scenario) = index.checked_sub(1).and_then(|i| Scenario::ALL.get(i)) {
                return Ok(*scenario);
            }
        }
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.id() == needle)
            .ok_or_else(|| {
                Error::validation(
                    format!("unknown scenario: {}", s.trim()),
                    Some("scenario".to_string()),
                )
            })
    }
}

/// A prompt on its way from the scenario picker to a chat session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPrompt {
    pub scenario: Scenario,
    pub title: String,
    pub prompt: String,
}

impl From<Scenario> for PendingPrompt {
    fn from(scenario: Scenario) -> Self {
        Self {
            scenario,
            title: scenario.title().to_string(),
            prompt: scenario.prompt().to_string(),
        }
    }
}

/// Holds at most one [`PendingPrompt`]. Clones share the slot.
#[derive(Debug, Clone)]
pub struct PromptDesk {
    pending: Arc<watch::Sender<Option<PendingPrompt>>>,
}

impl PromptDesk {
    pub fn new() -> Self {
        let (pending, _) = watch::channel(None);
        Self {
            pending: Arc::new(pending),
        }
    }

    /// Replaces whatever is pending with `scenario`'s defaults.
    pub fn choose(&self, scenario: Scenario) -> PendingPrompt {
        let pending = PendingPrompt::from(scenario);
        self.pending.send_replace(Some(pending.clone()));
        pending
    }

    /// Rewrites the pending prompt text. Fails when nothing is pending.
    pub fn edit(&self, prompt: impl Into<String>) -> Result<()> {
        let prompt = prompt.into();
        let mut edited = false;
        self.pending.send_if_modified(|pending| match pending {
            Some(pending) => {
                pending.prompt = prompt;
                edited = true;
                true
            }
            None => false,
        });
        if edited {
            Ok(())
        } else {
            Err(Error::validation(
                "no scenario selected",
                Some("prompt".to_string()),
            ))
        }
    }

    pub fn pending(&self) -> Option<PendingPrompt> {
        self.pending.borrow().clone()
    }

    /// Removes and returns the pending prompt.
    pub fn take(&self) -> Option<PendingPrompt> {
        let mut taken = None;
        self.pending.send_if_modified(|pending| {
            taken = pending.take();
            taken.is_some()
        });
        taken
    }

    pub fn clear(&self) {
        self.pending.send_replace(None);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PendingPrompt>> {
        self.pending.subscribe()
    }
}

impl Default for PromptDesk {
    fn default() -> Self {
        Self::new()
    }
}
