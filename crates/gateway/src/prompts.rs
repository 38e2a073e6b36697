//! One-shot interactive prompts bound to the member that opened them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rostergate_core::domain::verification::UserId;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::events::InteractionRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Email,
    Code,
}

impl PromptKind {
    pub fn action_id(self) -> &'static str {
        match self {
            Self::Email => "verify-email",
            Self::Code => "verify-code",
        }
    }

    pub fn modal_id(self) -> &'static str {
        match self {
            Self::Email => "email_modal",
            Self::Code => "code_modal",
        }
    }

    pub fn input_id(self) -> &'static str {
        match self {
            Self::Email => "email_input",
            Self::Code => "code_input",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Email => "Verify Email",
            Self::Code => "Verify Code",
        }
    }

    pub fn from_action_id(action_id: &str) -> Option<Self> {
        [Self::Email, Self::Code].into_iter().find(|kind| kind.action_id() == action_id)
    }

    pub fn modal_custom_id(self, prompt_id: &str) -> String {
        format!("{}:{prompt_id}", self.modal_id())
    }

    /// Splits `<modal_id>:<prompt_id>` back into its parts.
    pub fn parse_modal_custom_id(custom_id: &str) -> Option<(Self, &str)> {
        let (modal_id, prompt_id) = custom_id.split_once(':')?;
        let kind = [Self::Email, Self::Code].into_iter().find(|kind| kind.modal_id() == modal_id)?;
        (!prompt_id.is_empty()).then_some((kind, prompt_id))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PromptSubmission {
    pub value: String,
    pub interaction: InteractionRef,
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PromptResolution {
    Submitted(PromptSubmission),
    TimedOut,
    /// A newer prompt of the same kind replaced this one.
    Superseded,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PromptError {
    #[error("prompt `{0}` is no longer pending")]
    NotPending(String),
    #[error("prompt `{prompt_id}` belongs to another member")]
    ForeignUser { prompt_id: String },
}

struct Slot {
    prompt_id: String,
    sender: oneshot::Sender<PromptSubmission>,
}

type Slots = Arc<Mutex<HashMap<(UserId, PromptKind), Slot>>>;

fn lock(slots: &Slots) -> MutexGuard<'_, HashMap<(UserId, PromptKind), Slot>> {
    match slots.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// At most one live prompt per `(member, kind)`.
#[derive(Clone, Default)]
pub struct PromptRegistry {
    slots: Slots,
}

impl PromptRegistry {
    /// Opens a prompt, replacing any live one for the same member and kind.
    pub fn open(&self, user_id: &UserId, kind: PromptKind) -> PendingPrompt {
        let prompt_id = Uuid::new_v4().to_string();
        let (sender, receiver) = oneshot::channel();

        lock(&self.slots)
            .insert((user_id.clone(), kind), Slot { prompt_id: prompt_id.clone(), sender });

        PendingPrompt {
            id: prompt_id,
            user_id: user_id.clone(),
            kind,
            receiver,
            slots: self.slots.clone(),
        }
    }

    pub fn submit(
        &self,
        prompt_id: &str,
        submitted_by: &UserId,
        submission: PromptSubmission,
    ) -> Result<(), PromptError> {
        let mut slots = lock(&self.slots);
        let Some(key) = slots
            .iter()
            .find(|(_, slot)| slot.prompt_id == prompt_id)
            .map(|(key, _)| key.clone())
        else {
            return Err(PromptError::NotPending(prompt_id.to_owned()));
        };

        if &key.0 != submitted_by {
            return Err(PromptError::ForeignUser { prompt_id: prompt_id.to_owned() });
        }

        let Some(slot) = slots.remove(&key) else {
            return Err(PromptError::NotPending(prompt_id.to_owned()));
        };
        slot.sender.send(submission).map_err(|_| PromptError::NotPending(prompt_id.to_owned()))
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.slots).len()
    }
}

pub struct PendingPrompt {
    pub id: String,
    pub user_id: UserId,
    pub kind: PromptKind,
    receiver: oneshot::Receiver<PromptSubmission>,
    slots: Slots,
}

impl PendingPrompt {
    pub async fn wait(mut self, timeout: Duration) -> PromptResolution {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(submission)) => PromptResolution::Submitted(submission),
            Ok(Err(_)) => PromptResolution::Superseded,
            Err(_) => {
                self.release();
                PromptResolution::TimedOut
            }
        }
    }

    /// Withdraws the prompt, e.g. when its modal could not be shown.
    pub fn cancel(self) {
        self.release();
    }

    fn release(&self) {
        let mut slots = lock(&self.slots);
        let key = (self.user_id.clone(), self.kind);
        if slots.get(&key).is_some_and(|slot| slot.prompt_id == self.id) {
            slots.remove(&key);
        }
    }
}
