//! Domain events published by the service

use event_bus::{Category, Event};
use update_ingestion::Update;

/// Everything that came in from the update endpoint
pub const INBOUND: Category = Category::new("inbound");

/// Outcome of the per-chat admission check
pub const ADMISSION: Category = Category::new("admission");

/// An update delivered by the ingestion session
#[derive(Debug, Clone)]
pub struct UpdateReceived {
    pub update: Update,
}

impl Event for UpdateReceived {
    const CATEGORIES: &'static [Category] = &[INBOUND];
}

/// An update that passed the per-chat rate limit
#[derive(Debug, Clone)]
pub struct UpdateAdmitted {
    pub update: Update,
    pub chat_id: i64,
}

impl UpdateAdmitted {
    /// Bot command carried by a message, e.g. `start` for `/start@my_bot arg`
    pub fn command(&self) -> Option<&str> {
        let text = self.update.text()?.strip_prefix('/')?;
        let command = text.split_whitespace().next()?;
        let command = command.split('@').next().unwrap_or(command);
        (!command.is_empty()).then_some(command)
    }
}

impl Event for UpdateAdmitted {
    const CATEGORIES: &'static [Category] = &[ADMISSION];
}

/// An update rejected by the per-chat rate limit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateThrottled {
    pub update_id: i64,
    pub chat_id: i64,
}

impl Event for UpdateThrottled {
    const CATEGORIES: &'static [Category] = &[ADMISSION];
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn admitted(text: &str) -> UpdateAdmitted {
        UpdateAdmitted {
            update: Update::new(1, json!({"message": {"chat": {"id": 5}, "text": text}})),
            chat_id: 5,
        }
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!(admitted("/start").command(), Some("start"));
        assert_eq!(admitted("/help@my_bot now").command(), Some("help"));
        assert_eq!(admitted("hello").command(), None);
        assert_eq!(admitted("/").command(), None);
    }
}
