//! Player-facing messages.

use ahash::AHashMap;
use once_cell::sync::Lazy;

/// A message id plus the arguments substituted into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationContainer {
    pub message_id: &'static str,
    pub params: Vec<String>,
}

impl TranslationContainer {
    pub fn new(message_id: &'static str) -> Self {
        Self {
            message_id,
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.params.push(param.into());
        self
    }
}

/// Formats messages shown to players.
pub trait Translator: Send + Sync {
    fn translate(&self, message: &TranslationContainer) -> String;
}

static MESSAGES: Lazy<AHashMap<&'static str, &'static str>> = Lazy::new(|| {
    AHashMap::from_iter([
        ("transfer.failed", "§cCould not connect to {0}: {1}"),
        ("transfer.outdated_client", "§cCould not connect to {0}: your client is outdated"),
        ("transfer.outdated_server", "§cCould not connect to {0}: the server is outdated"),
        ("transfer.server_full", "§cCould not connect to {0}: the server is full"),
        ("transfer.rejected", "§cCould not connect to {0}: login was rejected"),
        ("transfer.encryption_failed", "§cCould not connect to {0}: encryption handshake failed"),
        ("transfer.timed_out", "§cCould not connect to {0}: timed out"),
        ("transfer.already_connected", "§cYou are already connected to {0}"),
        ("transfer.in_progress", "§cA transfer is already in progress"),
        ("command.server.unknown", "§cUnknown server {0}"),
        ("command.server.usage", "§eUsage: /server <name>. Servers: {0}"),
    ])
});

/// Translator backed by the built-in English messages.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultTranslator;

impl Translator for DefaultTranslator {
    fn translate(&self, message: &TranslationContainer) -> String {
        let Some(template) = MESSAGES.get(message.message_id) else {
            return if message.params.is_empty() {
                message.message_id.to_owned()
            } else {
                format!("{} [{}]", message.message_id, message.params.join(", "))
            };
        };

        message
            .params
            .iter()
            .enumerate()
            .fold((*template).to_owned(), |text, (i, param)| {
                text.replace(&format!("{{{i}}}"), param)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_positional_params() {
        let message = TranslationContainer::new("transfer.failed")
            .with_param("survival")
            .with_param("Server closed");
        assert_eq!(
            DefaultTranslator.translate(&message),
            "§cCould not connect to survival: Server closed"
        );
    }

    #[test]
    fn unknown_ids_fall_back_to_the_id() {
        let message = TranslationContainer::new("custom.message").with_param("x");
        assert_eq!(DefaultTranslator.translate(&message), "custom.message [x]");
    }
}
