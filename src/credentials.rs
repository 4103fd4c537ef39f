//! API key gate.
//!
//! The pipeline refuses to start without a key, and a run that fails with a
//! rejected credential flips the gate closed until a key is selected again.

use std::io::{BufRead, Write};

use crate::gemini::{FALLBACK_API_KEY_ENV, GEMINI_API_KEY_ENV};

/// Errors raised while selecting a key.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("no API key was entered")]
    Empty,

    #[error("failed to read API key: {0}")]
    Io(#[from] std::io::Error),
}

/// Gate in front of every generation run.
pub trait CredentialGate {
    /// Whether a usable key is currently selected.
    fn has_key(&self) -> bool;

    /// The selected key, if the gate is open.
    fn api_key(&self) -> Option<String>;

    /// Ask for a (new) key and open the gate on success.
    fn request_key_selection(&mut self) -> Result<(), CredentialError>;

    /// Close the gate after the remote side rejected the key.
    fn invalidate(&mut self);
}

/// Key taken from the environment (after `.env` loading), with an
/// interactive prompt as the selection flow.
#[derive(Debug, Default)]
pub struct EnvCredentials {
    key: Option<String>,
    valid: bool,
}

impl EnvCredentials {
    /// Read `GEMINI_API_KEY`, falling back to `API_KEY`.
    pub fn from_env() -> Self {
        let key = std::env::var(GEMINI_API_KEY_ENV)
            .or_else(|_| std::env::var(FALLBACK_API_KEY_ENV))
            .ok()
            .filter(|k| !k.trim().is_empty());
        Self::with_key(key)
    }

    pub fn with_key(key: Option<String>) -> Self {
        let valid = key.is_some();
        Self { key, valid }
    }

    /// Read a key from `input`, prompting on `output`.
    pub fn select_from(
        &mut self,
        input: &mut impl BufRead,
        output: &mut impl Write,
    ) -> Result<(), CredentialError> {
        write!(output, "Enter your Gemini API key: ")?;
        output.flush()?;

        let mut line = String::new();
        input.read_line(&mut line)?;
        let key = line.trim();
        if key.is_empty() {
            return Err(CredentialError::Empty);
        }

        self.key = Some(key.to_string());
        self.valid = true;
        log::info!("API key selected");
        Ok(())
    }
}

impl CredentialGate for EnvCredentials {
    fn has_key(&self) -> bool {
        self.valid && self.key.is_some()
    }

    fn api_key(&self) -> Option<String> {
        if self.has_key() {
            self.key.clone()
        } else {
            None
        }
    }

    fn request_key_selection(&mut self) -> Result<(), CredentialError> {
        let stdin = std::io::stdin();
        let mut input = stdin.lock();
        let mut output = std::io::stderr();
        self.select_from(&mut input, &mut output)
    }

    fn invalidate(&mut self) {
        log::warn!("API key rejected; a new key must be selected");
        self.valid = false;
    }
}
