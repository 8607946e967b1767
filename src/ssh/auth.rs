// ABOUTME: Builds the ordered credential chain tried for one connection attempt
// ABOUTME: Each candidate has a lazy availability check (prepare) and an execute step (authenticate)

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use russh::client::{Handle, Handler, KeyboardInteractiveAuthResponse};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::PrivateKey;

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::ssh::agent::SshAgent;
use crate::ssh::parser::HostRecord;
use crate::ssh::prompt::Prompter;

/// Conventional key file names, in the order they are offered.
pub const DEFAULT_KEY_NAMES: [&str; 4] = ["id_ed25519", "id_rsa", "id_ecdsa", "id_dsa"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthCandidate {
    IdentityFile(PathBuf),
    Agent(PathBuf),
    DefaultKey(PathBuf),
    Password,
    KeyboardInteractive,
}

impl fmt::Display for AuthCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthCandidate::IdentityFile(path) => write!(f, "identity file {}", path.display()),
            AuthCandidate::Agent(socket) => write!(f, "ssh-agent at {}", socket.display()),
            AuthCandidate::DefaultKey(path) => write!(f, "default key {}", path.display()),
            AuthCandidate::Password => write!(f, "password"),
            AuthCandidate::KeyboardInteractive => write!(f, "keyboard-interactive"),
        }
    }
}

/// A candidate that passed its availability check and is ready to offer to the server.
pub enum Credential {
    Key(Arc<PrivateKey>),
    Agent(SshAgent),
    Password,
    KeyboardInteractive,
}

pub struct AuthChainBuilder {
    key_dir: PathBuf,
    agent_socket: Option<PathBuf>,
    diag: Diagnostics,
}

impl AuthChainBuilder {
    pub fn new(key_dir: PathBuf, agent_socket: Option<PathBuf>, diag: Diagnostics) -> Self {
        Self {
            key_dir,
            agent_socket,
            diag,
        }
    }

    /// Candidates in priority order. An explicit `IdentityFile` suppresses agent and
    /// default-key probing entirely.
    pub fn build(&self, host: &HostRecord) -> Vec<AuthCandidate> {
        let mut chain = Vec::new();

        match &host.identity_file {
            Some(path) => {
                self.diag
                    .debug(&format!("IdentityFile from config: {}", path.display()));
                chain.push(AuthCandidate::IdentityFile(path.clone()));
            }
            None => {
                if let Some(socket) = &self.agent_socket {
                    chain.push(AuthCandidate::Agent(socket.clone()));
                }

                for name in DEFAULT_KEY_NAMES {
                    let path = self.key_dir.join(name);
                    if path.is_file() {
                        chain.push(AuthCandidate::DefaultKey(path));
                    }
                }
            }
        }

        chain.push(AuthCandidate::Password);
        chain.push(AuthCandidate::KeyboardInteractive);
        chain
    }
}

impl AuthCandidate {
    /// Availability check. `None` means skip this candidate; it is never fatal.
    pub async fn prepare(&self, prompter: &dyn Prompter, diag: Diagnostics) -> Option<Credential> {
        match self {
            AuthCandidate::IdentityFile(path) | AuthCandidate::DefaultKey(path) => {
                load_key(path, prompter, diag).map(|key| Credential::Key(Arc::new(key)))
            }
            AuthCandidate::Agent(socket) => match SshAgent::connect(socket).await {
                Ok(agent) => {
                    diag.debug(&format!("SSH agent offers {} key(s)", agent.identity_count()));
                    Some(Credential::Agent(agent))
                }
                Err(e) => {
                    diag.debug(&format!("SSH agent unavailable at {}: {e}", socket.display()));
                    None
                }
            },
            AuthCandidate::Password => Some(Credential::Password),
            AuthCandidate::KeyboardInteractive => Some(Credential::KeyboardInteractive),
        }
    }
}

/// Reads and decodes a private key, asking once for a passphrase if the key is encrypted.
pub fn load_key(path: &Path, prompter: &dyn Prompter, diag: Diagnostics) -> Option<PrivateKey> {
    let data = match std::fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            diag.debug(&format!("Cannot read key {}: {e}", path.display()));
            return None;
        }
    };

    match russh::keys::decode_secret_key(&data, None) {
        Ok(key) => Some(key),
        Err(russh::keys::Error::KeyIsEncrypted) => {
            let prompt = format!("Enter passphrase for key '{}': ", path.display());
            let passphrase = match prompter.secret(&prompt) {
                Ok(passphrase) => passphrase,
                Err(e) => {
                    diag.debug(&format!("No passphrase for {}: {e}", path.display()));
                    return None;
                }
            };

            match russh::keys::decode_secret_key(&data, Some(&passphrase)) {
                Ok(key) => Some(key),
                Err(e) => {
                    diag.debug(&format!("Wrong passphrase for {}: {e}", path.display()));
                    None
                }
            }
        }
        Err(e) => {
            diag.debug(&format!("Failed to load key from {}: {e}", path.display()));
            None
        }
    }
}

impl Credential {
    /// Execute step. `Ok(false)` is a rejection; the caller moves on to the next candidate.
    pub async fn authenticate<H: Handler>(
        &mut self,
        handle: &mut Handle<H>,
        user: &str,
        prompter: &dyn Prompter,
        diag: Diagnostics,
    ) -> std::result::Result<bool, russh::Error> {
        match self {
            Credential::Key(key) => {
                let hash_alg = handle.best_supported_rsa_hash().await?.flatten();
                let key = PrivateKeyWithHashAlg::new(key.clone(), hash_alg);
                let result = handle.authenticate_publickey(user, key).await?;
                Ok(result.success())
            }
            Credential::Agent(agent) => agent.authenticate(handle, user, diag).await,
            Credential::Password => {
                let password = match prompter.secret("Password: ") {
                    Ok(password) => password,
                    Err(e) => {
                        diag.debug(&format!("Password prompt failed: {e}"));
                        return Ok(false);
                    }
                };
                let result = handle.authenticate_password(user, password).await?;
                Ok(result.success())
            }
            Credential::KeyboardInteractive => {
                keyboard_interactive(handle, user, prompter, diag).await
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Accepted,
    Rejected,
    /// The availability check failed; nothing was sent to the server.
    Unavailable,
    Failed(String),
}

/// Execute step for one candidate of the chain.
pub trait AuthAttempt {
    fn attempt(&mut self, candidate: &AuthCandidate) -> impl Future<Output = AttemptOutcome>;
}

/// Offers candidates in order until one is accepted. Every other outcome moves on.
pub async fn authenticate_chain<A: AuthAttempt>(
    chain: &[AuthCandidate],
    attempt: &mut A,
    user: &str,
    address: &str,
    diag: Diagnostics,
) -> Result<AuthCandidate> {
    for candidate in chain {
        diag.debug(&format!("Trying {candidate}"));

        match attempt.attempt(candidate).await {
            AttemptOutcome::Accepted => {
                diag.debug(&format!("Authenticated with {candidate}"));
                return Ok(candidate.clone());
            }
            AttemptOutcome::Rejected => diag.debug(&format!("Server rejected {candidate}")),
            AttemptOutcome::Unavailable => {
                diag.debug(&format!("Skipping {candidate}: not available"))
            }
            AttemptOutcome::Failed(e) => diag.debug(&format!("{candidate} failed: {e}")),
        }
    }

    Err(Error::AuthExhausted {
        user: user.to_string(),
        address: address.to_string(),
    })
}

/// Prepares each candidate lazily and offers it over a live connection.
pub struct ServerAttempt<'a, H: Handler> {
    pub handle: &'a mut Handle<H>,
    pub user: &'a str,
    pub prompter: &'a dyn Prompter,
    pub diag: Diagnostics,
}

impl<H: Handler> AuthAttempt for ServerAttempt<'_, H> {
    fn attempt(&mut self, candidate: &AuthCandidate) -> impl Future<Output = AttemptOutcome> {
        async move {
            let Some(mut credential) = candidate.prepare(self.prompter, self.diag).await else {
                return AttemptOutcome::Unavailable;
            };

            match credential
                .authenticate(&mut *self.handle, self.user, self.prompter, self.diag)
                .await
            {
                Ok(true) => AttemptOutcome::Accepted,
                Ok(false) => AttemptOutcome::Rejected,
                Err(e) => AttemptOutcome::Failed(e.to_string()),
            }
        }
    }
}

async fn keyboard_interactive<H: Handler>(
    handle: &mut Handle<H>,
    user: &str,
    prompter: &dyn Prompter,
    diag: Diagnostics,
) -> std::result::Result<bool, russh::Error> {
    let mut response = handle
        .authenticate_keyboard_interactive_start(user, None::<String>)
        .await?;

    loop {
        match response {
            KeyboardInteractiveAuthResponse::Success => return Ok(true),
            KeyboardInteractiveAuthResponse::Failure { .. } => return Ok(false),
            KeyboardInteractiveAuthResponse::InfoRequest {
                instructions,
                prompts,
                ..
            } => {
                diag.debug(&format!("Keyboard-interactive round with {} prompt(s)", prompts.len()));
                if !instructions.is_empty() {
                    prompter.notice(&instructions);
                }

                let answers = prompts
                    .iter()
                    .map(|p| answer_challenge(prompter, &p.prompt, p.echo))
                    .collect();

                response = handle
                    .authenticate_keyboard_interactive_respond(answers)
                    .await?;
            }
        }
    }
}

/// A prompt that cannot be read is answered with an empty string; the server decides.
fn answer_challenge(prompter: &dyn Prompter, question: &str, echo: bool) -> String {
    let answer = if echo {
        prompter.visible(question)
    } else {
        prompter.secret(question)
    };
    answer.unwrap_or_default()
}
