// ABOUTME: ssh-agent client used by the Agent auth candidate
// ABOUTME: Connects to the socket named by the environment and offers every identity it holds

use std::future::Future;
use std::path::Path;

use russh::client::{Handle, Handler};
use russh::keys::agent::client::{AgentClient, AgentStream};
use russh::keys::ssh_key;
use russh::{AgentAuthError, CryptoVec, Signer};

use crate::diagnostics::Diagnostics;

type DynAgent = AgentClient<Box<dyn AgentStream + Send + Unpin + 'static>>;

/// Clones the requested public key before awaiting so the signing future stays `Send`.
struct AgentSigner<'a> {
    agent: &'a mut DynAgent,
}

impl Signer for AgentSigner<'_> {
    type Error = AgentAuthError;

    fn auth_publickey_sign(
        &mut self,
        key: &ssh_key::PublicKey,
        hash_alg: Option<ssh_key::HashAlg>,
        to_sign: CryptoVec,
    ) -> impl Future<Output = Result<CryptoVec, Self::Error>> + Send {
        let key_owned = key.clone();
        async move {
            self.agent
                .sign_request(&key_owned, hash_alg, to_sign)
                .await
                .map_err(Into::into)
        }
    }
}

pub struct SshAgent {
    agent: DynAgent,
    identities: Vec<ssh_key::PublicKey>,
}

impl SshAgent {
    /// Connects and lists identities. An unreachable agent is `Err`, an empty one is not.
    pub async fn connect(socket: &Path) -> Result<Self, russh::keys::Error> {
        let mut agent = AgentClient::connect_uds(socket).await?.dynamic();
        let identities = agent.request_identities().await?;
        Ok(Self { agent, identities })
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    /// Offers each agent identity in turn; `Ok(true)` as soon as the server accepts one.
    pub async fn authenticate<H: Handler>(
        &mut self,
        handle: &mut Handle<H>,
        user: &str,
        diag: Diagnostics,
    ) -> Result<bool, russh::Error> {
        let hash_alg = handle.best_supported_rsa_hash().await?.flatten();

        for key in &self.identities {
            diag.debug(&format!("Trying agent key: {} ({})", key.algorithm(), key.comment()));

            let result = handle
                .authenticate_publickey_with(
                    user,
                    key.clone(),
                    hash_alg,
                    &mut AgentSigner {
                        agent: &mut self.agent,
                    },
                )
                .await;

            match result {
                Ok(auth) if auth.success() => return Ok(true),
                Ok(_) => diag.debug(&format!("Agent key rejected by server: {}", key.comment())),
                Err(e) => diag.debug(&format!("Agent signing failed for {}: {e:?}", key.comment())),
            }
        }

        Ok(false)
    }
}
