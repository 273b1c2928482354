//! The credential authority state machine.
//!
//! The authority consumes the space's credential stream and owns the
//! derived authorization state: which writer keys are currently admitted,
//! and the chain by which each device was admitted. It is constructed per
//! space and destroyed with it — never process-global — so multiple
//! spaces in one process cannot contaminate each other.
//!
//! Processing is synchronous and in-memory; `is_admitted` is answerable
//! at any time without I/O.

use std::collections::{HashMap, HashSet};

use tokio::sync::watch;
use tracing::{debug, warn};

use spacefold_core::{PublicKey, SpaceId};

use crate::credential::{AssertionKind, Credential};
use crate::error::Result;

/// Outcome of processing one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Processed {
    /// The subject key is now admitted.
    Admitted,
    /// The subject key was already admitted; re-processing is a no-op.
    AlreadyAdmitted,
    /// The issuer's own admission has not been processed yet. The
    /// credential is held and re-driven after every later admission —
    /// a gap in the chain defers, it never rejects.
    Deferred,
    /// The subject key is no longer admitted.
    Revoked,
    /// The credential had no effect (unknown assertion, or revocation of
    /// a key that was not admitted).
    Ignored,
}

/// How a device key was admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceChain {
    /// The admitted device key.
    pub device: PublicKey,
    /// The already-admitted key that issued the admission.
    pub issued_by: PublicKey,
}

/// Per-space authorization state derived from the credential stream.
pub struct CredentialAuthority {
    space_id: SpaceId,
    local_device: PublicKey,

    /// Writer keys whose mutations may currently be materialized.
    admitted: HashSet<PublicKey>,

    /// Admission chain per device key.
    chains: HashMap<PublicKey, DeviceChain>,

    /// Verified credentials waiting for their issuer's admission.
    deferred: Vec<Credential>,

    /// Resolves once a credential admits this process's own device.
    ready_tx: watch::Sender<bool>,

    /// Unknown assertions seen (forward-compat observability).
    ignored_unknown: u64,
}

impl CredentialAuthority {
    /// Create the authority for a space.
    ///
    /// The founding identity key is admitted at construction (the genesis
    /// device), so the first credential it signs is verifiable without a
    /// bootstrap credential.
    pub fn new(space_id: SpaceId, identity: PublicKey, local_device: PublicKey) -> Self {
        let mut admitted = HashSet::new();
        admitted.insert(identity);

        let (ready_tx, _) = watch::channel(local_device == identity);

        Self {
            space_id,
            local_device,
            admitted,
            chains: HashMap::new(),
            deferred: Vec::new(),
            ready_tx,
            ignored_unknown: 0,
        }
    }

    /// The space this authority belongs to.
    pub fn space_id(&self) -> &SpaceId {
        &self.space_id
    }

    /// Whether a writer's mutations may currently be materialized.
    ///
    /// Synchronous over already-processed credentials; never blocks.
    pub fn is_admitted(&self, writer: &PublicKey) -> bool {
        self.admitted.contains(writer)
    }

    /// The admission chain for a device, if it was admitted by credential.
    pub fn chain(&self, device: &PublicKey) -> Option<&DeviceChain> {
        self.chains.get(device)
    }

    /// A signal that resolves once this process's device is admitted.
    ///
    /// Callers waiting to prove their own authorization before writing
    /// await this receiver seeing `true`.
    pub fn ready_signal(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    /// Number of currently admitted keys.
    pub fn admitted_len(&self) -> usize {
        self.admitted.len()
    }

    /// Number of credentials held waiting for a chain link.
    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Process one credential. Never suspends.
    ///
    /// Verifies the signature, applies the assertion, and re-drives any
    /// deferred credentials whose chain link may now exist. Idempotent:
    /// replaying an applied credential is a no-op.
    pub fn process(&mut self, credential: &Credential) -> Result<Processed> {
        credential.verify()?;

        let outcome = self.apply_verified(credential);

        if matches!(outcome, Processed::Admitted | Processed::Revoked) {
            self.drain_deferred();
        }

        Ok(outcome)
    }

    /// Apply an already-verified credential. Does not touch the deferred
    /// queue beyond pushing to it.
    fn apply_verified(&mut self, credential: &Credential) -> Processed {
        match credential.kind {
            AssertionKind::AuthorizedDevice | AssertionKind::AdmitMember => {
                if !self.admitted.contains(&credential.issuer) {
                    debug!(
                        issuer = %credential.issuer,
                        subject = %credential.subject,
                        "issuer not yet admitted, deferring credential"
                    );
                    self.deferred.push(credential.clone());
                    return Processed::Deferred;
                }

                if self.admitted.contains(&credential.subject) {
                    return Processed::AlreadyAdmitted;
                }

                self.admitted.insert(credential.subject);
                self.chains.insert(
                    credential.subject,
                    DeviceChain {
                        device: credential.subject,
                        issued_by: credential.issuer,
                    },
                );

                if credential.subject == self.local_device {
                    self.ready_tx.send_replace(true);
                }

                Processed::Admitted
            }

            AssertionKind::RevokeDevice => {
                if !self.admitted.contains(&credential.issuer) {
                    self.deferred.push(credential.clone());
                    return Processed::Deferred;
                }

                if self.admitted.remove(&credential.subject) {
                    self.chains.remove(&credential.subject);
                    if credential.subject == self.local_device {
                        warn!(device = %self.local_device, "local device revoked");
                        self.ready_tx.send_replace(false);
                    }
                    Processed::Revoked
                } else {
                    Processed::Ignored
                }
            }

            AssertionKind::Unknown(tag) => {
                self.ignored_unknown += 1;
                debug!(tag, "ignoring unknown assertion kind");
                Processed::Ignored
            }
        }
    }

    /// Re-drive deferred credentials until a pass makes no progress.
    ///
    /// Credentials in the queue were verified when first seen, so chains
    /// arriving in any order settle to the same admitted set.
    fn drain_deferred(&mut self) {
        loop {
            if self.deferred.is_empty() {
                return;
            }

            let pending = std::mem::take(&mut self.deferred);
            let mut progress = false;

            for credential in pending {
                match self.apply_verified(&credential) {
                    Processed::Deferred => {}
                    _ => progress = true,
                }
            }

            if !progress {
                return;
            }
        }
    }
}

impl std::fmt::Debug for CredentialAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialAuthority")
            .field("space_id", &self.space_id)
            .field("admitted", &self.admitted.len())
            .field("deferred", &self.deferred.len())
            .field("ignored_unknown", &self.ignored_unknown)
            .finish()
    }
}
