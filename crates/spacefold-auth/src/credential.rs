//! Credential payloads.
//!
//! A credential is a signed authorization assertion: an already-admitted
//! issuer asserts something about a subject key. Credentials travel as
//! feed entries ([`spacefold_core::EntryKind::Credential`]) and are the
//! only input to the credential authority's derived state.

use serde::{Deserialize, Serialize};

use spacefold_core::{Keypair, PublicKey, Signature};

use crate::error::{AuthError, Result};

/// What an assertion claims about its subject.
///
/// The tag space is open: assertions minted by newer writers decode as
/// `Unknown` and are ignored by the authority, not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", from = "u16")]
pub enum AssertionKind {
    /// The subject device key may write to the space.
    AuthorizedDevice,
    /// The subject identity key is a member of the space.
    AdmitMember,
    /// The subject device key may no longer write.
    RevokeDevice,
    /// Assertion minted by a newer writer; carried but not interpreted.
    Unknown(u16),
}

impl AssertionKind {
    /// Convert to u16 for serialization.
    pub fn to_u16(self) -> u16 {
        match self {
            AssertionKind::AuthorizedDevice => 0x0001,
            AssertionKind::AdmitMember => 0x0002,
            AssertionKind::RevokeDevice => 0x0003,
            AssertionKind::Unknown(v) => v,
        }
    }

    /// Parse from u16. Total: unrecognized values map to `Unknown`.
    pub fn from_u16(value: u16) -> Self {
        match value {
            0x0001 => Self::AuthorizedDevice,
            0x0002 => Self::AdmitMember,
            0x0003 => Self::RevokeDevice,
            other => Self::Unknown(other),
        }
    }
}

impl From<AssertionKind> for u16 {
    fn from(kind: AssertionKind) -> u16 {
        kind.to_u16()
    }
}

impl From<u16> for AssertionKind {
    fn from(value: u16) -> AssertionKind {
        AssertionKind::from_u16(value)
    }
}

/// A signed authorization assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Who makes the assertion. Must itself be admitted for the
    /// assertion to take effect.
    pub issuer: PublicKey,

    /// The key the assertion is about.
    pub subject: PublicKey,

    /// What is asserted.
    pub kind: AssertionKind,

    /// Ed25519 signature by the issuer over the signing message.
    pub signature: Signature,
}

impl Credential {
    /// Issue a new credential, signing it with the issuer's keypair.
    pub fn issue(issuer: &Keypair, subject: PublicKey, kind: AssertionKind) -> Self {
        let issuer_key = issuer.public_key();
        let message = signing_message(&issuer_key, &subject, kind);
        let signature = issuer.sign(&message);

        Self {
            issuer: issuer_key,
            subject,
            kind,
            signature,
        }
    }

    /// Verify the credential's signature against its issuer key.
    pub fn verify(&self) -> Result<()> {
        let message = signing_message(&self.issuer, &self.subject, self.kind);
        self.issuer
            .verify(&message, &self.signature)
            .map_err(|_| AuthError::BadSignature)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).expect("CBOR serialization failed");
        buf
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e: ciborium::de::Error<std::io::Error>| {
            AuthError::Decode(e.to_string())
        })
    }
}

/// Domain-separated signing message for a credential.
fn signing_message(issuer: &PublicKey, subject: &PublicKey, kind: AssertionKind) -> Vec<u8> {
    let mut buf = Vec::with_capacity(19 + 32 + 2 + 32);
    buf.extend_from_slice(b"spacefold-cred-v0:");
    buf.extend_from_slice(&issuer.0);
    buf.extend_from_slice(&kind.to_u16().to_be_bytes());
    buf.extend_from_slice(&subject.0);
    buf
}
