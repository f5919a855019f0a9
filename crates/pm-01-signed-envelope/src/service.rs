//! # Envelope Service
//!
//! Creation, verification, and decoding of signed envelopes.
//!
//! ## Contract
//!
//! - `create_signed_payload` succeeds only for local-key signers, and only
//!   when the formatted payload names the signing account.
//! - Verification never errors. A payload that does not recover to its
//!   claimed signer under the given domain is simply rejected.
//! - Decoding treats the network as hostile: any codec or signature failure
//!   yields `None` and a debug log line.

use crate::domain::eip712::Eip712Domain;
use crate::domain::envelope::{SignedEnvelope, TypedPayload};
use crate::domain::errors::EnvelopeError;
use crate::ports::outbound::{PayloadCodec, SignerKind, TypedDataSigner};
use rayon::prelude::*;
use serde::de::DeserializeOwned;
use shared_types::Address;
use tracing::{debug, trace};

/// Build a payload for the signer's account and sign it under `domain`.
///
/// `format` receives the signing account so the payload can embed it.
///
/// # Errors
///
/// - `UnsupportedSignerKind` for injected or remote signers
/// - `SignerFieldMismatch` if the payload names another account
/// - `Signer` if the signing capability fails
pub async fn create_signed_payload<T, F>(
    domain: &Eip712Domain,
    format: F,
    signer: &dyn TypedDataSigner,
) -> Result<SignedEnvelope<T>, EnvelopeError>
where
    T: TypedPayload,
    F: FnOnce(Address) -> T,
{
    let kind = signer.kind();
    if kind != SignerKind::LocalKey {
        return Err(EnvelopeError::UnsupportedSignerKind(kind));
    }

    let account = signer.address().await?;
    let payload = format(account);
    let claimed = payload.signer();
    if claimed != account {
        return Err(EnvelopeError::SignerFieldMismatch {
            claimed,
            actual: account,
        });
    }

    let typed = payload.to_typed_struct();
    let signature = signer.sign_typed_data(domain, &typed).await?;
    trace!(primary_type = %typed.name, signer = %account, "Created signed payload");

    Ok(SignedEnvelope { payload, signature })
}

/// True if the envelope was signed by the account it names.
#[must_use]
pub fn verify_payload<T: TypedPayload>(domain: &Eip712Domain, envelope: &SignedEnvelope<T>) -> bool {
    envelope.recover_signer(domain) == Some(envelope.payload.signer())
}

/// True if the envelope is valid and was signed by `expected`.
#[must_use]
pub fn verify_payload_as<T: TypedPayload>(
    domain: &Eip712Domain,
    envelope: &SignedEnvelope<T>,
    expected: Address,
) -> bool {
    envelope.payload.signer() == expected && verify_payload(domain, envelope)
}

/// Decode and verify one envelope from wire bytes.
///
/// Returns `None` for malformed bytes and for bad signatures.
pub fn decode_signed_payload<T, C>(
    domain: &Eip712Domain,
    codec: &C,
    bytes: &[u8],
) -> Option<SignedEnvelope<T>>
where
    T: TypedPayload + DeserializeOwned,
    C: PayloadCodec + ?Sized,
{
    let envelope: SignedEnvelope<T> = match codec.decode(bytes) {
        Ok(envelope) => envelope,
        Err(e) => {
            debug!(error = %e, len = bytes.len(), "Dropping undecodable payload");
            return None;
        }
    };

    if !verify_payload(domain, &envelope) {
        debug!(
            claimed = %envelope.payload.signer(),
            domain = domain.name.as_deref().unwrap_or_default(),
            "Dropping payload with invalid signature"
        );
        return None;
    }

    Some(envelope)
}

/// Decode and verify a page of wire messages in parallel.
///
/// Invalid entries are dropped. Output preserves input order.
pub fn decode_signed_batch<T, C>(
    domain: &Eip712Domain,
    codec: &C,
    messages: &[Vec<u8>],
) -> Vec<SignedEnvelope<T>>
where
    T: TypedPayload + DeserializeOwned + Send,
    C: PayloadCodec + ?Sized,
{
    let accepted: Vec<SignedEnvelope<T>> = messages
        .par_iter()
        .filter_map(|bytes| decode_signed_payload(domain, codec, bytes))
        .collect();

    if accepted.len() != messages.len() {
        debug!(
            total = messages.len(),
            accepted = accepted.len(),
            "Dropped invalid payloads from batch"
        );
    }
    accepted
}
