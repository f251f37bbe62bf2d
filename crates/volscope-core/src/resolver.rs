//! Claim → volume → device attribute resolution.
//!
//! [`resolve_attributes`] holds the defaulting policy as a pure function of
//! the two lookups. [`VolumeAttributeResolver`] performs the lookups through
//! a [`ClaimResolver`] and folds lookup errors into "not found".
//!
//! The encryption flag is an exact string comparison against `"true"`.
//! `"True"` or `"1"` read as unencrypted; consumers rely on that.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::model::{
    ClaimRecord, ClaimRef, VolumeAttributes, VolumeRecord, DEFAULT_IOPS, DEFAULT_THROUGHPUT,
    ENCRYPTED_ATTRIBUTE, IOPS_ANNOTATION, THROUGHPUT_ANNOTATION,
};
use crate::source::ClaimResolver;

/// Applies the defaulting policy to a claim lookup and a volume lookup.
///
/// `volume` is only consulted when `claim` is bound.
pub fn resolve_attributes(
    claim: Option<&ClaimRecord>,
    volume: Option<&VolumeRecord>,
) -> VolumeAttributes {
    if claim.and_then(ClaimRecord::bound_volume).is_none() {
        return VolumeAttributes::unresolved();
    }
    let Some(volume) = volume else {
        return VolumeAttributes::unresolved();
    };

    let mut attrs = VolumeAttributes::unresolved();
    if let Some(csi) = &volume.csi {
        attrs.volume_id = csi.volume_handle.clone();
        attrs.encrypted = csi
            .attributes
            .get(ENCRYPTED_ATTRIBUTE)
            .is_some_and(|v| v == "true");
    }
    attrs.iops = annotation_or(volume, IOPS_ANNOTATION, DEFAULT_IOPS);
    attrs.throughput = annotation_or(volume, THROUGHPUT_ANNOTATION, DEFAULT_THROUGHPUT);
    attrs
}

fn annotation_or(volume: &VolumeRecord, key: &str, default: &str) -> String {
    volume
        .annotations
        .get(key)
        .cloned()
        .unwrap_or_else(|| default.to_string())
}

/// Resolves claim references against a [`ClaimResolver`].
#[derive(Clone)]
pub struct VolumeAttributeResolver {
    claims: Arc<dyn ClaimResolver>,
}

impl VolumeAttributeResolver {
    /// Creates a resolver backed by `claims`.
    pub fn new(claims: Arc<dyn ClaimResolver>) -> Self {
        Self { claims }
    }

    /// Resolves `claim_ref` to device attributes. Never fails.
    pub async fn resolve(&self, claim_ref: &ClaimRef) -> VolumeAttributes {
        let claim = match self.claims.get_claim(&claim_ref.namespace, &claim_ref.name).await {
            Ok(Some(claim)) => claim,
            Ok(None) => {
                debug!(claim = %claim_ref, "claim not found");
                return VolumeAttributes::unresolved();
            }
            Err(e) => {
                warn!(claim = %claim_ref, error = %e, "claim lookup failed");
                return VolumeAttributes::unresolved();
            }
        };

        let Some(volume_name) = claim.bound_volume() else {
            debug!(claim = %claim_ref, "claim not bound yet");
            return VolumeAttributes::unresolved();
        };

        let volume = match self.claims.get_volume(volume_name).await {
            Ok(Some(volume)) => Some(volume),
            Ok(None) => {
                debug!(claim = %claim_ref, volume = volume_name, "bound volume missing");
                None
            }
            Err(e) => {
                warn!(claim = %claim_ref, volume = volume_name, error = %e, "volume lookup failed");
                None
            }
        };

        resolve_attributes(Some(&claim), volume.as_ref())
    }
}
