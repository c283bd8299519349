use crate::resources::metadata::{labels, set_controller_reference, splunk_name};
use crate::util::errors::{Error, Result};

use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::ByteString;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Characters used for generated Splunk credentials
pub const SECRET_BYTES: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

pub const SECRET_LENGTH: usize = 24;

pub const SECRET_KEYS: [&str; 5] = ["hec_token", "password", "pass4SymmKey", "idxc_secret", "shc_secret"];

/// Pseudo-random source for per-deployment credentials.
///
/// Safe to share between concurrent reconciliations; the lock is only held while a
/// single token is drawn. Not a cryptographic source.
#[derive(Debug)]
pub struct SecretGenerator {
    rng: Mutex<StdRng>,
}

impl SecretGenerator {
    pub fn from_clock() -> Self {
        let now = chrono::Utc::now();
        let seed = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros().wrapping_mul(1_000));
        Self::with_seed(seed as u64)
    }

    pub fn with_seed(seed: u64) -> Self {
        SecretGenerator {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Returns `length` bytes drawn uniformly from `alphabet`.
    pub fn generate(&self, alphabet: &[u8], length: usize) -> Result<Vec<u8>> {
        if alphabet.is_empty() {
            return Err(Error::InvalidArgument("secret alphabet must not be empty".to_string()));
        }
        if length == 0 {
            return Ok(Vec::new());
        }

        // a poisoned lock still holds a usable rng
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok((0..length)
            .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
            .collect())
    }
}

impl Default for SecretGenerator {
    fn default() -> Self {
        Self::from_clock()
    }
}

pub fn secrets_name(identifier: &str) -> String {
    splunk_name(identifier, "secrets")
}

/// Builds the credential secret for a Splunk deployment.
///
/// Only called when the secret is first provisioned; regenerating it would
/// invalidate credentials already in use by running pods.
pub fn build_secrets(
    identifier: &str,
    namespace: &str,
    owner: &OwnerReference,
    generator: &SecretGenerator,
) -> Result<Secret> {
    let mut data = BTreeMap::new();
    for key in SECRET_KEYS {
        data.insert(
            key.to_string(),
            ByteString(generator.generate(SECRET_BYTES, SECRET_LENGTH)?),
        );
    }

    let mut metadata = ObjectMeta {
        name: Some(secrets_name(identifier)),
        namespace: Some(namespace.to_string()),
        labels: Some(labels("secrets", "secrets", identifier)),
        ..Default::default()
    };
    set_controller_reference(&mut metadata, owner);

    Ok(Secret {
        metadata,
        type_: Some("Opaque".to_string()),
        data: Some(data),
        ..Default::default()
    })
}
