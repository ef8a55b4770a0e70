use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::{rngs::OsRng, Rng};
use sha2::{Digest, Sha256};
use thiserror::Error;
use x25519_dalek::{EphemeralSecret, PublicKey, SharedSecret};

/// Length of the nonce carried by a finalized result.
pub const RESULT_NONCE_LEN: usize = 16;

/// Length of the AEAD nonce taken from the result nonce.
const AEAD_NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("result payload too short ({0} bytes)")]
    Truncated(usize),
    #[error("result failed authentication")]
    Authentication,
    #[error("result plaintext has {0} bytes, expected 8")]
    Plaintext(usize),
}

/// Encrypted computation output as stored in the result resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncryptedResult {
    pub nonce: [u8; RESULT_NONCE_LEN],
    pub ciphertext: Vec<u8>,
}

impl EncryptedResult {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(RESULT_NONCE_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() <= RESULT_NONCE_LEN {
            return Err(CipherError::Truncated(bytes.len()));
        }
        let (nonce, ciphertext) = bytes.split_at(RESULT_NONCE_LEN);
        let mut fixed = [0u8; RESULT_NONCE_LEN];
        fixed.copy_from_slice(nonce);
        Ok(Self {
            nonce: fixed,
            ciphertext: ciphertext.to_vec(),
        })
    }
}

/// Single-use key material for one computation request.
///
/// The secret half never leaves memory and is consumed by [RequestKeys::open].
pub struct RequestKeys {
    secret: EphemeralSecret,
    public: PublicKey,
    nonce: u128,
}

impl RequestKeys {
    pub fn generate() -> Self {
        let secret = EphemeralSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        Self {
            secret,
            public,
            nonce: OsRng.gen(),
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    pub fn nonce(&self) -> u128 {
        self.nonce
    }

    /// Decrypt the 1-based result using the MXE's public key.
    pub fn open(self, mxe_public_key: [u8; 32], result: &EncryptedResult) -> Result<u64, CipherError> {
        let shared = self.secret.diffie_hellman(&PublicKey::from(mxe_public_key));
        let plaintext = result_cipher(&shared)
            .decrypt(aead_nonce(&result.nonce), result.ciphertext.as_slice())
            .map_err(|_| CipherError::Authentication)?;
        let bytes: [u8; 8] = plaintext
            .as_slice()
            .try_into()
            .map_err(|_| CipherError::Plaintext(plaintext.len()))?;
        Ok(u64::from_le_bytes(bytes))
    }
}

fn result_cipher(shared: &SharedSecret) -> ChaCha20Poly1305 {
    let key = Sha256::digest(shared.as_bytes());
    ChaCha20Poly1305::new(&key)
}

fn aead_nonce(nonce: &[u8; RESULT_NONCE_LEN]) -> &Nonce {
    Nonce::from_slice(&nonce[..AEAD_NONCE_LEN])
}

/// Encrypt a result the way the MXE does; used by the mock network.
#[cfg(any(test, feature = "mocks"))]
pub fn seal_result(
    shared: &SharedSecret,
    nonce: [u8; RESULT_NONCE_LEN],
    raw_result: u64,
) -> EncryptedResult {
    let ciphertext = result_cipher(shared)
        .encrypt(aead_nonce(&nonce), raw_result.to_le_bytes().as_slice())
        .expect("chacha20poly1305 encryption is infallible for short messages");
    EncryptedResult { nonce, ciphertext }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x25519_dalek::StaticSecret;

    #[test]
    fn sealed_result_opens_with_request_keys() {
        let mxe = StaticSecret::random_from_rng(OsRng);
        let mxe_public = PublicKey::from(&mxe);
        let keys = RequestKeys::generate();
        let shared = mxe.diffie_hellman(&PublicKey::from(keys.public_key()));
        let sealed = seal_result(&shared, [3u8; RESULT_NONCE_LEN], 6);

        let decoded = EncryptedResult::from_bytes(&sealed.to_bytes()).unwrap();
        assert_eq!(decoded, sealed);
        assert_eq!(keys.open(mxe_public.to_bytes(), &decoded), Ok(6));
    }

    #[test]
    fn tampered_result_fails_authentication() {
        let mxe = StaticSecret::random_from_rng(OsRng);
        let keys = RequestKeys::generate();
        let shared = mxe.diffie_hellman(&PublicKey::from(keys.public_key()));
        let mut sealed = seal_result(&shared, [1u8; RESULT_NONCE_LEN], 2);
        sealed.ciphertext[0] ^= 0xff;
        assert_eq!(
            keys.open(PublicKey::from(&mxe).to_bytes(), &sealed),
            Err(CipherError::Authentication)
        );
    }

    #[test]
    fn short_payload_is_rejected() {
        assert_eq!(
            EncryptedResult::from_bytes(&[0u8; 10]),
            Err(CipherError::Truncated(10))
        );
    }

    #[test]
    fn request_keys_are_fresh() {
        let a = RequestKeys::generate();
        let b = RequestKeys::generate();
        assert_ne!(a.public_key(), b.public_key());
        assert_ne!(a.nonce(), b.nonce());
    }
}
