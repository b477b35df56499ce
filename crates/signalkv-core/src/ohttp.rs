//! Two-way OHTTP envelope for shard-to-shard lookups
//!
//! Requests are encapsulated with HPKE under the peer's published key and
//! responses are encrypted back under a secret exported from the same HPKE
//! context, so a relay between shards learns nothing about either
//! direction. The message layout follows RFC 9458:
//!
//! ```text
//! request  = hdr(key_id, kem_id, kdf_id, aead_id) || enc || ct
//! response = response_nonce || ct
//! ```
//!
//! with the response key and nonce derived via
//! `Extract(enc || response_nonce, export(response_label))`.
//!
//! The cipher suite is fixed for the deployment: DHKEM(X25519, HKDF-SHA256),
//! HKDF-SHA256, AES-256-GCM. Both encryptor types are stateful and
//! single-exchange: the client must encrypt a request before it can decrypt
//! the response, the server must decrypt a request before it can encrypt a
//! response, and the retained context is consumed by the second call.

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use hkdf::Hkdf;
use hpke::aead::{AeadCtxR, AeadCtxS, AesGcm256};
use hpke::kdf::HkdfSha256;
use hpke::kem::X25519HkdfSha256;
use hpke::{Deserializable, Kem as KemTrait, OpModeR, OpModeS, Serializable};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::Error;

/// DHKEM(X25519, HKDF-SHA256)
pub const KEM_ID: u16 = 0x0020;
/// HKDF-SHA256
pub const KDF_ID: u16 = 0x0001;
/// AES-256-GCM
pub const AEAD_ID: u16 = 0x0002;

/// HPKE info label bound into request encapsulation.
pub const REQUEST_LABEL: &[u8] = b"message/ad-auction-trusted-signals-request";
/// Export label for the response key schedule.
pub const RESPONSE_LABEL: &[u8] = b"message/ad-auction-trusted-signals-response";

/// Fixed message for calling `decrypt_response` before `encrypt_request`.
pub const CLIENT_ORDER_VIOLATION: &str =
    "missing request context; encrypt_request must be called first";
/// Fixed message for calling `encrypt_response` before `decrypt_request`.
pub const SERVER_ORDER_VIOLATION: &str =
    "missing request context; decrypt_request must be called first";

const HEADER_SIZE: usize = 7;
const ENCAPPED_KEY_SIZE: usize = 32;
const AEAD_KEY_SIZE: usize = 32;
const AEAD_NONCE_SIZE: usize = 12;
/// max(Nk, Nn) per RFC 9458.
const RESPONSE_NONCE_SIZE: usize = 32;

type Kem = X25519HkdfSha256;
type SenderContext = AeadCtxS<AesGcm256, HkdfSha256, Kem>;
type ReceiverContext = AeadCtxR<AesGcm256, HkdfSha256, Kem>;

/// Published key material for one shard: the key id clients put in the
/// message header plus the serialized X25519 public key.
#[derive(Debug, Clone)]
pub struct PublicKeyConfig {
    pub key_id: u8,
    pub public_key: Vec<u8>,
}

/// Source of OHTTP key material. Production deployments back this with a
/// key-management service; tests inject a [`StaticKeyFetcher`] with a fixed
/// keypair.
pub trait KeyFetcher: Send + Sync {
    /// Key to encrypt outgoing requests under.
    fn public_key_config(&self) -> Result<PublicKeyConfig, Error>;
    /// Private key matching `key_id`, for decrypting incoming requests.
    fn private_key(&self, key_id: u8) -> Result<Vec<u8>, Error>;
}

/// Key fetcher over fixed in-memory key material.
pub struct StaticKeyFetcher {
    key_id: u8,
    public_key: Vec<u8>,
    private_key: Option<Vec<u8>>,
}

impl StaticKeyFetcher {
    pub fn new(key_id: u8, public_key: Vec<u8>, private_key: Option<Vec<u8>>) -> Self {
        Self {
            key_id,
            public_key,
            private_key,
        }
    }
}

impl KeyFetcher for StaticKeyFetcher {
    fn public_key_config(&self) -> Result<PublicKeyConfig, Error> {
        Ok(PublicKeyConfig {
            key_id: self.key_id,
            public_key: self.public_key.clone(),
        })
    }

    fn private_key(&self, key_id: u8) -> Result<Vec<u8>, Error> {
        if key_id != self.key_id {
            return Err(Error::Decryption(format!("no private key for id {key_id}")));
        }
        self.private_key
            .clone()
            .ok_or_else(|| Error::Decryption("no private key configured".to_string()))
    }
}

/// Generate a fresh X25519 keypair, returned as
/// `(private_key, public_key)` bytes.
pub fn generate_key_pair() -> (Vec<u8>, Vec<u8>) {
    let mut csprng = OsRng;
    let (private_key, public_key) = <Kem as KemTrait>::gen_keypair(&mut csprng);
    (
        private_key.to_bytes().to_vec(),
        public_key.to_bytes().to_vec(),
    )
}

fn message_header(key_id: u8) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0] = key_id;
    header[1..3].copy_from_slice(&KEM_ID.to_be_bytes());
    header[3..5].copy_from_slice(&KDF_ID.to_be_bytes());
    header[5..7].copy_from_slice(&AEAD_ID.to_be_bytes());
    header
}

fn hpke_info(label: &[u8], header: &[u8]) -> Vec<u8> {
    let mut info = Vec::with_capacity(label.len() + 1 + header.len());
    info.extend_from_slice(label);
    info.push(0);
    info.extend_from_slice(header);
    info
}

/// Derive the response AEAD key and nonce from the exported secret.
fn response_key_schedule(
    secret: &[u8],
    enc: &[u8],
    response_nonce: &[u8],
) -> Result<([u8; AEAD_KEY_SIZE], [u8; AEAD_NONCE_SIZE]), Error> {
    let mut salt = Vec::with_capacity(enc.len() + response_nonce.len());
    salt.extend_from_slice(enc);
    salt.extend_from_slice(response_nonce);
    let (_, hk) = Hkdf::<Sha256>::extract(Some(&salt), secret);
    let mut key = [0u8; AEAD_KEY_SIZE];
    hk.expand(b"key", &mut key)
        .map_err(|e| Error::Encryption(format!("response key derivation failed: {e}")))?;
    let mut nonce = [0u8; AEAD_NONCE_SIZE];
    hk.expand(b"nonce", &mut nonce)
        .map_err(|e| Error::Encryption(format!("response nonce derivation failed: {e}")))?;
    Ok((key, nonce))
}

struct ClientRequestContext {
    enc: Vec<u8>,
    ctx: SenderContext,
}

/// Client half of the envelope: encrypts one request, then decrypts its
/// response with the retained HPKE context. Not thread safe; one instance
/// per exchange.
pub struct ClientEncryptor {
    key_fetcher: Arc<dyn KeyFetcher>,
    context: Option<ClientRequestContext>,
}

impl ClientEncryptor {
    pub fn new(key_fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self {
            key_fetcher,
            context: None,
        }
    }

    /// Encrypt an outgoing request.
    pub fn encrypt_request(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let config = self.key_fetcher.public_key_config()?;
        let public_key = <Kem as KemTrait>::PublicKey::from_bytes(&config.public_key)
            .map_err(|e| Error::Encryption(format!("invalid public key: {e}")))?;
        tracing::trace!(key_id = config.key_id, "Encrypting request");
        let header = message_header(config.key_id);
        let info = hpke_info(REQUEST_LABEL, &header);
        let mut csprng = OsRng;
        let (encapped_key, mut ctx) = hpke::setup_sender::<AesGcm256, HkdfSha256, Kem, _>(
            &OpModeS::Base,
            &public_key,
            &info,
            &mut csprng,
        )
        .map_err(|e| Error::Encryption(format!("request encapsulation failed: {e}")))?;
        let ciphertext = ctx
            .seal(payload, b"")
            .map_err(|e| Error::Encryption(format!("request seal failed: {e}")))?;

        let enc = encapped_key.to_bytes().to_vec();
        let mut message = Vec::with_capacity(HEADER_SIZE + enc.len() + ciphertext.len());
        message.extend_from_slice(&header);
        message.extend_from_slice(&enc);
        message.extend_from_slice(&ciphertext);
        self.context = Some(ClientRequestContext { enc, ctx });
        Ok(message)
    }

    /// Decrypt the response to the previously encrypted request. Must be
    /// called after [`Self::encrypt_request`]; consumes the context.
    pub fn decrypt_response(&mut self, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        let Some(context) = self.context.take() else {
            return Err(Error::Decryption(CLIENT_ORDER_VIOLATION.to_string()));
        };
        if encrypted.len() < RESPONSE_NONCE_SIZE {
            return Err(Error::Decryption(format!(
                "response too short: {} bytes",
                encrypted.len()
            )));
        }
        let (response_nonce, ciphertext) = encrypted.split_at(RESPONSE_NONCE_SIZE);
        let mut secret = [0u8; AEAD_KEY_SIZE];
        context
            .ctx
            .export(RESPONSE_LABEL, &mut secret)
            .map_err(|e| Error::Decryption(format!("secret export failed: {e}")))?;
        let (key, nonce) = response_key_schedule(&secret, &context.enc, response_nonce)
            .map_err(|e| Error::Decryption(e.to_string()))?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::Decryption(e.to_string()))?;
        cipher
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .map_err(|_| Error::Decryption("response decryption failed".to_string()))
    }
}

struct ServerRequestContext {
    enc: Vec<u8>,
    ctx: ReceiverContext,
}

/// Server half of the envelope: decrypts one request, then encrypts its
/// response. Not thread safe; one instance per exchange.
pub struct ServerEncryptor {
    key_fetcher: Arc<dyn KeyFetcher>,
    context: Option<ServerRequestContext>,
}

impl ServerEncryptor {
    pub fn new(key_fetcher: Arc<dyn KeyFetcher>) -> Self {
        Self {
            key_fetcher,
            context: None,
        }
    }

    /// Decrypt an incoming request and retain its context for the reply.
    pub fn decrypt_request(&mut self, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        if encrypted.len() < HEADER_SIZE + ENCAPPED_KEY_SIZE {
            return Err(Error::Decryption(format!(
                "request too short: {} bytes",
                encrypted.len()
            )));
        }
        let header = &encrypted[..HEADER_SIZE];
        let kem_id = u16::from_be_bytes([header[1], header[2]]);
        let kdf_id = u16::from_be_bytes([header[3], header[4]]);
        let aead_id = u16::from_be_bytes([header[5], header[6]]);
        if (kem_id, kdf_id, aead_id) != (KEM_ID, KDF_ID, AEAD_ID) {
            return Err(Error::Decryption(format!(
                "unsupported cipher suite: kem={kem_id:#06x} kdf={kdf_id:#06x} aead={aead_id:#06x}"
            )));
        }
        tracing::trace!(key_id = header[0], "Decrypting request");
        let private_key_bytes = self.key_fetcher.private_key(header[0])?;
        let private_key = <Kem as KemTrait>::PrivateKey::from_bytes(&private_key_bytes)
            .map_err(|e| Error::Decryption(format!("invalid private key: {e}")))?;
        let enc = &encrypted[HEADER_SIZE..HEADER_SIZE + ENCAPPED_KEY_SIZE];
        let encapped_key = <Kem as KemTrait>::EncappedKey::from_bytes(enc)
            .map_err(|e| Error::Decryption(format!("invalid encapsulated key: {e}")))?;
        let info = hpke_info(REQUEST_LABEL, header);
        let mut ctx = hpke::setup_receiver::<AesGcm256, HkdfSha256, Kem>(
            &OpModeR::Base,
            &private_key,
            &encapped_key,
            &info,
        )
        .map_err(|e| Error::Decryption(format!("request decapsulation failed: {e}")))?;
        let plaintext = ctx
            .open(&encrypted[HEADER_SIZE + ENCAPPED_KEY_SIZE..], b"")
            .map_err(|_| Error::Decryption("request decryption failed".to_string()))?;
        self.context = Some(ServerRequestContext {
            enc: enc.to_vec(),
            ctx,
        });
        Ok(plaintext)
    }

    /// Encrypt the reply to the previously decrypted request. Must be
    /// called after [`Self::decrypt_request`]; consumes the context.
    pub fn encrypt_response(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let Some(context) = self.context.take() else {
            return Err(Error::Encryption(SERVER_ORDER_VIOLATION.to_string()));
        };
        let mut secret = [0u8; AEAD_KEY_SIZE];
        context
            .ctx
            .export(RESPONSE_LABEL, &mut secret)
            .map_err(|e| Error::Encryption(format!("secret export failed: {e}")))?;
        let mut response_nonce = [0u8; RESPONSE_NONCE_SIZE];
        OsRng.fill_bytes(&mut response_nonce);
        let (key, nonce) = response_key_schedule(&secret, &context.enc, &response_nonce)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::Encryption(e.to_string()))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), payload)
            .map_err(|_| Error::Encryption("response encryption failed".to_string()))?;
        let mut message = Vec::with_capacity(RESPONSE_NONCE_SIZE + ciphertext.len());
        message.extend_from_slice(&response_nonce);
        message.extend_from_slice(&ciphertext);
        Ok(message)
    }
}
