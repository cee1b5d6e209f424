//! Context derivation from a CBOR input-parameter map.
//!
//! ```text
//! {
//!   1 : bstr,   ; master secret (required)
//!   2 : bstr,   ; client id (required)
//!   3 : bstr,   ; server id (required)
//!   4 : int,    ; HKDF algorithm
//!   5 : int,    ; AEAD algorithm
//!   6 : bstr,   ; master salt
//!   7 : bstr,   ; ID context
//! }
//! ```

use ciborium::value::Value;

use crate::core::{
    ContextConfig, ContextError, PARAM_ALG, PARAM_CLIENT_ID, PARAM_CONTEXT_ID, PARAM_HKDF,
    PARAM_MASTER_SECRET, PARAM_SALT, PARAM_SERVER_ID,
};

use super::keying::{ContextCounter, MasterKeying};
use super::security::SecurityContext;

/// Which end of the exchange is deriving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EndpointRole {
    /// Client: sends as the client id.
    Client,
    /// Server: sends as the server id.
    Server,
}

/// Decoded input-parameter map.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContextParams {
    /// Master secret.
    pub master_secret: Vec<u8>,
    /// Client id.
    pub client_id: Vec<u8>,
    /// Server id.
    pub server_id: Vec<u8>,
    /// HKDF algorithm, if given.
    pub kdf: Option<i64>,
    /// AEAD algorithm, if given.
    pub aead: Option<i64>,
    /// Master salt, if given.
    pub salt: Option<Vec<u8>>,
    /// ID context, if given.
    pub context_id: Option<Vec<u8>>,
}

impl ContextParams {
    /// Decode a CBOR-encoded parameter map.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, ContextError> {
        let value: Value = ciborium::de::from_reader(bytes)
            .map_err(|e| ContextError::InvalidParameters(e.to_string()))?;
        Self::from_value(&value)
    }

    /// Read a parameter map.
    pub fn from_value(value: &Value) -> Result<Self, ContextError> {
        let entries = value
            .as_map()
            .ok_or_else(|| invalid("parameters must be a map"))?;
        let lookup = |label: i64| {
            entries.iter().find_map(|(key, value)| match key {
                Value::Integer(key) if i128::from(*key) == i128::from(label) => Some(value),
                _ => None,
            })
        };

        let required = |label: i64, name: &str| -> Result<Vec<u8>, ContextError> {
            let value = lookup(label).ok_or_else(|| invalid(&format!("missing {name}")))?;
            bytes(value, name)
        };
        let optional_bytes = |label: i64, name: &str| lookup(label).map(|v| bytes(v, name)).transpose();
        let optional_int = |label: i64, name: &str| lookup(label).map(|v| int(v, name)).transpose();

        Ok(Self {
            master_secret: required(PARAM_MASTER_SECRET, "master secret")?,
            client_id: required(PARAM_CLIENT_ID, "client id")?,
            server_id: required(PARAM_SERVER_ID, "server id")?,
            kdf: optional_int(PARAM_HKDF, "HKDF algorithm")?,
            aead: optional_int(PARAM_ALG, "AEAD algorithm")?,
            salt: optional_bytes(PARAM_SALT, "master salt")?,
            context_id: optional_bytes(PARAM_CONTEXT_ID, "ID context")?,
        })
    }

    /// Encode as a parameter map, omitting absent optional entries.
    pub fn to_value(&self) -> Value {
        let label = |l: i64| Value::Integer(l.into());
        let mut entries = vec![
            (label(PARAM_MASTER_SECRET), Value::Bytes(self.master_secret.clone())),
            (label(PARAM_CLIENT_ID), Value::Bytes(self.client_id.clone())),
            (label(PARAM_SERVER_ID), Value::Bytes(self.server_id.clone())),
        ];
        if let Some(kdf) = self.kdf {
            entries.push((label(PARAM_HKDF), Value::Integer(kdf.into())));
        }
        if let Some(aead) = self.aead {
            entries.push((label(PARAM_ALG), Value::Integer(aead.into())));
        }
        if let Some(salt) = &self.salt {
            entries.push((label(PARAM_SALT), Value::Bytes(salt.clone())));
        }
        if let Some(context_id) = &self.context_id {
            entries.push((label(PARAM_CONTEXT_ID), Value::Bytes(context_id.clone())));
        }
        Value::Map(entries)
    }

    /// CBOR encoding of [`to_value`](Self::to_value).
    pub fn to_cbor(&self) -> Result<Vec<u8>, ContextError> {
        let mut out = Vec::new();
        ciborium::ser::into_writer(&self.to_value(), &mut out)
            .map_err(|e| ContextError::InvalidParameters(e.to_string()))?;
        Ok(out)
    }

    /// Keying for these parameters. The salt is extended with
    /// `nonce1 || nonce2` when a nonce pair is given.
    pub fn keying(&self, nonces: Option<(&[u8], &[u8])>, config: ContextConfig) -> MasterKeying {
        let mut salt = self.salt.clone().unwrap_or_default();
        if let Some((nonce1, nonce2)) = nonces {
            salt.extend_from_slice(nonce1);
            salt.extend_from_slice(nonce2);
        }

        let mut keying = MasterKeying::new(self.master_secret.clone())
            .with_salt(salt)
            .with_config(config);
        if let Some(aead) = self.aead {
            keying = keying.with_aead(aead);
        }
        if let Some(kdf) = self.kdf {
            keying = keying.with_kdf(kdf);
        }
        if let Some(context_id) = &self.context_id {
            keying = keying.with_id_context(context_id.clone());
        }
        keying
    }

    /// Derive the context for `role`: a client sends as the client id, a
    /// server as the server id.
    pub fn derive(
        &self,
        role: EndpointRole,
        nonces: Option<(&[u8], &[u8])>,
        config: ContextConfig,
        counter: &ContextCounter,
    ) -> Result<SecurityContext, ContextError> {
        let (sender_id, recipient_id) = match role {
            EndpointRole::Client => (&self.client_id, &self.server_id),
            EndpointRole::Server => (&self.server_id, &self.client_id),
        };
        SecurityContext::derive(self.keying(nonces, config), sender_id, recipient_id, counter)
    }
}

fn invalid(message: &str) -> ContextError {
    ContextError::InvalidParameters(message.to_owned())
}

fn bytes(value: &Value, name: &str) -> Result<Vec<u8>, ContextError> {
    value
        .as_bytes()
        .cloned()
        .ok_or_else(|| invalid(&format!("{name} must be a byte string")))
}

fn int(value: &Value, name: &str) -> Result<i64, ContextError> {
    value
        .as_integer()
        .and_then(|i| i64::try_from(i).ok())
        .ok_or_else(|| invalid(&format!("{name} must be an integer")))
}
