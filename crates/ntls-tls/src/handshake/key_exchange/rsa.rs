//! RSA key transport (RFC 5246 7.4.7.1).

use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use subtle::{ConditionallySelectable, ConstantTimeEq};

use crate::buffer::{SecureBuffer, TlsReader, TlsWriter};
use crate::crypt::key_schedule::MASTER_SECRET_LEN;
use ntls_types::TlsError;

/// Length of the RSA-encrypted pre-master secret.
pub const PRE_MASTER_SECRET_LEN: usize = MASTER_SECRET_LEN;

#[derive(Default)]
pub struct RsaKeyExchange {
    encrypted: Vec<u8>,
    pub(super) pre_master_secret: Option<SecureBuffer>,
}

fn random_pre_master_secret(client_version: u16) -> Result<SecureBuffer, TlsError> {
    let mut pms = SecureBuffer::random(PRE_MASTER_SECRET_LEN)?;
    pms[..2].copy_from_slice(&client_version.to_be_bytes());
    Ok(pms)
}

impl RsaKeyExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// `client_version || random[46]`, encrypted to the server key.
    pub fn generate_client(&mut self, client_version: u16, server_key: &RsaPublicKey) -> Result<(), TlsError> {
        let pms = random_pre_master_secret(client_version)?;
        self.encrypted = server_key
            .encrypt(&mut rand::rngs::OsRng, Pkcs1v15Encrypt, &pms)
            .map_err(|_| TlsError::internal_error("RSA encryption of the pre-master secret failed"))?;
        self.pre_master_secret = Some(pms);
        Ok(())
    }

    pub fn write_client(&self) -> Result<Vec<u8>, TlsError> {
        let mut w = TlsWriter::with_capacity(self.encrypted.len() + 2);
        w.write_vec16(&self.encrypted)?;
        Ok(w.into_vec())
    }

    /// Decrypt the client's pre-master secret.
    ///
    /// A decryption failure, a wrong length or a version mismatch all yield a
    /// random secret instead, so the failure only shows up at Finished.
    pub fn handle_client(&mut self, body: &[u8], key: &RsaPrivateKey, client_version: u16) -> Result<(), TlsError> {
        let mut r = TlsReader::new(body);
        let encrypted = r.read_vec16()?;
        r.expect_end("ClientKeyExchange")?;

        let fallback = random_pre_master_secret(client_version)?;
        let decrypted = SecureBuffer::from_vec(
            key.decrypt(Pkcs1v15Encrypt, encrypted).unwrap_or_default(),
        );
        let candidate = if decrypted.len() == PRE_MASTER_SECRET_LEN {
            decrypted
        } else {
            SecureBuffer::new(PRE_MASTER_SECRET_LEN)
        };
        let good = decrypted_version_ok(&candidate, client_version);

        let mut pms = SecureBuffer::new(PRE_MASTER_SECRET_LEN);
        for (i, out) in pms.iter_mut().enumerate() {
            *out = u8::conditional_select(&fallback[i], &candidate[i], good);
        }
        self.pre_master_secret = Some(pms);
        Ok(())
    }
}

fn decrypted_version_ok(pms: &[u8], client_version: u16) -> subtle::Choice {
    let v = client_version.to_be_bytes();
    pms[0].ct_eq(&v[0]) & pms[1].ct_eq(&v[1])
}
