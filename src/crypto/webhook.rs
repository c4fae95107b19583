use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::constants::SIGNATURE_SCHEME_PREFIX;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Struct untuk verifikasi tanda tangan webhook (HMAC-SHA256)
pub struct WebhookVerifier;

impl WebhookVerifier {
    /// Memverifikasi header `v0=<hex>` terhadap body mentah dari provider.
    /// body: Raw bytes persis seperti yang diterima, sebelum JSON parsing
    pub fn verify(secret: &str, body: &[u8], signature_header: &str) -> Result<()> {
        let hex_part = signature_header
            .trim()
            .strip_prefix(SIGNATURE_SCHEME_PREFIX)
            .ok_or(AppError::InvalidSignature)?;

        let provided = hex::decode(hex_part).map_err(|_| AppError::InvalidSignature)?;

        let expected = Self::digest(secret, body);
        if bool::from(expected.ct_eq(provided.as_slice())) {
            Ok(())
        } else {
            Err(AppError::InvalidSignature)
        }
    }

    /// Menghasilkan nilai header untuk body tertentu (dipakai tooling dan test)
    pub fn sign(secret: &str, body: &[u8]) -> String {
        format!(
            "{}{}",
            SIGNATURE_SCHEME_PREFIX,
            hex::encode(Self::digest(secret, body))
        )
    }

    fn digest(secret: &str, body: &[u8]) -> [u8; 32] {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(body);
        mac.finalize().into_bytes().into()
    }
}
