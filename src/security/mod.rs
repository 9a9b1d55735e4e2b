pub mod password;

use sha2::{Digest, Sha256};

/// Stable, non-reversible token for an email address in log records.
pub fn redact_email(email: &str) -> String {
    let mut h = Sha256::new();
    h.update(email.trim().to_lowercase().as_bytes());
    let digest = format!("{:x}", h.finalize());
    digest[..12].to_string()
}
