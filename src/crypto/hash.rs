use sha3::{Digest, Keccak256};

/// Menghitung hash Keccak256 dari data byte
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Menghitung hash Keccak256 dan mengembalikan string hex dengan prefix 0x
pub fn keccak256_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(data)))
}
