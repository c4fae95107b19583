// src/crypto/mod.rs
pub mod hash;
pub mod webhook;
