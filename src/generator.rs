//! Short code generation
//!
//! Generators only produce candidates. Uniqueness against the store is
//! checked by the shortening service, which retries on collision.

use rand::{distr::Alphanumeric, Rng};

/// Length of every short code
pub const CODE_LENGTH: usize = 7;

pub trait Generator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

/// Uniform random codes over `[A-Za-z0-9]`, 62^7 possibilities
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomGenerator;

impl Generator for RandomGenerator {
    fn generate(&self) -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(CODE_LENGTH)
            .map(char::from)
            .collect()
    }
}

/// Checks the shape of a code without touching any storage
pub fn is_well_formed(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_alphanumeric())
}
