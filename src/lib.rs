pub mod shared;
pub mod verifier;
