pub mod attest;
pub mod fetch;
pub mod resolve;
