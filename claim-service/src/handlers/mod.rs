pub mod admin;
pub mod claim;
pub mod health;
pub mod session;
pub mod webauthn;
