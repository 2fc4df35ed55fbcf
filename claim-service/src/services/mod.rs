pub mod binder;
pub mod delivery;
pub mod issuer;
pub mod otp;
pub mod redeemer;
pub mod resolver;
pub mod session;
pub mod webauthn;
