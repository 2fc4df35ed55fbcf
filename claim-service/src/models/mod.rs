pub mod bin;
pub mod claim_token;
pub mod contact;
pub mod credential;
pub mod membership;
pub mod role;
pub mod user;
pub mod verification;

pub use bin::Bin;
pub use claim_token::{random_token, ClaimToken};
pub use contact::{normalize_email, normalize_phone, ClaimContact};
pub use credential::WebAuthnCredential;
pub use membership::BinMembership;
pub use role::Role;
pub use user::User;
pub use verification::{ChannelType, ContactVerification};
