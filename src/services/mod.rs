pub mod accounting;
pub mod crypto;
pub mod stripe;
