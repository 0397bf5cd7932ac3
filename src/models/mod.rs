pub mod media_purchase;
pub mod message;
pub mod money;
pub mod payment;
pub mod plan;
pub mod purchase;
pub mod subscription;
pub mod user;
