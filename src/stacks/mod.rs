//! The two stacks of a deployment: storage and delivery

pub mod delivery;
pub mod storage;

pub use delivery::{DeliveryStack, DeliveryStackProps, DOMAIN_OUTPUT};
pub use storage::{StorageStack, StorageStackProps};
