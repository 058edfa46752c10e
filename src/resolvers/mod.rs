pub mod address;
pub mod channel;
pub mod confirmation;
