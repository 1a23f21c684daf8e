pub mod account;
pub mod admin;
pub mod pick;
pub mod standings;
pub mod stats;
pub mod week;
