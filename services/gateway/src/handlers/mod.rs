pub mod account;
pub mod health;
pub mod order;
pub mod ws;
