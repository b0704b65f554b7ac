pub mod audit;
pub mod auth;
pub mod photo;
pub mod shared;
pub mod user;
