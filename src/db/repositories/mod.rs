pub mod cart;
pub mod order;
pub mod product;
pub mod refresh_token;
pub mod transaction;
pub mod user;
