pub mod prelude;

pub mod cart_items;
pub mod order_items;
pub mod orders;
pub mod product_assets;
pub mod product_colors;
pub mod products;
pub mod refresh_tokens;
pub mod transactions;
pub mod users;
