pub use super::cart_items::Entity as CartItems;
pub use super::order_items::Entity as OrderItems;
pub use super::orders::Entity as Orders;
pub use super::product_assets::Entity as ProductAssets;
pub use super::product_colors::Entity as ProductColors;
pub use super::products::Entity as Products;
pub use super::refresh_tokens::Entity as RefreshTokens;
pub use super::transactions::Entity as Transactions;
pub use super::users::Entity as Users;
