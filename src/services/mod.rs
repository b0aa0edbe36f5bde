pub mod image;
pub mod mail;
pub mod tokens;

pub use mail::{LogMailer, MailError, Mailer, SmtpMailer};
pub use tokens::TokenService;

pub mod scheduler;
pub use scheduler::Scheduler;

pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{AuthError, AuthService, SessionTokens};
pub use auth_service_impl::SeaOrmAuthService;

pub mod user_service;
pub mod user_service_impl;
pub use user_service::{Registration, UserError, UserService};
pub use user_service_impl::SeaOrmUserService;

pub mod product_service;
pub mod product_service_impl;
pub use product_service::{
    ProductDetail, ProductDraft, ProductError, ProductListQuery, ProductPatch, ProductService,
};
pub use product_service_impl::SeaOrmProductService;

pub mod cart_service;
pub mod cart_service_impl;
pub use cart_service::{CartError, CartService, CartView};
pub use cart_service_impl::SeaOrmCartService;

pub mod order_service;
pub mod order_service_impl;
pub use order_service::{
    Buyer, CheckoutCompletion, CompletionOutcome, OrderError, OrderService, Requester,
    ShippingDetails,
};
pub use order_service_impl::SeaOrmOrderService;
