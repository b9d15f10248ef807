pub mod models;
pub mod order_locks;
pub mod signature;
pub mod url_builder;
pub mod woocommerce;
