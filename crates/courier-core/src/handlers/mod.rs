//! Handlers for the operations around the status engine.
//!
//! Checkout creates orders, dispatch records which driver carries an order,
//! and the catalog registers the menu items checkout prices against.

pub mod catalog;
pub mod checkout;
pub mod dispatch;

pub use catalog::CatalogHandler;
pub use checkout::CheckoutHandler;
pub use dispatch::DispatchHandler;
