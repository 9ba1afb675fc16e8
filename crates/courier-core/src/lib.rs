//! Core order lifecycle engine for the courier service.
//!
//! Owns the order status state machine: the transition table, the ownership
//! rules deciding who may move an order, and the atomic update of an order
//! together with its audit history. Checkout, driver dispatch and the menu
//! catalog live alongside it, and the builder wires everything to the
//! storage and authentication backends named in configuration.

pub mod auth;
pub mod builder;
pub mod engine;
pub mod handlers;
pub mod state;

pub use auth::{AuthError, AuthService, Authenticator};
pub use builder::{BuilderError, Courier, CourierBuilder, CourierFactories};
pub use engine::{event_bus::EventBus, EngineError, OrderLifecycleEngine};
pub use state::TransitionTable;
