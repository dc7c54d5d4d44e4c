//! HTTP API handlers for rabdap-id

pub mod health;
pub mod identities;

pub use health::health_routes;
pub use identities::identity_routes;
