//! Authentication and authorization: JWT verification, entitlement
//! lookups against the authorization service, and the request gate that
//! ties them together.

pub mod entitlements;
pub mod gate;
pub mod token;

pub use entitlements::{EntitlementProvider, HttpEntitlementProvider};
pub use gate::{permission_middleware, PermissionGate};
pub use token::{Identity, Role, TokenAuthenticator};
