//! Browser-side auth state, driven through the identity API.

pub mod context;
pub mod identity;

pub use context::{AuthContext, AuthSnapshot, Lifecycle, Navigation};
pub use identity::{ClientError, HttpIdentityApi, IdentityApi};
