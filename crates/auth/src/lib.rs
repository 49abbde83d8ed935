//! `kardex-auth`: role based authorization for commands.
//!
//! Decoupled from sessions and storage: callers supply the actor's role, this
//! crate answers whether that role holds a permission.

pub mod authorize;
pub mod permissions;
pub mod roles;

pub use authorize::{AuthzError, CommandAuthorization, RolePermissions};
pub use permissions::Permission;
pub use roles::Role;
