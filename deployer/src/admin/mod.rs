//! Administrative boundary
//!
//! Each service asserts the project association of whatever it is handed,
//! asks the [`authz::AuthorizationCheck`], then calls into the core.

pub mod authz;
pub mod deployments;
pub mod folders;
pub mod servers;
