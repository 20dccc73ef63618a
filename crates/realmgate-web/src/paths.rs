//! Redirect targets.

pub const USERS: &str = "/users";
pub const REALM: &str = "/realm";
pub const SIGNOUT: &str = "/signout";
