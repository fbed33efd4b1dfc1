pub mod cover;
pub mod selection;
pub mod session;
pub mod submit;
