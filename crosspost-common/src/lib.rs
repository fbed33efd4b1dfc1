pub mod id;
pub mod model;
pub mod util;
