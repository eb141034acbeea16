pub mod hand;
pub mod utils;
