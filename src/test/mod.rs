mod store;
mod utils;
mod view;

pub use utils::test_utils;
