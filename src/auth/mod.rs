pub mod identity;
pub mod permissions;
pub mod provider;
pub mod session;

pub use identity::*;
pub use permissions::*;
pub use provider::*;
pub use session::*;
