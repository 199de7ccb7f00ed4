//! Wire models exchanged with the storefront backend.
//!
//! Field names follow the backend's JSON exactly (`snake_case`), so most
//! types derive `Serialize`/`Deserialize` without renames.

pub mod cart;
pub mod order;
pub mod product;
pub mod user;

pub use cart::*;
pub use order::*;
pub use product::*;
pub use user::*;
