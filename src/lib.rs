pub mod amount;
pub mod csv;
pub mod draw;
pub mod engine;
pub mod model;
pub mod store;

pub use amount::{Amount, Odds};
pub use engine::{CoreError, Engine};
pub use model::{AccountId, Caller, Command, Role};
