//
// src/proxy/mod.rs
//
mod backend;
mod pool;
mod relay;

pub use backend::{AddressParseError, BackendAddress};
pub use pool::BackendList;
pub use relay::{relay, RelayOutcome, RelaySession};
