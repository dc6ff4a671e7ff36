mod chain_state;
mod event_source;
mod handler;
mod pagination;
mod repository;

pub use chain_state::*;
pub use event_source::*;
pub use handler::*;
pub use pagination::*;
pub use repository::*;
