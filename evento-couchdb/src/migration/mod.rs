mod adapter;
mod record;
mod schema;

pub use adapter::*;
pub use record::*;
pub use schema::*;
