mod adapter;
mod stream;

pub use adapter::*;
pub use stream::*;
