pub mod record;
pub mod relation;
pub mod stored;

pub use record::*;
pub use relation::*;
pub use stored::*;
