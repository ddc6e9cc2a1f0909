pub mod fallback;
pub mod record;
pub mod subject;

pub use fallback::*;
pub use record::*;
pub use subject::*;
