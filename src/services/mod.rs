pub mod content_extractor;
pub mod droid;
pub mod field_extractor;
pub mod openai_client;
pub mod pipeline;
pub mod resolver;
pub mod writer;

pub use content_extractor::*;
pub use droid::*;
pub use field_extractor::*;
pub use openai_client::*;
pub use pipeline::*;
pub use resolver::*;
pub use writer::*;
