mod completion;
mod dispatch;
mod engine;
mod op;
mod registry;

pub use completion::*;
pub use dispatch::*;
pub use engine::*;
pub use op::*;
pub use registry::*;
