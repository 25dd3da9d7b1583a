pub mod post_flow;

pub use post_flow::{PostFlow, PostHandler, ProcessResult};
