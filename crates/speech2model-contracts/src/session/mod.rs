mod buffer;
mod interpreter;

pub use buffer::SessionBuffer;
pub use interpreter::{CommandInterpreter, FeedOutcome, InterpreterState};
