pub mod events;
pub mod jobs;
pub mod prompts;
pub mod runs;
pub mod session;
pub mod voice;
