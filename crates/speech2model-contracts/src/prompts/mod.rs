mod extract;
mod template;

pub use extract::extract_modeling_prompt;
pub use template::{
    PromptRequest, DEFAULT_TEXT_MODEL, DESCRIPTION_PLACEHOLDER, INSTRUCTION_TEMPLATE,
    MODELING_MARKER,
};
