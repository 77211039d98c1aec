pub const DESCRIPTION_PLACEHOLDER: &str = "*model_description*";

pub const MODELING_MARKER: &str = "STARTING 3D MODELING";

pub const DEFAULT_TEXT_MODEL: &str = "granite3.1-dense";

pub const INSTRUCTION_TEMPLATE: &str = "You are a 3D model prompt assistant. Take any vague elements and get creative with further supporting details. Wait for the user to explicitly state 'Create Model' when they are done describing their model. Only after hearing this phrase, generate a detailed 3D modeling prompt based on their input.

Include the text 'STARTING 3D MODELING' at the beginning of the generated prompt to signal the process is starting. Also keep the 3d model prompt to 300 characters or less.

Let's begin, *model_description*
Create Model.";

/// One completion request per triggered session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub model: String,
    pub description: String,
    pub prompt: String,
}

impl PromptRequest {
    pub fn new(description: &str, model: &str) -> Self {
        Self {
            model: model.to_string(),
            description: description.to_string(),
            prompt: INSTRUCTION_TEMPLATE.replace(DESCRIPTION_PLACEHOLDER, description),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PromptRequest, DESCRIPTION_PLACEHOLDER, INSTRUCTION_TEMPLATE, MODELING_MARKER};

    #[test]
    fn template_has_one_placeholder_and_the_marker() {
        assert_eq!(INSTRUCTION_TEMPLATE.matches(DESCRIPTION_PLACEHOLDER).count(), 1);
        assert!(INSTRUCTION_TEMPLATE.contains(MODELING_MARKER));
    }

    #[test]
    fn request_substitutes_description_literally() {
        let request = PromptRequest::new("a red chair with $1 legs", "granite3.1-dense");
        assert!(request.prompt.contains("Let's begin, a red chair with $1 legs\nCreate Model."));
        assert!(!request.prompt.contains(DESCRIPTION_PLACEHOLDER));
        assert_eq!(request.model, "granite3.1-dense");
        assert_eq!(request.description, "a red chair with $1 legs");
    }
}
