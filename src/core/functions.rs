//! Functions the assistant model may ask the site to run.
//!
//! The backend only advertises these; the browser executes them when a
//! function-call token arrives on the chat stream.

use serde_json::json;

use crate::api::FunctionDefinition;

pub const GET_TRAINING_DATA: &str = "get_training_data";
pub const RENDER_BOX_COMPONENT: &str = "render_box_component";

/// Content boxes the front end knows how to render.
pub const BOX_COMPONENTS: &[&str] = &["about", "projects", "experience", "contact", "booking"];

pub fn declared_functions() -> Vec<FunctionDefinition> {
    vec![
        FunctionDefinition {
            name: GET_TRAINING_DATA.to_string(),
            description: Some(
                "Fetch background facts about the site owner's work, skills and projects \
                 when the visitor asks something the conversation does not already answer."
                    .to_string(),
            ),
            parameters: json!({
                "type": "object",
                "properties": {},
            }),
        },
        FunctionDefinition {
            name: RENDER_BOX_COMPONENT.to_string(),
            description: Some(
                "Show one of the site's content boxes next to the chat, e.g. the project \
                 list when the visitor asks to see recent work."
                    .to_string(),
            ),
            parameters: json!({
                "type": "object",
                "properties": {
                    "component": {
                        "type": "string",
                        "enum": BOX_COMPONENTS,
                        "description": "Which box to display",
                    },
                },
                "required": ["component"],
            }),
        },
    ]
}
