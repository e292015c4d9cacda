//! # Feature: Prompt Catalog
//!
//! One-click product-photo presets, the context-placement template and the
//! aspect-ratio directives appended to placement requests.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 1.0.0: Object/handbag/pants/shirt isolation presets, landscape and portrait directives

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub id: &'static str,
    pub label: &'static str,
    pub prompt: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        id: "isolate_object",
        label: "Isolate object",
        prompt: "Identify the main object in this image. Isolate it completely, removing any people, hands, or other secondary objects. The final image should feature only the main object, fully intact, on a pure white background.",
    },
    Preset {
        id: "handbag",
        label: "Handbag",
        prompt: "Precisely isolate the handbag in this image. Remove any person, hands, or other objects holding or near the bag. The final image should show only the handbag, complete and intact, on a pure white background.",
    },
    Preset {
        id: "pants",
        label: "Pants",
        prompt: "Precisely isolate the pants in this image. Remove the person wearing them and any other objects. The final image should show only the pants, laid flat as if for a product photo, on a pure white background.",
    },
    Preset {
        id: "shirt",
        label: "Shirt",
        prompt: "Precisely isolate the shirt or top garment in this image. Remove the person wearing it and any other objects. The final image should show only the shirt/top, laid flat as if for a product photo, on a pure white background.",
    },
];

pub fn get_preset(id: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.id == id)
}

/// Orientation requested for context-placement output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectPreference {
    #[default]
    Auto,
    Landscape,
    Portrait,
}

impl AspectPreference {
    pub fn directive(&self) -> Option<&'static str> {
        match self {
            AspectPreference::Auto => None,
            AspectPreference::Landscape => Some("The final image must have a landscape orientation (e.g. a 16:9 aspect ratio)."),
            AspectPreference::Portrait => Some("The final image must have a portrait orientation (e.g. a 9:16 aspect ratio)."),
        }
    }
}

/// How a submission treats the current image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    /// Apply the instruction as written, one result.
    DirectEdit,
    /// Drop the isolated subject into a new scene, two variants.
    ContextPlacement,
}

impl EditMode {
    pub fn image_count(&self) -> usize {
        match self {
            EditMode::DirectEdit => 1,
            EditMode::ContextPlacement => 2,
        }
    }
}

/// Builds the text actually sent to the model.
pub fn build_instruction(instruction: &str, mode: EditMode, aspect: AspectPreference) -> String {
    match mode {
        EditMode::DirectEdit => instruction.to_string(),
        EditMode::ContextPlacement => {
            let mut prompt = format!(
                "Take the primary object from this image, which is isolated on a white background, and place it realistically into the following new scene or context: \"{}\". Ensure the lighting, shadows, and perspective match the new environment. Do not add any logos or watermarks.",
                instruction
            );
            if let Some(directive) = aspect.directive() {
                prompt.push(' ');
                prompt.push_str(directive);
            }
            prompt
        }
    }
}
