use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::spec::element::Element;

/// Per-slide navigation options.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SlideOptions {
    /// When this evaluates to false the slide is skipped on forward navigation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jump_condition: Option<String>,
    /// Display hint only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_progress: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An ordered, independently navigable group of elements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Slide {
    #[serde(default)]
    pub elements: Vec<Element>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slide_options: Option<SlideOptions>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Slide {
    pub fn jump_condition(&self) -> Option<&str> {
        self.slide_options
            .as_ref()
            .and_then(|options| options.jump_condition.as_deref())
            .filter(|condition| !condition.trim().is_empty())
    }

    pub fn named_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter().filter(|element| element.name.is_some())
    }
}
