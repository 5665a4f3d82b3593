use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::spec::element::Element;
use crate::spec::slide::Slide;

/// Errors raised while loading a form definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("failed to parse form definition: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Form-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormSettings {
    pub id: String,
    /// Where the host should deliver answers; the engine never reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_url: Option<String>,
    #[serde(default)]
    pub is_auto_solvable: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Top-level slide form definition. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FormDefinition {
    pub settings: FormSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_slide: Option<Slide>,
    #[serde(default)]
    pub slides: Vec<Slide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_slide: Option<Slide>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Position of a slide inside the definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlideRef {
    Start,
    Body(usize),
    End,
}

impl FormDefinition {
    pub fn from_json(json: &str) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_value(value: Value) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn id(&self) -> &str {
        &self.settings.id
    }

    /// `[start?, ...slides, end?]` with absent optional slides filtered out.
    pub fn traversal(&self) -> Vec<SlideRef> {
        let mut entries = Vec::with_capacity(self.slides.len() + 2);
        if self.start_slide.is_some() {
            entries.push(SlideRef::Start);
        }
        entries.extend((0..self.slides.len()).map(SlideRef::Body));
        if self.end_slide.is_some() {
            entries.push(SlideRef::End);
        }
        entries
    }

    pub fn slide(&self, slide_ref: SlideRef) -> Option<&Slide> {
        match slide_ref {
            SlideRef::Start => self.start_slide.as_ref(),
            SlideRef::Body(index) => self.slides.get(index),
            SlideRef::End => self.end_slide.as_ref(),
        }
    }

    /// All elements in traversal order.
    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.traversal()
            .into_iter()
            .filter_map(|slide_ref| self.slide(slide_ref))
            .flat_map(|slide| slide.elements.iter())
    }

    pub fn named_elements(&self) -> impl Iterator<Item = &Element> {
        self.elements().filter(|element| element.name.is_some())
    }

    pub fn find_element(&self, name: &str) -> Option<&Element> {
        self.named_elements()
            .find(|element| element.name.as_deref() == Some(name))
    }
}
