pub mod element;
pub mod form;
pub mod slide;

pub use element::{ChoiceOption, Condition, Element, ElementKind, ValueContract};
pub use form::{DefinitionError, FormDefinition, FormSettings, SlideRef};
pub use slide::{Slide, SlideOptions};
