use std::collections::BTreeMap;

use crate::answers::AnswersMap;
use crate::expr::evaluate_condition;
use crate::spec::element::Element;
use crate::spec::form::FormDefinition;
use crate::spec::slide::Slide;

/// Visibility of every named element, keyed by name.
pub type VisibilityMap = BTreeMap<String, bool>;

pub fn is_visible(element: &Element, answers: &AnswersMap) -> bool {
    evaluate_condition(element.display_condition(), answers)
}

/// A slide without a jump condition is always reachable.
pub fn is_reachable(slide: &Slide, answers: &AnswersMap) -> bool {
    evaluate_condition(slide.jump_condition(), answers)
}

pub fn visible_elements<'a>(
    slide: &'a Slide,
    answers: &'a AnswersMap,
) -> impl Iterator<Item = &'a Element> + 'a {
    slide
        .elements
        .iter()
        .filter(move |element| is_visible(element, answers))
}

pub fn resolve_visibility(definition: &FormDefinition, answers: &AnswersMap) -> VisibilityMap {
    definition
        .named_elements()
        .filter_map(|element| {
            let name = element.name.as_ref()?;
            Some((name.clone(), is_visible(element, answers)))
        })
        .collect()
}
