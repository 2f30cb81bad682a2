//! Cross-field consistency checks over fetched collections.

use serde::Serialize;

/// A named predicate with the message reported when it fails.
pub struct Validator<T> {
    pub name: String,
    pub message: String,
    check: Box<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T> Validator<T> {
    pub fn new<F>(name: impl Into<String>, message: impl Into<String>, check: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            message: message.into(),
            check: Box::new(check),
        }
    }

    pub fn check(&self, item: &T) -> bool {
        (self.check)(item)
    }
}

impl<T> std::fmt::Debug for Validator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("name", &self.name)
            .field("message", &self.message)
            .finish_non_exhaustive()
    }
}

/// Outcome of running validators over a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub is_valid: bool,
    pub checked: usize,
    pub errors: Vec<String>,
}

/// Run every validator over every item, collecting one error per failure.
pub fn validate_items<T>(items: &[T], validators: &[Validator<T>]) -> ConsistencyReport {
    let errors: Vec<String> = items
        .iter()
        .enumerate()
        .flat_map(|(index, item)| {
            validators
                .iter()
                .filter(move |v| !v.check(item))
                .map(move |v| format!("Item {index}: {} ({})", v.message, v.name))
        })
        .collect();

    ConsistencyReport {
        is_valid: errors.is_empty(),
        checked: items.len(),
        errors,
    }
}
