use serde::de::DeserializeOwned;
use serde::Serialize;

/// A scenario-scoped parameter layer owned by one action.
///
/// The context visible at position `i` of a scenario is the fold of the
/// layers of actions `0..=i`, where fields set by a later layer override the
/// same fields of an earlier one.
pub trait ContextLayer:
    Default + Clone + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Copy every field that `newer` has set over the fields of `self`.
    fn overlay(&mut self, newer: &Self);

    /// The value of a named business key, if this context establishes it.
    fn business_key(&self, _name: &str) -> Option<String> {
        None
    }
}

/// Fold a sequence of layers, oldest first, into the resolved context.
pub fn resolve<'a, C, I>(layers: I) -> C
where
    C: ContextLayer,
    I: IntoIterator<Item = &'a C>,
{
    let mut resolved = C::default();
    for layer in layers {
        resolved.overlay(layer);
    }
    resolved
}

/// Overlay helper for `Option` fields: a set field in `newer` wins.
pub fn overlay_field<T: Clone>(target: &mut Option<T>, newer: &Option<T>) {
    if let Some(value) = newer {
        *target = Some(value.clone());
    }
}
