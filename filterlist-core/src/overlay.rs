//! Ordered overlays on top of the store's request parameters.
//!
//! The request parameters the engine loads with are the store's value with
//! each overlay applied in order. The persistence overlay, when present, is
//! always the last layer and therefore wins.

use std::sync::Arc;

use crate::params::RequestParams;

/// One named layer over the request parameters.
///
/// Reads of reactive cells inside [`ParamsOverlay::apply`] are tracked, so
/// an overlay backed by a signal re-derives the parameters when it changes.
pub trait ParamsOverlay: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, params: &mut RequestParams);
}

/// Layers applied to the store value, in order.
#[derive(Clone, Default)]
pub struct OverlayStack {
    layers: Vec<Arc<dyn ParamsOverlay>>,
}

impl OverlayStack {
    /// Stack of `layers` followed by the persistence layer.
    pub fn new(layers: Vec<Arc<dyn ParamsOverlay>>, persistence: Option<Arc<dyn ParamsOverlay>>) -> Self {
        let mut layers = layers;
        layers.extend(persistence);
        Self { layers }
    }

    pub fn apply(&self, mut params: RequestParams) -> RequestParams {
        for layer in &self.layers {
            layer.apply(&mut params);
        }
        params
    }

    /// Layer names in application order.
    pub fn names(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.name()).collect()
    }
}

impl std::fmt::Debug for OverlayStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPage(&'static str, u32);

    impl ParamsOverlay for FixedPage {
        fn name(&self) -> &str {
            self.0
        }

        fn apply(&self, params: &mut RequestParams) {
            params.page = self.1;
        }
    }

    #[test]
    fn persistence_layer_applies_last() {
        let stack = OverlayStack::new(
            vec![Arc::new(FixedPage("first", 2)), Arc::new(FixedPage("second", 3))],
            Some(Arc::new(FixedPage("persist", 9))),
        );

        assert_eq!(stack.names(), vec!["first", "second", "persist"]);
        assert_eq!(stack.apply(RequestParams::default()).page, 9);
    }

    #[test]
    fn empty_stack_is_identity() {
        let params = RequestParams::default().with_page(4);
        assert_eq!(OverlayStack::default().apply(params.clone()), params);
    }
}
