use std::sync::Arc;

use tracing::debug;

use crate::params::RequestParams;
use crate::reactive::{Memo, Signal};

use super::codec::QueryCodec;
use super::{DataStore, DataStoreFactory, StoreListener, StoreSubscription};

/// Store over an externally owned query-string signal.
///
/// The parsed value is a memo over the string, so whoever owns the string
/// (a router, a history integration) can rewrite it and the engine picks the
/// change up on its own.
#[derive(Debug, Clone)]
pub struct StringStore {
    source: Signal<String>,
    codec: Arc<QueryCodec>,
    parsed: Memo<RequestParams>,
}

impl StringStore {
    /// Wrap `source`. An empty source is seeded with `initial`.
    pub fn new(source: Signal<String>, codec: QueryCodec, initial: &RequestParams) -> Self {
        let codec = Arc::new(codec);

        let current = source.get_untracked();
        if current.strip_prefix('?').unwrap_or(&current).is_empty() {
            let seeded = codec.stringify(initial);
            if !seeded.is_empty() {
                debug!(query = %seeded, "seeding empty query string");
                source.set(seeded);
            }
        }

        let parsed = {
            let source = source.clone();
            let codec = codec.clone();
            Memo::new(move || source.with(|query| codec.parse(query)))
        };

        Self {
            source,
            codec,
            parsed,
        }
    }

    /// Factory for [`crate::FilterlistBuilder::store`].
    ///
    /// The engine's initial parameters carry its default sort direction,
    /// which the codec then reports for queries without a sort key.
    pub fn factory(source: Signal<String>, codec: QueryCodec) -> DataStoreFactory {
        Box::new(move |initial| {
            let codec = codec.with_default_sort_asc(initial.sort.asc);
            Arc::new(Self::new(source, codec, initial)) as Arc<dyn DataStore>
        })
    }

    /// The current query string.
    pub fn query(&self) -> String {
        self.source.get_untracked()
    }

    pub fn codec(&self) -> &QueryCodec {
        &self.codec
    }
}

impl DataStore for StringStore {
    fn value(&self) -> RequestParams {
        self.parsed.get()
    }

    fn set_value(&self, next: RequestParams) {
        self.source.set_if_changed(self.codec.stringify(&next));
    }

    fn subscribe(&self, listener: StoreListener) -> StoreSubscription {
        let parsed = self.parsed.clone();
        StoreSubscription::watch(move || parsed.get(), listener)
    }
}
