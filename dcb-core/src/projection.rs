//! The projection engine: fold multiple named projectors over one shared
//! stream and derive an `AppendCondition` for the decide-then-append loop.
//!
//! Projectors may carry distinct `State` types in the same `project` call.
//! The teacher crate (`disintegrate::state::MultiState`) solves the
//! equivalent heterogeneous-state problem with macro-generated typed tuples
//! bounded to a fixed arity; here projector sets are built at runtime with
//! unbounded arity, so states are type-erased behind `Box<dyn Any>` instead
//! and recovered through `States::get`.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::{oneshot, Semaphore};

use crate::condition::AppendCondition;
use crate::config::StoreConfig;
use crate::error::{Error, ResourceError};
use crate::event::StoredEvent;
use crate::query::{Cursor, Query};
use crate::store::EventStore;

/// A pure fold from matched events to a state value.
///
/// `State` must be `Clone` so `project_stream` can hand out an immutable
/// snapshot after every event without requiring exclusive access to the
/// fold-in-progress map.
pub trait Projector: Send + Sync {
    type State: Clone + Send + Sync + 'static;

    /// Identifies this projector within one `project`/`project_stream` call.
    fn id(&self) -> &str;

    /// Events this projector wants to see.
    fn query(&self) -> &Query;

    fn initial_state(&self) -> Self::State;

    /// Must be pure: no I/O, no panics on well-formed input.
    fn transition(&self, state: Self::State, event: &StoredEvent) -> Self::State;
}

type AnyState = Box<dyn Any + Send + Sync>;

/// Object-safe, type-erased view of a `Projector`, used internally so a
/// `Vec` of heterogeneous projectors can be driven by one engine.
trait ErasedProjector: Send + Sync {
    fn id(&self) -> &str;
    fn query(&self) -> &Query;
    fn initial_state_erased(&self) -> AnyState;
    fn transition_erased(&self, state: AnyState, event: &StoredEvent) -> AnyState;
    fn clone_state_erased(&self, state: &AnyState) -> AnyState;
}

struct ErasedProjectorImpl<P>(P);

impl<P> ErasedProjector for ErasedProjectorImpl<P>
where
    P: Projector,
{
    fn id(&self) -> &str {
        self.0.id()
    }

    fn query(&self) -> &Query {
        self.0.query()
    }

    fn initial_state_erased(&self) -> AnyState {
        Box::new(self.0.initial_state())
    }

    fn transition_erased(&self, state: AnyState, event: &StoredEvent) -> AnyState {
        let state = *state
            .downcast::<P::State>()
            .expect("projector state type is stable across one project call");
        Box::new(self.0.transition(state, event))
    }

    fn clone_state_erased(&self, state: &AnyState) -> AnyState {
        let state = state
            .downcast_ref::<P::State>()
            .expect("projector state type is stable across one project call");
        Box::new(state.clone())
    }
}

/// A projector handed to `ProjectionEngine::project`/`project_stream`.
pub struct BoxedProjector(Box<dyn ErasedProjector>);

impl BoxedProjector {
    pub fn new<P: Projector + 'static>(projector: P) -> Self {
        Self(Box::new(ErasedProjectorImpl(projector)))
    }
}

/// The states produced by one `project`/`project_stream` call, keyed by
/// projector id. Retrieve a concrete state with [`States::get`].
#[derive(Default)]
pub struct States(HashMap<String, AnyState>);

impl States {
    /// Downcasts the state stored for `id`. Returns `None` if `T` does not
    /// match the type the projector with that id was declared with, or if
    /// no projector with that id ran.
    pub fn get<T: 'static>(&self, id: &str) -> Option<&T> {
        self.0.get(id).and_then(|b| b.downcast_ref::<T>())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|s| s.as_str())
    }
}

/// Runs projections against an `EventStore`, enforcing the process-wide
/// concurrency guard.
pub struct ProjectionEngine<ES> {
    store: Arc<ES>,
    semaphore: Arc<Semaphore>,
    config: StoreConfig,
}

impl<ES> ProjectionEngine<ES>
where
    ES: EventStore + 'static,
{
    pub fn new(store: Arc<ES>, config: StoreConfig) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent_projections));
        Self {
            store,
            semaphore,
            config,
        }
    }

    fn combined_query(projectors: &[BoxedProjector]) -> Result<Query, Error> {
        if projectors.is_empty() {
            return Err(Error::validation("projectors", "must not be empty"));
        }
        let mut combined = Query::empty();
        for p in projectors {
            combined = combined.union(p.0.query());
        }
        if combined.is_empty() {
            return Err(Error::validation(
                "projectors",
                "combined query must not be empty",
            ));
        }
        Ok(combined)
    }

    /// Synchronous projection: folds the whole matched stream and returns
    /// the final states plus a ready-to-use append condition.
    #[tracing::instrument(skip(self, projectors), fields(projector_count = projectors.len()))]
    pub async fn project(
        &self,
        projectors: Vec<BoxedProjector>,
        after: Option<Cursor>,
    ) -> Result<(States, AppendCondition), Error> {
        let combined = Self::combined_query(&projectors)?;

        let _permit = self
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::TooManyProjections)?;

        let mut states: HashMap<String, AnyState> = projectors
            .iter()
            .map(|p| (p.0.id().to_string(), p.0.initial_state_erased()))
            .collect();

        let mut last_cursor = after.unwrap_or(Cursor::START);
        let fut = async {
            let mut stream = self.store.query_stream(&combined, after);
            while let Some(event) = stream.next().await {
                let event = event?;
                last_cursor = event.cursor();
                for p in &projectors {
                    if p.0.query().matches(&event.event_type, &event.tags) {
                        let current = states.remove(p.0.id()).expect("initialized above");
                        states.insert(p.0.id().to_string(), p.0.transition_erased(current, &event));
                    }
                }
            }
            Ok::<_, Error>(())
        };
        tokio::time::timeout(self.config.query_timeout, fut).await??;

        let condition = AppendCondition::new(combined, Some(last_cursor));
        Ok((States(states), condition))
    }

    /// Streaming projection: emits a `States` snapshot after every matched
    /// event is folded in, and the final append condition once the
    /// underlying stream is exhausted.
    #[tracing::instrument(skip(self, projectors), fields(projector_count = projectors.len()))]
    pub fn project_stream(
        self: Arc<Self>,
        projectors: Vec<BoxedProjector>,
        after: Option<Cursor>,
    ) -> Result<
        (
            BoxStream<'static, Result<States, Error>>,
            oneshot::Receiver<Result<AppendCondition, Error>>,
        ),
        Error,
    > {
        let combined = Self::combined_query(&projectors)?;
        let (condition_tx, condition_rx) = oneshot::channel();

        let engine = self;
        let states_stream = stream! {
            let _permit = match engine.semaphore.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    let _ = condition_tx.send(Err(Error::TooManyProjections));
                    yield Err(Error::TooManyProjections);
                    return;
                }
            };

            let mut states: HashMap<String, AnyState> = projectors
                .iter()
                .map(|p| (p.0.id().to_string(), p.0.initial_state_erased()))
                .collect();

            let mut last_cursor = after.unwrap_or(Cursor::START);
            let deadline = tokio::time::Instant::now() + engine.config.query_timeout;

            let mut inner = engine.store.query_stream(&combined, after);
            loop {
                let next = tokio::time::timeout_at(deadline, inner.next()).await;
                let event = match next {
                    Err(_) => {
                        let _ = condition_tx.send(Err(Error::from(ResourceError::Timeout)));
                        yield Err(Error::from(ResourceError::Timeout));
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        yield Err(e);
                        return;
                    }
                    Ok(Some(Ok(event))) => event,
                };
                last_cursor = event.cursor();
                for p in &projectors {
                    if p.0.query().matches(&event.event_type, &event.tags) {
                        let current = states.remove(p.0.id()).expect("initialized above");
                        states.insert(p.0.id().to_string(), p.0.transition_erased(current, &event));
                    }
                }
                let snapshot: HashMap<String, AnyState> = projectors
                    .iter()
                    .map(|p| {
                        let state = states.get(p.0.id()).expect("initialized above");
                        (p.0.id().to_string(), p.0.clone_state_erased(state))
                    })
                    .collect();
                yield Ok(States(snapshot));
            }

            let condition = AppendCondition::new(combined, Some(last_cursor));
            let _ = condition_tx.send(Ok(condition));
        };

        Ok((states_stream.boxed(), condition_rx))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::stream;

    use super::*;
    use crate::tag::Tag;
    use crate::EventType;

    /// A minimal in-process `EventStore` for exercising the projection
    /// engine without a database, in the style of the teacher's
    /// `DummyEventStore` test double (`disintegrate::decision::test`).
    struct InMemoryStore {
        events: Mutex<Vec<StoredEvent>>,
    }

    impl InMemoryStore {
        fn new(events: Vec<StoredEvent>) -> Self {
            Self {
                events: Mutex::new(events),
            }
        }
    }

    #[async_trait::async_trait]
    impl EventStore for InMemoryStore {
        async fn append(
            &self,
            _events: Vec<crate::InputEvent>,
        ) -> Result<Vec<StoredEvent>, Error> {
            unimplemented!("not exercised by projection tests")
        }

        async fn append_if(
            &self,
            _events: Vec<crate::InputEvent>,
            _condition: AppendCondition,
        ) -> Result<Vec<StoredEvent>, Error> {
            unimplemented!("not exercised by projection tests")
        }

        async fn append_if_isolated(
            &self,
            _events: Vec<crate::InputEvent>,
            _condition: AppendCondition,
        ) -> Result<Vec<StoredEvent>, Error> {
            unimplemented!("not exercised by projection tests")
        }

        async fn query(
            &self,
            query: &Query,
            after: Option<Cursor>,
        ) -> Result<Vec<StoredEvent>, Error> {
            let after = after.unwrap_or(Cursor::START);
            Ok(self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.cursor() > after && query.matches(&e.event_type, &e.tags))
                .cloned()
                .collect())
        }

        fn query_stream<'a>(
            &'a self,
            query: &'a Query,
            after: Option<Cursor>,
        ) -> BoxStream<'a, Result<StoredEvent, Error>> {
            let after = after.unwrap_or(Cursor::START);
            let matched: Vec<_> = self
                .events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.cursor() > after && query.matches(&e.event_type, &e.tags))
                .cloned()
                .map(Ok)
                .collect();
            stream::iter(matched).boxed()
        }
    }

    fn stored(position: i64, event_type: &str, tags: Vec<Tag>) -> StoredEvent {
        StoredEvent {
            id: uuid::Uuid::new_v4(),
            event_type: EventType::new(event_type).unwrap(),
            tags,
            data: vec![],
            position,
            transaction_id: position,
            occurred_at: chrono::Utc::now(),
        }
    }

    struct CountProjector {
        id: String,
        query: Query,
    }

    impl Projector for CountProjector {
        type State = u32;

        fn id(&self) -> &str {
            &self.id
        }

        fn query(&self) -> &Query {
            &self.query
        }

        fn initial_state(&self) -> Self::State {
            0
        }

        fn transition(&self, state: Self::State, _event: &StoredEvent) -> Self::State {
            state + 1
        }
    }

    #[tokio::test]
    async fn project_folds_matching_events_and_ignores_others() {
        let tag = |v: &str| Tag::new("cart_id", v).unwrap();
        let events = vec![
            stored(1, "ItemAdded", vec![tag("c1")]),
            stored(2, "ItemAdded", vec![tag("c2")]),
            stored(3, "ItemRemoved", vec![tag("c1")]),
        ];
        let store = Arc::new(InMemoryStore::new(events));
        let engine = ProjectionEngine::new(store, StoreConfig::default());

        let query = Query::new(vec![QueryItem::new(vec![], vec![tag("c1")]).unwrap()]);
        let projector = BoxedProjector::new(CountProjector {
            id: "c1_events".into(),
            query,
        });

        let (states, condition) = engine.project(vec![projector], None).await.unwrap();
        assert_eq!(states.get::<u32>("c1_events"), Some(&2));
        assert_eq!(condition.after().unwrap().position, 3);
    }

    #[tokio::test]
    async fn project_rejects_empty_projector_list() {
        let store = Arc::new(InMemoryStore::new(vec![]));
        let engine = ProjectionEngine::new(store, StoreConfig::default());
        let result = engine.project(vec![], None).await;
        assert!(matches!(result, Err(Error::Validation { .. })));
    }

    mod mocked {
        use mockall::mock;

        use super::*;

        // Mirrors the teacher's `utils::tests::Database` + hand-written
        // `EventStore` wrapper (`disintegrate::utils::tests`): mockall drives
        // a small synchronous trait, and a thin manual impl adapts it onto
        // the real async `EventStore` so the mock itself stays free of
        // lifetime-generic streaming methods.
        trait Source {
            fn stream(&self, query: &Query, after: Option<Cursor>) -> Vec<Result<StoredEvent, Error>>;
        }

        mock! {
            pub Source {}
            impl Source for Source {
                fn stream(&self, query: &Query, after: Option<Cursor>) -> Vec<Result<StoredEvent, Error>>;
            }
        }

        struct MockedStore(MockSource);

        #[async_trait::async_trait]
        impl EventStore for MockedStore {
            async fn append(&self, _events: Vec<crate::InputEvent>) -> Result<Vec<StoredEvent>, Error> {
                unimplemented!("not exercised by this test")
            }

            async fn append_if(
                &self,
                _events: Vec<crate::InputEvent>,
                _condition: AppendCondition,
            ) -> Result<Vec<StoredEvent>, Error> {
                unimplemented!("not exercised by this test")
            }

            async fn append_if_isolated(
                &self,
                _events: Vec<crate::InputEvent>,
                _condition: AppendCondition,
            ) -> Result<Vec<StoredEvent>, Error> {
                unimplemented!("not exercised by this test")
            }

            async fn query(&self, query: &Query, after: Option<Cursor>) -> Result<Vec<StoredEvent>, Error> {
                self.0.stream(query, after).into_iter().collect()
            }

            fn query_stream<'a>(
                &'a self,
                query: &'a Query,
                after: Option<Cursor>,
            ) -> BoxStream<'a, Result<StoredEvent, Error>> {
                stream::iter(self.0.stream(query, after)).boxed()
            }
        }

        #[tokio::test]
        async fn project_propagates_a_query_failure_from_the_store() {
            let mut mock = MockSource::new();
            mock.expect_stream()
                .times(1)
                .returning(|_, _| vec![Err(Error::Internal("boom".into()))]);
            let store = Arc::new(MockedStore(mock));
            let engine = ProjectionEngine::new(store, StoreConfig::default());

            let query = Query::new(vec![QueryItem::new(vec![], vec![]).unwrap()]);
            let projector = BoxedProjector::new(CountProjector {
                id: "any".into(),
                query,
            });

            let result = engine.project(vec![projector], None).await;
            assert!(matches!(result, Err(Error::Internal(_))));
        }
    }

    #[tokio::test]
    async fn project_stream_emits_final_condition_after_last_event() {
        let tag = |v: &str| Tag::new("cart_id", v).unwrap();
        let events = vec![
            stored(1, "ItemAdded", vec![tag("c1")]),
            stored(2, "ItemAdded", vec![tag("c1")]),
        ];
        let store = Arc::new(InMemoryStore::new(events));
        let engine = Arc::new(ProjectionEngine::new(store, StoreConfig::default()));

        let query = Query::new(vec![QueryItem::new(vec![], vec![tag("c1")]).unwrap()]);
        let projector = BoxedProjector::new(CountProjector {
            id: "c1_events".into(),
            query,
        });

        let (mut states_stream, condition_rx) =
            engine.project_stream(vec![projector], None).unwrap();

        let mut last = None;
        while let Some(states) = states_stream.next().await {
            last = Some(states.unwrap());
        }
        assert_eq!(last.unwrap().get::<u32>("c1_events"), Some(&2));

        let condition = condition_rx.await.unwrap().unwrap();
        assert_eq!(condition.after().unwrap().position, 2);
    }
}
