use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use stagecraft::actors::*;

// An actor that tags its own execution context and reports what the
// currently-delivered invocation carried.
struct Tagged;

impl Actor for Tagged {
    fn type_name() -> &'static str {
        "Tagged"
    }

    fn create(_definition: &Definition) -> ActorResult<Self> {
        Ok(Tagged)
    }
}

#[derive(Clone)]
struct TaggedProxy(Proxy<Tagged>);

impl TaggedProxy {
    fn tag(&self, value: u64) -> Pending<()> {
        self.0.call(format!("tag({})", value), move |_, ctx| {
            ctx.update_execution_context(|own| own.set("tag", value));
            Ok(())
        })
    }

    fn observed_tag(&self) -> Pending<Option<u64>> {
        self.0.call("observed_tag()", |_, ctx| {
            Ok(ctx
                .current_message_context()
                .get::<u64>("tag")
                .map(|value| *value))
        })
    }

    fn declare_collaborator(&self, collaborator: ActorHandle) -> Pending<()> {
        self.0.call("declare_collaborator()", move |_, ctx| {
            ctx.update_execution_context(|own| own.collaborators(vec![collaborator]));
            Ok(())
        })
    }
}

#[tokio::test]
async fn snapshots_are_taken_at_enqueue_time() {
    let stage = StageBuilder::new().name("ctx-snapshot").create();
    let tagged = TaggedProxy(
        stage
            .actor_for(Definition::of::<Tagged>())
            .expect("tagged actor"),
    );

    tagged.tag(1).await.expect_value();

    // Hold the mailbox so later mutations cannot race the enqueue.
    tagged.0.suspend();
    let first = tagged.observed_tag();
    let retag = tagged.tag(2);
    // Snapshotted before `tag(2)` is delivered: still sees 1.
    let second = tagged.observed_tag();
    tagged.0.resume();

    assert_eq!(first.await.expect_value(), Some(1));
    retag.await.expect_value();
    assert_eq!(second.await.expect_value(), Some(1));

    // A fresh enqueue after the mutation observes the new value.
    assert_eq!(tagged.observed_tag().await.expect_value(), Some(2));

    stage.close().await;
}

#[tokio::test]
async fn delivery_context_is_cleared_between_frames() {
    let stage = StageBuilder::new().name("ctx-clear").create();
    let tagged = TaggedProxy(
        stage
            .actor_for(Definition::of::<Tagged>())
            .expect("tagged actor"),
    );

    // No declarative context: invocations carry the empty context.
    assert_eq!(tagged.observed_tag().await.expect_value(), None);

    stage.close().await;
}

#[tokio::test]
async fn propagate_replaces_collaborator_context_maps() {
    let stage = StageBuilder::new().name("ctx-propagate").create();
    let tagged = TaggedProxy(
        stage
            .actor_for(Definition::of::<Tagged>())
            .expect("tagged actor"),
    );
    let collaborator: Proxy<Tagged> = stage
        .actor_for(Definition::of::<Tagged>())
        .expect("collaborator actor");

    tagged
        .declare_collaborator(collaborator.handle())
        .await
        .expect_value();
    tagged.tag(9).await.expect_value();

    // Delivering any invocation propagates the snapshot into the declared
    // collaborator's own context map.
    tagged.observed_tag().await.expect_value();

    let adopted = collaborator.execution_context();
    assert_eq!(adopted.get::<u64>("tag").map(|v| *v), Some(9));

    stage.close().await;
}

// The supervisor observes the execution context that was live when the
// failing invocation was enqueued.
struct ContextSpy {
    seen: Arc<Mutex<Option<Option<u64>>>>,
}

#[async_trait]
impl Supervisor for ContextSpy {
    fn decide(&self, _error: &ActorError) -> Directive {
        Directive::Resume
    }

    async fn inform(&self, error: &ActorError, supervised: &Supervised) -> ActorResult<()> {
        let tag = supervised
            .execution_context()
            .get::<u64>("tag")
            .map(|value| *value);
        *self.seen.lock().unwrap() = Some(tag);

        // Fall back to the default directive handling.
        stagecraft::actor::Supervisor::inform(&FallbackResume, error, supervised).await
    }
}

struct FallbackResume;

#[async_trait]
impl Supervisor for FallbackResume {
    fn decide(&self, _error: &ActorError) -> Directive {
        Directive::Resume
    }
}

#[tokio::test]
async fn supervisors_read_the_failing_invocations_context() {
    let stage = StageBuilder::new().name("ctx-supervisor").create();
    let seen: Arc<Mutex<Option<Option<u64>>>> = Arc::new(Mutex::new(None));
    stage.register_supervisor("spy", Arc::new(ContextSpy { seen: seen.clone() }));

    let tagged = TaggedProxy(
        stage
            .actor_for_in(
                Definition::of::<Tagged>(),
                SpawnOptions::new().supervisor("spy"),
            )
            .expect("tagged actor"),
    );

    tagged.tag(42).await.expect_value();
    let failed: Pending<()> = tagged
        .0
        .call("explode()", |_, _| Err(ActorError::msg("boom")));
    assert!(failed.await.error().is_some());

    // Resume directive: the actor keeps running.
    assert_eq!(tagged.observed_tag().await.expect_value(), Some(42));
    assert_eq!(*seen.lock().unwrap(), Some(Some(42)));

    stage.close().await;
}
