use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use stagecraft::actors::*;

struct Counter {
    count: u64,
}

impl Actor for Counter {
    fn type_name() -> &'static str {
        "Counter"
    }

    fn create(_definition: &Definition) -> ActorResult<Self> {
        Ok(Counter { count: 0 })
    }
}

#[tokio::test]
async fn value_registry_round_trip() {
    let stage = StageBuilder::new().name("stage-values").create();

    stage.register_value("limit", 250u64);
    assert_eq!(*stage.registered_value::<u64>("limit").unwrap(), 250);

    // Overwrite on insert.
    stage.register_value("limit", 500u64);
    assert_eq!(*stage.registered_value::<u64>("limit").unwrap(), 500);

    // Wrong type errors; the entry survives.
    assert!(matches!(
        stage.registered_value::<String>("limit"),
        Err(StageError::ValueTypeMismatch(_))
    ));

    assert!(stage.deregister_value("limit").is_some());
    assert!(stage.deregister_value("limit").is_none());
    assert!(matches!(
        stage.registered_value::<u64>("limit"),
        Err(StageError::ValueNotRegistered(_))
    ));

    stage.close().await;
}

#[tokio::test]
async fn values_registered_before_creation_are_visible_to_actors() {
    let stage = StageBuilder::new().name("stage-visibility").create();
    stage.register_value("seed", 41u64);

    let counter: Proxy<Counter> = stage
        .actor_for(Definition::of::<Counter>())
        .expect("counter actor");
    let seed = counter
        .call("read_seed()", |_, ctx| {
            ctx.stage()
                .registered_value::<u64>("seed")
                .map(|value| *value)
                .map_err(ActorError::failure)
        })
        .await
        .expect_value();

    assert_eq!(seed, 41);
    stage.close().await;
}

struct Spawner;

impl Actor for Spawner {
    fn type_name() -> &'static str {
        "Spawner"
    }

    fn create(_definition: &Definition) -> ActorResult<Self> {
        Ok(Spawner)
    }
}

#[tokio::test]
async fn children_are_stopped_with_their_parent() {
    let stage = StageBuilder::new().name("stage-children").create();
    let spawner: Proxy<Spawner> = stage
        .actor_for(Definition::of::<Spawner>())
        .expect("spawner actor");

    let child_address = spawner
        .call("spawn_child()", |_, ctx| {
            let child: Proxy<Counter> = ctx
                .child_actor_for(Definition::of::<Counter>(), None)
                .map_err(ActorError::failure)?;
            Ok(child.address().clone())
        })
        .await
        .expect_value();

    let child = stage.actor_of(&child_address).expect("child registered");
    assert_eq!(child.parent().map(|p| p.address()), Some(spawner.address().clone()));
    assert_eq!(child.supervisor_name(), DEFAULT_SUPERVISOR);

    spawner.stop(None).await.expect("stop parent");
    assert!(stage.actor_of(&child_address).is_none());
    assert!(child.is_stopped());

    stage.close().await;
}

struct Watcher;

impl Actor for Watcher {
    fn type_name() -> &'static str {
        "Watcher"
    }

    fn create(_definition: &Definition) -> ActorResult<Self> {
        Ok(Watcher)
    }
}

#[async_trait]
impl Supervisor for Watcher {
    fn decide(&self, _error: &ActorError) -> Directive {
        Directive::Resume
    }
}

#[tokio::test]
async fn close_stops_users_supervisors_then_roots() {
    let stage = StageBuilder::new().name("stage-close").create();

    let counter: Proxy<Counter> = stage
        .actor_for(Definition::of::<Counter>())
        .expect("counter actor");
    let watcher: Proxy<Watcher> = stage
        .actor_for(Definition::of::<Watcher>())
        .expect("watcher actor");
    stage.register_supervisor("watcher", Arc::new(watcher.clone()));

    stage.close().await;

    assert!(counter.is_stopped());
    assert!(watcher.is_stopped());
    assert_eq!(stage.actor_count(), 0);
    assert!(matches!(
        stage.actor_for::<Counter>(Definition::of::<Counter>()),
        Err(StageError::Closed)
    ));

    // Closing twice is a no-op.
    stage.close().await;
}

struct SlowGoodbye;

#[async_trait]
impl Actor for SlowGoodbye {
    fn type_name() -> &'static str {
        "SlowGoodbye"
    }

    fn create(_definition: &Definition) -> ActorResult<Self> {
        Ok(SlowGoodbye)
    }

    async fn before_stop(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(())
    }
}

#[tokio::test]
async fn stop_with_timeout_force_closes_the_mailbox() {
    let stage = StageBuilder::new().name("stage-timeout").create();
    let slow: Proxy<SlowGoodbye> = stage
        .actor_for(Definition::of::<SlowGoodbye>())
        .expect("slow actor");

    // A round-trip guarantees `start` has been delivered.
    slow.call("noop()", |_, _| Ok(())).await.expect_value();

    let result = slow.stop(Some(Duration::from_millis(100))).await;
    assert!(matches!(result, Err(ActorError::StopTimeout(_))));

    // The mailbox is force-closed: new sends observe the stopped sentinel.
    let outcome = slow.call("late()", |_, _| Ok(())).await;
    assert!(outcome.is_stopped());
}

#[tokio::test]
async fn scheduler_runs_and_cancels_jobs() {
    let stage = StageBuilder::new().name("stage-timer").create();

    let (tx, rx) = tokio::sync::oneshot::channel::<&'static str>();
    stage.scheduler().schedule_once(Duration::from_millis(20), move || {
        let _ = tx.send("fired");
    });
    let fired = tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("job fires")
        .expect("sender kept");
    assert_eq!(fired, "fired");

    let (tx, mut rx) = tokio::sync::oneshot::channel::<&'static str>();
    let id = stage
        .scheduler()
        .schedule_once(Duration::from_millis(200), move || {
            let _ = tx.send("fired");
        });
    assert!(stage.scheduler().cancel(id));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(rx.try_recv().is_err(), "cancelled job must not fire");

    stage.close().await;
}

#[tokio::test]
async fn fresh_addresses_and_contexts() {
    let stage = StageBuilder::new().name("stage-fresh").create();

    let a = stage.address();
    let b = stage.address();
    assert_ne!(a, b);

    let ctx = stage.execution_context();
    assert!(!ctx.has_context());
    assert_eq!(ctx.count(), 0);

    stage.close().await;
}
