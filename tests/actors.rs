use std::sync::{Arc, Mutex};

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

#[derive(Clone)]
struct CounterProxy(Proxy<Counter>);

impl CounterProxy {
    fn increment(&self) -> Pending<()> {
        self.0.call("increment()", |counter, _| {
            counter.count += 1;
            Ok(())
        })
    }

    fn get(&self) -> Pending<u64> {
        self.0.call("get()", |counter, _| Ok(counter.count))
    }
}

fn counter_for(stage: &Stage) -> CounterProxy {
    CounterProxy(
        stage
            .actor_for(Definition::of::<Counter>())
            .expect("counter actor"),
    )
}

#[tokio::test]
async fn values_are_observed_in_enqueue_order() {
    let stage = StageBuilder::new().name("actors-basic").create();
    let counter = counter_for(&stage);

    counter.increment();
    counter.increment();
    counter.increment();
    let observed = counter.get().await.expect_value();

    assert_eq!(observed, 3);
    stage.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn per_target_order_holds_across_many_sends() {
    let stage = StageBuilder::new().name("actors-order").create();
    let counter = counter_for(&stage);

    for _ in 0..1_000 {
        counter.increment();
    }
    assert_eq!(counter.get().await.expect_value(), 1_000);
    stage.close().await;
}

// An actor whose `initiate` defers the second step through its own mailbox.
struct Pinger {
    steps: u64,
}

impl Actor for Pinger {
    fn type_name() -> &'static str {
        "Pinger"
    }

    fn create(_definition: &Definition) -> ActorResult<Self> {
        Ok(Pinger { steps: 0 })
    }
}

#[derive(Clone)]
struct PingerProxy(Proxy<Pinger>);

impl PingerProxy {
    fn initiate(&self) -> Pending<u64> {
        self.0.call("initiate()", |pinger, ctx| {
            let myself = PingerProxy(ctx.myself());
            myself.step2();
            // The self-send must not have run inside this frame.
            Ok(pinger.steps)
        })
    }

    fn step2(&self) -> Pending<()> {
        self.0.call("step2()", |pinger, _| {
            pinger.steps += 1;
            Ok(())
        })
    }

    fn steps(&self) -> Pending<u64> {
        self.0.call("steps()", |pinger, _| Ok(pinger.steps))
    }
}

#[tokio::test]
async fn self_send_runs_after_the_current_frame() {
    let stage = StageBuilder::new().name("actors-selfsend").create();
    let pinger = PingerProxy(
        stage
            .actor_for(Definition::of::<Pinger>())
            .expect("pinger actor"),
    );

    let during_frame = pinger.initiate().await.expect_value();
    assert_eq!(during_frame, 0);

    // step2 is queued behind initiate; steps() is queued behind step2.
    assert_eq!(pinger.steps().await.expect_value(), 1);
    stage.close().await;
}

#[tokio::test]
async fn proxy_metadata_is_synchronous() {
    let stage = StageBuilder::new().name("actors-meta").create();
    let counter = counter_for(&stage);
    let proxy = &counter.0;

    assert_eq!(proxy.type_name(), "Counter");
    assert_eq!(proxy.definition().type_name(), "Counter");
    assert_eq!(proxy.address(), proxy.definition().address());
    assert_eq!(proxy.life_cycle(), LifeCycle::Running);
    assert!(!proxy.is_stopped());
    assert!(!proxy.execution_context().has_context());
    assert_eq!(proxy.stage().name(), "actors-meta");
    assert!(proxy.to_string().contains("Counter"));

    let same = proxy.clone();
    assert_eq!(*proxy, same);

    let other = counter_for(&stage);
    assert_ne!(*proxy, other.0);

    stage.close().await;
}

#[tokio::test]
async fn directory_tracks_live_actors() {
    let stage = StageBuilder::new().name("actors-directory").create();
    let counter = counter_for(&stage);
    let address = counter.0.address().clone();

    let found = stage.actor_of(&address).expect("registered actor");
    assert_eq!(found.address(), address);
    assert_eq!(found.type_name(), "Counter");
    assert!(stage.actor_of_type("Counter").is_some());

    counter.0.stop(None).await.expect("stop");
    assert!(stage.actor_of(&address).is_none());
    assert!(counter.0.is_stopped());

    stage.close().await;
}

// Records every lifecycle hook it runs through.
struct Recorder {
    events: Arc<Mutex<Vec<&'static str>>>,
}

impl Recorder {
    fn record(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl Actor for Recorder {
    fn type_name() -> &'static str {
        "Recorder"
    }

    fn create(definition: &Definition) -> ActorResult<Self> {
        let events = definition
            .parameters()
            .get::<Arc<Mutex<Vec<&'static str>>>>()
            .cloned()
            .ok_or_else(|| ActorError::msg("missing event sink"))?;
        Ok(Recorder { events })
    }

    fn before_start(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        self.record("before_start");
        Ok(())
    }

    async fn start(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        self.record("start");
        Ok(())
    }

    async fn before_stop(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        self.record("before_stop");
        Ok(())
    }

    fn after_stop(&mut self, _ctx: &Context<Self>) -> ActorResult<()> {
        self.record("after_stop");
        Ok(())
    }
}

#[tokio::test]
async fn lifecycle_hooks_run_in_order() {
    let stage = StageBuilder::new().name("actors-hooks").create();
    let events: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let recorder: Proxy<Recorder> = stage
        .actor_for(Definition::with_parameters::<Recorder>(Parameters::new(
            events.clone(),
        )))
        .expect("recorder actor");

    // A round-trip guarantees `start` has been delivered.
    recorder
        .call("noop()", |_, _| Ok(()))
        .await
        .expect_value();
    recorder.stop(None).await.expect("stop");

    let seen = events.lock().unwrap().clone();
    assert_eq!(seen, vec!["before_start", "start", "before_stop", "after_stop"]);
    stage.close().await;
}

#[tokio::test]
async fn stop_is_idempotent() {
    let stage = StageBuilder::new().name("actors-stop").create();
    let counter = counter_for(&stage);

    counter.0.stop(None).await.expect("first stop");
    counter.0.stop(None).await.expect("second stop is a no-op");
    assert!(counter.0.is_stopped());

    stage.close().await;
}
