use std::sync::{Arc, Mutex};

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

    fn some_op(&self) -> Pending<()> {
        self.0.call("some_op()", |_, _| Ok(()))
    }
}

fn bounded_counter(stage: &Stage, capacity: usize, policy: OverflowPolicy) -> CounterProxy {
    CounterProxy(
        stage
            .actor_for_in(
                Definition::of::<Counter>(),
                SpawnOptions::new().mailbox(MailboxConfig::bounded(capacity, policy)),
            )
            .expect("bounded counter"),
    )
}

#[derive(Default)]
struct RecordingListener {
    records: Mutex<Vec<(String, DeadLetterReason)>>,
}

impl DeadLetterListener for RecordingListener {
    fn handle(&self, letter: &DeadLetter) {
        self.records
            .lock()
            .unwrap()
            .push((letter.representation().to_string(), letter.reason()));
    }
}

#[tokio::test]
async fn sends_to_a_stopped_actor_dead_letter() {
    let stage = StageBuilder::new().name("mbox-deadletter").create();
    let listener = Arc::new(RecordingListener::default());
    stage.dead_letters().subscribe(listener.clone());

    let counter = CounterProxy(
        stage
            .actor_for(Definition::of::<Counter>())
            .expect("counter actor"),
    );
    counter.0.stop(None).await.expect("stop");

    let outcome = counter.some_op().await;
    assert!(outcome.is_stopped(), "completion resolves to the stopped sentinel");

    let records = listener.records.lock().unwrap().clone();
    let record = records
        .iter()
        .find(|(representation, _)| representation.contains("some_op"))
        .expect("a dead letter for some_op");
    assert_eq!(record.1, DeadLetterReason::ActorStopped);

    stage.close().await;
}

#[tokio::test]
async fn drop_oldest_evicts_the_head() {
    let stage = StageBuilder::new().name("mbox-oldest").create();
    let counter = bounded_counter(&stage, 2, OverflowPolicy::DropOldest);

    // Drain `start` so the queue is empty before suspending.
    counter.get().await.expect_value();
    counter.0.suspend();

    let a = counter.increment();
    let b = counter.increment();
    let c = counter.increment();
    counter.0.resume();

    assert!(matches!(a.await, Outcome::Dropped(DropReason::Overflow)));
    b.await.expect_value();
    c.await.expect_value();
    assert_eq!(counter.get().await.expect_value(), 2);
    assert_eq!(counter.0.mailbox().dropped(), 1);

    stage.close().await;
}

#[tokio::test]
async fn drop_newest_refuses_the_arrival() {
    let stage = StageBuilder::new().name("mbox-newest").create();
    let counter = bounded_counter(&stage, 2, OverflowPolicy::DropNewest);

    counter.get().await.expect_value();
    counter.0.suspend();

    let a = counter.increment();
    let b = counter.increment();
    let c = counter.increment();
    counter.0.resume();

    a.await.expect_value();
    b.await.expect_value();
    assert!(matches!(c.await, Outcome::Dropped(DropReason::Overflow)));
    assert_eq!(counter.get().await.expect_value(), 2);
    assert_eq!(counter.0.mailbox().dropped(), 1);

    stage.close().await;
}

#[tokio::test]
async fn reject_dead_letters_the_arrival() {
    let stage = StageBuilder::new().name("mbox-reject").create();
    let listener = Arc::new(RecordingListener::default());
    stage.dead_letters().subscribe(listener.clone());
    let counter = bounded_counter(&stage, 2, OverflowPolicy::Reject);

    counter.get().await.expect_value();
    counter.0.suspend();

    let a = counter.increment();
    let b = counter.increment();
    let c = counter.increment();
    counter.0.resume();

    a.await.expect_value();
    b.await.expect_value();
    assert!(matches!(c.await, Outcome::Dropped(DropReason::MailboxFull)));
    assert_eq!(counter.0.mailbox().dropped(), 1);

    let records = listener.records.lock().unwrap().clone();
    assert!(records
        .iter()
        .any(|(representation, reason)| representation.contains("increment")
            && *reason == DeadLetterReason::MailboxFull));

    stage.close().await;
}

#[tokio::test]
async fn suspension_holds_deliveries_until_resume() {
    let stage = StageBuilder::new().name("mbox-suspend").create();
    let counter = CounterProxy(
        stage
            .actor_for(Definition::of::<Counter>())
            .expect("counter actor"),
    );

    counter.get().await.expect_value();
    counter.0.suspend();
    assert_eq!(counter.0.mailbox().state(), MailboxState::Suspended);

    let held = counter.increment();
    assert_eq!(counter.0.mailbox().queued(), 1);

    counter.0.resume();
    held.await.expect_value();
    assert_eq!(counter.get().await.expect_value(), 1);
    assert_eq!(counter.0.mailbox().state(), MailboxState::Open);

    stage.close().await;
}

#[tokio::test]
async fn queued_invocations_dead_letter_on_stop() {
    let stage = StageBuilder::new().name("mbox-drain").create();
    let counter = CounterProxy(
        stage
            .actor_for(Definition::of::<Counter>())
            .expect("counter actor"),
    );

    counter.get().await.expect_value();
    counter.0.suspend();
    let held = counter.increment();

    counter.0.stop(None).await.expect("stop");
    assert!(held.await.is_stopped());
    assert_eq!(counter.0.mailbox().state(), MailboxState::Closed);

    stage.close().await;
}
