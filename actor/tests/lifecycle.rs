//! End-to-end runtime behavior: spawning, request/response, supervision and
//! dead letters, all through the public API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dynamo_actor::{
    Actor, ActorError, ActorSystem, Context, MessageEnvelope, Pid, Props, SystemMessage,
};

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}

fn echo_props() -> Props {
    Props::from_fn(|ctx: &mut Context, env: &MessageEnvelope| {
        if env.message_as::<String>().is_some() {
            ctx.respond(MessageEnvelope::from_arc(env.message.clone()));
        }
    })
}

#[tokio::test]
async fn request_round_trip() {
    let system = ActorSystem::new();
    let root = system.root();
    let echo = root.spawn_named(echo_props(), "echo").unwrap();

    let future = root.request(&echo, MessageEnvelope::new("ping".to_string()));
    let reply = future.result().await.unwrap();
    assert_eq!(reply.message_as::<String>().map(String::as_str), Some("ping"));
    assert_eq!(reply.sender.as_ref(), Some(&echo));
}

#[tokio::test]
async fn spawn_named_collision_leaves_first_process_alone() {
    let system = ActorSystem::new();
    let root = system.root();
    let first = root.spawn_named(echo_props(), "gate").unwrap();

    let second = root.spawn_named(echo_props(), "gate");
    assert_eq!(second, Err(ActorError::NameExists("gate".to_string())));

    // the original binding still answers requests
    let reply = root
        .request(&first, MessageEnvelope::new("still here".to_string()))
        .result()
        .await
        .unwrap();
    assert_eq!(
        reply.message_as::<String>().map(String::as_str),
        Some("still here")
    );
}

#[tokio::test]
async fn request_to_missing_pid_resolves_dead_letter() {
    let system = ActorSystem::new();
    let root = system.root();

    let nowhere = Pid::new("local", "no-such-process");
    let future = root.request_with_timeout(
        &nowhere,
        MessageEnvelope::new("lost".to_string()),
        Duration::from_secs(5),
    );
    // resolves well before the timeout
    let result = tokio::time::timeout(Duration::from_secs(1), future.result())
        .await
        .expect("dead letter response should arrive promptly");
    assert_eq!(result, Err(ActorError::DeadLetter));
}

#[tokio::test]
async fn dead_letter_monitor_sees_dropped_envelopes() {
    let system = ActorSystem::new();
    let root = system.root();

    let seen: Arc<Mutex<Vec<Pid>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_in_actor = Arc::clone(&seen);
    let monitor = root
        .spawn_named(
            Props::from_fn(move |_ctx: &mut Context, env: &MessageEnvelope| {
                if let Some(SystemMessage::DeadLetter { target }) =
                    env.message_as::<SystemMessage>()
                {
                    seen_in_actor.lock().unwrap().push(target.clone());
                }
            }),
            "dead-letter-monitor",
        )
        .unwrap();
    system.watch_dead_letters(monitor);

    let nowhere = Pid::new("local", "gone");
    root.send(&nowhere, MessageEnvelope::new(()));

    eventually(|| seen.lock().unwrap().first() == Some(&nowhere)).await;
}

struct LifeActor {
    log: Arc<Mutex<Vec<String>>>,
}

impl Actor for LifeActor {
    fn receive(&mut self, _ctx: &mut Context, env: &MessageEnvelope) {
        if let Some(text) = env.message_as::<String>() {
            self.log.lock().unwrap().push(format!("recv:{text}"));
        }
    }
    fn started(&mut self, _ctx: &mut Context) {
        self.log.lock().unwrap().push("started".into());
    }
    fn stopping(&mut self, _ctx: &mut Context) {
        self.log.lock().unwrap().push("stopping".into());
    }
    fn stopped(&mut self, _ctx: &mut Context) {
        self.log.lock().unwrap().push("stopped".into());
    }
}

#[tokio::test]
async fn lifecycle_hooks_run_in_order() {
    let system = ActorSystem::new();
    let root = system.root();

    let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let producer_log = Arc::clone(&log);
    let pid = root
        .spawn(Props::from_producer(move || {
            Box::new(LifeActor {
                log: Arc::clone(&producer_log),
            })
        }))
        .unwrap();

    root.send(&pid, MessageEnvelope::new("one".to_string()));
    eventually(|| log.lock().unwrap().len() == 2).await;

    root.stop(&pid);
    eventually(|| log.lock().unwrap().len() == 4).await;

    assert_eq!(
        *log.lock().unwrap(),
        vec!["started", "recv:one", "stopping", "stopped"]
    );
    assert!(system.registry().get_local(&pid.id).is_none());
}

#[tokio::test]
async fn user_messages_after_stop_go_to_dead_letter() {
    let system = ActorSystem::new();
    let root = system.root();
    let pid = root.spawn_named(echo_props(), "ephemeral").unwrap();

    root.stop(&pid);
    eventually(|| system.registry().get_local(&pid.id).is_none()).await;

    let future = root.request_with_timeout(
        &pid,
        MessageEnvelope::new("too late".to_string()),
        Duration::from_secs(5),
    );
    let result = tokio::time::timeout(Duration::from_secs(1), future.result())
        .await
        .expect("should resolve via dead letter");
    assert_eq!(result, Err(ActorError::DeadLetter));
}

struct Flaky {
    incarnation: Arc<AtomicUsize>,
    handled: Arc<AtomicUsize>,
}

impl Actor for Flaky {
    fn receive(&mut self, _ctx: &mut Context, env: &MessageEnvelope) {
        if env.message_as::<String>().map(String::as_str) == Some("boom") {
            panic!("boom");
        }
        self.handled.fetch_add(1, Ordering::SeqCst);
    }
    fn started(&mut self, _ctx: &mut Context) {
        self.incarnation.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn panicking_child_is_restarted_by_supervisor() {
    let system = ActorSystem::new();
    let root = system.root();

    let incarnation = Arc::new(AtomicUsize::new(0));
    let handled = Arc::new(AtomicUsize::new(0));
    let (inc, hnd) = (Arc::clone(&incarnation), Arc::clone(&handled));

    // the child panics under a parent with the default one-for-one strategy
    let parent = root
        .spawn_named(
            Props::from_fn(move |ctx: &mut Context, env: &MessageEnvelope| {
                if env.message_as::<()>().is_some() {
                    let (inc, hnd) = (Arc::clone(&inc), Arc::clone(&hnd));
                    let child = ctx
                        .spawn_named(
                            Props::from_producer(move || {
                                Box::new(Flaky {
                                    incarnation: Arc::clone(&inc),
                                    handled: Arc::clone(&hnd),
                                })
                            }),
                            "flaky",
                        )
                        .unwrap();
                    ctx.respond(MessageEnvelope::new(child));
                }
            }),
            "parent",
        )
        .unwrap();

    let reply = root
        .request(&parent, MessageEnvelope::new(()))
        .result()
        .await
        .unwrap();
    let child = reply.message_as::<Pid>().unwrap().clone();

    root.send(&child, MessageEnvelope::new("ok".to_string()));
    eventually(|| handled.load(Ordering::SeqCst) == 1).await;

    root.send(&child, MessageEnvelope::new("boom".to_string()));
    // a fresh incarnation keeps processing messages
    eventually(|| incarnation.load(Ordering::SeqCst) == 2).await;

    root.send(&child, MessageEnvelope::new("ok".to_string()));
    eventually(|| handled.load(Ordering::SeqCst) == 2).await;
}

struct Watcher {
    observed: Arc<Mutex<Option<Pid>>>,
    target: Pid,
}

impl Actor for Watcher {
    fn receive(&mut self, _ctx: &mut Context, _env: &MessageEnvelope) {}
    fn started(&mut self, ctx: &mut Context) {
        ctx.watch(&self.target);
    }
    fn terminated(&mut self, _ctx: &mut Context, who: &Pid) {
        *self.observed.lock().unwrap() = Some(who.clone());
    }
}

#[tokio::test]
async fn watchers_observe_termination() {
    let system = ActorSystem::new();
    let root = system.root();
    let target = root.spawn_named(echo_props(), "target").unwrap();

    let observed: Arc<Mutex<Option<Pid>>> = Arc::new(Mutex::new(None));
    let (obs, tgt) = (Arc::clone(&observed), target.clone());
    root.spawn(Props::from_producer(move || {
        Box::new(Watcher {
            observed: Arc::clone(&obs),
            target: tgt.clone(),
        })
    }))
    .unwrap();

    // let the watch land before stopping the target
    tokio::time::sleep(Duration::from_millis(50)).await;
    root.stop(&target);

    eventually(|| observed.lock().unwrap().as_ref() == Some(&target)).await;
}

#[tokio::test]
async fn stopping_a_parent_stops_its_children() {
    let system = ActorSystem::new();
    let root = system.root();

    let child_pid: Arc<Mutex<Option<Pid>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&child_pid);
    let parent = root
        .spawn_named(
            Props::from_fn(move |ctx: &mut Context, env: &MessageEnvelope| {
                if env.message_as::<()>().is_some() {
                    let child = ctx.spawn_named(echo_props(), "inner").unwrap();
                    *slot.lock().unwrap() = Some(child);
                }
            }),
            "outer",
        )
        .unwrap();

    root.send(&parent, MessageEnvelope::new(()));
    eventually(|| child_pid.lock().unwrap().is_some()).await;
    let child = child_pid.lock().unwrap().clone().unwrap();
    assert_eq!(child.id, "outer/inner");

    root.stop(&parent);
    eventually(|| {
        system.registry().get_local(&parent.id).is_none()
            && system.registry().get_local(&child.id).is_none()
    })
    .await;
}
