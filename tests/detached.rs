// tests/detached.rs

//! Detached handlers: emit, receive replies, stop.

mod common;

use apiary::{DetachedHandler, DictKey, Hive, HiveConfig, HiveError, MappedKeys, Msg, RecvContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::timeout;

#[derive(Debug, Serialize, Deserialize)]
struct Ping(u64);

#[derive(Debug, Serialize, Deserialize)]
struct Pong(u64);

/// Emits one ping, then parks until stopped. Replies land in its private
/// mailbox.
struct Prober {
  replies: Arc<Mutex<Vec<u64>>>,
  stopping: Arc<Notify>,
  stopped: Arc<AtomicBool>,
}

#[async_trait]
impl DetachedHandler for Prober {
  async fn start(&self, ctx: RecvContext) {
    ctx.emit(&Ping(21)).await.expect("emit ping");
    // Blocks for the bee's whole life; stop() unblocks it.
    self.stopping.notified().await;
  }

  async fn stop(&self, _ctx: RecvContext) {
    self.stopped.store(true, Ordering::SeqCst);
    self.stopping.notify_waiters();
  }

  async fn recv(&self, msg: &Msg, _ctx: &mut RecvContext) {
    let Pong(n) = msg.decode().expect("pong");
    self.replies.lock().unwrap().push(n);
  }
}

fn test_hive(name: &str) -> Hive {
  common::init_tracing();
  Hive::new(HiveConfig {
    name: name.to_owned(),
    ..HiveConfig::default()
  })
  .expect("hive")
}

#[tokio::test]
async fn detached_handler_gets_replies_to_its_own_messages() {
  let hive = test_hive("detached");
  let app = hive.new_app("prober").expect("app");

  // Ordinary handler answering pings with a doubled pong.
  app
    .handle_fn::<Ping, _, _>(
      |_msg, _ctx| -> MappedKeys { vec![DictKey::new("pings", "all")] },
      |msg, ctx| {
        let Ping(n) = msg.decode().expect("ping");
        let reply = Msg::new(&Pong(n * 2)).expect("build pong").addressed_to(msg.from().clone());
        let ctx = ctx.clone();
        tokio::spawn(async move {
          ctx.emit_msg(reply).await.expect("send pong");
        });
      },
    )
    .expect("register ping handler");

  let replies = Arc::new(Mutex::new(Vec::new()));
  let stopped = Arc::new(AtomicBool::new(false));
  let detached_id = app
    .detached(Prober {
      replies: replies.clone(),
      stopping: Arc::new(Notify::new()),
      stopped: stopped.clone(),
    })
    .await
    .expect("register detached");
  assert!(!detached_id.is_nil());

  // The reply must arrive in the detached handler's private mailbox.
  let wait = async {
    while replies.lock().unwrap().is_empty() {
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  };
  timeout(Duration::from_secs(2), wait).await.expect("pong must arrive");
  assert_eq!(&*replies.lock().unwrap(), &[42]);

  // Node shutdown drives the detached stop entry point.
  hive.stop().await.unwrap();
  assert!(stopped.load(Ordering::SeqCst), "stop(ctx) must have run");
}

#[tokio::test]
async fn only_one_detached_handler_per_app() {
  let hive = test_hive("detached-dup");
  let app = hive.new_app("prober").expect("app");

  let first = Prober {
    replies: Arc::new(Mutex::new(Vec::new())),
    stopping: Arc::new(Notify::new()),
    stopped: Arc::new(AtomicBool::new(false)),
  };
  app.detached(first).await.expect("first detached");

  let second = Prober {
    replies: Arc::new(Mutex::new(Vec::new())),
    stopping: Arc::new(Notify::new()),
    stopped: Arc::new(AtomicBool::new(false)),
  };
  let err = app.detached(second).await.expect_err("second detached rejected");
  assert!(matches!(err, HiveError::DuplicateDetached));

  hive.stop().await.unwrap();
}
