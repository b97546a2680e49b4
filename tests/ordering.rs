// tests/ordering.rs

//! Per-key serialization, cross-key concurrency and key locality.

mod common;

use apiary::{App, BeeId, DictKey, Handler, Hive, HiveConfig, MapContext, MappedKeys, Msg, RecvContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

#[derive(Debug, Serialize, Deserialize)]
struct Sample {
  key: String,
  seq: u64,
}

/// Maps each sample to its key and records what it saw, and where.
struct Recording {
  log: Arc<Mutex<Vec<(String, u64)>>>,
  seen_by: Arc<Mutex<Vec<(String, BeeId)>>>,
}

#[async_trait]
impl Handler for Recording {
  fn map(&self, msg: &Msg, _ctx: &MapContext) -> MappedKeys {
    let s: Sample = msg.decode().expect("sample payload");
    vec![DictKey::new("samples", s.key)]
  }

  async fn recv(&self, msg: &Msg, ctx: &mut RecvContext) {
    let s: Sample = msg.decode().expect("sample payload");
    // Make the first delivery slow so any reordering bug would surface.
    if s.seq == 1 {
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    self.log.lock().unwrap().push((s.key.clone(), s.seq));
    self.seen_by.lock().unwrap().push((s.key, ctx.bee().clone()));
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

fn recording_app(hive: &Hive) -> (App, Arc<Mutex<Vec<(String, u64)>>>, Arc<Mutex<Vec<(String, BeeId)>>>) {
  let app = hive.new_app("samples").expect("app");
  let log = Arc::new(Mutex::new(Vec::new()));
  let seen_by = Arc::new(Mutex::new(Vec::new()));
  app
    .handle::<Sample, _>(Recording {
      log: log.clone(),
      seen_by: seen_by.clone(),
    })
    .expect("register");
  (app, log, seen_by)
}

async fn wait_for_count(log: &Arc<Mutex<Vec<(String, u64)>>>, n: usize) {
  for _ in 0..200 {
    if log.lock().unwrap().len() >= n {
      return;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  panic!("saw {} deliveries, expected {}", log.lock().unwrap().len(), n);
}

#[tokio::test]
async fn messages_to_one_key_are_processed_in_order() {
  let hive = test_hive("ordering");
  let (_app, log, _) = recording_app(&hive);

  for seq in 1..=3u64 {
    hive
      .emit(&Sample {
        key: "k".into(),
        seq,
      })
      .await
      .expect("emit");
  }

  wait_for_count(&log, 3).await;
  let seqs: Vec<u64> = log.lock().unwrap().iter().map(|(_, s)| *s).collect();
  assert_eq!(seqs, vec![1, 2, 3], "per-key delivery order must hold");
  hive.stop().await.unwrap();
}

#[tokio::test]
async fn every_message_for_a_key_lands_on_the_same_bee() {
  let hive = test_hive("locality");
  let (app, log, seen_by) = recording_app(&hive);

  for seq in 1..=5u64 {
    hive
      .emit(&Sample {
        key: "stable".into(),
        seq,
      })
      .await
      .expect("emit");
  }
  hive
    .emit(&Sample {
      key: "other".into(),
      seq: 1,
    })
    .await
    .expect("emit");

  wait_for_count(&log, 6).await;

  let seen = seen_by.lock().unwrap().clone();
  let stable_owners: Vec<BeeId> = seen
    .iter()
    .filter(|(k, _)| k == "stable")
    .map(|(_, id)| id.clone())
    .collect();
  assert_eq!(stable_owners.len(), 5);
  assert!(
    stable_owners.iter().all(|id| *id == stable_owners[0]),
    "one key, one bee"
  );

  // The mapper resolves the key to exactly that owner.
  let resolved = app
    .resolve_key(DictKey::new("samples", "stable"))
    .await
    .expect("resolve");
  assert_eq!(resolved, stable_owners[0]);

  // A key nobody ever mapped to has no owner: the nil identity, checked
  // explicitly, not an error.
  let unowned = app
    .resolve_key(DictKey::new("samples", "never-used"))
    .await
    .expect("resolve");
  assert!(unowned.is_nil());

  hive.stop().await.unwrap();
}

/// Handler whose `k1` bee spins until the `k2` bee has run. Progress is
/// only possible if distinct keys really execute concurrently.
struct CrossKey {
  k2_ran: Arc<AtomicBool>,
  k1_done: Arc<AtomicBool>,
  spins: Arc<AtomicUsize>,
}

#[async_trait]
impl Handler for CrossKey {
  fn map(&self, msg: &Msg, _ctx: &MapContext) -> MappedKeys {
    let key: String = msg.decode().expect("key payload");
    vec![DictKey::new("pairs", key)]
  }

  async fn recv(&self, msg: &Msg, _ctx: &mut RecvContext) {
    let key: String = msg.decode().expect("key payload");
    if key == "k1" {
      while !self.k2_ran.load(Ordering::SeqCst) {
        if self.spins.fetch_add(1, Ordering::SeqCst) > 1_000 {
          return; // give up; the assertion below will fail
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
      }
      self.k1_done.store(true, Ordering::SeqCst);
    } else {
      self.k2_ran.store(true, Ordering::SeqCst);
    }
  }
}

#[tokio::test]
async fn distinct_keys_run_concurrently() {
  let hive = test_hive("crosskey");
  let app = hive.new_app("pairs").expect("app");

  let k2_ran = Arc::new(AtomicBool::new(false));
  let k1_done = Arc::new(AtomicBool::new(false));
  app
    .handle::<String, _>(CrossKey {
      k2_ran: k2_ran.clone(),
      k1_done: k1_done.clone(),
      spins: Arc::new(AtomicUsize::new(0)),
    })
    .expect("register");

  hive.emit(&"k1".to_string()).await.expect("emit k1");
  // Let k1's bee start spinning before k2 exists.
  tokio::time::sleep(Duration::from_millis(30)).await;
  hive.emit(&"k2".to_string()).await.expect("emit k2");

  let wait = async {
    while !k1_done.load(Ordering::SeqCst) {
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  };
  timeout(Duration::from_secs(2), wait)
    .await
    .expect("k1 must unblock once k2 runs on its own bee");

  hive.stop().await.unwrap();
}
