//! Property tests for mirror request de-duplication and write visibility.

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use common::RecordingSink;
use mirrorcache::{CacheMessage, ChannelName, Mirror};

#[derive(Debug, Clone)]
enum Op {
    Get(String),
    Set(String, i64),
    Inbound(String, i64),
    Expire(String),
}

fn key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["theme", "volume", "language", "layout"]).prop_map(String::from)
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => key().prop_map(Op::Get),
        2 => (key(), any::<i64>()).prop_map(|(k, v)| Op::Set(k, v)),
        2 => (key(), any::<i64>()).prop_map(|(k, v)| Op::Inbound(k, v)),
        1 => key().prop_map(Op::Expire),
    ]
}

fn mirror() -> (Mirror, RecordingSink) {
    let sink = RecordingSink::default();
    let channel = ChannelName::for_cache("cache", "settings").unwrap();
    (Mirror::new(channel, Box::new(sink.clone())), sink)
}

proptest! {
    /// Property: every key is fetched at most once, and exactly once if it
    /// was ever read with `get`, whatever else happens in between.
    #[test]
    fn prop_at_most_one_fetch_per_key(ops in prop::collection::vec(op(), 1..64)) {
        let (mirror, sink) = mirror();
        let mut read = HashSet::new();

        for op in &ops {
            match op {
                Op::Get(k) => {
                    mirror.get(k);
                    read.insert(k.clone());
                }
                Op::Set(k, v) => {
                    mirror.set(k, json!(v));
                }
                Op::Inbound(k, v) => mirror.handle_message(CacheMessage::entry(k.clone(), json!(v))),
                Op::Expire(k) => mirror.handle_message(CacheMessage::expiring(k.clone())),
            }
        }

        for k in ["theme", "volume", "language", "layout"] {
            let expected = usize::from(read.contains(k));
            prop_assert_eq!(sink.fetches_for(k), expected);
        }
    }

    /// Property: records are never replaced, and each one holds the value
    /// of the last local or inbound write that reached it.
    #[test]
    fn prop_records_keep_identity_and_last_write(ops in prop::collection::vec(op(), 1..64)) {
        let (mirror, _sink) = mirror();
        let mut handles: HashMap<String, Arc<mirrorcache::CacheRecord>> = HashMap::new();
        let mut model: HashMap<String, Option<i64>> = HashMap::new();

        for op in &ops {
            match op {
                Op::Get(k) => {
                    let record = mirror.get(k);
                    if let Some(held) = handles.get(k) {
                        prop_assert!(Arc::ptr_eq(held, &record));
                    }
                    handles.entry(k.clone()).or_insert(record);
                    model.entry(k.clone()).or_insert(None);
                }
                Op::Set(k, v) => {
                    let record = mirror.set(k, json!(v));
                    prop_assert_eq!(record.value(), Some(json!(v)));
                    handles.entry(k.clone()).or_insert(record);
                    model.insert(k.clone(), Some(*v));
                }
                Op::Inbound(k, v) => {
                    mirror.handle_message(CacheMessage::entry(k.clone(), json!(v)));
                    if let Some(slot) = model.get_mut(k) {
                        *slot = Some(*v);
                    }
                }
                Op::Expire(k) => {
                    mirror.handle_message(CacheMessage::expiring(k.clone()));
                    if let Some(slot) = model.get_mut(k) {
                        *slot = None;
                    }
                }
            }
        }

        prop_assert_eq!(mirror.len(), model.len());
        for (k, expected) in &model {
            let record = &handles[k];
            prop_assert_eq!(record.value(), expected.map(|v| json!(v)));
            prop_assert!(Arc::ptr_eq(record, &mirror.peek(k).unwrap()));
        }
    }
}
