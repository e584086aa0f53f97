// End-to-end protocol scenarios over a scripted engine.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use bulkstream::api::{
    Batch, Client, Engine, EngineSession, ErrorKind, PollReply, RawStatus, STATUS_OK,
    StorageCredentials, StreamItem, SubmitReply, SubmitView,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Captures one submit crossing as the engine saw it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct SeenSubmit {
    sources: Vec<String>,
    offsets: Vec<u64>,
    lengths: Vec<u64>,
    credentials: StorageCredentials,
}

#[derive(Default)]
struct Script {
    submits: Mutex<Vec<SeenSubmit>>,
    closes: AtomicUsize,
}

struct ScriptedEngine {
    script: Arc<Script>,
    replies: Vec<PollReply>,
}

impl ScriptedEngine {
    fn new(script: Arc<Script>, replies: Vec<PollReply>) -> Self {
        Self { script, replies }
    }
}

impl Engine for ScriptedEngine {
    fn open(&self) -> Result<Box<dyn EngineSession>, RawStatus> {
        Ok(Box::new(ScriptedSession {
            script: Arc::clone(&self.script),
            replies: self.replies.iter().copied().collect(),
        }))
    }

    fn describe_status(&self, code: RawStatus) -> Option<String> {
        match code {
            0 => Some("success".to_string()),
            21 => Some("source not readable".to_string()),
            _ => None,
        }
    }
}

struct ScriptedSession {
    script: Arc<Script>,
    replies: VecDeque<PollReply>,
}

impl EngineSession for ScriptedSession {
    fn submit(
        &mut self,
        items: &mut [SubmitView<'_>],
        credentials: &StorageCredentials,
    ) -> SubmitReply {
        let mut seen = SeenSubmit {
            credentials: credentials.clone(),
            ..SeenSubmit::default()
        };
        for (position, item) in items.iter_mut().enumerate() {
            seen.sources.push(item.source.to_string());
            seen.offsets.push(item.offset);
            seen.lengths.push(item.length);
            // Fill each destination with its item position so the caller can
            // check buffer/item correlation after drain.
            let length = item.length as usize;
            item.destination[..length].fill(position as u8);
        }
        let slots = items.len() as u32;
        self.script.submits.lock().expect("lock").push(seen);
        SubmitReply {
            status: STATUS_OK,
            slots,
        }
    }

    fn poll(&mut self) -> PollReply {
        self.replies.pop_front().expect("scripted reply available")
    }

    fn close(&mut self) {
        self.script.closes.fetch_add(1, Ordering::SeqCst);
    }
}

fn ok(index: u32) -> PollReply {
    PollReply {
        status: STATUS_OK,
        index,
    }
}

fn failed(index: u32, status: RawStatus) -> PollReply {
    PollReply { status, index }
}

fn three_item_batch() -> Batch {
    Batch::new(vec![
        StreamItem::new("model-00001.safetensors", 0, 10, vec![0u8; 10]),
        StreamItem::new("model-00001.safetensors", 10, 20, vec![0u8; 20]),
        StreamItem::new("model-00002.safetensors", 0, 30, vec![0u8; 30]),
    ])
}

#[test]
fn three_items_complete_out_of_order() {
    init_tracing();
    let script = Arc::new(Script::default());
    let engine = ScriptedEngine::new(Arc::clone(&script), vec![ok(2), ok(0), ok(1)]);
    let mut session = Client::new(Arc::new(engine)).open_session().expect("open");

    let slots = session.submit(three_item_batch()).expect("submit");
    assert_eq!(slots, 3);

    let mut seen = Vec::new();
    for _ in 0..slots {
        let completion = session.poll().expect("poll");
        assert!(completion.is_success());
        seen.push(completion.index);
    }
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 1, 2]);
    assert_eq!(session.outstanding(), 0);

    let buffers = session.take_destinations().expect("take");
    assert_eq!(buffers[0], vec![0u8; 10]);
    assert_eq!(buffers[1], vec![1u8; 20]);
    assert_eq!(buffers[2], vec![2u8; 30]);

    session.close().expect("close");
    assert_eq!(script.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn one_failed_item_does_not_abort_its_siblings() {
    init_tracing();
    let script = Arc::new(Script::default());
    let engine = ScriptedEngine::new(Arc::clone(&script), vec![ok(0), failed(1, 21), ok(2)]);
    let mut session = Client::new(Arc::new(engine)).open_session().expect("open");

    session.submit(three_item_batch()).expect("submit");

    let mut failures = Vec::new();
    for _ in 0..3 {
        let completion = session.poll().expect("poll");
        if !completion.is_success() {
            failures.push(completion.clone());
        }
    }
    assert_eq!(failures.len(), 1);
    let err = failures.remove(0).into_result().expect_err("item failed");
    assert_eq!(err.kind(), ErrorKind::ItemFailed);
    assert_eq!(err.index(), Some(1));
    assert_eq!(err.code(), Some(21));
    assert_eq!(err.message(), Some("source not readable"));

    // All three slots drained despite the failure.
    assert_eq!(session.outstanding(), 0);
    session.take_destinations().expect("take");
    session.close().expect("close");
}

#[test]
fn submit_passes_the_wire_shape_through_unchanged() {
    init_tracing();
    let script = Arc::new(Script::default());
    let engine = ScriptedEngine::new(Arc::clone(&script), vec![ok(0)]);
    let mut session = Client::new(Arc::new(engine)).open_session().expect("open");

    let credentials = StorageCredentials {
        key: Some("AKIA".to_string()),
        region: Some("eu-west-1".to_string()),
        ..StorageCredentials::default()
    };
    let batch = Batch::new(vec![StreamItem::new(
        "s3-object-key",
        4096,
        64,
        vec![0u8; 64],
    )])
    .with_credentials(credentials.clone());

    session.submit(batch).expect("submit");

    let submits = script.submits.lock().expect("lock");
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].sources, vec!["s3-object-key".to_string()]);
    assert_eq!(submits[0].offsets, vec![4096]);
    assert_eq!(submits[0].lengths, vec![64]);
    assert_eq!(submits[0].credentials, credentials);
    assert!(submits[0].credentials.secret.is_none());
}

#[test]
fn empty_batch_fails_without_contacting_the_engine() {
    init_tracing();
    let script = Arc::new(Script::default());
    let engine = ScriptedEngine::new(Arc::clone(&script), Vec::new());
    let mut session = Client::new(Arc::new(engine)).open_session().expect("open");

    let err = session.submit(Batch::new(Vec::new())).expect_err("empty");
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(script.submits.lock().expect("lock").is_empty());
}

#[test]
fn poll_after_close_is_a_local_protocol_error() {
    init_tracing();
    let script = Arc::new(Script::default());
    let engine = ScriptedEngine::new(Arc::clone(&script), Vec::new());
    let mut session = Client::new(Arc::new(engine)).open_session().expect("open");

    session.close().expect("close");
    let err = session.poll().expect_err("poll after close");
    assert_eq!(err.kind(), ErrorKind::Misuse);
    // Only the explicit close reached the engine.
    assert_eq!(script.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn abandoning_drop_still_releases_the_engine_instance() {
    init_tracing();
    let script = Arc::new(Script::default());
    let engine = ScriptedEngine::new(Arc::clone(&script), vec![ok(0), ok(1)]);
    {
        let mut session = Client::new(Arc::new(engine)).open_session().expect("open");
        session
            .submit(Batch::new(vec![
                StreamItem::new("a", 0, 4, vec![0u8; 4]),
                StreamItem::new("b", 0, 4, vec![0u8; 4]),
            ]))
            .expect("submit");
        session.poll().expect("poll one of two");
        // Dropped with one completion outstanding: abandoned, not leaked.
    }
    assert_eq!(script.closes.load(Ordering::SeqCst), 1);
}

#[test]
fn sequential_batches_reuse_one_session() {
    init_tracing();
    let script = Arc::new(Script::default());
    let engine = ScriptedEngine::new(Arc::clone(&script), vec![ok(0), ok(1), ok(0)]);
    let mut session = Client::new(Arc::new(engine)).open_session().expect("open");

    session
        .submit(Batch::new(vec![
            StreamItem::new("first", 0, 8, vec![0u8; 8]),
            StreamItem::new("first", 8, 8, vec![0u8; 8]),
        ]))
        .expect("first batch");
    session.poll().expect("poll");
    session.poll().expect("poll");
    let first = session.take_destinations().expect("take first");
    assert_eq!(first.len(), 2);

    session
        .submit(Batch::new(vec![StreamItem::new("second", 0, 8, vec![0u8; 8])]))
        .expect("second batch");
    session.poll().expect("poll");
    let second = session.take_destinations().expect("take second");
    assert_eq!(second.len(), 1);

    session.close().expect("close");
    assert_eq!(script.submits.lock().expect("lock").len(), 2);
}
