//! Stage ordering, dispatch, and adapter-style fixtures.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use async_trait::async_trait;
use base64::Engine;
use futures_lite::future::{block_on, yield_now};
use json_graft::{
    parse, stringify, BoxError, Decoded, Node, OpaqueValue, PrefixCodec, Transform,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

type StageLog = Rc<RefCell<Vec<(&'static str, String)>>>;

/// Appends its label to every string, logging invocation order into a log
/// shared across stages.
struct Suffix {
    label: &'static str,
    /// Number of cooperative yields before producing, to simulate an
    /// asynchronous stage that settles late.
    delay: usize,
    log: StageLog,
}

impl Suffix {
    fn new(label: &'static str, delay: usize, log: StageLog) -> Self {
        Suffix { label, delay, log }
    }
}

#[async_trait(?Send)]
impl Transform for Suffix {
    fn test_encode(&self, value: &Node, _key: &str) -> bool {
        matches!(value, Node::String(_))
    }

    async fn encode(&self, value: Node, key: &str) -> Result<Node, BoxError> {
        for _ in 0..self.delay {
            yield_now().await;
        }
        self.log.borrow_mut().push((self.label, key.to_string()));
        Ok(match value {
            Node::String(s) => Node::String(format!("{s}{}", self.label)),
            other => other,
        })
    }

    fn test_decode(&self, value: &Node, _key: &str) -> bool {
        matches!(value, Node::String(_))
    }

    async fn decode(&self, value: Node, key: &str) -> Result<Node, BoxError> {
        for _ in 0..self.delay {
            yield_now().await;
        }
        self.log.borrow_mut().push((self.label, key.to_string()));
        Ok(match value {
            Node::String(s) => match s.strip_suffix(self.label) {
                Some(rest) => Node::String(rest.to_string()),
                None => Node::String(s),
            },
            other => other,
        })
    }
}

#[test]
fn encode_applies_stages_in_declared_order_per_node() {
    let log: StageLog = Rc::default();
    let a = Suffix::new("A", 0, log.clone());
    let b = Suffix::new("B", 0, log.clone());
    let doc = Node::record([("s", Node::from("x"))]);
    let text = block_on(stringify(&doc, &[&a, &b])).unwrap();
    assert_eq!(text, r#"{"s":"xAB"}"#);
    let order: Vec<&str> = log.borrow().iter().map(|(l, _)| *l).collect();
    assert_eq!(order, vec!["A", "B"]);
}

#[test]
fn a_slow_async_stage_still_runs_before_a_fast_one() {
    // A suspends several times; B is immediate. Sequential awaiting means B
    // must still observe A's settled output on every node.
    let log: StageLog = Rc::default();
    let a = Suffix::new("A", 3, log.clone());
    let b = Suffix::new("B", 0, log.clone());
    let text = block_on(stringify(&Node::from("x"), &[&a, &b])).unwrap();
    assert_eq!(text, r#""xAB""#);
    let order: Vec<&str> = log.borrow().iter().map(|(l, _)| *l).collect();
    assert_eq!(order, vec!["A", "B"]);

    // Decode runs in declared order too (never implicitly reversed), so the
    // caller lists the inverse stages back to front.
    log.borrow_mut().clear();
    let back = block_on(parse(r#""xAB""#, &[&b, &a])).unwrap();
    assert_eq!(back, Node::from("x"));
    let order: Vec<&str> = log.borrow().iter().map(|(l, _)| *l).collect();
    assert_eq!(order, vec!["B", "A"]);
}

#[test]
fn encode_visits_parents_before_children_breadth_first() {
    let log: StageLog = Rc::default();
    let probe = Suffix::new("", 0, log.clone());
    let doc = Node::from_json(&json!({"a": {"x": "deep"}, "b": "top"}));
    block_on(stringify(&doc, &[&probe])).unwrap();
    // Only string nodes are staged; "deep" sits one level below "top".
    let keys: Vec<String> = log.borrow().iter().map(|(_, k)| k.clone()).collect();
    assert_eq!(keys, vec!["b", "x"]);
}

#[test]
fn decode_visits_children_before_parents() {
    struct KeyLog(RefCell<Vec<String>>);

    #[async_trait(?Send)]
    impl Transform for KeyLog {
        fn test_decode(&self, _value: &Node, _key: &str) -> bool {
            true
        }

        async fn decode(&self, value: Node, key: &str) -> Result<Node, BoxError> {
            self.0.borrow_mut().push(key.to_string());
            Ok(value)
        }
    }

    let probe = KeyLog(RefCell::new(Vec::new()));
    block_on(parse(r#"{"a":{"x":1},"b":2}"#, &[&probe])).unwrap();
    assert_eq!(*probe.0.borrow(), vec!["x", "a", "b", ""]);
}

#[test]
fn stage_sees_the_member_key() {
    struct RedactSecret;

    #[async_trait(?Send)]
    impl Transform for RedactSecret {
        fn test_encode(&self, _value: &Node, key: &str) -> bool {
            key == "secret"
        }

        async fn encode(&self, _value: Node, _key: &str) -> Result<Node, BoxError> {
            Ok(Node::from("<redacted>"))
        }
    }

    let doc = Node::from_json(&json!({"secret": "hunter2", "open": "hello"}));
    let text = block_on(stringify(&doc, &[&RedactSecret])).unwrap();
    assert_eq!(text, r#"{"secret":"<redacted>","open":"hello"}"#);
}

#[test]
fn shared_node_is_staged_once_and_substituted_everywhere() {
    struct CountUpper(RefCell<usize>);

    #[async_trait(?Send)]
    impl Transform for CountUpper {
        fn test_encode(&self, value: &Node, _key: &str) -> bool {
            matches!(value, Node::Record(_))
        }

        async fn encode(&self, value: Node, _key: &str) -> Result<Node, BoxError> {
            *self.0.borrow_mut() += 1;
            Ok(value)
        }
    }

    let shared = Node::record([("v", Node::from(1i64))]);
    let doc = Node::record([("a", shared.clone()), ("b", shared)]);
    let counter = CountUpper(RefCell::new(0));
    let text = block_on(stringify(&doc, &[&counter])).unwrap();
    // Root plus the shared record once; the second occurrence is a token.
    assert_eq!(*counter.0.borrow(), 2);
    assert_eq!(text, r#"{"a":{"v":1},"b":"$ref:[\"a\"]"}"#);
}

/// The number-widening stage from the upstream demo: big integers travel as
/// `b`-prefixed strings, ordinary strings get an `s` in front.
struct BigNum;

#[async_trait(?Send)]
impl Transform for BigNum {
    fn test_encode(&self, value: &Node, _key: &str) -> bool {
        matches!(value, Node::Number(_) | Node::String(_))
    }

    async fn encode(&self, value: Node, _key: &str) -> Result<Node, BoxError> {
        Ok(match value {
            Node::Number(n) => Node::String(format!("b{n}")),
            Node::String(s) => Node::String(format!("s{s}")),
            other => other,
        })
    }

    fn test_decode(&self, value: &Node, _key: &str) -> bool {
        matches!(value, Node::String(_))
    }

    async fn decode(&self, value: Node, _key: &str) -> Result<Node, BoxError> {
        let Node::String(s) = value else { return Ok(value) };
        Ok(match s.split_at(1) {
            ("s", rest) => Node::String(rest.to_string()),
            ("b", rest) => Node::Number(rest.parse::<i64>()?.into()),
            _ => Node::String(s),
        })
    }
}

#[test]
fn number_widening_stage_round_trips() {
    let doc = Node::from_json(&json!({"name": "memo", "age": 18}));
    let text = block_on(stringify(&doc, &[&BigNum])).unwrap();
    assert_eq!(text, r#"{"name":"smemo","age":"b18"}"#);

    let back = block_on(parse(&text, &[&BigNum])).unwrap();
    assert_eq!(back, doc);
}

#[derive(Debug, PartialEq)]
struct Bytes(Vec<u8>);

impl OpaqueValue for Bytes {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Serialize, Deserialize)]
struct BinaryPayload {
    kind: String,
    data: String,
}

/// An adapter-style stage: carries opaque byte buffers through JSON strings
/// behind its own `$bin:` prefix, escaping colliding literals itself.
struct BinaryStage {
    codec: PrefixCodec<BinaryPayload>,
}

impl BinaryStage {
    fn new() -> Self {
        BinaryStage {
            codec: PrefixCodec::new("$bin:", '_'),
        }
    }
}

#[async_trait(?Send)]
impl Transform for BinaryStage {
    fn test_encode(&self, value: &Node, _key: &str) -> bool {
        match value {
            Node::String(_) => true,
            Node::Opaque(o) => o.as_any().downcast_ref::<Bytes>().is_some(),
            _ => false,
        }
    }

    async fn encode(&self, value: Node, _key: &str) -> Result<Node, BoxError> {
        Ok(match value {
            Node::String(s) => Node::String(self.codec.encode_str(&s)),
            Node::Opaque(o) => match o.as_any().downcast_ref::<Bytes>() {
                Some(bytes) => {
                    let payload = BinaryPayload {
                        kind: "bytes".to_string(),
                        data: base64::engine::general_purpose::STANDARD.encode(&bytes.0),
                    };
                    Node::String(self.codec.encode_payload(&payload)?)
                }
                None => Node::Opaque(o),
            },
            other => other,
        })
    }

    fn test_decode(&self, value: &Node, _key: &str) -> bool {
        matches!(value, Node::String(_))
    }

    async fn decode(&self, value: Node, _key: &str) -> Result<Node, BoxError> {
        let Node::String(s) = value else { return Ok(value) };
        Ok(match self.codec.decode(&s)? {
            Decoded::Literal(literal) => Node::String(literal),
            Decoded::Payload(payload) => {
                let data = base64::engine::general_purpose::STANDARD.decode(payload.data)?;
                Node::opaque(Bytes(data))
            }
        })
    }
}

#[test]
fn opaque_binary_payload_round_trips_through_a_stage() {
    let stage = BinaryStage::new();
    let doc = Node::record([
        ("name", Node::from("blob")),
        ("data", Node::opaque(Bytes(vec![0, 159, 146, 150]))),
    ]);

    let text = block_on(stringify(&doc, &[&stage])).unwrap();
    assert!(text.contains("$bin:"));

    let back = block_on(parse(&text, &[&stage])).unwrap();
    let data = json_graft::path::get(&back, &["data".to_string()]).unwrap();
    match data {
        Node::Opaque(o) => {
            let bytes = o.as_any().downcast_ref::<Bytes>().unwrap();
            assert_eq!(bytes.0, vec![0, 159, 146, 150]);
        }
        other => panic!("expected opaque bytes, got {other:?}"),
    }
}

#[test]
fn shared_opaque_round_trips_reference_identical_through_a_stage() {
    let stage = BinaryStage::new();
    let blob = Node::opaque(Bytes(vec![1, 2, 3]));
    let doc = Node::record([("x", blob.clone()), ("y", blob)]);

    let text = block_on(stringify(&doc, &[&stage])).unwrap();
    let back = block_on(parse(&text, &[&stage])).unwrap();

    let x = json_graft::path::get(&back, &["x".to_string()]).unwrap();
    let y = json_graft::path::get(&back, &["y".to_string()]).unwrap();
    assert!(x.same(&y), "shared opaque decodes to one allocation");
}
