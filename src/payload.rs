//! Payload conversion for queue entries.
//!
//! Callers hand the queue an [`Item`] — a closed set of payload shapes —
//! and the converter turns it into the opaque binary [`Payload`] stored in
//! the table's `data` column. Conversion is a pure data-shape transformation
//! with no side effects; a batch that fails conversion never reaches the
//! database.

use serde::Serialize;

use crate::error::{QueueError, QueueResult};

/// Binary representation of one queue entry as stored in the `data` column.
pub type Payload = Vec<u8>;

/// Priority assigned when the caller supplies none.
pub const DEFAULT_PRIORITY: i64 = 0;

/// Sentinel stored for [`Item::Empty`].
const EMPTY_SENTINEL: &[u8] = b"{}";

/// A value that can serialize itself to binary.
///
/// Implement this for application types that carry their own wire format.
/// The encoder may fail; a failing encoder surfaces as
/// [`QueueError::UnsupportedPayload`] carrying the concrete type name.
pub trait BinaryEncode: Send + Sync {
    /// Produce the binary representation of this value.
    fn to_bytes(&self) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>;

    /// Concrete type name reported in conversion errors.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// One enqueueable item.
///
/// The accepted payload shapes form a closed set; anything else is a
/// compile error at the call site rather than a runtime rejection.
pub enum Item {
    /// Zero-value marker, stored as the two-byte `{}` sentinel
    Empty,
    /// A pre-built binary payload, passed through unchanged
    Bytes(Vec<u8>),
    /// A value exposing the serialize-to-binary capability
    Encode(Box<dyn BinaryEncode>),
}

impl Item {
    /// Build a `Bytes` item by serializing `value` as JSON.
    pub fn json<T: Serialize>(value: &T) -> QueueResult<Self> {
        let bytes = serde_json::to_vec(value)
            .map_err(|e| QueueError::unsupported(std::any::type_name::<T>(), Some(Box::new(e))))?;
        Ok(Self::Bytes(bytes))
    }
}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => f.write_str("Item::Empty"),
            Self::Bytes(b) => f.debug_tuple("Item::Bytes").field(&b.len()).finish(),
            Self::Encode(v) => f.debug_tuple("Item::Encode").field(&v.type_name()).finish(),
        }
    }
}

impl From<Vec<u8>> for Item {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<&[u8]> for Item {
    fn from(bytes: &[u8]) -> Self {
        Self::Bytes(bytes.to_vec())
    }
}

impl From<String> for Item {
    fn from(s: String) -> Self {
        Self::Bytes(s.into_bytes())
    }
}

impl From<&str> for Item {
    fn from(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }
}

/// Convert one item into its stored payload.
pub fn convert_single(item: Item) -> QueueResult<Payload> {
    match item {
        Item::Empty => Ok(EMPTY_SENTINEL.to_vec()),
        Item::Bytes(bytes) => Ok(bytes),
        Item::Encode(value) => value
            .to_bytes()
            .map_err(|e| QueueError::unsupported(value.type_name(), Some(e))),
    }
}

/// Convert an ordered batch, short-circuiting on the first failure.
pub fn convert_multiple(items: Vec<Item>) -> QueueResult<Vec<Payload>> {
    let mut payloads = Vec::with_capacity(items.len());
    for item in items {
        payloads.push(convert_single(item)?);
    }
    Ok(payloads)
}

/// Convert a batch and pair each payload with a priority.
///
/// A single supplied priority applies to the whole batch; a slice in 1:1
/// correspondence zips; any other arity falls back to
/// [`DEFAULT_PRIORITY`] for every item.
pub fn convert_multiple_with_priority(
    items: Vec<Item>,
    priorities: &[i64],
) -> QueueResult<Vec<(Payload, i64)>> {
    let count = items.len();
    let payloads = convert_multiple(items)?;
    let paired = payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| {
            let priority = match priorities {
                [single] => *single,
                slice if slice.len() == count => slice[i],
                _ => DEFAULT_PRIORITY,
            };
            (payload, priority)
        })
        .collect();
    Ok(paired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    struct Failing;

    impl BinaryEncode for Failing {
        fn to_bytes(&self) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
            Err("no binary representation".into())
        }
    }

    struct Greeting(String);

    impl BinaryEncode for Greeting {
        fn to_bytes(&self) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(self.0.as_bytes().to_vec())
        }
    }

    #[test]
    fn empty_item_becomes_sentinel() {
        let payload = convert_single(Item::Empty).unwrap();
        assert_eq!(payload, b"{}");
    }

    #[test]
    fn bytes_pass_through_unchanged() {
        let payload = convert_single(Item::from(&b"hello"[..])).unwrap();
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn encodable_item_is_invoked() {
        let item = Item::Encode(Box::new(Greeting("hi".to_string())));
        assert_eq!(convert_single(item).unwrap(), b"hi");
    }

    #[test]
    fn failing_encoder_reports_unsupported_with_type_name() {
        let err = convert_single(Item::Encode(Box::new(Failing))).unwrap_err();
        match err {
            QueueError::UnsupportedPayload { type_name, .. } => {
                assert!(type_name.contains("Failing"));
            }
            other => panic!("expected UnsupportedPayload, got {other}"),
        }
    }

    #[test]
    fn json_constructor_serializes() {
        #[derive(Serialize)]
        struct Job {
            id: u32,
        }

        let item = Item::json(&Job { id: 7 }).unwrap();
        assert_eq!(convert_single(item).unwrap(), br#"{"id":7}"#);
    }

    #[test]
    fn multiple_short_circuits_on_first_failure() {
        let items = vec![
            Item::from("first"),
            Item::Encode(Box::new(Failing)),
            Item::from("third"),
        ];
        let err = convert_multiple(items).unwrap_err();
        assert!(matches!(err, QueueError::UnsupportedPayload { .. }));
    }

    #[test]
    fn single_priority_broadcasts_to_batch() {
        let items = vec![Item::from("a"), Item::from("b"), Item::from("c")];
        let paired = convert_multiple_with_priority(items, &[5]).unwrap();
        assert!(paired.iter().all(|(_, p)| *p == 5));
    }

    #[test]
    fn matching_priorities_zip_in_order() {
        let items = vec![Item::from("a"), Item::from("b")];
        let paired = convert_multiple_with_priority(items, &[3, 1]).unwrap();
        assert_eq!(paired[0], (b"a".to_vec(), 3));
        assert_eq!(paired[1], (b"b".to_vec(), 1));
    }

    #[test]
    fn mismatched_priorities_fall_back_to_default() {
        let items = vec![Item::from("a"), Item::from("b"), Item::from("c")];
        let paired = convert_multiple_with_priority(items, &[3, 1]).unwrap();
        assert!(paired.iter().all(|(_, p)| *p == DEFAULT_PRIORITY));
    }

    #[test]
    fn empty_priorities_use_default() {
        let items = vec![Item::Empty];
        let paired = convert_multiple_with_priority(items, &[]).unwrap();
        assert_eq!(paired, vec![(b"{}".to_vec(), DEFAULT_PRIORITY)]);
    }
}
