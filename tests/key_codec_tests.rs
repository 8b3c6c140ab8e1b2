// Key codec tests
// Composite key layout, malformed input, clustering comparison.

use std::cmp::Ordering;

use proptest::prelude::*;
use sstable_reader::key::{EOC_END, EOC_MORE};
use sstable_reader::{ClusteringOrder, ColumnType, Error, KeyCodec, Schema, Value};

fn table(order: ClusteringOrder) -> Schema {
    Schema::builder("ks", "events")
        .partition_key("user", ColumnType::Text)
        .partition_key("day", ColumnType::Int)
        .clustering_with_order("at", ColumnType::BigInt, order)
        .clustering("seq", ColumnType::Int)
        .regular_column("payload", ColumnType::Blob)
        .build()
        .unwrap()
}

// =============================================================================
// Test 1: Composite partition key is length-prefixed with end-of-component bytes
// =============================================================================
#[test]
fn composite_partition_key_layout() {
    let schema = table(ClusteringOrder::Asc);
    let key = schema
        .encode_partition_key(&[Value::from("bob"), Value::Int(258)])
        .unwrap();
    let expected = [
        vec![0x00, 0x03],
        b"bob".to_vec(),
        vec![EOC_MORE],
        vec![0x00, 0x04, 0x00, 0x00, 0x01, 0x02],
        vec![EOC_END],
    ]
    .concat();
    assert_eq!(key, expected);
    assert_eq!(
        schema.decode_partition_key(&key).unwrap(),
        vec![Value::from("bob"), Value::Int(258)]
    );

    let parts = KeyCodec::split(&key, 2).unwrap();
    assert_eq!(parts, vec![&b"bob"[..], &[0, 0, 1, 2][..]]);
}

// =============================================================================
// Test 2: Wrong number of values or wrong types → SchemaMismatch
// =============================================================================
#[test]
fn arity_and_type_mismatch() {
    let schema = table(ClusteringOrder::Asc);
    assert!(matches!(
        schema.encode_partition_key(&[Value::from("bob")]),
        Err(Error::SchemaMismatch(_))
    ));
    assert!(matches!(
        schema.encode_clustering(&[Value::Int(1), Value::Int(2)]),
        Err(Error::SchemaMismatch(_))
    ));

    let three = [
        vec![0x00, 0x01, b'a', EOC_MORE],
        vec![0x00, 0x01, b'b', EOC_MORE],
        vec![0x00, 0x01, b'c', EOC_END],
    ]
    .concat();
    assert!(matches!(
        KeyCodec::split(&three, 2),
        Err(Error::SchemaMismatch(_))
    ));
}

// =============================================================================
// Test 3: Truncated or overrunning components → MalformedKey
// =============================================================================
#[test]
fn malformed_composites() {
    let schema = table(ClusteringOrder::Asc);
    let cases: [&[u8]; 4] = [
        &[0x00],
        &[0x00, 0x05, b'a', b'b', EOC_END],
        &[0x00, 0x01, b'a'],
        &[0x00, 0x01, b'a', EOC_END, 0x00, 0x04, 0, 0, 0, 1, EOC_END],
    ];
    for key in cases {
        assert!(
            matches!(schema.decode_partition_key(key), Err(Error::MalformedKey(_))),
            "{key:?}"
        );
    }

    // Valid framing, but the int component has the wrong width.
    let short_int = [vec![0x00, 0x01, b'a', EOC_MORE], vec![0x00, 0x02, 0, 1, EOC_END]].concat();
    assert!(matches!(
        schema.decode_partition_key(&short_int),
        Err(Error::MalformedKey(_))
    ));

    // Invalid UTF-8 in a text component.
    let bad_text = [vec![0x00, 0x01, 0xFF, EOC_MORE], vec![0x00, 0x04, 0, 0, 0, 1, EOC_END]].concat();
    assert!(matches!(
        schema.decode_partition_key(&bad_text),
        Err(Error::MalformedKey(_))
    ));
}

// =============================================================================
// Test 4: Descending clustering columns reverse only their own component
// =============================================================================
#[test]
fn descending_clustering_order() {
    let schema = table(ClusteringOrder::Desc);
    let ck = |at: i64, seq: i32| {
        schema
            .encode_clustering(&[Value::BigInt(at), Value::Int(seq)])
            .unwrap()
    };
    assert_eq!(schema.compare_clustering(&ck(10, 0), &ck(5, 0)), Ordering::Less);
    assert_eq!(schema.compare_clustering(&ck(5, 1), &ck(5, 2)), Ordering::Less);
    assert_eq!(schema.compare_clustering(&ck(-1, 9), &ck(-1, 9)), Ordering::Equal);
}

fn value_strategy(column_type: ColumnType) -> BoxedStrategy<Value> {
    match column_type {
        ColumnType::Text => ".{0,24}".prop_map(Value::Text).boxed(),
        ColumnType::Int => any::<i32>().prop_map(Value::Int).boxed(),
        ColumnType::BigInt => any::<i64>().prop_map(Value::BigInt).boxed(),
        _ => any::<Vec<u8>>().prop_map(Value::Blob).boxed(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Encoding then decoding a partition key returns the same values.
    #[test]
    fn prop_partition_key_roundtrip(
        user in value_strategy(ColumnType::Text),
        day in value_strategy(ColumnType::Int),
    ) {
        let schema = table(ClusteringOrder::Asc);
        let values = vec![user, day];
        let key = schema.encode_partition_key(&values).unwrap();
        prop_assert_eq!(schema.decode_partition_key(&key).unwrap(), values);
    }

    /// The clustering comparator agrees with comparing the typed values.
    #[test]
    fn prop_clustering_order_matches_values(
        a in (any::<i64>(), any::<i32>()),
        b in (any::<i64>(), any::<i32>()),
        descending in any::<bool>(),
    ) {
        let order = if descending { ClusteringOrder::Desc } else { ClusteringOrder::Asc };
        let schema = table(order);
        let encode = |(at, seq): (i64, i32)| {
            schema.encode_clustering(&[Value::BigInt(at), Value::Int(seq)]).unwrap()
        };
        let at = if descending { b.0.cmp(&a.0) } else { a.0.cmp(&b.0) };
        let expected = at.then(a.1.cmp(&b.1));
        prop_assert_eq!(schema.compare_clustering(&encode(a), &encode(b)), expected);
    }

    /// Arbitrary bytes never panic the decoder.
    #[test]
    fn prop_decode_arbitrary_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
        let schema = table(ClusteringOrder::Asc);
        let _ = schema.decode_partition_key(&bytes);
        let _ = schema.decode_clustering(&bytes);
    }
}
