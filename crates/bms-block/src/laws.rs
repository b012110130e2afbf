//! Property checks for the contract between diff and apply.
//!
//! Documents are drawn from a configuration-like shape (named blocks, a
//! two-level keyed array with per-type sub-schemas, a flat keyed array) mixed
//! with arbitrary JSON, so that every branch of the diff engine is reached.

use proptest::collection::{btree_map, vec};
use proptest::option;
use proptest::prelude::*;
use proptest::strategy::Union;
use serde_json::{json, Value as Json};

use crate::{apply_patches_to_value, diff_values, sort_patches, Block, Path, Value, ValueKind};

fn schema() -> Vec<Block> {
    vec![
        Block::new(["name"]),
        Block::new(["site", "zones"])
            .with_key("id")
            .with_type_key("kind")
            .with_type_blocks("ahu", vec![Block::new(["points"]).with_key("id")])
            .with_blocks(vec![Block::new(["setpoint"])]),
        Block::new(["meters"]).with_key("id"),
    ]
}

fn arb_json() -> impl Strategy<Value = Json> {
    let leaf = prop_oneof![
        Just(Json::Null),
        any::<bool>().prop_map(Json::Bool),
        (-3i64..3).prop_map(|n| json!(n)),
        "[xy]{0,2}".prop_map(Json::String),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            vec(inner.clone(), 0..3).prop_map(Json::Array),
            btree_map("[abc]", inner, 0..3)
                .prop_map(|members| Json::Object(members.into_iter().collect())),
        ]
    })
}

fn arb_points() -> impl Strategy<Value = Json> {
    btree_map(0u8..4, arb_json(), 0..4)
        .prop_map(|points| {
            points
                .into_iter()
                .map(|(id, v)| json!({"id": id, "v": v}))
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
        .prop_map(Json::Array)
}

fn arb_zones() -> impl Strategy<Value = Json> {
    let body = (
        option::of(prop_oneof![Just("ahu"), Just("vav")]),
        option::of(arb_json()),
        option::of(arb_points()),
        option::of(arb_json()),
    );
    btree_map(0u8..5, body, 0..4)
        .prop_map(|zones| {
            zones
                .into_iter()
                .map(|(id, (kind, setpoint, points, label))| {
                    let mut zone = serde_json::Map::new();
                    zone.insert("id".into(), json!(id));
                    if let Some(kind) = kind {
                        zone.insert("kind".into(), json!(kind));
                    }
                    if let Some(setpoint) = setpoint {
                        zone.insert("setpoint".into(), setpoint);
                    }
                    if let Some(points) = points {
                        zone.insert("points".into(), points);
                    }
                    if let Some(label) = label {
                        zone.insert("label".into(), label);
                    }
                    Json::Object(zone)
                })
                .collect::<Vec<_>>()
        })
        .prop_shuffle()
        .prop_map(Json::Array)
}

fn arb_site() -> impl Strategy<Value = Json> {
    (option::of(arb_zones()), option::of(arb_json())).prop_map(|(zones, label)| {
        let mut site = serde_json::Map::new();
        if let Some(zones) = zones {
            site.insert("zones".into(), zones);
        }
        if let Some(label) = label {
            site.insert("label".into(), label);
        }
        Json::Object(site)
    })
}

fn arb_config() -> impl Strategy<Value = Json> {
    (
        option::of(arb_json()),
        option::of(prop_oneof![4 => arb_site(), 1 => arb_json()]),
        option::of(arb_points()),
        option::of(arb_json()),
    )
        .prop_map(|(name, site, meters, other)| {
            let mut config = serde_json::Map::new();
            for (field, value) in [("name", name), ("site", site), ("meters", meters), ("b", other)] {
                if let Some(value) = value {
                    config.insert(field.into(), value);
                }
            }
            Json::Object(config)
        })
}

fn arb_doc() -> impl Strategy<Value = Value> {
    prop_oneof![8 => arb_config(), 1 => arb_json()].prop_map(Value::from)
}

/// Any document whose kind is not `kind`.
fn arb_doc_not_of(kind: ValueKind) -> impl Strategy<Value = Value> {
    let by_kind: Vec<(ValueKind, BoxedStrategy<Value>)> = vec![
        (ValueKind::Null, Just(Value::null()).boxed()),
        (ValueKind::Bool, any::<bool>().prop_map(Value::from).boxed()),
        (ValueKind::Number, (-3i64..3).prop_map(Value::from).boxed()),
        (ValueKind::String, "[xy]{0,2}".prop_map(Value::from).boxed()),
        (
            ValueKind::Array,
            vec(arb_json(), 0..3).prop_map(|items| Value::from(Json::Array(items))).boxed(),
        ),
        (ValueKind::Object, arb_config().prop_map(Value::from).boxed()),
    ];
    Union::new(
        by_kind
            .into_iter()
            .filter(|(k, _)| *k != kind)
            .map(|(_, strategy)| strategy),
    )
}

/// Two documents of different kinds.
fn arb_kind_change() -> impl Strategy<Value = (Value, Value)> {
    arb_doc().prop_flat_map(|a| {
        let b = arb_doc_not_of(a.kind());
        (Just(a), b)
    })
}

/// Keyed arrays are compared by identity, not position: patching appends new
/// elements at the end.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            Value::Object(map.iter().map(|(k, v)| (k.clone(), canonical(v))).collect())
        }
        Value::Array(items) => {
            let mut items: Vec<Value> = items.iter().map(canonical).collect();
            let keyed = !items.is_empty()
                && items
                    .iter()
                    .all(|item| matches!(item.get("id"), Some(Value::Scalar(_))));
            if keyed {
                items.sort_by_key(|item| {
                    item.get("id").and_then(Value::as_scalar).map(|s| s.identity())
                });
            }
            Value::Array(items)
        }
        other => other.clone(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn apply_after_diff_reproduces_target(a in arb_doc(), b in arb_doc()) {
        let patches = diff_values(&a, &b, &schema()).unwrap();
        let applied = apply_patches_to_value(&a, &patches).unwrap();
        prop_assert_eq!(canonical(&applied), canonical(&b));
    }

    #[test]
    fn diff_against_self_is_empty(a in arb_doc()) {
        prop_assert!(diff_values(&a, &a, &schema()).unwrap().is_empty());
    }

    #[test]
    fn type_change_is_one_root_replacement((a, b) in arb_kind_change()) {
        prop_assert_ne!(a.kind(), b.kind());
        let patches = diff_values(&a, &b, &schema()).unwrap();
        prop_assert_eq!(patches.len(), 1);
        prop_assert_eq!(&patches[0].path, &Path::root());
        prop_assert!(!patches[0].deleted);
        prop_assert_eq!(&patches[0].value, &b);
    }

    #[test]
    fn patch_order_does_not_matter(
        a in arb_doc(),
        b in arb_doc(),
        seed in any::<u64>(),
    ) {
        let mut patches = diff_values(&a, &b, &schema()).unwrap();
        let in_order = apply_patches_to_value(&a, &patches).unwrap();

        // Deterministic reshuffle: sort, then rotate by the seed.
        sort_patches(&mut patches);
        patches.reverse();
        if !patches.is_empty() {
            let shift = (seed % patches.len() as u64) as usize;
            patches.rotate_left(shift);
        }
        let reordered = apply_patches_to_value(&a, &patches).unwrap();
        prop_assert_eq!(canonical(&reordered), canonical(&in_order));
    }

    #[test]
    fn diff_survives_the_wire(a in arb_doc(), b in arb_doc()) {
        let patches = diff_values(&a, &b, &schema()).unwrap();
        let text = serde_json::to_string(&patches).unwrap();
        let decoded: Vec<crate::Patch> = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(decoded, patches);
    }
}
