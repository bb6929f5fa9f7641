#[cfg(test)]
mod proptests {
    use std::collections::BTreeMap;

    use proptest::prelude::*;
    use pr_core::Entity;
    use serde_json::json;
    use testing::ProjectBuilder;

    use crate::merge::merge;

    #[derive(Debug, Clone)]
    struct Shape {
        version: u64,
        last_modified: i64,
        deleted_at: Option<i64>,
        summary: String
    }

    fn shape() -> impl Strategy<Value = Shape> {
        (1u64..4, 0i64..6, prop::option::of(0i64..8), "[a-c]{0,2}").prop_map(
            |(version, last_modified, deleted_at, summary)| Shape {
                version,
                last_modified,
                deleted_at,
                summary
            }
        )
    }

    fn build(name: &str, shape: &Shape) -> Entity {
        let mut builder = ProjectBuilder::new(name)
            .version(shape.version)
            .last_modified(shape.last_modified)
            .field("summary", json!(shape.summary));
        if let Some(deleted) = shape.deleted_at {
            builder = builder.deleted_at(deleted);
        }
        builder.build()
    }

    fn collection() -> impl Strategy<Value = Vec<Entity>> {
        prop::collection::btree_map("[a-e]", shape(), 0..5).prop_map(|shapes| {
            shapes
                .iter()
                .map(|(name, shape)| build(name, shape))
                .collect()
        })
    }

    fn by_key(entities: &[Entity]) -> BTreeMap<String, Entity> {
        entities
            .iter()
            .map(|e| (e.natural_key().to_string(), e.clone()))
            .collect()
    }

    proptest! {
        #[test]
        fn test_merge_is_idempotent(x in collection()) {
            let merged = merge(&x, &x);
            prop_assert_eq!(merged.entities, by_key(&x));
            prop_assert_eq!(merged.report.conflicts(), 0);
        }

        #[test]
        fn test_merge_outcome_ignores_argument_order(a in collection(), b in collection()) {
            let ab = merge(&a, &b);
            let ba = merge(&b, &a);
            prop_assert_eq!(ab.entities, ba.entities);
        }

        #[test]
        fn test_local_only_entities_survive(
            local in collection(),
            remote in collection(),
            extra in shape()
        ) {
            let fresh = build("new-item", &extra);
            let mut local = local;
            local.push(fresh.clone());

            let merged = merge(&local, &remote);
            prop_assert_eq!(merged.entities.get("new-item"), Some(&fresh));
        }

        #[test]
        fn test_higher_version_wins_regardless_of_time(
            low in 1u64..5,
            bump in 1u64..5,
            local_secs in 0i64..100,
            remote_secs in 0i64..100
        ) {
            let local = ProjectBuilder::new("Foo")
                .version(low + bump)
                .last_modified(local_secs)
                .field("summary", json!("local"))
                .build();
            let remote = ProjectBuilder::new("Foo")
                .version(low)
                .last_modified(remote_secs)
                .field("summary", json!("remote"))
                .build();

            let merged = merge(&[local.clone()], &[remote]);
            prop_assert_eq!(&merged.entities["Foo"], &local);
        }

        #[test]
        fn test_tombstone_hides_only_older_edits(edited in 0i64..50, deleted in 0i64..50) {
            let local = ProjectBuilder::new("Foo").version(1).last_modified(edited).build();
            let remote = ProjectBuilder::new("Foo").version(1).deleted_at(deleted).build();

            let merged = merge(&[local.clone()], &[remote]);
            let live = merged.live().count();
            if deleted > edited {
                prop_assert_eq!(live, 0);
            } else {
                prop_assert_eq!(&merged.entities["Foo"], &local);
            }
        }

        #[test]
        fn test_sanitized_keys_are_deterministic_and_usable(name in "[a-zA-Z0-9 ._#$\\[\\]-]{1,12}") {
            let key = utils::sanitize_key(&name);
            prop_assert_eq!(&key, &utils::sanitize_key(&name));
            prop_assert!(utils::is_valid_remote_key(&key));
        }
    }
}
