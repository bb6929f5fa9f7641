use pr_core::{Collection, ProjectStatus, RemoteStore, RemoteTree};
use serde_json::json;
use storage::InMemoryRemote;
use sync::key_registry::KeyRegistry;
use sync::{Winner, merge, resolve};
use testing::{FeedbackBuilder, ProjectBuilder, at};

#[test]
fn test_remote_archive_beats_newer_local_edit() {
    // Local v1 edited at t=10, remote archived as v2 at t=5.
    let local = ProjectBuilder::new("Foo").version(1).at(10).build();
    let remote = ProjectBuilder::new("Foo")
        .version(2)
        .at(5)
        .status(ProjectStatus::Archived)
        .build();

    let merged = merge(&[local], &[remote.clone()]);
    assert_eq!(merged.entities["Foo"], remote);
    assert_eq!(merged.report.remote_wins, 1);
    assert!(merged.report.changes_local());
}

#[test]
fn test_local_deletion_outlives_older_remote_edit() {
    let local = ProjectBuilder::new("Foo").version(2).at(50).deleted_at(100).build();
    let remote = ProjectBuilder::new("Foo").version(1).at(50).build();

    assert_eq!(resolve(&local, &remote), Winner::Local);
    let merged = merge(&[local], &[remote]);
    assert_eq!(merged.live().count(), 0);
    assert_eq!(merged.report.tombstoned, 1);
}

#[test]
fn test_remote_deletion_equal_to_edit_keeps_live_copy() {
    let local = ProjectBuilder::new("Foo").version(1).at(50).build();
    let remote = ProjectBuilder::new("Foo").version(1).at(10).deleted_at(50).build();

    let merged = merge(&[local.clone()], &[remote]);
    assert_eq!(merged.entities["Foo"], local);
}

#[test]
fn test_feedback_merges_by_id_across_projects() {
    let local = vec![
        FeedbackBuilder::new("f1", "Foo").build(),
        FeedbackBuilder::new("f2", "Foo").text("local").version(2).build(),
    ];
    let remote = vec![
        FeedbackBuilder::new("f2", "Foo").text("remote").build(),
        FeedbackBuilder::new("f3", "Bar").build(),
    ];

    let merged = merge(&local, &remote);
    assert_eq!(merged.entities.len(), 3);
    assert_eq!(merged.entities["f2"].str_field("feedbackText"), Some("local"));
    assert_eq!(merged.report.adopted_local, 1);
    assert_eq!(merged.report.remote_only, 1);
    assert_eq!(merged.report.local_wins, 1);
}

#[tokio::test]
async fn test_put_fetch_merge_round_trip() {
    let remote = InMemoryRemote::new();
    let pushed = ProjectBuilder::new("Foo")
        .version(3)
        .at(42)
        .tags(&["ai", "ops"])
        .images(2)
        .field("customField", json!({"nested": [1, 2, 3]}))
        .build();
    remote
        .put_entity(Collection::Projects, "Foo", &pushed.to_json())
        .await
        .unwrap();

    let fetched = remote.fetch_all().await.unwrap();
    let remote_side: Vec<_> = fetched.projects.into_values().collect();
    let merged = merge(&[], &remote_side);
    assert_eq!(merged.entities["Foo"], pushed);
}

#[test]
fn test_malformed_remote_documents_do_not_poison_the_tree() {
    let tree = RemoteTree::from_json(&json!({
        "projects": {
            "Foo": {"projectName": "Foo", "_lastModified": "not a date", "_version": "2"},
            "Bad": 17
        },
        "feedback": null
    }));

    let foo = &tree.projects["Foo"];
    assert_eq!(foo.id, "Foo");
    assert!(foo.last_modified.is_none());
    assert!(!tree.projects.contains_key("Bad"));
    assert!(tree.feedback.is_empty());

    let merged = merge(&[ProjectBuilder::new("Foo").version(1).at(1).build()], &[foo.clone()]);
    assert_eq!(merged.entities.len(), 1);
}

#[test]
fn test_independent_writers_derive_the_same_remote_key() {
    let mut a = KeyRegistry::new();
    let mut b = KeyRegistry::new();
    assert_eq!(a.register("v1.2 [beta]"), b.register("v1.2 [beta]"));
    assert_eq!(a.resolve("v1_2 _beta_"), "v1.2 [beta]");
}

#[test]
fn test_colliding_names_are_never_guessed() {
    let mut registry = KeyRegistry::new();
    registry.rebuild(["a.b", "a_b", "Foo"]);

    assert_eq!(registry.natural_for("a_b"), None);
    assert_eq!(registry.resolve("a_b"), "a_b");
    assert_eq!(registry.collisions().len(), 1);
    assert_eq!(registry.natural_for("Foo"), Some("Foo"));
}

#[test]
fn test_local_only_legacy_entity_gets_sync_fields() {
    let legacy = ProjectBuilder::new("Old").legacy().build();
    let merged = merge(&[legacy], &[]);
    let adopted = &merged.entities["Old"];
    assert_eq!(adopted.version, 1);
    assert_eq!(adopted.last_modified, Some(at(1)));
}
