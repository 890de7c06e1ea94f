//! Entry store behavior against a real filesystem.

use smartweb::Entry;

#[tokio::test]
async fn uncommitted_write_keeps_previous_data() {
    let dir = tempfile::tempdir().unwrap();
    let entry = Entry::root(dir.path()).child("site/page");
    entry.write(b"v1").await.unwrap();

    let mut writer = entry.create().await.unwrap();
    writer.write_all(b"v2-partial").await.unwrap();
    assert_eq!(entry.read().await.unwrap(), b"v1");
    drop(writer);
    assert_eq!(entry.read().await.unwrap(), b"v1");

    let mut writer = entry.create().await.unwrap();
    writer.write_all(b"v2").await.unwrap();
    writer.commit().await.unwrap();
    assert_eq!(entry.read().await.unwrap(), b"v2");
}

#[tokio::test]
async fn children_are_listed_once_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let folder = Entry::root(dir.path()).child("folder/");

    folder.child("b").write(b"").await.unwrap();
    folder.child("a").write(b"").await.unwrap();
    // Data, metadata and a subtree for the same name.
    folder.child("a").parameters().child("note").write(b"").await.unwrap();
    folder.child("a/inner").write(b"").await.unwrap();
    // A staging file alone does not make a child.
    let _pending = folder.child("c").create().await.unwrap();

    let names: Vec<String> = folder
        .children()
        .await
        .unwrap()
        .iter()
        .map(|c| c.name().to_string())
        .collect();
    assert_eq!(names, ["a", "b"]);
}

#[tokio::test]
async fn delete_all_cascades_but_spares_siblings() {
    let dir = tempfile::tempdir().unwrap();
    let root = Entry::root(dir.path());
    let doc = root.child("doc");
    let sibling = root.child("doc2");

    doc.write(b"x").await.unwrap();
    doc.parameters().child("headers/Content-Type").write(b"text/plain").await.unwrap();
    doc.child("attachment").write(b"y").await.unwrap();
    doc.child("folder/deep").write(b"w").await.unwrap();
    sibling.write(b"z").await.unwrap();
    sibling.parameters().child("tag").write(b"keep").await.unwrap();

    doc.delete_all().await.unwrap();

    assert!(!doc.exists().await);
    assert!(!doc.dir_exists().await);
    assert!(doc.parameters().child("headers").children().await.unwrap().is_empty());
    assert!(doc.children().await.unwrap().is_empty());
    for descendant in [doc.child("attachment"), doc.child("folder/"), doc.child("folder/deep")] {
        assert!(!descendant.exists().await, "{descendant}");
        assert!(descendant.children().await.unwrap().is_empty(), "{descendant}");
    }
    assert_eq!(sibling.read().await.unwrap(), b"z");
    assert_eq!(sibling.parameters().child("tag").read().await.unwrap(), b"keep");
}

#[tokio::test]
async fn deleting_the_root_empties_it() {
    let dir = tempfile::tempdir().unwrap();
    let root = Entry::root(dir.path());
    root.child("a/b/c").write(b"deep").await.unwrap();
    root.child("top").write(b"t").await.unwrap();

    root.delete_all().await.unwrap();

    assert!(dir.path().is_dir());
    assert!(root.children().await.unwrap().is_empty());
}

#[tokio::test]
async fn missing_entry_reads_as_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = Entry::root(dir.path()).child("nope").read().await.unwrap_err();
    assert!(err.is_not_found());
}
