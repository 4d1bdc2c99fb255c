use bytes::Bytes;
use std::sync::Arc;
use tempfile::tempdir;
use tripwire_storage::{FilesystemBackend, MediaKind, Storage, StorageError};

#[tokio::test]
async fn save_creates_namespace_and_round_trips() {
    let temp = tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path(), false).await.unwrap();

    assert!(backend.list(MediaKind::Pdf).await.unwrap().is_empty());
    assert!(!temp.path().join("pdf").exists());

    let locator = backend
        .save(MediaKind::Pdf, Bytes::from_static(b"%PDF-1.7"), "report.pdf", None)
        .await
        .unwrap();
    assert_eq!(
        locator,
        temp.path().join("pdf/report.pdf").to_string_lossy()
    );

    assert_eq!(
        backend.get(MediaKind::Pdf, "report.pdf").await.unwrap().as_ref(),
        b"%PDF-1.7"
    );
    assert_eq!(backend.list(MediaKind::Pdf).await.unwrap(), vec!["report.pdf"]);
    assert!(backend.list(MediaKind::Image).await.unwrap().is_empty());
}

#[tokio::test]
async fn save_overwrites_and_leaves_no_temp_files() {
    let temp = tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path(), false).await.unwrap();

    for body in [&b"first"[..], &b"second"[..]] {
        backend
            .save(MediaKind::Html, Bytes::copy_from_slice(body), "page.html", None)
            .await
            .unwrap();
    }

    let entries: Vec<_> = std::fs::read_dir(temp.path().join("html"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec!["page.html"]);
    assert_eq!(
        backend.get(MediaKind::Html, "page.html").await.unwrap().as_ref(),
        b"second"
    );
}

#[tokio::test]
async fn list_skips_directories_and_in_flight_temp_files() {
    let temp = tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path(), false).await.unwrap();
    let ns = temp.path().join("image");
    std::fs::create_dir_all(ns.join("nested")).unwrap();
    std::fs::write(ns.join("b.png"), b"b").unwrap();
    std::fs::write(ns.join("a.png"), b"a").unwrap();
    std::fs::write(ns.join(".c.png.tmp.0000"), b"partial").unwrap();

    assert_eq!(
        backend.list(MediaKind::Image).await.unwrap(),
        vec!["a.png", "b.png"]
    );
}

#[tokio::test]
async fn flat_mode_shares_the_root() {
    let temp = tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path(), true).await.unwrap();

    backend
        .save(MediaKind::Pdf, Bytes::from_static(b"p"), "a.pdf", None)
        .await
        .unwrap();
    backend
        .save(MediaKind::Image, Bytes::from_static(b"i"), "b.png", None)
        .await
        .unwrap();

    assert!(temp.path().join("a.pdf").exists());
    assert_eq!(
        backend.list(MediaKind::Html).await.unwrap(),
        vec!["a.pdf", "b.png"]
    );
}

#[tokio::test]
async fn get_and_delete_missing_are_not_found() {
    let temp = tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path(), false).await.unwrap();

    assert!(matches!(
        backend.get(MediaKind::Pdf, "nope.pdf").await,
        Err(StorageError::NotFound(_))
    ));
    assert!(matches!(
        backend.delete(MediaKind::Pdf, "nope.pdf").await,
        Err(StorageError::NotFound(_))
    ));

    backend
        .save(MediaKind::Pdf, Bytes::from_static(b"x"), "yes.pdf", None)
        .await
        .unwrap();
    backend.delete(MediaKind::Pdf, "yes.pdf").await.unwrap();
    assert!(backend.list(MediaKind::Pdf).await.unwrap().is_empty());
}

#[tokio::test]
async fn names_with_path_components_are_rejected() {
    let temp = tempdir().unwrap();
    let backend = FilesystemBackend::new(temp.path().join("root"), false)
        .await
        .unwrap();

    for name in ["../escape.pdf", "a/b.pdf", "..", "/abs.pdf"] {
        let err = backend
            .save(MediaKind::Pdf, Bytes::from_static(b"x"), name, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidName(_)), "{name}");
    }
    assert!(!temp.path().join("escape.pdf").exists());
}

#[tokio::test]
async fn concurrent_saves_to_distinct_names() {
    let temp = tempdir().unwrap();
    let backend: Arc<dyn Storage> =
        Arc::new(FilesystemBackend::new(temp.path(), false).await.unwrap());

    let mut handles = Vec::new();
    for i in 0..16 {
        let backend = Arc::clone(&backend);
        handles.push(tokio::spawn(async move {
            backend
                .save(
                    MediaKind::Image,
                    Bytes::from(vec![i as u8; 128]),
                    &format!("img-{i:02}.png"),
                    None,
                )
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let names = backend.list(MediaKind::Image).await.unwrap();
    assert_eq!(names.len(), 16);
    assert_eq!(names[0], "img-00.png");
}
