use std::fs;

use tempfile::tempdir;
use url::Url;

use sitesnap::file_manager::{FileManager, ROOT_FILENAME};
use sitesnap::html_parser::HtmlParser;
use sitesnap::store::{SessionStore, SqliteStore};
use sitesnap::{url_check, CaptureError};

#[test]
fn normalized_input_is_ready_for_capture() {
    for raw in ["example.com", "  www.example.com/  ", "http://example.com/"] {
        let url = url_check::normalize(raw);
        assert!(url_check::is_valid(&url), "{url:?} should validate");
        assert!(Url::parse(&url).is_ok());
    }
    assert!(!url_check::is_valid(&url_check::normalize("ftp://example.com")));
}

#[test]
fn file_manager_mirrors_url_paths() {
    let dir = tempdir().unwrap();
    let files = FileManager::new(dir.path()).unwrap();

    let cases = [
        ("/", ROOT_FILENAME.to_string()),
        ("/styles.css", "styles.css".to_string()),
        ("/assets/img/a.png", "assets/img/a.png".to_string()),
    ];
    for (url_path, rel) in cases {
        let dest = files.map_path(url_path).unwrap();
        assert_eq!(dest, dir.path().join(rel));
        files.write_file(&dest, b"content").unwrap();
        assert_eq!(fs::read(&dest).unwrap(), b"content");
    }

    let err = files.map_path("/../../etc/passwd").unwrap_err();
    assert!(matches!(err, CaptureError::PathTraversal { .. }));
}

#[test]
fn extraction_feeds_the_same_host_filter() {
    let html = r#"
        <html><head>
            <link rel="stylesheet" href="styles.css">
            <script src="http://cdn.other.com/app.js"></script>
        </head><body>
            <img src="logo.png">
        </body></html>
    "#;
    let page = Url::parse("http://example.com/").unwrap();
    let out = HtmlParser::new(page.clone()).extract_resources(html);

    assert_eq!(out.stylesheets[0].as_str(), "http://example.com/styles.css");
    assert_eq!(out.scripts[0].as_str(), "http://cdn.other.com/app.js");
    assert_eq!(out.images[0].as_str(), "http://example.com/logo.png");

    let same_host: Vec<_> = out
        .stylesheets
        .iter()
        .chain(&out.scripts)
        .chain(&out.images)
        .filter(|u| u.host_str() == page.host_str())
        .collect();
    assert_eq!(same_host.len(), 2);
}

#[tokio::test]
async fn store_persists_across_reopen() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("state").join("history.db");

    let id = {
        let store = SqliteStore::open_at(&db_path).await.unwrap();
        let id = store.create_session("example.com", 1_700_000_000).await.unwrap();
        store
            .record_resource(id, "https://example.com/", 120, 4.0)
            .await
            .unwrap();
        store
            .finalize_session(id, 1_700_000_009, 9_000, 4.0)
            .await
            .unwrap();
        id
    };

    let store = SqliteStore::open_at(&db_path).await.unwrap();
    let report = store.session_by_id(id).await.unwrap().unwrap();
    assert_eq!(report.session.name, "example.com");
    assert_eq!(report.session.total_kb, Some(4.0));
    assert_eq!(report.resources.len(), 1);

    let listed = store.list_sessions().await.unwrap();
    assert_eq!(listed.len(), 1);
}
