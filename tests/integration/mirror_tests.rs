//! End-to-end mirror runs
//!
//! Each test serves a small site from a wiremock server and mirrors it into
//! a temporary directory, sometimes over several runs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use sumi_mirror::config::{
    Config, CrawlerConfig, IndexConfig, OutputConfig, OutputMode, PolicyConfig, RewriteConfig,
    SiteConfig,
};
use sumi_mirror::crawler::mirror;
use sumi_mirror::storage::layout::file_url;
use sumi_mirror::MirrorError;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Modification time far before any test run
const LONG_AGO: &str = "2020-01-01T00:00:00";

/// Creates a test configuration mirroring `server` into `root`
fn create_test_config(server: &MockServer, root: &Path, entry_routes: &[&str]) -> Config {
    let host = server.uri().trim_start_matches("http://").to_string();
    Config {
        site: SiteConfig {
            origin: server.uri(),
            hostnames: vec![host.clone()],
            authoring_hostname: host.clone(),
            public_hostname: host,
            username: None,
            password: None,
            query_marker: None,
        },
        crawler: CrawlerConfig {
            entry_routes: entry_routes.iter().map(|r| r.to_string()).collect(),
            timeout_secs: 5,
            max_retries: 0,
            ..CrawlerConfig::default()
        },
        output: OutputConfig {
            root: root.display().to_string(),
            mode: OutputMode::Serve,
        },
        policy: PolicyConfig::default(),
        index: IndexConfig {
            collections: vec!["/wp-json/wp/v2/pages".to_string()],
            ..IndexConfig::default()
        },
        rewrite: RewriteConfig::default(),
    }
}

async fn mount_page(server: &MockServer, route: &str, body: &str) {
    mount_status(server, route, 200, body).await;
}

async fn mount_status(server: &MockServer, route: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(status)
                .set_body_string(body)
                .insert_header("content-type", "text/html"),
        )
        .mount(server)
        .await;
}

/// Lists every path in the modification index as last changed long ago
async fn mount_index(server: &MockServer, paths: &[&str]) {
    let records: Vec<String> = paths
        .iter()
        .map(|p| {
            format!(
                r#"{{"link": "{}{}/", "modified_gmt": "{}"}}"#,
                server.uri(),
                p.trim_end_matches('/'),
                LONG_AGO
            )
        })
        .collect();

    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/pages"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("[{}]", records.join(","))))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/pages"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(400))
        .mount(server)
        .await;
}

/// Number of requests the server received for a path
async fn hits(server: &MockServer, route: &str) -> usize {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .count()
}

/// Reads every file below `root`, keyed by relative path
fn snapshot(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).expect("Failed to read directory") {
            let file = entry.expect("Failed to read entry").path();
            if file.is_dir() {
                pending.push(file);
            } else {
                let key = file.strip_prefix(root).unwrap().display().to_string();
                files.insert(key, fs::read(&file).expect("Failed to read file"));
            }
        }
    }
    files
}

/// A home page linking to an about page, plus a custom not-found page
async fn mount_small_site(server: &MockServer, not_found_body: &str) {
    mount_page(
        server,
        "/",
        &format!(r#"<html><body><a href="{}/about/">About</a></body></html>"#, server.uri()),
    )
    .await;
    mount_page(server, "/about", "<html><body><p>About us</p></body></html>").await;
    mount_status(server, "/404.html", 404, not_found_body).await;
    mount_index(server, &["/about"]).await;
}

#[tokio::test]
async fn test_frontier_visits_each_path_once() {
    let server = MockServer::start().await;
    let uri = server.uri();
    mount_page(
        &server,
        "/",
        &format!(
            r#"<a href="{0}/a">A</a><a href="/b">B</a><a href="https://external.example/x">X</a>"#,
            uri
        ),
    )
    .await;
    mount_page(
        &server,
        "/a",
        r#"<a href="/">Home</a><a href="/b/">B</a><a href="https://external.example/x">X</a>"#,
    )
    .await;
    mount_page(
        &server,
        "/b",
        &format!(
            r#"<a href="{0}/">Home</a><a href="../a">A</a><a href="https://external.example/x">X</a>"#,
            uri
        ),
    )
    .await;
    mount_index(&server, &["/", "/a", "/b"]).await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    let summary = mirror(create_test_config(&server, &root, &["/"]))
        .await
        .expect("Mirror run failed");

    assert_eq!(summary.visited, 3);
    assert_eq!(summary.fetched, 3);
    assert!(!summary.has_failures());
    for route in ["/", "/a", "/b"] {
        assert_eq!(hits(&server, route).await, 1, "requests for {}", route);
    }
    assert!(root.join("a/index.html").is_file());
    assert!(root.join("b/index.html").is_file());

    let home = fs::read_to_string(root.join("index.html")).unwrap();
    assert!(home.contains(r#"href="/a""#));
    assert!(home.contains(r#"href="https://external.example/x""#));
}

#[tokio::test]
async fn test_second_run_reuses_unchanged_pages() {
    let server = MockServer::start().await;
    mount_small_site(&server, "<p>Not found</p>").await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");

    let first = mirror(create_test_config(&server, &root, &["/", "/404.html"]))
        .await
        .expect("First run failed");
    assert_eq!(first.fetched, 3);
    assert_eq!(first.reused, 0);
    let stamp = fs::read_to_string(root.join("about/index.html.fetched")).unwrap();

    let second = mirror(create_test_config(&server, &root, &["/", "/404.html"]))
        .await
        .expect("Second run failed");

    // The home page always refetches and the not-found page is the layout probe
    assert_eq!(second.fetched, 2);
    assert_eq!(second.reused, 1);
    assert!(!second.cascade_fired);
    assert_eq!(hits(&server, "/about").await, 1);
    assert_eq!(hits(&server, "/404.html").await, 2);

    assert_eq!(
        fs::read_to_string(root.join("about/index.html.fetched")).unwrap(),
        stamp
    );
    assert_eq!(
        fs::read_to_string(root.join("404.html")).unwrap(),
        "<p>Not found</p>"
    );
}

#[tokio::test]
async fn test_layout_change_cascades_to_cached_documents() {
    let server = MockServer::start().await;
    mount_small_site(&server, "<p>Not found</p>").await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    mirror(create_test_config(&server, &root, &["/", "/404.html"]))
        .await
        .expect("First run failed");

    // Same content, new shared footer
    server.reset().await;
    mount_small_site(&server, "<p>Not found</p><footer>v2</footer>").await;

    let summary = mirror(create_test_config(&server, &root, &["/", "/404.html"]))
        .await
        .expect("Second run failed");

    assert!(summary.cascade_fired);
    assert_eq!(summary.reused, 0);
    assert_eq!(summary.fetched, 3);
    // Up to date per the index, refetched anyway
    assert_eq!(hits(&server, "/about").await, 1);
    assert!(fs::read_to_string(root.join("404.html"))
        .unwrap()
        .contains("v2"));
}

#[tokio::test]
async fn test_query_versioned_script() {
    let server = MockServer::start().await;
    let script_page = |version: u32| {
        format!(
            r#"<html><head><script src="/theme/app.js?v={}"></script></head></html>"#,
            version
        )
    };

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");

    for (run, version, expected_hits) in [(1, 1, 1), (2, 1, 0), (3, 2, 1)] {
        server.reset().await;
        mount_page(&server, "/", &script_page(version)).await;
        mount_page(&server, "/theme/app.js", r#"fetch("/api/" + id);"#).await;
        mount_index(&server, &[]).await;

        mirror(create_test_config(&server, &root, &["/"]))
            .await
            .unwrap_or_else(|e| panic!("Run {} failed: {}", run, e));

        assert_eq!(
            hits(&server, "/theme/app.js").await,
            expected_hits,
            "script requests in run {}",
            run
        );
        assert_eq!(
            fs::read_to_string(root.join("theme/app.js.query")).unwrap(),
            format!("?v={}", version)
        );
    }

    // Scripts are stored verbatim
    assert_eq!(
        fs::read_to_string(root.join("theme/app.js")).unwrap(),
        r#"fetch("/api/" + id);"#
    );
}

#[tokio::test]
async fn test_strict_failure_leaves_live_generation_intact() {
    let server = MockServer::start().await;
    mount_small_site(&server, "<p>Not found</p>").await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    mirror(create_test_config(&server, &root, &["/", "/404.html"]))
        .await
        .expect("First run failed");
    let before = snapshot(&root);

    server.reset().await;
    mount_page(
        &server,
        "/",
        r#"<html><body><a href="/about">About</a><a href="/broken">Broken</a></body></html>"#,
    )
    .await;
    mount_page(&server, "/about", "<p>About us, revised</p>").await;
    mount_status(&server, "/broken", 500, "oops").await;
    mount_status(&server, "/404.html", 404, "<p>Not found</p>").await;
    mount_index(&server, &["/about"]).await;

    let mut config = create_test_config(&server, &root, &["/", "/404.html"]);
    config.crawler.strict = true;
    let err = mirror(config).await.expect_err("Strict run should abort");

    assert!(matches!(err, MirrorError::RouteFailed { .. }));
    assert!(!err.is_fatal());
    assert_eq!(snapshot(&root), before);
}

#[tokio::test]
async fn test_route_failure_recorded_outside_strict_mode() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="missing">Gone</a>"#).await;
    mount_status(&server, "/missing", 500, "oops").await;
    mount_index(&server, &[]).await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    let summary = mirror(create_test_config(&server, &root, &["/"]))
        .await
        .expect("Run should tolerate route failures");

    assert!(summary.has_failures());
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.path, "/missing");
    assert_eq!(failure.original, "missing");
    assert_eq!(failure.referrer, "/");
    assert!(root.join("index.html").is_file());
    assert!(!root.join("missing").exists());
}

#[tokio::test]
async fn test_not_found_page_is_mirrored() {
    let server = MockServer::start().await;
    mount_status(&server, "/404.html", 404, "<h1>Nothing here</h1>").await;
    mount_index(&server, &[]).await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    let summary = mirror(create_test_config(&server, &root, &["/404.html"]))
        .await
        .expect("Mirror run failed");

    assert!(!summary.has_failures());
    assert_eq!(
        fs::read_to_string(root.join("404.html")).unwrap(),
        "<h1>Nothing here</h1>"
    );
}

#[tokio::test]
async fn test_unknown_relation_aborts_run() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<html><head><link rel="me" href="https://social.example/@site"></head></html>"#,
    )
    .await;
    mount_index(&server, &[]).await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    let err = mirror(create_test_config(&server, &root, &["/"]))
        .await
        .expect_err("Unknown relation must abort");

    assert!(err.is_fatal());
    assert!(!root.exists());
}

#[tokio::test]
async fn test_offline_mode_links_and_reuse() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/about">About</a>"#).await;
    mount_page(&server, "/about", r#"<a href="deep">Deeper</a>"#).await;
    mount_page(&server, "/about/deep", "<p>Deep</p>").await;
    mount_status(&server, "/404.html", 404, "<p>Not found</p>").await;
    mount_index(&server, &["/about", "/about/deep"]).await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    let mut config = create_test_config(&server, &root, &["/", "/404.html"]);
    config.output.mode = OutputMode::Offline;

    mirror(config.clone()).await.expect("First run failed");
    let file_root = file_url(&root).unwrap();
    let home = fs::read_to_string(root.join("index.html")).unwrap();
    assert!(home.contains(&format!(r#"href="{}/about/index.html""#, file_root)));
    let about = fs::read_to_string(root.join("about/index.html")).unwrap();
    assert!(about.contains(&format!(r#"href="{}/about/deep/index.html""#, file_root)));

    // The reused about page still leads the crawl to its child
    let summary = mirror(config).await.expect("Second run failed");
    assert_eq!(summary.reused, 2);
    assert!(summary.removed.is_empty());
    assert_eq!(hits(&server, "/about").await, 1);
    assert_eq!(hits(&server, "/about/deep").await, 1);
    assert!(root.join("about/deep/index.html").is_file());
}

#[tokio::test]
async fn test_removed_pages_reported() {
    let server = MockServer::start().await;
    mount_page(&server, "/", r#"<a href="/old">Old</a>"#).await;
    mount_page(&server, "/old", "<p>Old news</p>").await;
    mount_index(&server, &["/old"]).await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    mirror(create_test_config(&server, &root, &["/"]))
        .await
        .expect("First run failed");
    assert!(root.join("old/index.html").is_file());

    server.reset().await;
    mount_page(&server, "/", "<p>Nothing to see</p>").await;
    mount_index(&server, &[]).await;

    let summary = mirror(create_test_config(&server, &root, &["/"]))
        .await
        .expect("Second run failed");
    assert_eq!(summary.removed, vec!["/old".to_string()]);
    assert!(!root.join("old").exists());
}

#[tokio::test]
async fn test_authoring_host_scrubbed_from_inline_data() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        r#"<script>var d = {"img":"https:\/\/dev.example.org\/wp-content\/a.png"};</script><p>Edit on dev.example.org</p>"#,
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/wp-content/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0x89, b'P', b'N', b'G', 0xff]))
        .expect(1)
        .mount(&server)
        .await;
    mount_index(&server, &[]).await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    let mut config = create_test_config(&server, &root, &["/"]);
    config.site.authoring_hostname = "dev.example.org".to_string();
    config.site.public_hostname = "example.org".to_string();

    mirror(config).await.expect("Mirror run failed");

    let home = fs::read_to_string(root.join("index.html")).unwrap();
    assert!(home.contains(r#""img":"/wp-content/a.png""#));
    assert!(home.contains("<p>Edit on example.org</p>"));
    assert!(!home.contains("dev.example.org"));
    assert!(root.join("wp-content/a.png").is_file());
}

/// Ten indexed pages behind a home page, all sharing one footer
async fn mount_section(server: &MockServer, footer: &str) -> Vec<String> {
    let pages: Vec<String> = (0..10).map(|i| format!("/section/p{}", i)).collect();
    let links: String = pages
        .iter()
        .map(|p| format!(r#"<a href="{}">{}</a>"#, p, p))
        .collect();
    mount_page(server, "/", &format!("<nav>{}</nav><footer>{}</footer>", links, footer)).await;
    for page in &pages {
        mount_page(
            server,
            page,
            &format!("<h1>{}</h1><footer>{}</footer>", page, footer),
        )
        .await;
    }
    let indexed: Vec<&str> = pages.iter().map(String::as_str).collect();
    mount_index(server, &indexed).await;
    pages
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_checks_unchanged_layout_once() {
    let server = MockServer::start().await;
    let pages = mount_section(&server, "v1").await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    let mut config = create_test_config(&server, &root, &["/"]);
    config.crawler.workers = 4;

    let first = mirror(config.clone()).await.expect("First run failed");
    assert_eq!(first.fetched, 11);

    server.reset().await;
    mount_section(&server, "v1").await;
    let second = mirror(config).await.expect("Second run failed");

    // Home plus the single layout check
    assert!(!second.cascade_fired);
    assert_eq!(second.fetched, 2);
    assert_eq!(second.reused, 9);
    let mut page_hits = 0;
    for page in &pages {
        page_hits += hits(&server, page).await;
    }
    assert_eq!(page_hits, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_pool_refetches_all_after_layout_change() {
    let server = MockServer::start().await;
    let pages = mount_section(&server, "v1").await;

    let dir = TempDir::new().unwrap();
    let root = dir.path().join("static");
    let mut config = create_test_config(&server, &root, &["/"]);
    config.crawler.workers = 4;

    mirror(config.clone()).await.expect("First run failed");

    server.reset().await;
    mount_section(&server, "v2").await;
    let summary = mirror(config).await.expect("Second run failed");

    assert!(summary.cascade_fired);
    assert_eq!(summary.reused, 0);
    assert_eq!(summary.fetched, 11);
    for page in &pages {
        assert_eq!(hits(&server, page).await, 1, "requests for {}", page);
        let stored = fs::read_to_string(root.join(&page[1..]).join("index.html")).unwrap();
        assert!(stored.contains("<footer>v2</footer>"), "{} is stale", page);
    }
}
