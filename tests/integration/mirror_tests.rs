//! Integration tests for the mirror
//!
//! These tests use wiremock to serve a small site and run full mirror
//! cycles against it with the real HTTP client.

use std::path::Path;
use sumi_mirror::config::MirrorConfig;
use sumi_mirror::{mirror_site, MirrorError};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Creates a test configuration pointing at the mock server
fn create_test_config(server: &MockServer, output: &Path, max_depth: u32) -> MirrorConfig {
    let mut config = MirrorConfig::default();
    config.site.seed_url = Some(format!("{}/", server.uri()));
    config.site.output_dir = output.to_string_lossy().into_owned();
    config.crawler.max_depth = max_depth;
    config.crawler.max_concurrent_fetches = 4;
    config.crawler.request_timeout_secs = 5;
    config
}

async fn serve(server: &MockServer, route: &str, content_type: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(body, content_type),
        )
        .mount(server)
        .await;
}

/// The example site: a home page, an about page and a third page
async fn mount_example_site(server: &MockServer) {
    serve(
        server,
        "/",
        "text/html",
        r#"<html><head><title>Example</title></head><body>
<img src="/img/logo.png" alt="logo">
<a href="/about.html">About</a>
<a href="mailto:info@example.com">Mail us</a>
</body></html>"#,
    )
    .await;

    serve(
        server,
        "/about.html",
        "text/html",
        r#"<html><head><title>About</title>
<link rel="stylesheet" href="css/about.css">
<script src="/js/app.js"></script></head>
<body><img src="img/team.jpg"><a href="/third.html">Third</a></body></html>"#,
    )
    .await;

    serve(server, "/img/logo.png", "image/png", "logo-bytes").await;
    serve(server, "/img/team.jpg", "image/jpeg", "team-bytes").await;
    serve(server, "/css/about.css", "text/css", "body { color: black; }").await;
    serve(server, "/js/app.js", "application/javascript", "console.log(1);").await;
    serve(server, "/third.html", "text/html", "<p>third</p>").await;
}

async fn requested_paths(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| request.url.path().to_string())
        .collect()
}

fn read(dir: &TempDir, relative: &str) -> String {
    std::fs::read_to_string(dir.path().join(relative)).expect("mirrored file missing")
}

#[tokio::test]
async fn test_mirror_example_site_depth_one() {
    let server = MockServer::start().await;
    mount_example_site(&server).await;
    let output = TempDir::new().unwrap();

    let summary = mirror_site(&create_test_config(&server, output.path(), 1))
        .await
        .expect("mirror failed");

    assert_eq!(summary.failed, 0);
    assert_eq!(summary.fetched, 6);
    assert!(!summary.cancelled);

    for file in [
        "index.html",
        "about.html",
        "img/logo.png",
        "img/team.jpg",
        "css/about.css",
        "js/app.js",
    ] {
        assert!(output.path().join(file).is_file(), "{} not mirrored", file);
    }

    // Link beyond the depth budget: never fetched, never rewritten
    assert!(!requested_paths(&server).await.contains(&"/third.html".to_string()));
    assert!(!output.path().join("third.html").exists());

    let index = read(&output, "index.html");
    assert!(index.contains(r#"<img src="img/logo.png" alt="logo">"#));
    assert!(index.contains(r#"<a href="about.html">About</a>"#));
    assert!(index.contains(r#"<a href="mailto:info@example.com">Mail us</a>"#));

    let about = read(&output, "about.html");
    assert!(about.contains(r#"<link rel="stylesheet" href="css/about.css">"#));
    assert!(about.contains(r#"<script src="js/app.js"></script>"#));
    assert!(about.contains(r#"<img src="img/team.jpg">"#));
    assert!(about.contains(r#"<a href="/third.html">Third</a>"#));

    let titles: Vec<_> = summary
        .pages
        .iter()
        .filter_map(|page| page.title.clone())
        .collect();
    assert!(titles.contains(&"Example".to_string()));
    assert!(titles.contains(&"About".to_string()));
}

#[tokio::test]
async fn test_max_depth_zero_fetches_seed_assets_only() {
    let server = MockServer::start().await;
    mount_example_site(&server).await;
    let output = TempDir::new().unwrap();

    let summary = mirror_site(&create_test_config(&server, output.path(), 0))
        .await
        .expect("mirror failed");

    let mut paths = requested_paths(&server).await;
    paths.sort();
    assert_eq!(paths, vec!["/", "/img/logo.png"]);
    assert_eq!(summary.pages.len(), 1);

    let index = read(&output, "index.html");
    assert!(index.contains(r#"<img src="img/logo.png" alt="logo">"#));
    assert!(index.contains(r#"<a href="/about.html">About</a>"#));
}

#[tokio::test]
async fn test_rerun_issues_no_requests() {
    let server = MockServer::start().await;
    mount_example_site(&server).await;
    let output = TempDir::new().unwrap();
    let config = create_test_config(&server, output.path(), 1);

    mirror_site(&config).await.expect("first run failed");
    let requests_after_first = requested_paths(&server).await.len();
    let index_after_first = read(&output, "index.html");
    let about_after_first = read(&output, "about.html");

    let summary = mirror_site(&config).await.expect("second run failed");

    assert_eq!(requested_paths(&server).await.len(), requests_after_first);
    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.skipped, 6);
    assert_eq!(read(&output, "index.html"), index_after_first);
    assert_eq!(read(&output, "about.html"), about_after_first);
}

#[tokio::test]
async fn test_interrupted_mirror_resumes() {
    let server = MockServer::start().await;
    mount_example_site(&server).await;
    let output = TempDir::new().unwrap();

    // A previous run got as far as the logo
    std::fs::create_dir_all(output.path().join("img")).unwrap();
    std::fs::write(output.path().join("img/logo.png"), "logo-bytes").unwrap();

    let summary = mirror_site(&create_test_config(&server, output.path(), 1))
        .await
        .expect("mirror failed");

    assert!(!requested_paths(&server).await.contains(&"/img/logo.png".to_string()));
    assert_eq!(summary.skipped, 1);
    assert!(read(&output, "index.html").contains(r#"<img src="img/logo.png" alt="logo">"#));
}

#[tokio::test]
async fn test_nested_pages_get_resolvable_relative_paths() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        "text/html",
        r#"<a href="/blog/2024/post.html">post</a>"#,
    )
    .await;
    serve(
        &server,
        "/blog/2024/post.html",
        "text/html",
        r#"<img src="/img/a.png"><a href="/">home</a><div style="background: url(../../img/bg.png)"></div>"#,
    )
    .await;
    serve(&server, "/img/a.png", "image/png", "a").await;
    serve(&server, "/img/bg.png", "image/png", "bg").await;
    let output = TempDir::new().unwrap();

    mirror_site(&create_test_config(&server, output.path(), 1))
        .await
        .expect("mirror failed");

    let post = read(&output, "blog/2024/post.html");
    assert_eq!(
        post,
        r#"<img src="../../img/a.png"><a href="../../index.html">home</a><div style="background: url(../../img/bg.png)"></div>"#
    );

    let post_dir = output.path().join("blog/2024");
    assert!(post_dir.join("../../img/a.png").is_file());
    assert!(post_dir.join("../../index.html").is_file());
    assert!(post_dir.join("../../img/bg.png").is_file());
}

#[tokio::test]
async fn test_failed_asset_reference_unchanged() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        "text/html",
        r#"<img src="/ok.png"><img src="/broken.png">"#,
    )
    .await;
    serve(&server, "/ok.png", "image/png", "ok").await;
    Mock::given(method("GET"))
        .and(path("/broken.png"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let output = TempDir::new().unwrap();

    let summary = mirror_site(&create_test_config(&server, output.path(), 0))
        .await
        .expect("a broken asset must not fail the run");

    assert_eq!(summary.failed, 1);
    assert!(summary.failures[0].url.ends_with("/broken.png"));
    assert_eq!(
        read(&output, "index.html"),
        r#"<img src="ok.png"><img src="/broken.png">"#
    );
    assert!(!output.path().join("broken.png").exists());
}

#[tokio::test]
async fn test_distinct_queries_distinct_files() {
    let server = MockServer::start().await;
    serve(
        &server,
        "/",
        "text/html",
        r#"<img src="/data?x=1"><img src="/data?x=2">"#,
    )
    .await;
    for (value, body) in [("1", "first"), ("2", "second")] {
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(query_param("x", value))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(body, "image/png"),
            )
            .mount(&server)
            .await;
    }
    let output = TempDir::new().unwrap();

    let summary = mirror_site(&create_test_config(&server, output.path(), 0))
        .await
        .expect("mirror failed");
    assert_eq!(summary.fetched, 3);

    let index = read(&output, "index.html");
    let sources: Vec<&str> = index
        .split("src=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .collect();

    assert_eq!(sources.len(), 2);
    assert_ne!(sources[0], sources[1]);
    assert_eq!(read(&output, sources[0]), "first");
    assert_eq!(read(&output, sources[1]), "second");
}

#[tokio::test]
async fn test_extensionless_page_gets_html_extension() {
    let server = MockServer::start().await;
    serve(&server, "/", "text/html", r#"<a href="/contact">contact</a>"#).await;
    serve(
        &server,
        "/contact",
        "text/html; charset=utf-8",
        "<p>write to us</p>",
    )
    .await;
    let output = TempDir::new().unwrap();

    mirror_site(&create_test_config(&server, output.path(), 1))
        .await
        .expect("mirror failed");

    assert_eq!(read(&output, "contact.html"), "<p>write to us</p>");
    assert_eq!(
        read(&output, "index.html"),
        r#"<a href="contact.html">contact</a>"#
    );
}

#[tokio::test]
async fn test_session_cookies_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "sid=abc123; theme=dark"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<p>members only</p>", "text/html"),
        )
        .expect(1)
        .mount(&server)
        .await;
    let output = TempDir::new().unwrap();

    let mut config = create_test_config(&server, output.path(), 0);
    config.session.cookies = Some("sid=abc123; theme=dark".to_string());

    let summary = mirror_site(&config).await.expect("mirror failed");

    assert_eq!(summary.fetched, 1);
    assert_eq!(read(&output, "index.html"), "<p>members only</p>");
}

#[tokio::test]
async fn test_missing_seed_fails_before_any_fetch() {
    let output = TempDir::new().unwrap();
    let mut config = MirrorConfig::default();
    config.site.output_dir = output.path().to_string_lossy().into_owned();

    let result = mirror_site(&config).await;

    assert!(matches!(result, Err(MirrorError::MissingSeed)));
    assert_eq!(std::fs::read_dir(output.path()).unwrap().count(), 0);
}
