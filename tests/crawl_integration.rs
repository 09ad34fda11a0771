//! Integration tests for the recursive crawler: depth capping, robots
//! policy, page requisites, and link rewriting.

use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

use wget2go::config::Config;
use wget2go::crawl::Crawler;
use wget2go::download::HttpClient;

async fn mount_page(server: &MockServer, route: &str, content_type: &str, body: String) {
    Mock::given(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body.into_bytes(), content_type))
        .mount(server)
        .await;
}

fn crawler(config: Config) -> Crawler {
    let config = Arc::new(config);
    let client = Arc::new(HttpClient::new(Arc::clone(&config)).unwrap());
    Crawler::new(client, config)
}

#[tokio::test]
async fn test_depth_cap_stops_recursion() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        "text/html",
        r#"<a href="/a.html">a</a>"#.to_string(),
    )
    .await;
    mount_page(
        &server,
        "/a.html",
        "text/html",
        r#"<a href="/b.html">b</a>"#.to_string(),
    )
    .await;
    mount_page(
        &server,
        "/b.html",
        "text/html",
        r#"<a href="/c.html">c</a>"#.to_string(),
    )
    .await;
    mount_page(&server, "/c.html", "text/html", "<p>too deep</p>".to_string()).await;

    let dir = TempDir::new().unwrap();
    let config = Config {
        recursive: true,
        recursive_level: 2,
        ..Config::default()
    };
    crawler(config)
        .download(&server.uri(), dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(dir.path().join("index.html").exists());
    assert!(dir.path().join("a.html").exists());
    assert!(dir.path().join("b.html").exists());
    assert!(
        !dir.path().join("c.html").exists(),
        "depth-3 page must not be downloaded"
    );
}

#[tokio::test]
async fn test_robots_disallow_skips_private_paths() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/robots.txt",
        "text/plain",
        "User-agent: *\nDisallow: /private/\n".to_string(),
    )
    .await;
    mount_page(
        &server,
        "/",
        "text/html",
        r#"<a href="/private/a.html">a</a><a href="/public/b.html">b</a>"#.to_string(),
    )
    .await;
    mount_page(
        &server,
        "/public/b.html",
        "text/html",
        "<p>public</p>".to_string(),
    )
    .await;
    // the private page must never be requested
    Mock::given(path("/private/a.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<p>private</p>"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = Config {
        recursive: true,
        recursive_level: 2,
        ..Config::default()
    };
    crawler(config)
        .download(&server.uri(), dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(dir.path().join("public").join("b.html").exists());
    assert!(!dir.path().join("private").join("a.html").exists());
}

#[tokio::test]
async fn test_requisites_and_css_links_downloaded() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        "text/html",
        r#"<link href="/css/site.css"><img src="/img/logo.png">"#.to_string(),
    )
    .await;
    mount_page(
        &server,
        "/css/site.css",
        "text/css",
        ".hero { background: url(/img/hero.png); }".to_string(),
    )
    .await;
    Mock::given(path("/img/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(vec![0x89u8, b'P', b'N', b'G']),
        )
        .mount(&server)
        .await;
    Mock::given(path("/img/hero.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(vec![0x89u8, b'P', b'N', b'G']),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = Config {
        recursive: true,
        recursive_level: 3,
        page_requisites: true,
        ..Config::default()
    };
    let crawler = crawler(config);
    crawler
        .download(&server.uri(), dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(dir.path().join("css").join("site.css").exists());
    assert!(dir.path().join("img").join("logo.png").exists());
    assert!(
        dir.path().join("img").join("hero.png").exists(),
        "URLs discovered inside CSS must be crawled"
    );
    assert_eq!(crawler.downloaded_count(), 4);
}

#[tokio::test]
async fn test_convert_links_rewrites_and_backs_up() {
    let server = MockServer::start().await;
    let base = server.uri();
    mount_page(
        &server,
        "/",
        "text/html",
        format!(r#"<a href="{base}/sub/page.html">go</a><img src="{base}/img/logo.png">"#),
    )
    .await;
    mount_page(
        &server,
        "/sub/page.html",
        "text/html",
        "<p>sub page</p>".to_string(),
    )
    .await;
    Mock::given(path("/img/logo.png"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Content-Type", "image/png")
                .set_body_bytes(vec![1u8, 2, 3]),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let config = Config {
        recursive: true,
        recursive_level: 2,
        convert_links: true,
        ..Config::default()
    };
    crawler(config)
        .download(&base, dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    let index = std::fs::read_to_string(dir.path().join("index.html")).unwrap();
    assert!(
        index.contains(r#"href="sub/page.html""#),
        "absolute link must become relative, got: {index}"
    );
    assert!(
        index.contains(r#"src="img/logo.png""#),
        "image link must become relative, got: {index}"
    );

    // every rewritten link resolves to a file in the mirror
    assert!(dir.path().join("sub").join("page.html").exists());
    assert!(dir.path().join("img").join("logo.png").exists());

    // the original document survives as a backup
    let backup = std::fs::read_to_string(dir.path().join("index.html.orig")).unwrap();
    assert!(backup.contains(&format!(r#"href="{base}/sub/page.html""#)));
}

#[tokio::test]
async fn test_non_recursive_config_downloads_only_start_page() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        "text/html",
        r#"<a href="/a.html">a</a>"#.to_string(),
    )
    .await;
    mount_page(&server, "/a.html", "text/html", "<p>a</p>".to_string()).await;

    let dir = TempDir::new().unwrap();
    let crawler = crawler(Config::default());
    crawler
        .download(&server.uri(), dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert!(dir.path().join("index.html").exists());
    assert!(!dir.path().join("a.html").exists());
    assert_eq!(crawler.downloaded_count(), 1);
}
