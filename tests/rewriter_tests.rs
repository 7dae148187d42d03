use std::path::Path;
use std::sync::Arc;
use url::Url;

use page_snap::{MappingStore, PathRewriter};

fn rewriter_with(entries: &[(&str, &str, &str)]) -> PathRewriter {
    let store = Arc::new(MappingStore::new());
    for (original, canonical, local) in entries {
        store.record_success(original, canonical, local);
    }
    let base = Url::parse("https://x.test/p").unwrap();
    PathRewriter::new(base, store).unwrap()
}

#[test]
fn test_img_src_rewritten_to_local_path() {
    let rewriter = rewriter_with(&[("/a.png", "https://x.test/a.png", "assets/a.png")]);
    let html = r#"<html><body><img src="/a.png"></body></html>"#;

    let (out, _) = rewriter.rewrite_html(html).unwrap();
    assert!(out.contains(r#"src="assets/a.png""#), "output: {}", out);
}

#[test]
fn test_all_reference_sites_rewritten() {
    let rewriter = rewriter_with(&[
        ("/css/site.css", "https://x.test/css/site.css", "css/site.css"),
        ("/js/app.js", "https://x.test/js/app.js", "js/app.js"),
        ("/hero.png", "https://x.test/hero.png", "assets/hero.png"),
        ("/poster.jpg", "https://x.test/poster.jpg", "assets/poster.jpg"),
        ("/sprite.svg", "https://x.test/sprite.svg", "assets/sprite.svg"),
        ("/bg.jpg", "https://x.test/bg.jpg", "assets/bg.jpg"),
    ]);
    let html = r#"
        <html>
          <head>
            <link rel="stylesheet" href="/css/site.css">
            <script src="/js/app.js"></script>
          </head>
          <body>
            <img src="/hero.png">
            <video poster="/poster.jpg"></video>
            <svg><use href="/sprite.svg"></use></svg>
            <div style="background-image: url('/bg.jpg')">tile</div>
          </body>
        </html>
    "#;

    let (out, _) = rewriter.rewrite_html(html).unwrap();
    assert!(out.contains(r#"href="css/site.css""#));
    assert!(out.contains(r#"src="js/app.js""#));
    assert!(out.contains(r#"src="assets/hero.png""#));
    assert!(out.contains(r#"poster="assets/poster.jpg""#));
    assert!(out.contains(r#"href="assets/sprite.svg""#));
    assert!(out.contains("url(assets/bg.jpg)"));
}

#[test]
fn test_srcset_descriptors_preserved() {
    let rewriter = rewriter_with(&[
        ("/hero.png", "https://x.test/hero.png", "assets/hero.png"),
        ("/hero-2x.png", "https://x.test/hero-2x.png", "assets/hero-2x.png"),
        ("/wide.webp", "https://x.test/wide.webp", "assets/wide.webp"),
    ]);
    let html = r#"
        <picture>
          <source srcset="/wide.webp 1024w">
          <img src="/hero.png" srcset="/hero.png 1x, /hero-2x.png 2x">
        </picture>
    "#;

    let (out, _) = rewriter.rewrite_html(html).unwrap();
    assert!(out.contains("assets/hero.png 1x, assets/hero-2x.png 2x"));
    assert!(out.contains("assets/wide.webp 1024w"));
}

#[test]
fn test_failed_download_leaves_remote_reference() {
    let store = Arc::new(MappingStore::new());
    store.record_failure("/broken.png", "https://x.test/broken.png");
    let base = Url::parse("https://x.test/p").unwrap();
    let rewriter = PathRewriter::new(base, store).unwrap();

    let html = r#"<img src="/broken.png">"#;
    let (out, _) = rewriter.rewrite_html(html).unwrap();
    assert!(out.contains(r#"src="/broken.png""#), "output: {}", out);
}

#[test]
fn test_lazy_markers_placeholders_and_handlers_stripped() {
    let rewriter = rewriter_with(&[("/real.png", "https://x.test/real.png", "assets/real.png")]);
    let html = r#"
        <picture>
          <source data-empty srcset="data:image/gif;base64,R0lGOD">
          <img data-lazy src="/real.png" onload="__lp(event)">
        </picture>
        <div data-lazy onerror="__lp(event)">text</div>
    "#;

    let (out, summary) = rewriter.rewrite_html(html).unwrap();
    assert!(!out.contains("data-lazy"));
    assert!(!out.contains("data-empty"));
    assert!(!out.contains("onload"));
    assert!(!out.contains("onerror"));
    assert!(!out.contains("<source"));
    assert!(out.contains(r#"src="assets/real.png""#));
    assert_eq!(summary.lazy_markers_removed, 2);
    assert_eq!(summary.placeholders_removed, 1);
    assert_eq!(summary.handlers_removed, 2);
}

#[test]
fn test_lazy_source_promoted_into_src() {
    let rewriter = rewriter_with(&[(
        "/deferred.png",
        "https://x.test/deferred.png",
        "assets/deferred.png",
    )]);
    let html = r#"<img data-src="/deferred.png" src="data:image/gif;base64,R0lGOD">"#;

    let (out, _) = rewriter.rewrite_html(html).unwrap();
    assert!(
        out.contains(r#"src="assets/deferred.png""#),
        "output: {}",
        out
    );
    assert!(!out.contains("data-src"));
}

#[test]
fn test_rewrite_is_idempotent() {
    let rewriter = rewriter_with(&[
        ("/a.png", "https://x.test/a.png", "assets/a.png"),
        ("/css/site.css", "https://x.test/css/site.css", "css/site.css"),
    ]);
    let html = r#"
        <html>
          <head><link rel="stylesheet" href="/css/site.css"></head>
          <body>
            <img src="/a.png" srcset="/a.png 1x" data-lazy>
            <img src="/not-downloaded.png">
          </body>
        </html>
    "#;

    let (once, _) = rewriter.rewrite_html(html).unwrap();
    let (twice, summary) = rewriter.rewrite_html(&once).unwrap();
    assert_eq!(once, twice);
    assert_eq!(summary.lazy_markers_removed, 0);
}

#[test]
fn test_css_urls_rewritten_relative_to_css_dir() {
    let rewriter = rewriter_with(&[
        ("../img/b.png", "https://x.test/img/b.png", "assets/b.png"),
        (
            "../fonts/body.woff2",
            "https://x.test/fonts/body.woff2",
            "fonts/body.woff2",
        ),
    ]);
    let css_url = Url::parse("https://x.test/css/s.css").unwrap();
    let css = concat!(
        "body { background: url(../img/b.png); }\n",
        "@font-face { src: url('../fonts/body.woff2') format('woff2'); }\n",
        ".keep { background: url(data:image/png;base64,AAAA); }\n",
        ".miss { background: url(../img/unknown.png); }\n",
    );

    let out = rewriter.rewrite_css(css, &css_url, Path::new("css"));
    assert!(out.contains("url(../assets/b.png)"));
    assert!(out.contains("url(../fonts/body.woff2)"));
    assert!(out.contains("url(data:image/png;base64,AAAA)"));
    assert!(out.contains("url(../img/unknown.png)"));
}

#[test]
fn test_css_rewrite_idempotent() {
    let rewriter =
        rewriter_with(&[("../img/b.png", "https://x.test/img/b.png", "assets/b.png")]);
    let css_url = Url::parse("https://x.test/css/s.css").unwrap();
    let css = "body { background: url(../img/b.png); }";

    let once = rewriter.rewrite_css(css, &css_url, Path::new("css"));
    let twice = rewriter.rewrite_css(&once, &css_url, Path::new("css"));
    assert_eq!(once, twice);
}

#[test]
fn test_inline_style_without_background_untouched() {
    let rewriter = rewriter_with(&[("/a.png", "https://x.test/a.png", "assets/a.png")]);
    let html = r#"<div style="color: red; margin: 0">x</div>"#;

    let (out, _) = rewriter.rewrite_html(html).unwrap();
    assert!(out.contains(r#"style="color: red; margin: 0""#));
}
