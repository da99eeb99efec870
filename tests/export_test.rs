mod common;

use common::{export_config, init_logging, StubFetcher, RUNTIME_URL};
use std::sync::Arc;
use stepdeck::export::LARGE_IMAGE_NOTE;
use stepdeck::{Deck, DeckError, DeckRepository, ExportRenderer, MemoryRepository, Step};

const ASSET_URL: &str = "http://minio:9000/stepdeck/decks/d1/photo.png";
const THRESHOLD: usize = 100 * 1024;

struct Fixture {
    repo: Arc<MemoryRepository>,
    fetcher: Arc<StubFetcher>,
    renderer: ExportRenderer,
}

fn fixture(runtime: Option<&str>) -> Fixture {
    init_logging();
    let repo = Arc::new(MemoryRepository::new());
    let fetcher = Arc::new(StubFetcher::new());
    let renderer = ExportRenderer::new(repo.clone(), fetcher.clone(), export_config(runtime));
    Fixture {
        repo,
        fetcher,
        renderer,
    }
}

/// Save a deck whose steps carry the given markup, in order.
async fn deck_with_steps(repo: &MemoryRepository, title: &str, contents: &[&str]) -> (Deck, Vec<Step>) {
    let mut deck = Deck::new(title, "owner");
    let mut steps = Vec::new();
    for content in contents {
        let step = Step {
            inner_html: content.to_string(),
            ..Step::new(&deck.id, "owner")
        };
        repo.save_step(&step).await.expect("Failed to save step");
        deck.order.push(step.id.clone());
        steps.push(step);
    }
    repo.save_deck(&deck).await.expect("Failed to save deck");
    (deck, steps)
}

fn image_step(url: &str) -> String {
    format!(r#"<p>Look</p><img src="{}" alt="photo">"#, url)
}

#[tokio::test]
async fn test_image_below_threshold_is_inlined() {
    let fx = fixture(None);
    fx.fetcher.respond(ASSET_URL, vec![7u8; THRESHOLD - 1], "image/png");
    let (deck, _) = deck_with_steps(&fx.repo, "Inline", &[&image_step(ASSET_URL)]).await;

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");

    assert!(exported.html.contains(r#"<img src="data:image/png;base64,"#));
    assert!(exported.html.contains(r#"alt="photo">"#));
    assert!(!exported.html.contains(ASSET_URL));
    assert!(!exported.html.contains(LARGE_IMAGE_NOTE));
}

#[tokio::test]
async fn test_image_at_threshold_is_linked_with_note() {
    let fx = fixture(None);
    fx.fetcher.respond(ASSET_URL, vec![7u8; THRESHOLD], "image/png");
    let (deck, _) = deck_with_steps(&fx.repo, "Large", &[&image_step(ASSET_URL)]).await;

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");

    let expected = format!(r#"<img src="{}" alt="photo">{}"#, ASSET_URL, LARGE_IMAGE_NOTE);
    assert!(exported.html.contains(&expected));
    assert!(!exported.html.contains("data:image/png"));
}

#[tokio::test]
async fn test_non_asset_image_is_untouched() {
    let fx = fixture(None);
    let external = "https://images.example.com/cat.png";
    fx.fetcher.respond(external, vec![1, 2, 3], "image/png");
    let (deck, _) = deck_with_steps(&fx.repo, "External", &[&image_step(external)]).await;

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");

    assert!(exported.html.contains(&image_step(external)));
    assert!(fx.fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_unreachable_asset_leaves_tag_as_is() {
    let fx = fixture(None);
    let (deck, _) = deck_with_steps(&fx.repo, "Broken", &[&image_step(ASSET_URL)]).await;

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");

    assert!(exported.html.contains(&image_step(ASSET_URL)));
    assert!(!exported.html.contains(LARGE_IMAGE_NOTE));
    assert_eq!(fx.fetcher.calls(), vec![ASSET_URL.to_string()]);
}

#[tokio::test]
async fn test_presigned_src_is_unescaped_before_fetch() {
    let fx = fixture(None);
    let presigned = "http://minio:9000/stepdeck/decks/d1/a.png?expires=1&token=abc";
    fx.fetcher.respond(presigned, vec![1, 2, 3], "image/png");
    let sanitized = image_step("http://minio:9000/stepdeck/decks/d1/a.png?expires=1&amp;token=abc");
    let (deck, _) = deck_with_steps(&fx.repo, "Signed", &[&sanitized]).await;

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");

    assert!(exported.html.contains("data:image/png;base64,AQID"));
}

#[tokio::test]
async fn test_runtime_embedded_when_available() {
    let fx = fixture(Some(RUNTIME_URL));
    fx.fetcher
        .respond(RUNTIME_URL, b"window.impress = function() {};".to_vec(), "text/javascript");
    let (deck, _) = deck_with_steps(&fx.repo, "Runtime", &["<h1>Hi</h1>"]).await;

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");

    let runtime_at = exported
        .html
        .find("window.impress = function() {};")
        .expect("Runtime not embedded");
    let init_at = exported.html.find("impress().init();").expect("Init call missing");
    assert!(runtime_at < init_at);
}

#[tokio::test]
async fn test_runtime_failure_leaves_empty_script() {
    let fx = fixture(Some(RUNTIME_URL));
    let (deck, _) = deck_with_steps(&fx.repo, "Offline", &["<h1>Hi</h1>"]).await;

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");

    let script = exported
        .html
        .split("<script>")
        .nth(1)
        .and_then(|rest| rest.split("</script>").next())
        .expect("Script block missing");
    assert_eq!(script.trim(), "impress().init();");
    assert_eq!(fx.fetcher.calls(), vec![RUNTIME_URL.to_string()]);
}

#[tokio::test]
async fn test_document_structure() {
    let fx = fixture(None);
    let (mut deck, steps) = deck_with_steps(
        &fx.repo,
        "Roadmap <2025>",
        &["<h1>First</h1>", "<h2>Second</h2>"],
    )
    .await;
    deck.background_color = "#102030".to_string();
    deck.autoplay = Some(5);
    deck.max_scale = Some(3);
    deck.order.insert(0, "stale-id".to_string());
    fx.repo.save_deck(&deck).await.expect("Failed to save deck");

    let mut second = steps[1].clone();
    second.x = 1200.0;
    second.rotate_y = 45.0;
    second.is_slide = false;
    second.autoplay = Some(3);
    second.notes = "Remember **this**".to_string();
    fx.repo.save_step(&second).await.expect("Failed to save step");

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");
    let html = &exported.html;

    assert_eq!(exported.filename, "Roadmap _2025_.html");
    assert!(html.starts_with("<!doctype html>"));
    assert!(html.contains("<title>Roadmap &lt;2025&gt;</title>"));
    assert!(html.contains("background: #102030;"));
    assert!(html.contains(r#"data-width="1024""#));
    assert!(html.contains(r#"data-max-scale="3""#));
    assert!(html.contains(r#"data-min-scale="""#));
    assert!(html.contains(r#"data-transition-duration="1000" data-autoplay="5">"#));

    let first_at = html.find("<h1>First</h1>").expect("First step missing");
    let second_at = html.find("<h2>Second</h2>").expect("Second step missing");
    assert!(first_at < second_at);
    assert_eq!(html.matches(r#"<div class="step slide""#).count(), 1);
    assert!(html.contains(r#"data-x="1200""#));
    assert!(html.contains(r#"data-rotate-y="45""#));
    assert!(html.contains(r#"data-autoplay="3""#));
    assert!(html.contains(r#"<div class="notes"><p>Remember <strong>this</strong></p>"#));
    assert!(html.contains(r#"<div id="overview" class="step""#));
}

#[tokio::test]
async fn test_font_links_deduplicated() {
    let fx = fixture(None);
    let (_, steps) = deck_with_steps(&fx.repo, "Fonts", &["<p>a</p>", "<p>b</p>", "<p>c</p>"]).await;
    let font = "https://fonts.googleapis.com/css2?family=Lato&display=swap";

    let mut deck_id = String::new();
    for (step, family) in steps.iter().zip([Some(font), Some("Georgia"), Some(font)]) {
        let mut step = step.clone();
        step.font_family = family.map(|f| f.to_string());
        deck_id = step.deck_id.clone();
        fx.repo.save_step(&step).await.expect("Failed to save step");
    }

    let exported = fx.renderer.export(&deck_id).await.expect("Export failed");

    assert_eq!(exported.html.matches(r#"rel="stylesheet""#).count(), 1);
    assert!(exported.html.contains(
        r#"<link href="https://fonts.googleapis.com/css2?family=Lato&amp;display=swap" rel="stylesheet">"#
    ));
    assert_eq!(exported.html.matches("font-family: Lato;").count(), 2);
    assert!(exported.html.contains("font-family: Georgia;"));
}

#[tokio::test]
async fn test_export_without_overview_or_steps() {
    let fx = fixture(None);
    let mut deck = Deck::new("Empty", "owner");
    deck.has_overview = false;
    fx.repo.save_deck(&deck).await.expect("Failed to save deck");

    let exported = fx.renderer.export(&deck.id).await.expect("Export failed");

    assert!(!exported.html.contains(r#"class="step"#));
    assert!(!exported.html.contains("overview"));
}

#[tokio::test]
async fn test_unknown_deck_is_not_found() {
    let fx = fixture(None);
    let result = fx.renderer.export("no-such-deck").await;
    assert!(matches!(result, Err(DeckError::DeckNotFound(id)) if id == "no-such-deck"));
}
