mod support;

use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use tessera::application::pieces::{PieceCatalog, PieceError, PieceService, PrunedLocation};
use tessera::application::repos::RepoError;
use tessera::application::views::{
    EDITABLE_DEPENDENCY, ViewCacheLocator, ViewCompiler, ViewError,
};
use tessera::domain::entities::PageMetaFields;
use tessera::domain::types::MetaKey;
use tessera::infra::views::{FsFileManager, FsViewCache, FsViewEngine};

use support::{MemoryMeta, MemoryPieces, address, code, editor, permissions};

const HOME: &str = r#"<!doctype html>
<html>
<head><title data-cms-meta="page">Home</title></head>
<body>
<section data-cms-piece="home.hero"><h1>Welcome</h1></section>
<footer data-cms-piece="footer">(c) Tessera</footer>
</body>
</html>
"#;

struct Site {
    _root: TempDir,
    views_dir: std::path::PathBuf,
    cache: FsViewCache,
    engine: Arc<FsViewEngine>,
    service: PieceService,
    pieces: Arc<MemoryPieces>,
    meta: Arc<MemoryMeta>,
}

fn write_view(views_dir: &Path, namespace: &str, view: &str, html: &str) {
    let path = views_dir.join(namespace).join(format!("{view}.html"));
    std::fs::create_dir_all(path.parent().expect("parent")).expect("create view dir");
    std::fs::write(path, html).expect("write view");
}

fn site() -> Site {
    let root = tempfile::tempdir().expect("tempdir");
    let views_dir = root.path().join("views");
    let cache = FsViewCache::new(root.path().join("cache"));

    let pieces = Arc::new(MemoryPieces::default());
    let meta = Arc::new(MemoryMeta::default());
    let catalog = Arc::new(PieceCatalog::new(pieces.clone(), meta.clone()));
    let engine = Arc::new(FsViewEngine::new(&views_dir, cache.clone(), catalog.clone()));
    let service = PieceService::new(
        catalog,
        engine.clone(),
        Arc::new(cache.clone()),
        Arc::new(FsFileManager),
        Arc::new(permissions()),
    );

    Site {
        _root: root,
        views_dir,
        cache,
        engine,
        service,
        pieces,
        meta,
    }
}

#[tokio::test]
async fn compiling_registers_pieces_and_meta_from_defaults() {
    let site = site();
    write_view(&site.views_dir, "site", "home", HOME);

    site.service
        .compile_view(&address("site", "home"))
        .await
        .expect("compile");

    let pieces = site.pieces.pieces().await;
    let mut codes: Vec<&str> = pieces.iter().map(|piece| piece.code.as_str()).collect();
    codes.sort_unstable();
    assert_eq!(codes, vec!["footer", "home.hero"]);
    let hero = pieces
        .iter()
        .find(|piece| piece.code == "home.hero")
        .expect("hero");
    assert_eq!(hero.content, "<h1>Welcome</h1>");
    assert_eq!(site.pieces.locations().await.len(), 2);

    let meta = site.meta.records().await;
    assert_eq!(meta.len(), 1);
    assert_eq!(meta[0].title.as_deref(), Some("Home"));

    let artifacts = site
        .cache
        .cache_files(&address("site", "home"))
        .await
        .expect("listing");
    assert_eq!(artifacts.len(), 2);
}

#[tokio::test]
async fn editable_and_plain_renderings_differ() {
    let site = site();
    write_view(&site.views_dir, "site", "home", HOME);
    let home = address("site", "home");

    let plain = site.service.render_view(None, &home).await.expect("plain");
    let editable = site
        .service
        .render_view(Some(&editor()), &home)
        .await
        .expect("editable");

    assert!(!plain.html.contains("data-cms-"));
    assert!(plain.html.contains("<section><h1>Welcome</h1></section>"));
    assert!(editable.html.contains("data-cms-editable=\"true\""));
    assert!(editable.html.contains("data-cms-namespace=\"site\""));
    assert!(editable.html.contains("data-cms-view=\"home\""));
    assert!(editable.path.exists());
    assert!(plain.path.exists());
}

#[tokio::test]
async fn saving_a_piece_rewrites_compiled_views() {
    let site = site();
    write_view(&site.views_dir, "site", "home", HOME);
    write_view(
        &site.views_dir,
        "site",
        "about",
        r#"<main><footer data-cms-piece="footer">(c) Tessera</footer></main>"#,
    );
    let home = address("site", "home");
    let about = address("site", "about");
    site.service.compile_view(&home).await.expect("home");
    site.service.compile_view(&about).await.expect("about");

    let (_, report) = site
        .service
        .save_piece(Some(&editor()), &code("footer"), "(c) 2026 Tessera")
        .await
        .expect("save");
    assert_eq!(report.compiled.len(), 2);

    let rendered = site.service.render_view(None, &about).await.expect("render");
    assert!(rendered.html.contains("<footer>(c) 2026 Tessera</footer>"));
}

#[tokio::test]
async fn saving_meta_emits_meta_tags() {
    let site = site();
    write_view(&site.views_dir, "site", "home", HOME);
    let home = address("site", "home");
    site.service.compile_view(&home).await.expect("compile");

    site.service
        .save_meta(
            Some(&editor()),
            &MetaKey::new(home.clone(), code("page")),
            PageMetaFields {
                title: Some("Welcome".to_string()),
                description: Some("Landing page".to_string()),
                keywords: Some("home, landing".to_string()),
            },
        )
        .await
        .expect("save meta");

    let rendered = site.service.render_view(None, &home).await.expect("render");
    assert!(rendered.html.contains("<title>Welcome</title>"));
    assert!(
        rendered
            .html
            .contains("<meta name=\"description\" content=\"Landing page\">")
    );
    assert!(
        rendered
            .html
            .contains("<meta name=\"keywords\" content=\"home, landing\">")
    );
}

#[tokio::test]
async fn removed_templates_prune_their_locations() {
    let site = site();
    write_view(&site.views_dir, "site", "home", HOME);
    write_view(
        &site.views_dir,
        "site",
        "legacy",
        r#"<div data-cms-piece="footer">(c)</div>"#,
    );
    site.service
        .compile_view(&address("site", "home"))
        .await
        .expect("home");
    site.service
        .compile_view(&address("site", "legacy"))
        .await
        .expect("legacy");
    std::fs::remove_file(site.views_dir.join("site").join("legacy.html")).expect("remove");

    let (piece, report) = site
        .service
        .save_piece(Some(&editor()), &code("footer"), "(c) new")
        .await
        .expect("save");

    assert_eq!(report.compiled, vec![address("site", "home")]);
    assert_eq!(
        report.pruned,
        vec![PrunedLocation {
            namespace: "site".to_string(),
            view: "legacy".to_string(),
        }]
    );
    let locations = site.pieces.locations().await;
    assert!(
        locations
            .iter()
            .all(|location| location.piece_id != piece.id || location.view == "home")
    );
}

#[tokio::test]
async fn lookup_timeouts_abort_the_refresh_without_pruning() {
    let site = site();
    write_view(&site.views_dir, "site", "home", HOME);
    site.service
        .compile_view(&address("site", "home"))
        .await
        .expect("home");
    let footer = site
        .service
        .find_piece(&code("footer"))
        .await
        .expect("lookup")
        .expect("footer");

    site.pieces.fail_next_lookups(1);
    let err = site
        .service
        .refresh_piece(&footer)
        .await
        .expect_err("timeout propagates");

    assert!(matches!(
        err,
        PieceError::View(ViewError::Content {
            source: RepoError::Timeout,
            ..
        })
    ));
    assert_eq!(site.pieces.locations().await.len(), 2);
}

#[tokio::test]
async fn title_entities_are_stored_decoded_and_rendered_once() {
    let site = site();
    write_view(
        &site.views_dir,
        "site",
        "cafe",
        r#"<title data-cms-meta="page">Caf&eacute; &#169; 2026</title>"#,
    );

    let environment = site.engine.environment().with_dependency(EDITABLE_DEPENDENCY, false);
    let compiled = site
        .engine
        .compile(&address("site", "cafe"), &environment, true)
        .await
        .expect("compile");

    let meta = site.meta.records().await;
    assert_eq!(meta[0].title.as_deref(), Some("Caf\u{e9} \u{a9} 2026"));
    assert!(compiled.html.contains("<title>Caf\u{e9} \u{a9} 2026</title>"));
}

#[tokio::test]
async fn non_forced_compiles_reuse_the_artifact() {
    let site = site();
    write_view(&site.views_dir, "site", "home", HOME);
    let home = address("site", "home");
    let environment = site.engine.environment().with_dependency(EDITABLE_DEPENDENCY, false);

    let first = site
        .engine
        .compile(&home, &environment, false)
        .await
        .expect("first");
    write_view(&site.views_dir, "site", "home", "<p>changed</p>");

    let cached = site
        .engine
        .compile(&home, &environment, false)
        .await
        .expect("cached");
    assert_eq!(cached.html, first.html);

    let forced = site
        .engine
        .compile(&home, &environment, true)
        .await
        .expect("forced");
    assert_eq!(forced.html, "<p>changed</p>");
}

#[tokio::test]
async fn missing_and_broken_templates_are_reported() {
    let site = site();
    let environment = site.engine.environment();

    let missing = site
        .engine
        .compile(&address("site", "nowhere"), &environment, true)
        .await;
    assert!(matches!(missing, Err(ViewError::NotFound { .. })));

    write_view(
        &site.views_dir,
        "site",
        "nested",
        r#"<div data-cms-piece="outer"><p data-cms-piece="inner">x</p></div>"#,
    );
    let nested = site
        .engine
        .compile(&address("site", "nested"), &environment, true)
        .await;
    assert!(matches!(nested, Err(ViewError::Compile { .. })));
    assert!(site.pieces.pieces().await.is_empty());
}

#[tokio::test]
async fn views_in_subdirectories_compile() {
    let site = site();
    write_view(
        &site.views_dir,
        "site",
        "blog/index",
        r#"<h2 data-cms-piece="blog.title">Blog</h2>"#,
    );
    let blog = address("site", "blog/index");

    site.service.compile_view(&blog).await.expect("compile");

    let artifacts = site.cache.cache_files(&blog).await.expect("listing");
    assert_eq!(artifacts.len(), 2);
    assert!(
        artifacts
            .iter()
            .all(|path| path.starts_with(site.cache.root().join("site").join("blog")))
    );
}
