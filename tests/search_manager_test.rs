use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tempfile::TempDir;

use mdkb_search::search::{
    ErrorKind, SearchConfig, SearchError, SearchManager, SearchOptions, SearchResults,
};

struct Fixture {
    _cache_dir: TempDir,
    folder_dir: TempDir,
    manager: SearchManager,
}

impl Fixture {
    fn new() -> Self {
        let cache_dir = TempDir::new().expect("Failed to create cache dir");
        let folder_dir = TempDir::new().expect("Failed to create folder dir");
        let manager = SearchManager::new(SearchConfig::with_cache_dir(cache_dir.path()));
        Self {
            _cache_dir: cache_dir,
            folder_dir,
            manager,
        }
    }

    fn folder(&self) -> &Path {
        self.folder_dir.path()
    }

    fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.folder().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        path
    }

    async fn search(&self, query: &str) -> SearchResults {
        self.manager
            .search(self.folder(), query, SearchOptions::default())
            .await
            .expect("search failed")
    }
}

fn names(results: &SearchResults) -> Vec<String> {
    let mut names: Vec<String> = results.results.iter().map(|r| r.name.clone()).collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_hello_goodbye_world() {
    let fx = Fixture::new();
    fx.write("a.md", "Hello World");
    fx.write("b.md", "Goodbye World");

    let found = fx.search("World").await;
    assert_eq!(found.total, 2);
    assert_eq!(found.results.len(), 2);
    for result in &found.results {
        assert_eq!(result.match_count, 1);
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].line_number, 1);
    }
    assert_eq!(names(&found), vec!["a.md", "b.md"]);
}

#[tokio::test]
async fn test_auto_update_picks_up_modification() {
    let fx = Fixture::new();
    fx.write("a.md", "Hello World");
    fx.write("b.md", "Goodbye World");
    assert_eq!(fx.search("World").await.total, 2);

    fx.write("a.md", "Hello there, nobody else");

    let found = fx.search("World").await;
    assert_eq!(names(&found), vec!["b.md"]);
}

#[tokio::test]
async fn test_empty_query_and_folder_rejected_without_io() {
    let fx = Fixture::new();

    let err = fx
        .manager
        .search(fx.folder(), "", SearchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = fx
        .manager
        .search(Path::new(""), "World", SearchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SearchError::InvalidInput(_)));

    // Nothing was built or cached
    assert_eq!(fx.manager.cache_stats().await.unwrap().total_folders, 0);
}

#[tokio::test]
async fn test_missing_folder_is_an_error() {
    let fx = Fixture::new();
    let missing = fx.folder().join("does-not-exist");

    let err = fx
        .manager
        .search(&missing, "anything", SearchOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Io);
}

#[tokio::test]
async fn test_second_build_applies_no_changes() {
    let fx = Fixture::new();
    fx.write("a.md", "alpha");
    fx.write("sub/b.md", "beta");

    let report = fx.manager.build_index_for_folder(fx.folder()).await.unwrap();
    assert_eq!(report.file_count, 2);

    let changes = fx.manager.update_index(fx.folder()).await.unwrap();
    assert!(changes.is_empty(), "unexpected changes: {:?}", changes);
    assert!(!fx.manager.needs_index_update(fx.folder()).await.unwrap());
}

#[tokio::test]
async fn test_deleted_file_vanishes_from_results() {
    let fx = Fixture::new();
    let gone = fx.write("gone.md", "a uniquephrase lives here");
    fx.write("stays.md", "ordinary text");
    assert_eq!(names(&fx.search("uniquephrase").await), vec!["gone.md"]);

    fs::remove_file(&gone).unwrap();

    assert!(fx.search("uniquephrase").await.results.is_empty());
    let entry = fx.manager.cached_entry(fx.folder()).unwrap().unwrap();
    let entry = entry.read().await;
    assert_eq!(entry.files.len(), 1);
    assert!(entry.is_consistent());
}

#[tokio::test]
async fn test_ids_are_not_reused_after_deletion() {
    let fx = Fixture::new();
    let first = fx.write("1.md", "one");
    fx.write("2.md", "two");
    fx.manager.build_index_for_folder(fx.folder()).await.unwrap();

    let old_ids: Vec<u64> = {
        let entry = fx.manager.cached_entry(fx.folder()).unwrap().unwrap();
        let entry = entry.read().await;
        entry.files.iter().map(|r| r.id.get()).collect()
    };

    fs::remove_file(&first).unwrap();
    fx.write("3.md", "three");
    fx.manager.update_index(fx.folder()).await.unwrap();

    let entry = fx.manager.cached_entry(fx.folder()).unwrap().unwrap();
    let entry = entry.read().await;
    let added = entry
        .files
        .iter()
        .find(|r| r.name == "3.md")
        .expect("3.md indexed");
    assert!(!old_ids.contains(&added.id.get()));
    assert!(entry.is_consistent());
}

#[tokio::test]
async fn test_index_hit_without_literal_match_is_excluded() {
    let fx = Fixture::new();
    // "world" and "peace" both hit the index, only one line holds the phrase
    fx.write("both.md", "world\npeace");
    fx.write("phrase.md", "world peace now");

    let found = fx.search("world peace").await;
    assert_eq!(names(&found), vec!["phrase.md"]);
}

#[tokio::test]
async fn test_file_name_only_hit_is_excluded() {
    let fx = Fixture::new();
    fx.write("recipes.md", "nothing relevant inside");

    assert!(fx.search("recipes").await.results.is_empty());
}

#[tokio::test]
async fn test_match_count_is_uncapped() {
    let fx = Fixture::new();
    let body = (0..9).map(|i| format!("todo item {}", i)).collect::<Vec<_>>().join("\n");
    fx.write("list.md", &body);

    let found = fx.search("todo").await;
    assert_eq!(found.results.len(), 1);
    assert_eq!(found.results[0].match_count, 9);
    assert_eq!(found.results[0].matches.len(), 5);
}

#[tokio::test]
async fn test_without_auto_update_cache_is_used_as_is() {
    let fx = Fixture::new();
    fx.write("a.md", "stable text");
    fx.search("stable").await;

    fx.write("b.md", "stable addition");
    let options = SearchOptions {
        auto_update: false,
        force_refresh: false,
    };
    let found = fx.manager.search(fx.folder(), "stable", options).await.unwrap();
    assert_eq!(names(&found), vec!["a.md"]);

    assert!(fx.manager.needs_index_update(fx.folder()).await.unwrap());
    let found = fx.search("stable").await;
    assert_eq!(names(&found), vec!["a.md", "b.md"]);
}

#[tokio::test]
async fn test_needs_index_update_does_not_consume_changes() {
    let fx = Fixture::new();
    fx.write("a.md", "first");
    fx.search("first").await;

    fx.write("b.md", "first again");
    assert!(fx.manager.needs_index_update(fx.folder()).await.unwrap());
    assert!(fx.manager.needs_index_update(fx.folder()).await.unwrap());

    // The search still sees the change
    assert_eq!(fx.search("first").await.total, 2);
    assert!(!fx.manager.needs_index_update(fx.folder()).await.unwrap());
}

#[tokio::test]
async fn test_needs_index_update_false_when_uncached() {
    let fx = Fixture::new();
    fx.write("a.md", "x");
    assert!(!fx.manager.needs_index_update(fx.folder()).await.unwrap());
}

#[tokio::test]
async fn test_force_refresh_rebuilds_and_releases_watch_guard() {
    let fx = Fixture::new();
    fx.write("a.md", "refresh me");
    fx.search("refresh").await;

    let released = Arc::new(AtomicBool::new(false));
    struct Guard(Arc<AtomicBool>);
    impl Drop for Guard {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }
    assert!(fx
        .manager
        .attach_watch_guard(fx.folder(), Box::new(Guard(Arc::clone(&released))))
        .unwrap());

    let options = SearchOptions {
        auto_update: true,
        force_refresh: true,
    };
    let found = fx.manager.search(fx.folder(), "refresh", options).await.unwrap();
    assert_eq!(found.total, 1);
    assert!(released.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_clear_cache_and_stats() {
    let fx = Fixture::new();
    let other = TempDir::new().unwrap();
    fx.write("a.md", "one");
    fx.write("b.md", "two");
    fs::write(other.path().join("c.md"), "three").unwrap();

    fx.manager.build_index_for_folder(fx.folder()).await.unwrap();
    fx.manager.build_index_for_folder(other.path()).await.unwrap();

    let stats = fx.manager.cache_stats().await.unwrap();
    assert_eq!(stats.total_folders, 2);
    let mine = stats
        .folders
        .iter()
        .find(|f| f.path == fx.folder())
        .unwrap();
    assert_eq!(mine.file_count, 2);

    assert!(fx.manager.clear_index_cache(fx.folder()).unwrap());
    assert!(!fx.manager.clear_index_cache(fx.folder()).unwrap());
    assert_eq!(fx.manager.cache_stats().await.unwrap().total_folders, 1);

    // Stats survive a cache clear
    assert_eq!(fx.manager.file_stats(fx.folder()).unwrap().len(), 2);

    assert_eq!(fx.manager.clear_all_cache().unwrap(), 1);
    assert_eq!(fx.manager.cache_stats().await.unwrap().total_folders, 0);
}

#[tokio::test]
async fn test_metadata_survives_restart() {
    let cache_dir = TempDir::new().unwrap();
    let folder_dir = TempDir::new().unwrap();
    let folder = folder_dir.path();
    fs::write(folder.join("a.md"), "kept").unwrap();
    fs::write(folder.join("b.md"), "edited later").unwrap();
    fs::write(folder.join("c.md"), "removed later").unwrap();

    {
        let manager = SearchManager::new(SearchConfig::with_cache_dir(cache_dir.path()));
        let report = manager.build_index_for_folder(folder).await.unwrap();
        assert_eq!(report.changes_since_last_run.added.len(), 3);
    }

    fs::write(folder.join("b.md"), "edited later, with more words").unwrap();
    fs::remove_file(folder.join("c.md")).unwrap();
    fs::write(folder.join("d.md"), "brand new").unwrap();

    let manager = SearchManager::new(SearchConfig::with_cache_dir(cache_dir.path()));
    let report = manager.build_index_for_folder(folder).await.unwrap();
    let changes = report.changes_since_last_run;
    assert_eq!(changes.modified, vec![folder.join("b.md")]);
    assert_eq!(changes.added, vec![folder.join("d.md")]);
    assert_eq!(changes.deleted, vec![folder.join("c.md")]);
    assert_eq!(report.file_count, 3);

    // The pruned metadata file mirrors the indexed set
    let persisted = manager.metadata_store().load(folder).await;
    assert_eq!(persisted.len(), 3);
    assert!(!persisted.contains_key(&folder.join("c.md")));
}

#[tokio::test]
async fn test_cjk_and_single_char_queries() {
    let fx = Fixture::new();
    fx.write("zh.md", "这是一个全文检索的例子");
    fx.write("en.md", "x marks the spot");

    assert_eq!(names(&fx.search("检索").await), vec!["zh.md"]);
    assert_eq!(names(&fx.search("x").await), vec!["en.md"]);
}

#[tokio::test]
async fn test_case_insensitive_previews() {
    let fx = Fixture::new();
    fx.write("case.md", "Intro\nThe QUICK brown fox");

    let found = fx.search("quick").await;
    assert_eq!(found.results.len(), 1);
    let m = &found.results[0].matches[0];
    assert_eq!(m.line_number, 2);
    assert_eq!(m.content, "The QUICK brown fox");
    assert_eq!(m.preview, "The QUICK brown fox");
    assert_eq!(found.results[0].relative_path, PathBuf::from("case.md"));
}

#[tokio::test]
async fn test_incremental_update_matches_full_rebuild() {
    let fx = Fixture::new();
    fx.write("a.md", "alpha shared\nline two");
    fx.write("b.md", "beta shared");
    let c = fx.write("nested/c.md", "gamma shared");
    fx.manager.build_index_for_folder(fx.folder()).await.unwrap();

    fx.write("a.md", "alpha rewritten entirely, shared still");
    fs::remove_file(&c).unwrap();
    fx.write("nested/d.md", "delta shared");
    fx.write("e.md", "epsilon");
    fx.manager.update_index(fx.folder()).await.unwrap();

    let queries = ["shared", "alpha", "gamma", "delta", "rewritten", "eps", "two"];
    let mut incremental = Vec::new();
    for query in queries {
        incremental.push(names(&fx.search(query).await));
    }

    let fresh_cache = TempDir::new().unwrap();
    let fresh = SearchManager::new(SearchConfig::with_cache_dir(fresh_cache.path()));
    for (query, expected) in queries.iter().zip(&incremental) {
        let rebuilt = fresh
            .search(fx.folder(), query, SearchOptions::default())
            .await
            .unwrap();
        assert_eq!(&names(&rebuilt), expected, "query {:?}", query);
    }
    assert_eq!(incremental[0], vec!["a.md", "b.md", "d.md"]);
    assert!(incremental[2].is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_searches_build_once() {
    let fx = Arc::new(Fixture::new());
    for i in 0..20 {
        fx.write(&format!("note{}.md", i), &format!("note number {} about rust", i));
    }

    let mut handles = Vec::new();
    for _ in 0..8 {
        let fx = Arc::clone(&fx);
        handles.push(tokio::spawn(async move { fx.search("rust").await.total }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 20);
    }

    let stats = fx.manager.cache_stats().await.unwrap();
    assert_eq!(stats.total_folders, 1);
    assert_eq!(stats.folders[0].file_count, 20);
    let entry = fx.manager.cached_entry(fx.folder()).unwrap().unwrap();
    assert!(entry.read().await.is_consistent());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_searches_during_edits_see_whole_states() {
    let fx = Arc::new(Fixture::new());
    fx.write("fixed.md", "marker fixed");
    fx.search("marker").await;

    let writer = {
        let fx = Arc::clone(&fx);
        tokio::spawn(async move {
            for i in 0..10 {
                fx.write(&format!("extra{}.md", i), "marker extra");
                fx.manager.update_index(fx.folder()).await.unwrap();
            }
        })
    };
    let mut readers = Vec::new();
    for _ in 0..4 {
        let fx = Arc::clone(&fx);
        readers.push(tokio::spawn(async move {
            for _ in 0..10 {
                let found = fx.search("marker").await;
                assert!(found.results.iter().any(|r| r.name == "fixed.md"));
                assert_eq!(found.total, found.results.len());
            }
        }));
    }

    writer.await.unwrap();
    for reader in readers {
        reader.await.unwrap();
    }
    assert_eq!(fx.search("marker").await.total, 11);
}

#[tokio::test]
async fn test_nested_folders_track_changes_independently() {
    let fx = Fixture::new();
    let sub = fx.folder().join("sub");
    let x = fx.write("sub/x.md", "oldword here");
    fx.write("top.md", "unrelated");

    let inner = |query: &'static str| {
        let sub = sub.clone();
        let manager = &fx.manager;
        async move {
            manager
                .search(&sub, query, SearchOptions::default())
                .await
                .unwrap()
        }
    };

    assert_eq!(inner("oldword").await.total, 1);
    assert_eq!(fx.search("oldword").await.total, 1);

    fx.write("sub/x.md", "newword replaces the old text");

    // The outer rescan must not hide the edit from the inner folder
    assert_eq!(fx.search("newword").await.total, 1);
    assert_eq!(inner("newword").await.total, 1);
    assert_eq!(inner("oldword").await.total, 0);

    fs::remove_file(&x).unwrap();

    // Nor may the inner rescan hide the deletion from the outer folder
    assert_eq!(inner("newword").await.total, 0);
    assert_eq!(fx.search("newword").await.total, 0);
    assert!(!fx.manager.needs_index_update(&sub).await.unwrap());

    let outer_stats = fx.manager.file_stats(fx.folder()).unwrap();
    assert_eq!(outer_stats.len(), 1);
    assert!(fx.manager.file_stats(&sub).unwrap().is_empty());
}

#[tokio::test]
async fn test_default_config_values() {
    let fx = Fixture::new();
    let config = fx.manager.config();
    assert_eq!(config.max_previews, 5);
    assert_eq!(config.preview_context, 40);
    assert_eq!(config.result_limit, 1000);
}
