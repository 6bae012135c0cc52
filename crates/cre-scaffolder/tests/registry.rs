//! End-to-end registry behavior against an in-memory template host

use chrono::{Duration, Utc};
use cre_scaffolder::config::{add_sources, SourceConfig};
use cre_scaffolder::templates::cache::TemplateListCache;
use cre_scaffolder::templates::fetcher::{TarballReader, TreeEntry, TreeResponse};
use cre_scaffolder::{
    Cache, CancellationToken, Registry, RegistryError, RepoSource, Result, TemplateMetadata,
    TemplateRemote,
};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tar::{Builder, EntryType, Header};

/// Template host double: trees per `owner/repo`, metadata per path, one tarball for everything
#[derive(Default)]
struct FakeRemote {
    trees: HashMap<String, TreeResponse>,
    documents: HashMap<String, String>,
    tarball: Option<Vec<u8>>,
    offline: bool,
    download_fails: bool,
    hang: bool,
    tree_calls: AtomicUsize,
    downloads: AtomicUsize,
    streams: AtomicUsize,
}

impl FakeRemote {
    fn with_tree(mut self, source: &RepoSource, sha: &str, paths: &[&str]) -> Self {
        self.trees.insert(
            source.slug(),
            TreeResponse {
                sha: sha.to_string(),
                tree: paths.iter().map(|p| TreeEntry::blob(*p)).collect(),
                truncated: false,
            },
        );
        self
    }

    fn with_document(mut self, path: &str, yaml: &str) -> Self {
        self.documents.insert(path.to_string(), yaml.to_string());
        self
    }

    fn with_tarball(mut self, bytes: Vec<u8>) -> Self {
        self.tarball = Some(bytes);
        self
    }

    fn unreachable(source: &RepoSource) -> RegistryError {
        RegistryError::RemoteUnavailable {
            repo: source.to_string(),
            reason: "connection refused".to_string(),
        }
    }
}

impl TemplateRemote for FakeRemote {
    async fn tree(&self, source: &RepoSource) -> Result<TreeResponse> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.offline {
            return Err(Self::unreachable(source));
        }
        self.trees
            .get(&source.slug())
            .cloned()
            .ok_or_else(|| Self::unreachable(source))
    }

    async fn metadata(&self, source: &RepoSource, path: &str) -> Result<TemplateMetadata> {
        let doc = self
            .documents
            .get(path)
            .ok_or_else(|| Self::unreachable(source))?;
        TemplateMetadata::from_yaml(doc, path)
    }

    async fn download_tarball(
        &self,
        source: &RepoSource,
        dest: &Path,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.offline || self.download_fails {
            return Err(Self::unreachable(source));
        }
        let bytes = self.tarball.as_ref().ok_or_else(|| Self::unreachable(source))?;
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(dest, bytes).unwrap();
        Ok(())
    }

    async fn stream_tarball(
        &self,
        source: &RepoSource,
        _cancel: &CancellationToken,
    ) -> Result<TarballReader> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        if self.offline {
            return Err(Self::unreachable(source));
        }
        let bytes = self.tarball.clone().ok_or_else(|| Self::unreachable(source))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

/// Gzipped tarball from (name, contents); names ending in '/' are directories.
/// Names are written raw so hostile paths reach the extractor untouched.
fn tarball(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::fast()));
    for (name, data) in entries {
        let mut header = Header::new_gnu();
        if name.ends_with('/') {
            header.set_entry_type(EntryType::Directory);
            header.set_mode(0o755);
            header.set_size(0);
        } else {
            header.set_entry_type(EntryType::Regular);
            header.set_mode(0o644);
            header.set_size(data.len() as u64);
        }
        header.as_old_mut().name[..name.len()].copy_from_slice(name.as_bytes());
        header.set_cksum();
        builder.append(&header, data.as_bytes()).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

fn acme() -> RepoSource {
    RepoSource::new("acme", "samples", "main")
}

fn names(templates: &[cre_scaffolder::TemplateSummary]) -> Vec<&str> {
    templates.iter().map(|t| t.name()).collect()
}

fn hello_go_remote() -> FakeRemote {
    FakeRemote::default()
        .with_tree(&acme(), "abc", &["sdk/hello-go/.cre/template.yaml", "sdk/hello-go/main.go"])
        .with_document(
            "sdk/hello-go/.cre/template.yaml",
            "name: hello-go\nlanguage: go\nexclude: [\"*.test.go\"]\n",
        )
}

#[tokio::test]
async fn test_fresh_discovery_then_scaffold_from_cached_tarball() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path().join("cache"));
    let registry = Registry::new(hello_go_remote(), cache.clone(), vec![acme()]);

    let templates = registry.list(false).await.unwrap();
    assert_eq!(names(&templates), vec!["hello-world-go", "hello-world-ts", "hello-go"]);

    let list_path = cache.list_path(&acme());
    assert!(list_path.ends_with("acme-samples-main-templates.json"));
    let record = cache.read_record(&acme()).unwrap().unwrap();
    assert_eq!(record.tree_sha, "abc");

    let template = registry.get("hello-go", false).await.unwrap();
    assert_eq!(template.path, "sdk/hello-go");
    assert!(!template.built_in);

    let tarball_path = cache.tarball_path(&acme(), "abc");
    assert!(tarball_path.ends_with("tarballs/acme-samples-abc.tar.gz"));
    std::fs::create_dir_all(tarball_path.parent().unwrap()).unwrap();
    std::fs::write(
        &tarball_path,
        tarball(&[
            ("acme-samples-abc/", ""),
            ("acme-samples-abc/sdk/hello-go/workflow/main.go", "package main"),
            ("acme-samples-abc/sdk/hello-go/README.md", "# hello"),
            ("acme-samples-abc/sdk/hello-go/.cre/template.yaml", "name: hello-go"),
            ("acme-samples-abc/sdk/hello-go/foo.test.go", "package main"),
        ]),
    )
    .unwrap();

    let dest = dir.path().join("project");
    let messages = std::cell::RefCell::new(Vec::new());
    registry
        .scaffold(&template, &dest, "my-wf", &|m: &str| {
            messages.borrow_mut().push(m.to_string())
        })
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dest.join("my-wf/main.go")).unwrap(),
        "package main"
    );
    assert!(dest.join("README.md").exists());
    assert!(!dest.join("workflow").exists());
    assert!(!dest.join(".cre").exists());
    assert!(!dest.join("foo.test.go").exists());
    assert_eq!(messages.into_inner(), vec!["Downloading template..."]);
}

#[tokio::test]
async fn test_stale_cache_is_used_when_remote_is_down() {
    let dir = tempfile::tempdir().unwrap();
    let cache = Cache::new(dir.path().join("cache"));

    // Seed a record aged three hours from a previous successful discovery
    let seeded = Registry::new(hello_go_remote(), cache.clone(), vec![acme()]);
    let discovered = seeded.list_from_source(&acme(), true).await.unwrap();
    let record = TemplateListCache {
        templates: discovered,
        tree_sha: "abc".to_string(),
        last_check: Utc::now() - Duration::hours(3),
    };
    std::fs::write(cache.list_path(&acme()), serde_json::to_vec(&record).unwrap()).unwrap();
    assert!(!cache.load_list(&acme()).fresh);

    let offline = FakeRemote {
        offline: true,
        ..Default::default()
    };
    let registry = Registry::new(offline, cache, vec![acme()]);

    let templates = registry.list(false).await.unwrap();

    assert_eq!(names(&templates), vec!["hello-world-go", "hello-world-ts", "hello-go"]);
}

#[tokio::test]
async fn test_fresh_cache_skips_remote_until_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(hello_go_remote(), Cache::new(dir.path()), vec![acme()]);

    registry.list(false).await.unwrap();
    registry.list(false).await.unwrap();
    let calls_after_cached = count_tree_calls(&registry);
    registry.list(true).await.unwrap();

    assert_eq!(calls_after_cached, 1);
    assert_eq!(count_tree_calls(&registry), 2);
}

fn count_tree_calls(registry: &Registry<FakeRemote>) -> usize {
    registry.remote().tree_calls.load(Ordering::SeqCst)
}

#[tokio::test]
async fn test_catalog_order_follows_sources_and_discovery() {
    let first = RepoSource::new("org", "one", "main");
    let second = RepoSource::new("org", "two", "dev");
    let remote = FakeRemote::default()
        .with_tree(&first, "s1", &["b/.cre/template.yaml", "a/.cre/template.yaml"])
        .with_tree(&second, "s2", &["c/.cre/template.yaml"])
        .with_document("b/.cre/template.yaml", "name: b-template\n")
        .with_document("a/.cre/template.yaml", "name: a-template\n")
        .with_document("c/.cre/template.yaml", "name: hello-world-go\n");
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(remote, Cache::new(dir.path()), vec![first, second.clone()]);

    let templates = registry.list(false).await.unwrap();

    assert_eq!(
        names(&templates),
        vec!["hello-world-go", "hello-world-ts", "b-template", "a-template", "hello-world-go"]
    );
    // Lookup returns the first match, which is the built-in
    let found = registry.get("hello-world-go", false).await.unwrap();
    assert!(found.built_in);
    assert_eq!(templates[4].source, second);
}

#[tokio::test]
async fn test_path_traversal_is_rejected() {
    let outer = tempfile::tempdir().unwrap();
    let cache_dir = outer.path().join("cache");
    let dest = outer.path().join("dest");
    let remote = FakeRemote::default()
        .with_tree(&acme(), "abc", &[".cre/template.yaml"])
        .with_document(".cre/template.yaml", "name: whole-repo\n")
        .with_tarball(tarball(&[
            ("acme-samples-abc/", ""),
            ("acme-samples-abc/main.go", "package main"),
            ("acme-samples-abc/../escape.txt", "evil"),
        ]));
    let registry = Registry::new(remote, Cache::new(&cache_dir), vec![acme()]);
    let template = registry.get("whole-repo", false).await.unwrap();

    let err = registry
        .scaffold(&template, &dest, "wf", &|_: &str| {})
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::UnsafeArchivePath { .. }));
    // The unsafe entry never triggers the streaming fallback
    assert_eq!(registry.remote().streams.load(Ordering::SeqCst), 0);
    for entry in walkdir::WalkDir::new(outer.path()) {
        let entry = entry.unwrap();
        assert_ne!(entry.file_name(), "escape.txt");
        if entry.file_type().is_file() {
            assert!(
                entry.path().starts_with(&dest) || entry.path().starts_with(&cache_dir),
                "unexpected file {}",
                entry.path().display()
            );
        }
    }
}

#[tokio::test]
async fn test_flat_template_is_wrapped_in_workflow_dir() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeRemote::default()
        .with_tree(&acme(), "def", &["svc-template/.cre/template.yaml"])
        .with_document("svc-template/.cre/template.yaml", "name: svc-ts\nlanguage: typescript\n")
        .with_tarball(tarball(&[
            ("acme-samples-def/svc-template/main.ts", "export {}"),
            ("acme-samples-def/svc-template/package.json", "{}"),
            ("acme-samples-def/svc-template/project.yaml", "targets: {}"),
            ("acme-samples-def/svc-template/.env", "KEY=1"),
        ]));
    let cache = Cache::new(dir.path().join("cache"));
    let registry = Registry::new(remote, cache.clone(), vec![acme()]);
    let template = registry.get("svc-ts", false).await.unwrap();
    let dest = dir.path().join("dest");

    registry
        .scaffold(&template, &dest, "svc", &|_: &str| {})
        .await
        .unwrap();

    assert!(dest.join("svc/main.ts").exists());
    assert!(dest.join("svc/package.json").exists());
    assert!(dest.join("project.yaml").exists());
    assert!(dest.join(".env").exists());
    assert!(!dest.join("main.ts").exists());
    // Downloaded under the tree revision and reusable afterwards
    assert!(cache.is_tarball_cached(&acme(), "def"));
    assert_eq!(registry.remote().downloads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_streaming_fallback_when_cache_download_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut remote = hello_go_remote().with_tarball(tarball(&[
        ("acme-samples-abc/sdk/hello-go/workflow/main.go", "package main"),
    ]));
    remote.download_fails = true;
    let cache = Cache::new(dir.path().join("cache"));
    let registry = Registry::new(remote, cache.clone(), vec![acme()]);
    let template = registry.get("hello-go", false).await.unwrap();
    let dest = dir.path().join("dest");

    let messages = std::cell::RefCell::new(Vec::new());
    registry
        .scaffold(&template, &dest, "flow", &|m: &str| {
            messages.borrow_mut().push(m.to_string())
        })
        .await
        .unwrap();

    assert!(dest.join("flow/main.go").exists());
    assert_eq!(registry.remote().streams.load(Ordering::SeqCst), 1);
    assert!(!cache.tarball_path(&acme(), "abc").exists());
    assert_eq!(
        messages.into_inner(),
        vec!["Downloading template...", "Extracting template files..."]
    );
}

#[tokio::test]
async fn test_scaffold_without_cached_list_uses_latest_key() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeRemote::default().with_tarball(tarball(&[("o-r-x/tmpl/main.go", "package main")]));
    let cache = Cache::new(dir.path().join("cache"));
    let registry = Registry::new(remote, cache.clone(), vec![acme()]);
    let template = cre_scaffolder::TemplateSummary {
        metadata: TemplateMetadata {
            name: "tmpl".to_string(),
            ..Default::default()
        },
        path: "tmpl".to_string(),
        source: acme(),
        built_in: false,
    };

    registry
        .scaffold(&template, &dir.path().join("dest"), "wf", &|_: &str| {})
        .await
        .unwrap();

    assert!(cache.tarball_path(&acme(), "latest").exists());
    assert!(dir.path().join("dest/wf/main.go").exists());
}

#[tokio::test]
async fn test_add_existing_repo_with_other_ref_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let store = SourceConfig::new(dir.path());
    let cache = Cache::new(dir.path().join("template-cache"));
    store.save(&[RepoSource::new("a", "x", "main")]).unwrap();

    let change = add_sources(
        &store,
        &cache,
        &RepoSource::new("smartcontractkit", "cre-templates", "main"),
        &[RepoSource::new("a", "x", "dev")],
    )
    .unwrap();

    assert_eq!(change.skipped, vec![RepoSource::new("a", "x", "dev")]);
    let loaded = store.load();
    assert_eq!(loaded, vec![RepoSource::new("a", "x", "main")]);
    assert_eq!(loaded[0].git_ref, "main");
}

#[tokio::test]
async fn test_malformed_metadata_is_skipped_and_list_cached() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeRemote::default()
        .with_tree(&acme(), "abc", &["ok/.cre/template.yaml", "bad/.cre/template.yaml"])
        .with_document("ok/.cre/template.yaml", "name: ok\n")
        .with_document("bad/.cre/template.yaml", "name: [unclosed\n");
    let cache = Cache::new(dir.path());
    let registry = Registry::new(remote, cache.clone(), vec![acme()]);

    let templates = registry.list_from_source(&acme(), false).await.unwrap();

    assert_eq!(names(&templates), vec!["ok"]);
    let record = cache.read_record(&acme()).unwrap().unwrap();
    assert_eq!(record.templates.len(), 1);
}

#[tokio::test]
async fn test_cancelled_listing_stops_waiting_on_remote() {
    let dir = tempfile::tempdir().unwrap();
    let remote = FakeRemote {
        hang: true,
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let registry =
        Registry::new(remote, Cache::new(dir.path()), vec![acme()]).with_cancellation(cancel.clone());

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel.cancel();
        })
    };

    let err = registry.list(false).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, RegistryError::Cancelled));
}

fn user_project(root: &Path) -> std::path::PathBuf {
    let dest = root.join("project");
    std::fs::create_dir_all(dest.join("app")).unwrap();
    std::fs::write(dest.join("app/main.go"), "user code").unwrap();
    dest
}

fn staging_leftovers(dest: &Path) -> Vec<String> {
    std::fs::read_dir(dest)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with(".cre-staging-"))
        .collect()
}

#[tokio::test]
async fn test_existing_workflow_like_directory_is_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let remote = hello_go_remote().with_tarball(tarball(&[
        ("acme-samples-abc/sdk/hello-go/workflow/main.go", "package main"),
        ("acme-samples-abc/sdk/hello-go/README.md", "# hello"),
    ]));
    let registry = Registry::new(remote, Cache::new(dir.path().join("cache")), vec![acme()]);
    let template = registry.get("hello-go", false).await.unwrap();
    let dest = user_project(dir.path());

    registry
        .scaffold(&template, &dest, "my-wf", &|_: &str| {})
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dest.join("app/main.go")).unwrap(),
        "user code"
    );
    assert_eq!(
        std::fs::read_to_string(dest.join("my-wf/main.go")).unwrap(),
        "package main"
    );
    assert!(!dest.join("workflow").exists());
    assert!(dest.join("README.md").exists());
    assert!(staging_leftovers(&dest).is_empty());
}

#[tokio::test]
async fn test_builtin_into_directory_with_existing_workflow_code() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new(FakeRemote::default(), Cache::new(dir.path().join("cache")), vec![]);
    let template = registry.get("hello-world-go", false).await.unwrap();
    let dest = user_project(dir.path());

    registry
        .scaffold(&template, &dest, "my-wf", &|_: &str| {})
        .await
        .unwrap();

    assert_eq!(
        std::fs::read_to_string(dest.join("app/main.go")).unwrap(),
        "user code"
    );
    assert!(dest.join("my-wf/main.go").is_file());
    assert!(dest.join("secrets.yaml").is_file());
    assert!(!dest.join("workflow").exists());
    assert!(staging_leftovers(&dest).is_empty());
}

#[tokio::test]
async fn test_failed_scaffold_leaves_existing_files_and_no_staging() {
    let dir = tempfile::tempdir().unwrap();
    let remote = hello_go_remote().with_tarball(tarball(&[
        ("acme-samples-abc/sdk/hello-go/workflow/main.go", "package main"),
        ("acme-samples-abc/sdk/hello-go/../../../escape.txt", "evil"),
    ]));
    let registry = Registry::new(remote, Cache::new(dir.path().join("cache")), vec![acme()]);
    let template = registry.get("hello-go", false).await.unwrap();
    let dest = user_project(dir.path());

    let err = registry
        .scaffold(&template, &dest, "my-wf", &|_: &str| {})
        .await
        .unwrap_err();

    assert!(matches!(err, RegistryError::UnsafeArchivePath { .. }));
    assert_eq!(
        std::fs::read_to_string(dest.join("app/main.go")).unwrap(),
        "user code"
    );
    assert!(!dest.join("my-wf").exists());
    assert!(!dir.path().join("escape.txt").exists());
    assert!(staging_leftovers(&dest).is_empty());
}
