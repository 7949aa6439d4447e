//! End-to-end tests of the git backend against real repositories
//! reached over `file://` URLs, no network involved.

mod helper;

use std::io::Cursor;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;
use zip::ZipArchive;

use modprox::backend::git::{GitBackend, Origin};
use modprox::backend::{Backend, BackendError};

use helper::gitrepo::{origin_root, ScratchRepo};

const T1: &str = "2022-05-16T12:00:00+00:00";
const T2: &str = "2022-05-17T00:17:27+00:00";

fn backend(remotes: &TempDir, cache: &TempDir) -> GitBackend {
    GitBackend::new(
        cache.path().to_path_buf(),
        Origin::new(origin_root(remotes.path())),
    )
}

#[tokio::test]
async fn list_returns_canonical_versions_for_the_root_module() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("main.go", "package main\n");
    repo.commit("initial", T1);
    repo.tag("v0.1.0").tag("v0.2.0").tag("v1.0").tag("v1.0.1");
    repo.tag("v2.0.0");
    repo.tag("not-a-version");

    let backend = backend(&remotes, &cache);
    let versions = backend.get_list("github.com/acme/widget", "").await.unwrap();

    // v1.0 canonicalizes, v2.0.0 needs a /v2 path, junk tags drop out.
    assert_eq!(versions, vec!["v0.1.0", "v0.2.0", "v1.0.0", "v1.0.1"]);
}

#[tokio::test]
async fn list_scopes_tags_to_the_sub_module() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("sub/sub.go", "package sub\n");
    repo.commit("initial", T1);
    repo.tag("v1.0.0").tag("sub/v0.3.0").tag("sub/v0.4.0");

    let backend = backend(&remotes, &cache);
    let versions = backend
        .get_list("github.com/acme/widget/sub", "")
        .await
        .unwrap();

    assert_eq!(versions, vec!["v0.3.0", "v0.4.0"]);
}

#[tokio::test]
async fn list_fails_when_no_candidate_base_resolves() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();

    let backend = backend(&remotes, &cache);
    let result = backend.get_list("github.com/wandel/dne", "").await;

    assert!(matches!(result, Err(BackendError::NotFound)));
}

#[tokio::test]
async fn latest_prefers_the_newest_tagged_commit() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("main.go", "package main\n");
    repo.commit("older", T1);
    repo.tag("v1.0.0");
    repo.write("main.go", "package main // patched\n");
    repo.commit("newer", T2);
    repo.annotated_tag("v1.0.1", T2);

    let backend = backend(&remotes, &cache);
    let latest = backend
        .get_latest("github.com/acme/widget", "")
        .await
        .unwrap();

    assert_eq!(latest.version, "v1.0.1");
    assert_eq!(
        latest.time,
        Utc.with_ymd_and_hms(2022, 5, 17, 0, 17, 27).unwrap()
    );
}

#[tokio::test]
async fn latest_falls_back_to_a_pseudo_version_for_untagged_repos() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/untagged");
    repo.write("main.go", "package main\n");
    let head = repo.commit("initial", T2);

    let backend = backend(&remotes, &cache);
    let latest = backend
        .get_latest("github.com/acme/untagged", "")
        .await
        .unwrap();

    assert_eq!(
        latest.version,
        format!("v0.0.0-20220517001727-{}", &head[..12])
    );
    assert_eq!(
        latest.time,
        Utc.with_ymd_and_hms(2022, 5, 17, 0, 17, 27).unwrap()
    );
}

#[tokio::test]
async fn module_file_is_returned_verbatim() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("go.mod", "module github.com/acme/widget\n\ngo 1.21\n");
    repo.commit("initial", T1);
    repo.tag("v1.0.0");

    let backend = backend(&remotes, &cache);
    let contents = backend
        .get_module("github.com/acme/widget", "v1.0.0")
        .await
        .unwrap();

    assert_eq!(contents, "module github.com/acme/widget\n\ngo 1.21\n");
}

#[tokio::test]
async fn module_file_is_synthesized_when_absent() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/wandel/modprox_test");
    repo.write("main.go", "package main\n");
    repo.commit("initial", T1);
    repo.tag("v0.1.0");

    let backend = backend(&remotes, &cache);
    let contents = backend
        .get_module("github.com/wandel/modprox_test", "v0.1.0")
        .await
        .unwrap();

    assert_eq!(contents, "module github.com/wandel/modprox_test\n");
}

#[tokio::test]
async fn gopkg_in_module_file_keeps_the_dotted_major() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/cheggaaa/pb");
    repo.write("pb.go", "package pb\n");
    repo.commit("initial", T1);
    repo.tag("v2.0.7");

    let backend = backend(&remotes, &cache);
    let contents = backend
        .get_module("gopkg.in/cheggaaa/pb.v2", "v2.0.7")
        .await
        .unwrap();

    assert_eq!(contents, "module gopkg.in/cheggaaa/pb.v2\n");
}

#[tokio::test]
async fn v2_module_without_go_mod_is_invalid() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("main.go", "package main\n");
    repo.commit("initial", T1);
    repo.tag("v2.0.0");

    let backend = backend(&remotes, &cache);
    let result = backend
        .get_module("github.com/acme/widget/v2", "v2.0.0")
        .await;

    assert!(matches!(result, Err(BackendError::NotFound)));
}

#[tokio::test]
async fn major_subdirectory_wins_the_module_file_lookup() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("go.mod", "module github.com/acme/widget\n");
    repo.write("v2/go.mod", "module github.com/acme/widget/v2\n");
    repo.commit("initial", T1);
    repo.tag("v2.0.0");

    let backend = backend(&remotes, &cache);
    let contents = backend
        .get_module("github.com/acme/widget/v2", "v2.0.0")
        .await
        .unwrap();

    assert_eq!(contents, "module github.com/acme/widget/v2\n");
}

#[tokio::test]
async fn incompatible_version_resolves_the_bare_tag() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("main.go", "package main\n");
    repo.commit("initial", T2);
    repo.tag("v2.0.0");

    let backend = backend(&remotes, &cache);
    let info = backend
        .get_info("github.com/acme/widget", "v2.0.0+incompatible")
        .await
        .unwrap();

    assert_eq!(info.version, "v2.0.0+incompatible");
    assert_eq!(
        info.time,
        Utc.with_ymd_and_hms(2022, 5, 17, 0, 17, 27).unwrap()
    );
}

#[tokio::test]
async fn incompatible_with_major_suffix_is_a_bad_request() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();

    let backend = backend(&remotes, &cache);
    let result = backend
        .get_module("github.com/acme/widget/v2", "v2.0.0+incompatible")
        .await;

    assert!(matches!(result, Err(BackendError::BadRequest(_))));
}

#[tokio::test]
async fn unknown_revision_is_out_of_date() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("main.go", "package main\n");
    repo.commit("initial", T1);
    repo.tag("v1.0.0");

    let backend = backend(&remotes, &cache);
    let result = backend.get_info("github.com/acme/widget", "v9.9.9").await;

    assert!(matches!(result, Err(BackendError::OutOfDate)));
}

#[tokio::test]
async fn pseudo_version_resolves_its_embedded_commit() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("main.go", "package main\n");
    let first = repo.commit("first", T1);
    repo.write("main.go", "package main // second\n");
    repo.commit("second", T2);

    let backend = backend(&remotes, &cache);
    let version = format!("v0.0.0-20220516120000-{}", &first[..12]);
    let info = backend
        .get_info("github.com/acme/widget", &version)
        .await
        .unwrap();

    assert_eq!(info.version, version);
    assert_eq!(
        info.time,
        Utc.with_ymd_and_hms(2022, 5, 16, 12, 0, 0).unwrap()
    );
}

fn zip_names(archive: &[u8]) -> Vec<String> {
    let mut archive = ZipArchive::new(Cursor::new(archive.to_vec())).unwrap();
    let mut names = Vec::new();
    for i in 0..archive.len() {
        names.push(archive.by_index(i).unwrap().name().to_string());
    }
    names.sort();
    names
}

#[tokio::test]
async fn archive_applies_the_module_zip_rules() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("go.mod", "module github.com/acme/widget\n");
    repo.write("main.go", "package main\n");
    repo.write("LICENSE", "MIT\n");
    repo.write("examples/demo/go.mod", "module demo\n");
    repo.write("examples/demo/main.go", "package main\n");
    repo.write("vendor/modules.txt", "# modules\n");
    repo.write("vendor/github.com/dep/dep.go", "package dep\n");
    #[cfg(unix)]
    repo.symlink("link.go", "main.go");
    repo.commit("initial", T1);
    repo.tag("v1.0.0");

    let backend = backend(&remotes, &cache);
    let archive = backend
        .get_archive("github.com/acme/widget", "v1.0.0")
        .await
        .unwrap();

    assert_eq!(
        zip_names(&archive),
        vec![
            "github.com/acme/widget@v1.0.0/LICENSE",
            "github.com/acme/widget@v1.0.0/go.mod",
            "github.com/acme/widget@v1.0.0/main.go",
            "github.com/acme/widget@v1.0.0/vendor/modules.txt",
        ]
    );
}

#[tokio::test]
async fn archive_inherits_the_repository_license_for_sub_modules() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("LICENSE", "MIT\n");
    repo.write("go.mod", "module github.com/acme/widget\n");
    repo.write("sub/go.mod", "module github.com/acme/widget/sub\n");
    repo.write("sub/sub.go", "package sub\n");
    repo.commit("initial", T1);
    repo.tag("sub/v0.3.0");

    let backend = backend(&remotes, &cache);
    let archive = backend
        .get_archive("github.com/acme/widget/sub", "v0.3.0")
        .await
        .unwrap();

    assert_eq!(
        zip_names(&archive),
        vec![
            "github.com/acme/widget/sub@v0.3.0/LICENSE",
            "github.com/acme/widget/sub@v0.3.0/go.mod",
            "github.com/acme/widget/sub@v0.3.0/sub.go",
        ]
    );
}

#[tokio::test]
async fn archive_contents_round_trip() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("go.mod", "module github.com/acme/widget\n");
    repo.commit("initial", T1);
    repo.tag("v1.0.0");

    let backend = backend(&remotes, &cache);
    let archive = backend
        .get_archive("github.com/acme/widget", "v1.0.0")
        .await
        .unwrap();

    let mut archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    let mut file = archive
        .by_name("github.com/acme/widget@v1.0.0/go.mod")
        .unwrap();
    let mut contents = String::new();
    std::io::Read::read_to_string(&mut file, &mut contents).unwrap();
    assert_eq!(contents, "module github.com/acme/widget\n");
}

#[tokio::test]
async fn concurrent_requests_share_a_single_clone() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("main.go", "package main\n");
    repo.commit("initial", T1);
    for minor in 0..4 {
        repo.tag(&format!("v0.{minor}.0"));
    }

    let backend = Arc::new(backend(&remotes, &cache));
    let mut tasks = Vec::new();
    for minor in 0..4 {
        let backend = backend.clone();
        tasks.push(tokio::spawn(async move {
            backend
                .get_info("github.com/acme/widget", &format!("v0.{minor}.0"))
                .await
        }));
    }
    for task in tasks {
        // A second clone into the same directory would fail, so every
        // request succeeding means the clone ran once.
        task.await.unwrap().unwrap();
    }

    assert!(cache.path().join("github.com/acme/widget").is_dir());
}

#[tokio::test]
async fn load_restores_the_cache_between_processes() {
    let remotes = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    let repo = ScratchRepo::init(remotes.path(), "github.com/acme/widget");
    repo.write("main.go", "package main\n");
    repo.commit("initial", T2);
    repo.tag("v1.0.0");

    {
        let backend = backend(&remotes, &cache);
        backend
            .get_info("github.com/acme/widget", "v1.0.0")
            .await
            .unwrap();
    }

    let restarted = backend(&remotes, &cache);
    let loaded = restarted.load().await.unwrap();
    assert_eq!(loaded, 1);

    let info = restarted
        .get_info("github.com/acme/widget", "v1.0.0")
        .await
        .unwrap();
    assert_eq!(info.version, "v1.0.0");
}
