//! Integration tests for Stratus

mod engine_tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use chrono::{DateTime, Utc};
    use stratus::config::CacheSettings;
    use stratus::remote::ByteStream;
    use stratus::stage::ActionRecord;
    use stratus::{BuildCache, MemoryStore, ModuleCache, Object, ObjectStore};
    use tempfile::TempDir;

    const ACTION_ID: &str = "aabb734f0d2e8ffa3c1b5d6e7f8091a2b3c4d5e6f708192a3b4c5d6e7f809100";
    const OUTPUT_ID: &str = "ccdd58a1b2c3d4e5f60718293a4b5c6d7e8f9a0b1c2d3e4f5a6b7c8d9e0f1311";
    const MTIME_NANOS: i64 = 1_700_000_000_000_000_000;

    fn body(bytes: &[u8]) -> ByteStream {
        Box::new(Cursor::new(bytes.to_vec()))
    }

    fn settings(dir: &TempDir, name: &str) -> CacheSettings {
        CacheSettings {
            local_dir: dir.path().join(name),
            ..CacheSettings::default()
        }
    }

    async fn build_cache(dir: &TempDir, name: &str, store: &Arc<MemoryStore>) -> BuildCache {
        BuildCache::new(&settings(dir, name), Arc::clone(store) as Arc<dyn ObjectStore>)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn write_through_durability() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());

        // First process: put and close.
        let cache = build_cache(&temp, "stage-a", &store).await;
        cache
            .put(Object {
                action_id: ACTION_ID.to_string(),
                output_id: OUTPUT_ID.to_string(),
                size: 5,
                body: body(b"hello"),
                mod_time: Some(DateTime::from_timestamp_nanos(MTIME_NANOS)),
            })
            .await
            .unwrap();
        cache.close().await.unwrap();

        // The remote now holds both records, partitioned by id prefix.
        let output_key = format!("output/{}/{}", &OUTPUT_ID[..2], OUTPUT_ID);
        let action_key = format!("action/{}/{}", &ACTION_ID[..2], ACTION_ID);
        assert_eq!(store.data(&output_key).unwrap(), b"hello");
        let record = ActionRecord::parse(&store.data(&action_key).unwrap()).unwrap();
        assert_eq!(record.output_id, OUTPUT_ID);
        assert_eq!(record.mod_time.timestamp(), MTIME_NANOS / 1_000_000_000);

        // Fresh process with an empty stage: the get faults in an identical
        // file with the original modification time.
        let fresh = build_cache(&temp, "stage-b", &store).await;
        let hit = fresh.get(ACTION_ID).await.unwrap().unwrap();
        assert_eq!(hit.output_id, OUTPUT_ID);
        assert_eq!(std::fs::read(&hit.disk_path).unwrap(), b"hello");

        let modified: DateTime<Utc> = std::fs::metadata(&hit.disk_path)
            .unwrap()
            .modified()
            .unwrap()
            .into();
        assert_eq!(modified.timestamp(), MTIME_NANOS / 1_000_000_000);
        assert_eq!(fresh.metrics().get_fault_hit.get(), 1);
    }

    #[tokio::test]
    async fn skip_small_never_touches_remote() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = BuildCache::new(
            &CacheSettings {
                local_dir: temp.path().join("stage"),
                min_upload_size: 1024,
                ..CacheSettings::default()
            },
            Arc::clone(&store) as Arc<dyn ObjectStore>,
        )
        .await
        .unwrap();

        cache
            .put(Object {
                action_id: ACTION_ID.to_string(),
                output_id: OUTPUT_ID.to_string(),
                size: 100,
                body: body(&[7u8; 100]),
                mod_time: None,
            })
            .await
            .unwrap();
        cache.close().await.unwrap();

        assert!(store.is_empty());
        assert_eq!(cache.metrics().put_skip_small.get(), 1);
        assert_eq!(cache.metrics().put_gcs_object.get(), 0);
    }

    #[tokio::test]
    async fn concurrent_identical_puts_upload_once() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(build_cache(&temp, "stage", &store).await);

        let other_action = "eeff0000000000000000000000000000000000000000000000000000000000ff";
        let (a, b) = tokio::join!(
            cache.put(Object {
                action_id: ACTION_ID.to_string(),
                output_id: OUTPUT_ID.to_string(),
                size: 4,
                body: body(b"same"),
                mod_time: None,
            }),
            cache.put(Object {
                action_id: other_action.to_string(),
                output_id: OUTPUT_ID.to_string(),
                size: 4,
                body: body(b"same"),
                mod_time: None,
            }),
        );
        a.unwrap();
        b.unwrap();
        cache.close().await.unwrap();

        let m = cache.metrics();
        assert_eq!(m.put_gcs_object.get(), 1);
        assert_eq!(m.put_gcs_found.get(), 1);
        assert_eq!(m.put_gcs_object.get() + m.put_gcs_found.get(), 2);
        assert_eq!(m.put_gcs_action.get(), 2);
        assert_eq!(store.len(), 3); // one output, two action records
    }

    #[tokio::test]
    async fn remote_miss_is_not_an_error() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = build_cache(&temp, "stage", &store).await;

        assert!(cache.get(ACTION_ID).await.unwrap().is_none());
        assert_eq!(cache.metrics().get_fault_miss.get(), 1);
    }

    #[tokio::test]
    async fn action_hit_with_missing_output_is_an_error() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = build_cache(&temp, "stage", &store).await;

        let action_key = format!("action/{}/{}", &ACTION_ID[..2], ACTION_ID);
        let record = format!("{} {}", OUTPUT_ID, MTIME_NANOS);
        store.put(&action_key, body(record.as_bytes())).await.unwrap();

        assert!(cache.get(ACTION_ID).await.is_err());
        assert_eq!(cache.metrics().get_fault_miss.get(), 0);
    }

    #[tokio::test]
    async fn upload_survives_caller_abort() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(build_cache(&temp, "stage", &store).await);

        // Issue the put from a task that is aborted as soon as the put
        // returns; the background upload must still complete.
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let put_cache = Arc::clone(&cache);
        let handle = tokio::spawn(async move {
            put_cache
                .put(Object {
                    action_id: ACTION_ID.to_string(),
                    output_id: OUTPUT_ID.to_string(),
                    size: 5,
                    body: body(b"hello"),
                    mod_time: None,
                })
                .await
                .unwrap();
            let _ = done_tx.send(());
            std::future::pending::<()>().await;
        });
        done_rx.await.unwrap();
        handle.abort();

        cache.close().await.unwrap();
        assert_eq!(cache.metrics().put_gcs_object.get(), 1);
        assert_eq!(cache.metrics().put_gcs_action.get(), 1);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn close_drains_all_pending_uploads() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = build_cache(&temp, "stage", &store).await;

        for i in 0..20u32 {
            let action_id = format!("{:064x}", 0xa000 + u64::from(i));
            let output_id = format!("{:064x}", 0xb000 + u64::from(i));
            cache
                .put(Object {
                    action_id,
                    output_id,
                    size: 8,
                    body: body(format!("body-{i:03}").as_bytes()),
                    mod_time: None,
                })
                .await
                .unwrap();
        }
        cache.close().await.unwrap();

        // Every upload finished before close returned: 20 outputs plus 20
        // action records, with stable counters.
        assert_eq!(store.len(), 40);
        let m = cache.metrics();
        assert_eq!(m.put_gcs_object.get(), 20);
        assert_eq!(m.put_gcs_action.get(), 20);
        assert_eq!(m.put_gcs_error.get(), 0);
    }

    #[tokio::test]
    async fn remote_keys_follow_partitioned_layout() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = BuildCache::new(
            &CacheSettings {
                local_dir: temp.path().join("stage"),
                key_prefix: "ci".to_string(),
                ..CacheSettings::default()
            },
            Arc::clone(&store) as Arc<dyn ObjectStore>,
        )
        .await
        .unwrap();

        cache
            .put(Object {
                action_id: ACTION_ID.to_string(),
                output_id: OUTPUT_ID.to_string(),
                size: 1,
                body: body(b"x"),
                mod_time: None,
            })
            .await
            .unwrap();
        cache.close().await.unwrap();

        for key in store.keys() {
            let parts: Vec<&str> = key.split('/').collect();
            let [prefix, kind, hh, id] = parts.as_slice() else {
                panic!("unexpected key shape: {key}");
            };
            assert_eq!(*prefix, "ci");
            assert!(matches!(*kind, "action" | "output"));
            assert_eq!(*hh, &id[..2]);
        }
    }

    #[tokio::test]
    async fn module_roundtrip_through_remote() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = ModuleCache::new(
            &settings(&temp, "stage"),
            Arc::clone(&store) as Arc<dyn ObjectStore>,
        )
        .await
        .unwrap();

        cache.put("x", body(b"y")).await.unwrap();
        cache.close().await.unwrap();
        assert_eq!(cache.metrics().put_storage_bytes.get(), 1);

        // Evict the local copy; the next get must fault in from the remote.
        let hash = stratus::module::hash_name("x");
        let local = temp
            .path()
            .join("stage")
            .join("module")
            .join(&hash[..2])
            .join(&hash);
        std::fs::remove_file(&local).unwrap();

        let reader = cache.get("x").await.unwrap();
        assert_eq!(reader.into_inner(), b"y");
        let m = cache.metrics();
        assert_eq!(m.get_fault_hit.get(), 1);
        assert_eq!(m.get_storage_bytes.get(), 1);
    }

    #[tokio::test]
    async fn module_miss_uses_not_found_sentinel() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let cache = ModuleCache::new(
            &settings(&temp, "stage"),
            Arc::clone(&store) as Arc<dyn ObjectStore>,
        )
        .await
        .unwrap();

        let err = cache.get("absent").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn build_and_module_share_a_stage_root() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let shared = settings(&temp, "stage");

        let build = BuildCache::new(&shared, Arc::clone(&store) as Arc<dyn ObjectStore>)
            .await
            .unwrap();
        let module = ModuleCache::new(&shared, Arc::clone(&store) as Arc<dyn ObjectStore>)
            .await
            .unwrap();

        build
            .put(Object {
                action_id: ACTION_ID.to_string(),
                output_id: OUTPUT_ID.to_string(),
                size: 5,
                body: body(b"hello"),
                mod_time: None,
            })
            .await
            .unwrap();
        module.put("mod@v1", body(b"zip")).await.unwrap();
        module.close().await.unwrap();
        build.close().await.unwrap();

        let usage = build.stage().usage().await.unwrap();
        assert_eq!(usage.files, 3); // action record, output, module file
    }
}

mod cli_tests {
    use assert_cmd::Command;
    use predicates::prelude::*;

    fn stratus() -> Command {
        Command::cargo_bin("stratus").unwrap()
    }

    #[test]
    fn help_displays() {
        stratus()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Two-tier build artifact cache"));
    }

    #[test]
    fn version_displays() {
        stratus()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stratus"));
    }

    #[test]
    fn config_path() {
        stratus()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        stratus()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn stats_reports_empty_stage() {
        let temp = tempfile::TempDir::new().unwrap();
        stratus()
            .args(["stats", "--dir"])
            .arg(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("files: 0"));
    }

    #[test]
    fn stats_json_output() {
        let temp = tempfile::TempDir::new().unwrap();
        stratus()
            .args(["stats", "--json", "--dir"])
            .arg(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("\"files\": 0"));
    }

    #[test]
    fn clean_requires_an_age() {
        let temp = tempfile::TempDir::new().unwrap();
        stratus()
            .arg("--config")
            .arg(temp.path().join("no-config.toml"))
            .args(["clean", "--dir"])
            .arg(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("expiration_days"));
    }

    #[test]
    fn clean_sweeps_old_files() {
        let temp = tempfile::TempDir::new().unwrap();
        let old = temp.path().join("output").join("aa").join("aabb");
        std::fs::create_dir_all(old.parent().unwrap()).unwrap();
        std::fs::write(&old, b"stale").unwrap();
        filetime::set_file_mtime(&old, filetime::FileTime::from_unix_time(1_000_000, 0)).unwrap();

        stratus()
            .args(["clean", "--max-age-days", "30", "--dir"])
            .arg(temp.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("removed 1"));
        assert!(!old.exists());
    }
}
