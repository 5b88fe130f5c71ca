//! Orchestrator integration tests
//!
//! Covers the deploy state machine, persistence ordering, all-or-nothing
//! propagation, lightweight sync, cloud mirroring, reset and the operation lock.

mod common;

use common::*;
use imesync_core::config::{
    GeneralSection, KeyboardSection, RimeSection, ToolbarSection, CLOUD_ENABLED_KEY,
    NEEDS_RESYNC_KEY,
};
use imesync_core::settings::{OperationSettings, RuntimeSettings};
use imesync_core::{Configuration, Error, OperationLock};
use imesync_deploy::DeployState;
use std::sync::Arc;
use std::time::Duration;

fn with_key_sounds(enabled: bool) -> Configuration {
    Configuration {
        keyboard: Some(KeyboardSection {
            enable_key_sounds: Some(enabled),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn cloud_on() -> Configuration {
    Configuration {
        general: Some(GeneralSection {
            enable_cloud: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn short_timeouts() -> RuntimeSettings {
    RuntimeSettings {
        operation: OperationSettings {
            timeout_secs: 1,
            silent_timeout_secs: 1,
        },
        ..Default::default()
    }
}

mod deploy {
    use super::*;

    #[tokio::test]
    async fn test_deploy_persists_only_after_engine() {
        let env = TestEnv::new();
        env.seed_sandbox();
        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());

        let state = orchestrator.subscribe();
        let durable = env.registry.durable_config_path().unwrap();
        engine.set_probe(Arc::new(move || {
            format!("{}|{}", state.borrow().name(), durable.exists())
        }));

        let deployed = orchestrator
            .deploy(Configuration::defaults())
            .await
            .unwrap();

        let calls = engine.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].operation, "deploy");
        assert_eq!(calls[0].observed.as_deref(), Some("ReinitializingEngine|false"));
        assert_eq!(calls[0].paths.user_data, env.path("sandbox/Rime"));
        assert_eq!(orchestrator.state(), DeployState::Done);

        // the only schema on disk becomes the selection
        assert_eq!(deployed.rime().selected_schemas(), vec!["pinyin".to_string()]);

        let store = env.store();
        assert_eq!(
            store
                .load(&env.registry.durable_config_path().unwrap())
                .unwrap(),
            deployed
        );
        assert_eq!(
            store
                .load(&env.path("shared/SharedSupport/imesync.yaml"))
                .unwrap(),
            deployed
        );
        assert_eq!(store.load_from_cache().unwrap(), deployed);
        assert!(store.cache().flag(NEEDS_RESYNC_KEY).unwrap());
        assert!(env.path("shared/SharedSupport/pinyin.schema.yaml").is_file());
        assert!(env.path("shared/Rime/default.custom.yaml").is_file());
    }

    #[tokio::test]
    async fn test_sync_failure_leaves_durable_config() {
        let env = TestEnv::new();
        env.seed_sandbox();
        let store = env.store();
        let durable = env.registry.durable_config_path().unwrap();
        store.save(&with_key_sounds(true), &durable).unwrap();
        let before = std::fs::read(&durable).unwrap();

        // the shared container cannot hold directories
        env.write("shared", "not a directory");

        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());
        let err = orchestrator
            .deploy(with_key_sounds(false))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DestinationNotWritable { .. }));
        assert_eq!(std::fs::read(&durable).unwrap(), before);
        assert!(engine.calls().is_empty());
        match orchestrator.state() {
            DeployState::Failed { step, reason } => {
                assert_eq!(step, "SynchronizingFiles");
                assert!(reason.starts_with("No write permission at"));
            }
            other => panic!("expected Failed, got {other}"),
        }

        // a later deploy starts over from the failed state
        std::fs::remove_file(env.path("shared")).unwrap();
        orchestrator.deploy(with_key_sounds(false)).await.unwrap();
        assert_eq!(orchestrator.state(), DeployState::Done);
        assert!(!store.load(&durable).unwrap().keyboard().enable_key_sounds());
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_durable_config() {
        let env = TestEnv::new();
        env.seed_sandbox();
        let store = env.store();
        let durable = env.registry.durable_config_path().unwrap();
        store.save(&with_key_sounds(true), &durable).unwrap();
        let before = std::fs::read(&durable).unwrap();

        let engine = MockEngine::new();
        engine.fail_on("deploy");
        let orchestrator = env.orchestrator(engine.clone());
        let err = orchestrator
            .deploy(with_key_sounds(false))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Engine { .. }));
        assert_eq!(std::fs::read(&durable).unwrap(), before);
        assert!(store.load_from_cache().unwrap_err().is_not_found());
        assert!(matches!(
            orchestrator.state(),
            DeployState::Failed { ref step, .. } if step == "ReinitializingEngine"
        ));
    }

    #[tokio::test]
    async fn test_patch_overrides_base() {
        let env = TestEnv::new();
        env.write(
            "sandbox/Rime/imesync.custom.yaml",
            "patch:\n  keyboard:\n    enable-key-sounds: false\n",
        );
        let base = Configuration {
            keyboard: Some(KeyboardSection {
                enable_key_sounds: Some(true),
                haptic_feedback_intensity: Some(4),
                ..Default::default()
            }),
            ..Default::default()
        };

        let orchestrator = env.orchestrator(MockEngine::new());
        let deployed = orchestrator.deploy(base).await.unwrap();

        let keyboard = deployed.keyboard();
        assert!(!keyboard.enable_key_sounds());
        assert_eq!(keyboard.haptic_feedback_intensity(), 4);
    }

    #[tokio::test]
    async fn test_user_configuration_replaces_base() {
        let env = TestEnv::new();
        env.write(
            "sandbox/Rime/imesync.yaml",
            "toolbar:\n  height-of-toolbar: 70\n",
        );

        let orchestrator = env.orchestrator(MockEngine::new());
        let deployed = orchestrator.deploy(with_key_sounds(true)).await.unwrap();

        assert_eq!(
            deployed.toolbar,
            Some(ToolbarSection {
                height_of_toolbar: Some(70),
                ..Default::default()
            })
        );
        assert!(deployed.keyboard.is_none());
    }

    #[tokio::test]
    async fn test_keyboard_dictionaries_preserved() {
        let env = TestEnv::new();
        env.seed_sandbox();
        env.write("shared/Rime/luna.userdb/000001.log", "learned");
        env.write("shared/Rime/custom_phrase.txt", "phrase");
        env.write("shared/Rime/stale.yaml", "old");

        let config = Configuration {
            rime: Some(RimeSection {
                override_dict_files: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        };
        let orchestrator = env.orchestrator(MockEngine::new());
        orchestrator.deploy(config).await.unwrap();

        assert_eq!(env.read("sandbox/Rime/luna.userdb/000001.log"), "learned");
        assert!(env.path("sandbox/Rime/custom_phrase.txt").is_file());
        assert!(!env.path("sandbox/Rime/stale.yaml").exists());
        assert!(env.path("shared/Rime/luna.userdb/000001.log").is_file());
        assert!(!env.path("shared/Rime/stale.yaml").exists());
    }

    #[tokio::test]
    async fn test_dictionaries_overridden_by_default() {
        let env = TestEnv::new();
        env.seed_sandbox();
        env.write("shared/Rime/luna.userdb/000001.log", "learned");

        let orchestrator = env.orchestrator(MockEngine::new());
        orchestrator.deploy(Configuration::default()).await.unwrap();

        assert!(!env.path("sandbox/Rime/luna.userdb").exists());
        assert!(!env.path("shared/Rime/luna.userdb").exists());
    }

    #[tokio::test]
    async fn test_deploy_pulls_cloud_mirror_first() {
        let env = TestEnv::with_cloud();
        env.seed_sandbox();
        env.write("cloud/RIME/SharedSupport/cloud_only.yaml", "from cloud");
        env.write(
            "cloud/RIME/Rime/imesync.custom.yaml",
            "patch:\n  keyboard:\n    enable-key-sounds: true\n",
        );

        let orchestrator = env.orchestrator(MockEngine::new());
        let deployed = orchestrator.deploy(cloud_on()).await.unwrap();

        assert_eq!(env.read("sandbox/SharedSupport/cloud_only.yaml"), "from cloud");
        assert!(env.path("shared/SharedSupport/cloud_only.yaml").is_file());
        // the pulled patch applies to this same deploy
        assert!(deployed.keyboard().enable_key_sounds());
    }

    #[tokio::test]
    async fn test_deploy_with_cloud_but_no_cloud_root() {
        let env = TestEnv::new();
        env.seed_sandbox();

        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());
        let err = orchestrator.deploy(cloud_on()).await.unwrap_err();

        assert!(matches!(err, Error::CloudNotConfigured));
        assert!(engine.calls().is_empty());
        assert!(matches!(
            orchestrator.state(),
            DeployState::Failed { ref step, .. } if step == "LoadingConfig"
        ));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_unreadable_user_file_activates_nothing() {
        let env = TestEnv::new();
        env.seed_sandbox();
        let orchestrator = env.orchestrator(MockEngine::new());
        orchestrator.deploy(Configuration::default()).await.unwrap();

        env.write("sandbox/SharedSupport/new_schema.yaml", "new");
        std::os::unix::fs::symlink("/proc/self/mem", env.path("sandbox/Rime/bad.bin")).unwrap();
        let err = orchestrator
            .deploy(Configuration::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Filesystem { .. }));
        // SharedSupport is not swapped ahead of the UserData that failed
        assert!(!env.path("shared/SharedSupport/new_schema.yaml").exists());
        assert!(env.path("shared/SharedSupport/pinyin.schema.yaml").is_file());
        assert!(!env.path("shared/Rime/bad.bin").exists());
        assert!(matches!(
            orchestrator.state(),
            DeployState::Failed { ref step, .. } if step == "SynchronizingFiles"
        ));
    }

    #[tokio::test]
    async fn test_second_operation_fails_fast() {
        let env = TestEnv::new();
        env.seed_sandbox();
        let _held = OperationLock::acquire(&env.path("sandbox"), "restore").unwrap();

        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());
        match orchestrator.deploy(Configuration::default()).await {
            Err(Error::OperationInProgress { operation }) => assert_eq!(operation, "restore"),
            other => panic!("expected OperationInProgress, got {other:?}"),
        }
        assert_eq!(orchestrator.state(), DeployState::Idle);
        assert!(engine.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deploy_times_out() {
        let env = TestEnv::new();
        env.seed_sandbox();
        let engine = MockEngine::new();
        engine.stall_for(Duration::from_secs(30));
        let orchestrator = env.orchestrator_with(engine, short_timeouts());

        let err = orchestrator
            .deploy(Configuration::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TimedOut { seconds: 1, .. }));
        assert!(matches!(orchestrator.state(), DeployState::Failed { .. }));
        assert!(!env.registry.durable_config_path().unwrap().exists());
    }

    #[tokio::test]
    async fn test_silent_deploy_uses_silent_timeout() {
        let env = TestEnv::new();
        env.seed_sandbox();
        let engine = MockEngine::new();
        engine.stall_for(Duration::from_secs(30));
        let settings = RuntimeSettings {
            operation: OperationSettings {
                timeout_secs: 600,
                silent_timeout_secs: 1,
            },
            ..Default::default()
        };
        let orchestrator = env.orchestrator_with(engine, settings);

        let err = orchestrator
            .deploy_silent(Configuration::default())
            .await
            .unwrap_err();
        assert!(err.user_message().contains("took too long"));
    }
}

mod sync {
    use super::*;

    #[tokio::test]
    async fn test_sync_propagates_without_redeploy() {
        let env = TestEnv::new();
        env.seed_sandbox();
        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());

        let summary = orchestrator.sync().await.unwrap();

        assert_eq!(engine.operations(), vec!["sync".to_string()]);
        assert_eq!(summary.sync_dir, env.path("sandbox/Rime/sync"));
        assert!(summary.sync_dir.is_dir());
        assert!(summary.cloud.is_empty());
        assert!(env.path("shared/SharedSupport/default.yaml").is_file());
        assert!(env.store().cache().flag(NEEDS_RESYNC_KEY).unwrap());
        // sync never claims a deployment
        assert!(!env.registry.durable_config_path().unwrap().exists());
        assert_eq!(orchestrator.state(), DeployState::Idle);
    }

    #[tokio::test]
    async fn test_unwritable_sync_dir_reported_before_work() {
        let env = TestEnv::new();
        env.seed_sandbox();
        env.write("blocked", "a file, not a directory");
        let target = env.path("blocked/sync");
        env.write(
            "sandbox/Rime/installation.yaml",
            &format!("installation_id: test\nsync_dir: {}\n", target),
        );

        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());
        let err = orchestrator.sync().await.unwrap_err();

        assert_eq!(
            err.user_message(),
            format!("No write permission at {}", target)
        );
        assert!(engine.calls().is_empty());
        assert!(!env.path("shared").exists());
    }

    #[tokio::test]
    async fn test_relative_sync_dir() {
        let env = TestEnv::new();
        env.write("sandbox/Rime/installation.yaml", "sync_dir: mirror\n");

        let orchestrator = env.orchestrator(MockEngine::new());
        let summary = orchestrator.sync().await.unwrap();
        assert_eq!(summary.sync_dir, env.path("sandbox/Rime/mirror"));
    }

    #[tokio::test]
    async fn test_sync_with_cloud() {
        let env = TestEnv::with_cloud();
        env.seed_sandbox();
        env.write("sandbox/Rime/luna.userdb/000001.log", "private");
        env.write("cloud/RIME/Rime/from_other_device.txt", "hello");
        let store = env.store();
        store.save_to_cache(&cloud_on()).unwrap();

        let orchestrator = env.orchestrator(MockEngine::new());
        let summary = orchestrator.sync().await.unwrap();

        // pulled from the cloud, then published everywhere
        assert_eq!(env.read("sandbox/Rime/from_other_device.txt"), "hello");
        assert!(env.path("shared/Rime/from_other_device.txt").is_file());
        assert!(env.path("cloud/RIME/SharedSupport/default.yaml").is_file());
        assert!(!env.path("cloud/RIME/Rime/luna.userdb").exists());
        assert!(!summary.cloud.is_empty());
    }

    #[tokio::test]
    async fn test_sync_leaves_durable_configuration() {
        let env = TestEnv::with_cloud();
        env.seed_sandbox();
        let orchestrator = env.orchestrator(MockEngine::new());
        orchestrator.deploy(cloud_on()).await.unwrap();

        let durable = env.registry.durable_config_path().unwrap();
        let before = std::fs::read(&durable).unwrap();
        let remote = "keyboard:\n  enable-key-sounds: true\n";
        env.write("cloud/RIME/SharedSupport/imesync.yaml", remote);

        orchestrator.sync().await.unwrap();

        assert_eq!(std::fs::read(&durable).unwrap(), before);
        assert_eq!(env.read("cloud/RIME/SharedSupport/imesync.yaml"), remote);
        assert!(env.path("cloud/RIME/SharedSupport/default.yaml").is_file());
    }

    #[tokio::test]
    async fn test_cloud_enabled_without_cloud_root() {
        let env = TestEnv::new();
        env.seed_sandbox();
        env.store().save_to_cache(&cloud_on()).unwrap();

        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());
        assert!(matches!(
            orchestrator.sync().await,
            Err(Error::CloudNotConfigured)
        ));
        assert!(engine.calls().is_empty());
    }
}

mod reset {
    use super::*;

    fn seed_bundle(env: &TestEnv) {
        env.write("bundle/SharedSupport/default.yaml", "schema_list: []\n");
        env.write("bundle/Rime/default.custom.yaml", "patch: {}\n");
    }

    #[tokio::test]
    async fn test_reset_recreates_from_bundle() {
        let env = TestEnv::new();
        env.seed_sandbox();
        seed_bundle(&env);
        env.write("sandbox/Rime/my_dict.txt", "mine");
        let store = env.store();
        store.save_to_cache(&cloud_on()).unwrap();
        store.cache().set_flag(CLOUD_ENABLED_KEY, true).unwrap();

        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());
        let config = orchestrator.reset().await.unwrap();

        assert_eq!(
            engine.operations(),
            vec!["reset".to_string(), "deploy".to_string()]
        );
        assert!(!env.path("sandbox/Rime/my_dict.txt").exists());
        assert!(!env.path("sandbox/SharedSupport/pinyin.schema.yaml").exists());
        assert!(env.path("shared/Rime/default.custom.yaml").is_file());
        assert!(!config.general().enable_cloud());
        assert!(!store.cache().flag(CLOUD_ENABLED_KEY).unwrap());
        assert_eq!(store.load_from_cache().unwrap(), config);
        assert!(store.load_default_from_cache().is_ok());
        assert_eq!(orchestrator.state(), DeployState::Done);
    }

    #[tokio::test]
    async fn test_reset_clears_cloud_from_bundled_user_config() {
        let env = TestEnv::new();
        seed_bundle(&env);
        env.write("bundle/Rime/imesync.yaml", "general:\n  enable-cloud: true\n");

        let orchestrator = env.orchestrator(MockEngine::new());
        let config = orchestrator.reset().await.unwrap();

        assert!(!config.general().enable_cloud());
        let durable = env
            .store()
            .load(&env.registry.durable_config_path().unwrap())
            .unwrap();
        assert!(!durable.general().enable_cloud());
    }

    #[tokio::test]
    async fn test_reset_without_bundle_changes_nothing() {
        let env = TestEnv::new();
        env.seed_sandbox();

        let engine = MockEngine::new();
        let orchestrator = env.orchestrator(engine.clone());
        let err = orchestrator.reset().await.unwrap_err();

        assert!(matches!(err, Error::SourceNotReadable { .. }));
        assert!(env.path("sandbox/SharedSupport/pinyin.schema.yaml").is_file());
        assert!(engine.calls().is_empty());
    }
}
