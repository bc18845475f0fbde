use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use kk_cli::cli::{Cli, Commands, InstallArgs, ScopeArg};
use kk_core::models::{ConfigFile, Configuration, PortMode, PortRole};

fn install_args(argv: &[&str]) -> (InstallArgs, bool) {
    let mut full = vec!["k8s-keeper", "install"];
    full.extend_from_slice(argv);
    let cli = Cli::try_parse_from(full).unwrap();
    match cli.command {
        Commands::Install(args) => (args, cli.debug),
        other => panic!("expected install, got {other:?}"),
    }
}

fn configuration(argv: &[&str], file: &ConfigFile) -> Configuration {
    let (args, debug) = install_args(argv);
    args.into_configuration(file, debug)
}

#[test]
fn defaults_without_flags_or_file() {
    let config = configuration(&[], &ConfigFile::default());
    assert_eq!(config.cluster_name, "k8s-keeper");
    assert_eq!(config.work_dir, PathBuf::from("/tmp/k8s-keeper-build"));
    assert_eq!(config.port_mode, PortMode::Auto);
    assert!(config.port_overrides.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn flags_override_config_file() {
    let file = ConfigFile {
        cluster_name: Some("from-file".into()),
        folder: Some("Staging".into()),
        ports: HashMap::from([(PortRole::Http, 9080), (PortRole::Dashboard, 9001)]),
        skip_stages: vec!["04".into()],
        crd_timeout_secs: Some(60),
        ..Default::default()
    };
    let config = configuration(
        &[
            "--cluster-name",
            "from-flag",
            "--http-port",
            "7080",
            "--skip-stage",
            "validation",
            "--skip-stage",
            "04",
        ],
        &file,
    );

    assert_eq!(config.cluster_name, "from-flag");
    assert_eq!(config.folder.as_deref(), Some("Staging"));
    assert_eq!(config.port_overrides.get(&PortRole::Http), Some(&7080));
    assert_eq!(config.port_overrides.get(&PortRole::Dashboard), Some(&9001));
    assert_eq!(config.skip_stages, vec!["04".to_string(), "validation".to_string()]);
    assert_eq!(config.crd_timeout, Duration::from_secs(60));
}

#[test]
fn token_flag_replaces_file_ksm_config() {
    let file = ConfigFile {
        ksm_config: Some(PathBuf::from("/etc/ksm.json")),
        ..Default::default()
    };
    let config = configuration(&["--token", "US:abc"], &file);
    assert_eq!(config.ksm_token.as_deref(), Some("US:abc"));
    assert_eq!(config.ksm_config, None);
    assert!(config.validate().is_ok());

    let config = configuration(&[], &file);
    assert_eq!(config.ksm_config, Some(PathBuf::from("/etc/ksm.json")));
}

#[test]
fn conflicting_modes_rejected_by_parser() {
    let result = Cli::try_parse_from([
        "k8s-keeper",
        "install",
        "--production-only",
        "--development-only",
    ]);
    assert!(result.is_err());

    let result = Cli::try_parse_from([
        "k8s-keeper",
        "install",
        "--token",
        "t",
        "--ksm-config",
        "/tmp/ksm.json",
    ]);
    assert!(result.is_err());
}

#[test]
fn interactive_flag_sets_port_mode() {
    let config = configuration(&["--interactive-ports"], &ConfigFile::default());
    assert_eq!(config.port_mode, PortMode::Interactive);
}

#[test]
fn resume_arguments_parse_back_to_the_same_configuration() {
    let original = configuration(
        &[
            "--allow-root",
            "--development-only",
            "--folder",
            "Staging",
            "--nodeport-base-port",
            "30500",
            "--https-port",
            "9443",
            "--interactive-ports",
            "--skip-stage",
            "07",
            "--cluster-name",
            "dev",
            "--work-dir",
            "/var/tmp/kk",
            "--crd-timeout",
            "90",
            "--debug",
        ],
        &ConfigFile::default(),
    );

    let rendered = original.to_cli_args();
    let argv: Vec<&str> = rendered.iter().map(String::as_str).collect();
    let reparsed = configuration(&argv, &ConfigFile::default());

    assert_eq!(reparsed.to_cli_args(), rendered);
    assert!(reparsed.allow_root);
    assert!(reparsed.development_only);
    assert!(reparsed.debug);
    assert_eq!(reparsed.port_overrides, original.port_overrides);
    assert_eq!(reparsed.work_dir, PathBuf::from("/var/tmp/kk"));
    assert_eq!(reparsed.crd_timeout, Duration::from_secs(90));
}

#[test]
fn uninstall_defaults_to_cluster_scope() {
    let cli = Cli::try_parse_from(["k8s-keeper", "uninstall"]).unwrap();
    match cli.command {
        Commands::Uninstall(args) => assert_eq!(args.scope, ScopeArg::Cluster),
        other => panic!("expected uninstall, got {other:?}"),
    }

    let cli = Cli::try_parse_from(["k8s-keeper", "uninstall", "purge", "--work-dir", "/tmp/x"])
        .unwrap();
    match cli.command {
        Commands::Uninstall(args) => {
            assert_eq!(args.scope, ScopeArg::Purge);
            assert_eq!(args.location.work_dir, Some(PathBuf::from("/tmp/x")));
        }
        other => panic!("expected uninstall, got {other:?}"),
    }
}

#[test]
fn ports_scan_takes_a_range() {
    let cli = Cli::try_parse_from(["k8s-keeper", "ports", "--scan", "8000-8010"]).unwrap();
    match cli.command {
        Commands::Ports(args) => assert_eq!(args.scan, Some((8000, 8010))),
        other => panic!("expected ports, got {other:?}"),
    }
    assert!(Cli::try_parse_from(["k8s-keeper", "ports", "--scan", "9000-8000"]).is_err());
}
