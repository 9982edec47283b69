//! Property tests for bootstrap planning and descriptor order

use proptest::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;
use vcpkg_prebuild_core::emit::{CHMOD, CURL, UNZIP};
use vcpkg_prebuild_core::plan::{plan_registry_bootstrap, plan_tool_bootstrap};
use vcpkg_prebuild_core::{
    Arch, BootstrapConfig, Environment, InstallPipelineBuilder, MapResolver, Os, PackageContext,
    Platform, ProcessInvocation, Sources, StepKind,
};

fn resolver() -> MapResolver {
    MapResolver::new()
        .with_tool(CURL, "/host/curl")
        .with_tool(UNZIP, "/host/unzip")
        .with_tool(CHMOD, "/host/chmod")
}

fn tag() -> impl Strategy<Value = String> {
    "[0-9]{4}[.-][0-9]{2}[.-][0-9]{2}"
}

/// Rank of a descriptor in the fixed pipeline order
fn rank(descriptor: &ProcessInvocation) -> usize {
    let label = descriptor.label.as_str();
    if label.starts_with("Run: curl") && label.contains("vcpkg-tool") {
        1
    } else if label.starts_with("Run: curl") || label.starts_with("Run: unzip") {
        0
    } else {
        match label {
            "Run: vcpkg version" => 3,
            "Run: vcpkg install" => 4,
            _ if descriptor.arguments.first().map(String::as_str) == Some("+x") => 2,
            _ => 5,
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn registry_present_means_no_registry_steps(tag in tag()) {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join(format!("vcpkg-{tag}"))).unwrap();
        prop_assert!(plan_registry_bootstrap(&tag, ws.path(), &Sources::default()).is_empty());
    }

    #[test]
    fn missing_tool_means_one_download_to_binary(tag in tag(), registry in tag()) {
        let ws = TempDir::new().unwrap();
        let root = ws.path().join(format!("vcpkg-{registry}"));
        let steps = plan_tool_bootstrap(
            &tag,
            &root,
            &Sources::default(),
            Platform::new(Os::Osx, Arch::Arm64),
        )
        .unwrap();

        prop_assert_eq!(steps.len(), 1);
        match &steps[0].kind {
            StepKind::Download { destination, url, .. } => {
                prop_assert_eq!(destination, &root.join("vcpkg"));
                prop_assert!(url.contains(&tag));
            }
            other => prop_assert!(false, "unexpected step {:?}", other),
        }
    }

    #[test]
    fn descriptors_follow_fixed_order(
        registry_present in any::<bool>(),
        tool_present in any::<bool>(),
    ) {
        let ws = TempDir::new().unwrap();
        let root = ws.path().join("vcpkg-2025.04.09");
        if registry_present {
            std::fs::create_dir(&root).unwrap();
            if tool_present {
                std::fs::write(root.join("vcpkg"), "").unwrap();
            }
        }

        let context = PackageContext::new("/pkg", ws.path(), resolver());
        let descriptors = InstallPipelineBuilder::new(BootstrapConfig::default(), Environment::new())
            .with_platform(Platform::new(Os::Osx, Arch::Arm64))
            .build(&context)
            .unwrap();

        let expected = 4
            + if registry_present { 0 } else { 2 }
            + if registry_present && tool_present { 0 } else { 1 };
        prop_assert_eq!(descriptors.len(), expected);

        let ranks: Vec<_> = descriptors.iter().map(rank).collect();
        prop_assert!(ranks.windows(2).all(|w| w[0] <= w[1]), "out of order: {:?}", ranks);

        let n = descriptors.len();
        prop_assert_eq!(&descriptors[n - 4].arguments[0], "+x");
        prop_assert_eq!(&descriptors[n - 1].arguments[0], "-x");
    }

    #[test]
    fn install_environment_never_has_registry_root(
        value in "[a-zA-Z0-9/_.-]{0,24}",
        define in any::<bool>(),
    ) {
        let ws = TempDir::new().unwrap();
        let mut env = Environment::new();
        env.insert("PATH".to_string(), "/usr/bin:/bin".to_string());
        if define {
            env.insert("VCPKG_ROOT".to_string(), value);
        }

        let context = PackageContext::new("/pkg", ws.path(), resolver());
        let descriptors = InstallPipelineBuilder::new(BootstrapConfig::default(), env)
            .with_platform(Platform::new(Os::Linux, Arch::Arm64))
            .build(&context)
            .unwrap();

        let install = descriptors.iter().find(|d| d.label == "Run: vcpkg install").unwrap();
        prop_assert!(!install.environment.contains_key("VCPKG_ROOT"));
        prop_assert_eq!(install.environment.get("PATH").map(String::as_str), Some("/usr/bin:/bin"));
        prop_assert_eq!(&install.output_dir, &ws.path().join("vcpkg_installed"));
    }
}

#[test]
fn unsupported_platform_aborts_before_emitting() {
    let ws = TempDir::new().unwrap();
    let context = PackageContext::new("/pkg", ws.path(), resolver());
    let result = InstallPipelineBuilder::new(BootstrapConfig::default(), Environment::new())
        .with_platform(Platform::new(Os::Ios, Arch::Arm64))
        .build(&context);
    assert!(matches!(
        result,
        Err(vcpkg_prebuild_core::Error::UnsupportedPlatform { .. })
    ));
}

#[test]
fn helpers_from_system_dirs_when_host_has_none() {
    let ws = TempDir::new().unwrap();
    let root = ws.path().join("vcpkg-2025.04.09");
    std::fs::create_dir(&root).unwrap();
    std::fs::write(root.join("vcpkg"), "").unwrap();

    let tools = TempDir::new().unwrap();
    let chmod = tools.path().join("chmod");
    std::fs::write(&chmod, "#!/bin/sh\n").unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&chmod, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let config = BootstrapConfig {
        search_dirs: vec![PathBuf::from("/nonexistent"), tools.path().to_path_buf()],
        ..BootstrapConfig::default()
    };
    let context = PackageContext::new("/pkg", ws.path(), vcpkg_prebuild_core::NoResolver);
    let descriptors = InstallPipelineBuilder::new(config, Environment::new())
        .with_platform(Platform::new(Os::Linux, Arch::X64))
        .build(&context)
        .unwrap();

    assert_eq!(descriptors.len(), 4);
    assert_eq!(descriptors[0].executable, chmod);
}
